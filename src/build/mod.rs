//! Cross-built boot components: U-Boot and the GRUB EFI loader.

pub mod grub;
pub mod uboot;

pub use grub::build_grub_efi;
pub use uboot::{boot_script, build_uboot, compile_boot_script};
