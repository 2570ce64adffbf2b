//! Builds Debian installer SD card images for Raspberry Pi boards.
//!
//! The image boots U-Boot from the Pi firmware, U-Boot runs a GRUB EFI
//! loader, and GRUB starts the Debian netboot installer from a SquashFS
//! partition:
//!
//! ```text
//! sector 0     MBR, DOS label
//! sector 2048  firmware   FAT, 0x0c, bootable   blobs, dtb, U-Boot, boot.scr
//! ...          EFI        FAT, 0xef             EFI/BOOT/<loader>
//! ...          installer  SquashFS, 0x83        linux, initrd.gz, grub.cfg
//! ```
//!
//! Everything is done with host tools (`make`, `mkfs.vfat`, `mcopy`,
//! `mksquashfs`, `sfdisk`, `dd`, ...) and needs no root privileges.
//!
//! # Example
//!
//! ```rust,ignore
//! use pi_installer_image::{board, config::BuildConfig, pipeline};
//!
//! let request = pipeline::BuildRequest {
//!     model: board::lookup("4b")?,
//!     output: "pi4-installer.img".into(),
//!     firmware_mb: 16,
//!     efi_mb: 16,
//! };
//! pipeline::build_image(&request, &BuildConfig::default())?;
//! ```

pub mod artifact;
pub mod board;
pub mod build;
pub mod config;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod preflight;
pub mod process;

pub use error::ImageError;
