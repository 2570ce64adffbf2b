//! Supported Raspberry Pi boards.
//!
//! A static table keyed by the model name given on the command line. Each
//! entry names the device tree the firmware hands to U-Boot, the U-Boot
//! defconfig, the CPU architecture and the firmware file suffix.

use crate::error::ImageError;

/// CPU architecture the image is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Arm64,
    Armhf,
}

impl Arch {
    pub const ALL: &'static [Arch] = &[Arch::Arm64, Arch::Armhf];

    /// Debian architecture name.
    pub fn debian_name(self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64",
            Arch::Armhf => "armhf",
        }
    }

    /// `CROSS_COMPILE` prefix of the host cross toolchain.
    pub fn cross_prefix(self) -> &'static str {
        match self {
            Arch::Arm64 => "aarch64-linux-gnu-",
            Arch::Armhf => "arm-linux-gnueabihf-",
        }
    }

    /// GRUB platform directory under `/usr/lib/grub`.
    pub fn grub_platform(self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64-efi",
            Arch::Armhf => "arm-efi",
        }
    }

    /// Debian package shipping the GRUB modules for this platform.
    pub fn grub_package(self) -> &'static str {
        match self {
            Arch::Arm64 => "grub-efi-arm64-bin",
            Arch::Armhf => "grub-efi-arm-bin",
        }
    }

    /// Removable-media EFI loader name.
    pub fn efi_loader_name(self) -> &'static str {
        match self {
            Arch::Arm64 => "BOOTAA64.EFI",
            Arch::Armhf => "BOOTARM.EFI",
        }
    }

    /// Debconf owner of the GRUB settings preseeded into the installer.
    pub fn grub_debconf_package(self) -> &'static str {
        match self {
            Arch::Arm64 => "grub-efi-arm64",
            Arch::Armhf => "grub-efi-arm",
        }
    }
}

/// Where the board's device tree blob comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTree {
    /// A blob from the Raspberry Pi firmware repository, by file name.
    Firmware(&'static str),
    /// A blob produced by the U-Boot build, relative to the source tree.
    UBoot(&'static str),
}

impl DeviceTree {
    /// File name the blob gets on the firmware partition.
    pub fn file_name(&self) -> &'static str {
        match self {
            DeviceTree::Firmware(name) => name,
            DeviceTree::UBoot(path) => path.rsplit('/').next().unwrap_or(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Model {
    pub name: &'static str,
    pub device_tree: DeviceTree,
    pub uboot_config: &'static str,
    pub arch: Arch,
    /// Suffix of `start*.elf` / `fixup*.dat` (`"4"` on BCM2711 boards).
    pub fixup_variant: Option<&'static str>,
}

impl Model {
    /// Firmware blobs copied to the firmware partition.
    pub fn firmware_files(&self) -> Vec<String> {
        let suffix = self.fixup_variant.unwrap_or("");
        vec![
            "bootcode.bin".to_string(),
            format!("start{}.elf", suffix),
            format!("fixup{}.dat", suffix),
        ]
    }
}

/// Sorted by name.
const MODELS: &[Model] = &[
    Model {
        name: "2b",
        device_tree: DeviceTree::UBoot("arch/arm/dts/bcm2836-rpi-2-b.dtb"),
        uboot_config: "rpi_2_defconfig",
        arch: Arch::Armhf,
        fixup_variant: None,
    },
    Model {
        name: "3a+",
        device_tree: DeviceTree::UBoot("arch/arm/dts/bcm2837-rpi-3-a-plus.dtb"),
        uboot_config: "rpi_3_defconfig",
        arch: Arch::Arm64,
        fixup_variant: None,
    },
    Model {
        name: "3b",
        device_tree: DeviceTree::UBoot("arch/arm/dts/bcm2837-rpi-3-b.dtb"),
        uboot_config: "rpi_3_defconfig",
        arch: Arch::Arm64,
        fixup_variant: None,
    },
    Model {
        name: "3b+",
        device_tree: DeviceTree::UBoot("arch/arm/dts/bcm2837-rpi-3-b-plus.dtb"),
        uboot_config: "rpi_3_b_plus_defconfig",
        arch: Arch::Arm64,
        fixup_variant: None,
    },
    Model {
        name: "400",
        device_tree: DeviceTree::Firmware("bcm2711-rpi-400.dtb"),
        uboot_config: "rpi_4_defconfig",
        arch: Arch::Arm64,
        fixup_variant: Some("4"),
    },
    Model {
        name: "4b",
        device_tree: DeviceTree::Firmware("bcm2711-rpi-4-b.dtb"),
        uboot_config: "rpi_4_defconfig",
        arch: Arch::Arm64,
        fixup_variant: Some("4"),
    },
    Model {
        name: "cm4",
        device_tree: DeviceTree::Firmware("bcm2711-rpi-cm4.dtb"),
        uboot_config: "rpi_4_defconfig",
        arch: Arch::Arm64,
        fixup_variant: Some("4"),
    },
];

/// Valid model names, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = MODELS.iter().map(|m| m.name).collect();
    names.sort_unstable();
    names
}

pub fn lookup(name: &str) -> Result<&'static Model, ImageError> {
    MODELS
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| ImageError::UnknownModel {
            name: name.to_string(),
            valid: names(),
        })
}
