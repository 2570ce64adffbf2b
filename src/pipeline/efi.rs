//! EFI system partition holding the removable-media GRUB loader.

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::disk::{make_fat_partition, MIB};
use crate::board::Arch;

pub const LABEL: &str = "EFI";

/// Stage `EFI/BOOT/<loader>` and build the partition image.
pub fn build_efi_partition(
    arch: Arch,
    loader: &Path,
    work_dir: &Path,
    size_mb: u64,
) -> Result<PathBuf> {
    info!("=== EFI partition ===");

    let staging = work_dir.join("efi-staging");
    let boot_dir = staging.join("EFI/BOOT");
    fs::create_dir_all(&boot_dir)
        .with_context(|| format!("Failed to create {}", boot_dir.display()))?;
    let dest = boot_dir.join(arch.efi_loader_name());
    fs::copy(loader, &dest)
        .with_context(|| format!("Failed to copy {} to {}", loader.display(), dest.display()))?;

    let image = work_dir.join("efi.vfat");
    make_fat_partition(&image, size_mb * MIB, LABEL, &[staging.join("EFI")])?;
    info!("  {} ({} MB)", image.display(), size_mb);
    Ok(image)
}
