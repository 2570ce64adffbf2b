//! End-to-end image build.
//!
//! One pass, no retries: preflight, U-Boot, the three partition images, then
//! assembly. Intermediate files live in a fresh `pi-installer-XXXXXX`
//! directory that is left behind for inspection and external cleanup.

pub mod efi;
pub mod firmware;
pub mod installer;
pub mod manifest;

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::disk::{assemble_disk, ImageLayout, PartitionDescriptor, PartitionType};
use crate::board::Model;
use crate::build::{boot_script, build_grub_efi, build_uboot, compile_boot_script};
use crate::config::BuildConfig;
use crate::fetch::Fetcher;
use crate::preflight;
use manifest::BuildManifest;

/// What to build and where.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub model: &'static Model,
    pub output: PathBuf,
    pub firmware_mb: u64,
    pub efi_mb: u64,
}

#[derive(Debug)]
pub struct BuildReport {
    pub layout: ImageLayout,
    pub work_dir: PathBuf,
    pub manifest: PathBuf,
}

/// Build the complete SD card image described by `request`.
pub fn build_image(request: &BuildRequest, config: &BuildConfig) -> Result<BuildReport> {
    let model = request.model;
    info!(
        "Building installer image for Raspberry Pi {} ({})",
        model.name,
        model.arch.debian_name()
    );

    preflight::check_host_tools(model)?;

    let work_dir = create_work_dir(config.work_root.as_deref())?;
    info!("Work directory: {}", work_dir.display());

    let fetcher = Fetcher::open(&config.cache_dir)?;

    info!("=== U-Boot ===");
    let uboot_bin = build_uboot(&config.uboot_source, model, &work_dir)?;
    let boot_scr = work_dir.join("boot.scr");
    compile_boot_script(&config.uboot_source, &boot_script(model.arch), &boot_scr)?;

    let firmware_img = firmware::build_firmware_partition(
        model,
        config,
        &fetcher,
        &uboot_bin,
        &boot_scr,
        &work_dir,
        request.firmware_mb,
    )?;

    info!("=== GRUB ===");
    let grub_deb = fetcher.fetch_to_cache(&config.grub_package_url(model.arch))?;
    let loader = build_grub_efi(model.arch, &grub_deb, &work_dir)?;
    let efi_img = efi::build_efi_partition(model.arch, &loader, &work_dir, request.efi_mb)?;

    let (installer_img, installer_mb) =
        installer::build_installer_partition(model.arch, config, &fetcher, &work_dir)?;

    info!("=== Assembling {} ===", request.output.display());
    let partitions = vec![
        PartitionDescriptor {
            name: "firmware",
            file: firmware_img,
            size_mb: request.firmware_mb,
            type_code: PartitionType::FAT32_LBA,
            bootable: true,
        },
        PartitionDescriptor {
            name: "efi",
            file: efi_img,
            size_mb: request.efi_mb,
            type_code: PartitionType::EFI_SYSTEM,
            bootable: false,
        },
        PartitionDescriptor {
            name: "installer",
            file: installer_img,
            size_mb: installer_mb,
            type_code: PartitionType::LINUX,
            bootable: false,
        },
    ];
    let layout = assemble_disk(&partitions, &request.output)?;

    let manifest =
        BuildManifest::collect(model, &partitions, &layout, &request.output)?.write(&work_dir)?;

    info!(
        "Wrote {} ({} MB)",
        request.output.display(),
        layout.total_bytes / crate::artifact::disk::MIB
    );

    Ok(BuildReport {
        layout,
        work_dir,
        manifest,
    })
}

/// Create a uniquely named work directory that outlives the process.
pub fn create_work_dir(root: Option<&Path>) -> Result<PathBuf> {
    let root = root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&root)
        .with_context(|| format!("Failed to create work root {}", root.display()))?;
    let dir = tempfile::Builder::new()
        .prefix("pi-installer-")
        .tempdir_in(&root)
        .with_context(|| format!("Failed to create work directory in {}", root.display()))?;
    Ok(dir.keep())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_work_dirs_are_unique_and_kept() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("work");

        let a = create_work_dir(Some(&root)).unwrap();
        let b = create_work_dir(Some(&root)).unwrap();

        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("pi-installer-"));
        assert_eq!(a.parent().unwrap(), root);
    }
}
