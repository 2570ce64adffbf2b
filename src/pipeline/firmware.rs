//! Firmware partition: Raspberry Pi boot blobs, device tree, U-Boot and its script.

use anyhow::{bail, Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::disk::{make_fat_partition, MIB};
use crate::board::{Arch, DeviceTree, Model};
use crate::config::BuildConfig;
use crate::fetch::{Downloader, Fetcher};

pub const LABEL: &str = "RPIFIRM";

/// `config.txt` read by the GPU firmware.
pub fn config_txt(model: &Model) -> String {
    let mut text = String::new();
    if model.arch == Arch::Arm64 {
        text.push_str("arm_64bit=1\n");
    }
    text.push_str("enable_uart=1\n");
    text.push_str("kernel=u-boot.bin\n");
    text.push_str(&format!("device_tree={}\n", model.device_tree.file_name()));
    text
}

/// Resolve the board's device tree blob, downloading it if it is remote.
pub fn device_tree<D: Downloader>(
    model: &Model,
    config: &BuildConfig,
    fetcher: &Fetcher<D>,
) -> Result<PathBuf> {
    match model.device_tree {
        DeviceTree::Firmware(name) => fetcher.fetch_to_cache(&config.firmware_url(name)),
        DeviceTree::UBoot(rel) => {
            let path = config.uboot_source.join(rel);
            if !path.is_file() {
                bail!("U-Boot build did not produce {}", path.display());
            }
            Ok(path)
        }
    }
}

/// Gather everything the firmware partition holds and build it.
///
/// # Arguments
/// * `uboot_bin` - Built `u-boot.bin`
/// * `boot_scr` - Compiled boot script
/// * `size_mb` - Partition size
///
/// # Returns
/// Path of the partition image in `work_dir`
pub fn build_firmware_partition<D: Downloader>(
    model: &Model,
    config: &BuildConfig,
    fetcher: &Fetcher<D>,
    uboot_bin: &Path,
    boot_scr: &Path,
    work_dir: &Path,
    size_mb: u64,
) -> Result<PathBuf> {
    info!("=== Firmware partition ===");

    let mut files = Vec::new();
    for name in model.firmware_files() {
        files.push(fetcher.fetch_to_cache(&config.firmware_url(&name))?);
    }
    files.push(device_tree(model, config, fetcher)?);
    files.push(uboot_bin.to_path_buf());
    files.push(boot_scr.to_path_buf());

    let config_path = work_dir.join("config.txt");
    fs::write(&config_path, config_txt(model))
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    files.push(config_path);

    let image = work_dir.join("firmware.vfat");
    make_fat_partition(&image, size_mb * MIB, LABEL, &files)?;
    info!("  {} ({} MB, {} files)", image.display(), size_mb, files.len());
    Ok(image)
}
