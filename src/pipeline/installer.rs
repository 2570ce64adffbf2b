//! Installer partition: Debian netboot kernel, preseeded initrd and GRUB menu
//! packed into a SquashFS image.

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::cpio::append_cpio_gz;
use crate::artifact::disk::helpers::mib_rounded_up;
use crate::artifact::squashfs::{build_squashfs, SquashfsOptions};
use crate::board::Arch;
use crate::config::BuildConfig;
use crate::fetch::{Downloader, Fetcher};

/// Netboot files staged into the partition, relative to the netboot root.
pub fn installer_files(arch: Arch) -> [String; 3] {
    let dir = format!("debian-installer/{}", arch.debian_name());
    [
        format!("{dir}/linux"),
        format!("{dir}/initrd.gz"),
        format!("{dir}/grub/grub.cfg"),
    ]
}

/// Answers the installer picks up from the initrd root.
///
/// The Pi has no writable EFI variables, so GRUB must not touch NVRAM and has
/// to be installed to the removable-media path to boot at all.
pub fn preseed_cfg(arch: Arch) -> String {
    let package = arch.grub_debconf_package();
    format!(
        "d-i grub2/update_nvram boolean false\n\
         {package} grub2/update_nvram boolean false\n\
         d-i grub-installer/force-efi-extra-removable boolean true\n\
         {package} grub2/force_efi_extra_removable boolean true\n"
    )
}

/// Append a cpio containing only `preseed.cfg` to `initrd`.
///
/// `scratch` is created and receives the preseed file; it must not hold
/// anything else.
pub fn inject_preseed(initrd: &Path, preseed: &str, scratch: &Path) -> Result<()> {
    fs::create_dir_all(scratch)
        .with_context(|| format!("Failed to create {}", scratch.display()))?;
    let preseed_path = scratch.join("preseed.cfg");
    fs::write(&preseed_path, preseed)
        .with_context(|| format!("Failed to write {}", preseed_path.display()))?;
    append_cpio_gz(scratch, initrd)
}

/// Build the installer SquashFS, returning its path and size in whole MiB.
pub fn build_installer_partition<D: Downloader>(
    arch: Arch,
    config: &BuildConfig,
    fetcher: &Fetcher<D>,
    work_dir: &Path,
) -> Result<(PathBuf, u64)> {
    info!("=== Installer partition ===");

    let cache = config.installer_cache_dir(arch);
    let base_url = config.installer_base_url(arch);
    let staging = work_dir.join("installer-staging");

    for rel in installer_files(arch) {
        let cached = fetcher.fetch(&format!("{base_url}{rel}"), &cache.join(&rel))?;
        let dest = staging.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::copy(&cached, &dest).with_context(|| {
            format!("Failed to copy {} to {}", cached.display(), dest.display())
        })?;
    }

    info!("  Preseeding initrd...");
    let initrd = staging.join(&installer_files(arch)[1]);
    inject_preseed(&initrd, &preseed_cfg(arch), &work_dir.join("preseed"))?;

    let image = work_dir.join("installer.squashfs");
    let options = SquashfsOptions {
        compression: &config.squashfs_compression,
        block_size: &config.squashfs_block_size,
        xattrs: false,
    };
    let len = build_squashfs(&staging, &image, &options)?;
    let size_mb = mib_rounded_up(len);
    debug!("  {} is {} bytes", image.display(), len);
    info!("  {} ({} MB)", image.display(), size_mb);

    Ok((image, size_mb))
}
