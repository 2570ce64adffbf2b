//! Standalone GRUB EFI loader.
//!
//! The GRUB modules come from Debian's `grub-efi-<arch>-bin` package, so the
//! host only needs `grub-mkstandalone` itself, not the target platform's
//! GRUB. The embedded config finds the installer partition by looking for
//! the installer kernel and hands over to the netboot `grub.cfg` stored there.

use anyhow::{bail, Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::board::Arch;
use crate::error::ImageError;
use crate::process::Cmd;

/// Config embedded in the standalone image as `boot/grub/grub.cfg`.
pub fn embedded_config(arch: Arch) -> String {
    let dir = format!("/debian-installer/{}", arch.debian_name());
    format!(
        "search --no-floppy --file --set=root {dir}/linux\n\
         set prefix=($root){dir}/grub\n\
         configfile $prefix/grub.cfg\n"
    )
}

/// Build `EFI/BOOT/<loader>` from a downloaded GRUB package.
///
/// # Arguments
/// * `arch` - Target architecture
/// * `package` - The `grub-efi-<arch>-bin` .deb
/// * `work_dir` - Scratch directory; the loader is written here
///
/// # Returns
/// Path of the built loader
pub fn build_grub_efi(arch: Arch, package: &Path, work_dir: &Path) -> Result<PathBuf> {
    info!("Building GRUB EFI loader ({})...", arch.grub_platform());

    let build_error = |source| ImageError::Build {
        what: format!("GRUB ({})", arch.grub_platform()),
        source,
    };

    let extract_dir = work_dir.join("grub-package");
    Cmd::new("dpkg-deb")
        .arg("-x")
        .arg_path(package)
        .arg_path(&extract_dir)
        .error_msg(format!("dpkg-deb failed to extract {}", package.display()))
        .run()
        .map_err(build_error)?;

    let modules = extract_dir.join("usr/lib/grub").join(arch.grub_platform());
    if !modules.is_dir() {
        bail!(
            "{} does not contain GRUB modules at usr/lib/grub/{}",
            package.display(),
            arch.grub_platform()
        );
    }

    let config = work_dir.join("grub-embedded.cfg");
    fs::write(&config, embedded_config(arch))
        .with_context(|| format!("Failed to write {}", config.display()))?;

    let output = work_dir.join(arch.efi_loader_name());
    Cmd::new("grub-mkstandalone")
        .args(["-O", arch.grub_platform(), "-d"])
        .arg_path(&modules)
        .arg("-o")
        .arg_path(&output)
        .args([
            "--modules=part_msdos squash4",
            "--locales=",
            "--themes=",
            "--fonts=",
        ])
        .arg(format!("boot/grub/grub.cfg={}", config.display()))
        .error_msg("grub-mkstandalone failed")
        .run()
        .map_err(build_error)?;

    Ok(output)
}
