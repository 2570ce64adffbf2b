//! U-Boot cross-build.
//!
//! The source tree is reset to a clean checkout, the board defconfig gets
//! autoboot lines appended so U-Boot sources `boot.scr` from the firmware
//! partition, then the tree is configured and built with the board's cross
//! toolchain.
//!
//! # Usage
//!
//! ```rust,ignore
//! let model = board::lookup("4b")?;
//! let uboot_bin = build_uboot(Path::new("u-boot"), model, &work_dir)?;
//! compile_boot_script(Path::new("u-boot"), &boot_script(model.arch), &work_dir.join("boot.scr"))?;
//! ```

use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::board::{Arch, Model};
use crate::error::ImageError;
use crate::process::{Cmd, CommandError};

/// Lines appended to the board defconfig.
pub const AUTOBOOT_CONFIG: &[&str] = &[
    "CONFIG_AUTOBOOT=y",
    "CONFIG_BOOTDELAY=2",
    "CONFIG_USE_BOOTCOMMAND=y",
    "CONFIG_BOOTCOMMAND=\"fatload mmc 0:1 ${scriptaddr} boot.scr; source ${scriptaddr}\"",
];

/// Build U-Boot for `model` and copy `u-boot.bin` into `work_dir`.
///
/// # Arguments
/// * `source` - U-Boot git checkout (reset and cleaned first)
/// * `model` - Board to configure for
/// * `work_dir` - Directory receiving the binary
///
/// # Returns
/// Path of the copied `u-boot.bin`
pub fn build_uboot(source: &Path, model: &Model, work_dir: &Path) -> Result<PathBuf> {
    info!(
        "Building U-Boot ({}) from {}...",
        model.uboot_config,
        source.display()
    );

    if !source.join("Makefile").exists() {
        bail!(
            "U-Boot source not found at {}\nRun: git submodule update --init u-boot",
            source.display()
        );
    }

    let build_error = |source: CommandError| ImageError::Build {
        what: format!("U-Boot ({})", model.uboot_config),
        source,
    };

    info!("  Resetting source tree...");
    reset_source_tree(source).map_err(build_error)?;

    let defconfig = source.join("configs").join(model.uboot_config);
    if !defconfig.is_file() {
        bail!("U-Boot has no defconfig {}", defconfig.display());
    }
    info!("  Enabling boot script autoload in {}...", model.uboot_config);
    patch_defconfig(&defconfig)?;

    let cross = format!("CROSS_COMPILE={}", model.arch.cross_prefix());
    Cmd::new("make")
        .arg("-C")
        .arg_path(source)
        .args(["ARCH=arm", &cross, model.uboot_config])
        .error_msg("make defconfig failed")
        .run()
        .map_err(build_error)?;

    let jobs_arg = format!("-j{}", build_jobs());
    info!("  Compiling...");
    Cmd::new("make")
        .arg("-C")
        .arg_path(source)
        .args(["ARCH=arm", &cross, &jobs_arg])
        .error_msg("U-Boot build failed")
        .run_interactive()
        .map_err(build_error)?;

    let built = source.join("u-boot.bin");
    if !built.is_file() {
        bail!("U-Boot build finished but {} is missing", built.display());
    }
    let dest = work_dir.join("u-boot.bin");
    fs::copy(&built, &dest)
        .with_context(|| format!("Failed to copy {} to {}", built.display(), dest.display()))?;

    Ok(dest)
}

/// Discard local changes and untracked files, including previous build output.
fn reset_source_tree(source: &Path) -> Result<(), CommandError> {
    Cmd::new("git")
        .arg("-C")
        .arg_path(source)
        .args(["reset", "--hard", "--quiet"])
        .error_msg("git reset failed in U-Boot tree")
        .run()?;
    Cmd::new("git")
        .arg("-C")
        .arg_path(source)
        .args(["clean", "-fdxq"])
        .error_msg("git clean failed in U-Boot tree")
        .run()?;
    Ok(())
}

/// Append [`AUTOBOOT_CONFIG`] to a defconfig.
///
/// Later assignments win in Kconfig, so appending overrides whatever the
/// board file already sets.
pub fn patch_defconfig(defconfig: &Path) -> Result<()> {
    let existing = fs::read_to_string(defconfig)
        .with_context(|| format!("Failed to read {}", defconfig.display()))?;

    let mut file = OpenOptions::new()
        .append(true)
        .open(defconfig)
        .with_context(|| format!("Failed to open {}", defconfig.display()))?;

    let mut extra = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        extra.push('\n');
    }
    for line in AUTOBOOT_CONFIG {
        extra.push_str(line);
        extra.push('\n');
    }
    file.write_all(extra.as_bytes())
        .with_context(|| format!("Failed to patch {}", defconfig.display()))?;
    Ok(())
}

fn build_jobs() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            warn!("Could not detect CPU count ({}), using 4 jobs", e);
            4
        }
    }
}

/// U-Boot script that chain-loads GRUB from the EFI partition.
pub fn boot_script(arch: Arch) -> String {
    format!(
        "fatload mmc 0:2 ${{kernel_addr_r}} EFI/BOOT/{}\n\
         bootefi ${{kernel_addr_r}} ${{fdtcontroladdr}}\n",
        arch.efi_loader_name()
    )
}

/// Compile a boot script with the `mkimage` built inside the U-Boot tree.
pub fn compile_boot_script(source: &Path, script: &str, output: &Path) -> Result<()> {
    let script_src = output.with_extension("cmd");
    fs::write(&script_src, script)
        .with_context(|| format!("Failed to write {}", script_src.display()))?;

    Cmd::new(source.join("tools/mkimage").to_string_lossy())
        .args(["-A", "arm", "-O", "linux", "-T", "script", "-C", "none", "-d"])
        .arg_path(&script_src)
        .arg_path(output)
        .error_msg("mkimage failed to compile boot script")
        .run()
        .map_err(|source| ImageError::Build {
            what: "boot script".to_string(),
            source,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_patch_defconfig_appends_autoboot() {
        let temp = TempDir::new().unwrap();
        let defconfig = temp.path().join("rpi_4_defconfig");
        fs::write(&defconfig, "CONFIG_ARM=y\nCONFIG_BOOTDELAY=0").unwrap();

        patch_defconfig(&defconfig).unwrap();

        let result = fs::read_to_string(&defconfig).unwrap();
        assert!(result.starts_with("CONFIG_ARM=y\nCONFIG_BOOTDELAY=0\n"));
        for line in AUTOBOOT_CONFIG {
            assert_eq!(result.matches(line).count(), 1);
        }
        // The appended delay comes last and therefore wins.
        assert!(result.rfind("CONFIG_BOOTDELAY=2") > result.rfind("CONFIG_BOOTDELAY=0"));
        assert!(result.ends_with('\n'));
    }

    #[test]
    fn test_boot_command_sources_script() {
        let command = AUTOBOOT_CONFIG
            .iter()
            .find(|l| l.starts_with("CONFIG_BOOTCOMMAND="))
            .unwrap();
        assert!(command.contains("boot.scr"));
        assert!(command.contains("source ${scriptaddr}"));
    }

    #[test]
    fn test_boot_script_loads_arch_loader() {
        let script = boot_script(Arch::Arm64);
        assert_eq!(
            script,
            "fatload mmc 0:2 ${kernel_addr_r} EFI/BOOT/BOOTAA64.EFI\n\
             bootefi ${kernel_addr_r} ${fdtcontroladdr}\n"
        );
        assert!(boot_script(Arch::Armhf).contains("BOOTARM.EFI"));
    }

    #[test]
    fn test_missing_source_tree() {
        let temp = TempDir::new().unwrap();
        let model = crate::board::lookup("3b").unwrap();
        let err = build_uboot(&temp.path().join("u-boot"), model, temp.path()).unwrap_err();
        assert!(err.to_string().contains("U-Boot source not found"));
    }
}
