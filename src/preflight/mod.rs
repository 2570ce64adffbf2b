//! Preflight checks for build validation.
//!
//! Validates that the host has every tool the build shells out to before
//! anything is downloaded or compiled, so a missing package is reported
//! once instead of as a failure halfway through a U-Boot build.
//!
//! # Example
//!
//! ```rust
//! use pi_installer_image::preflight::check_required_tools;
//!
//! let tools = [("mksquashfs".to_string(), "squashfs-tools")];
//! if let Err(e) = check_required_tools(&tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

use crate::board::{Arch, Model};
use crate::process;

/// Host tools needed regardless of board.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("git", "git"),
    ("make", "make"),
    ("wget", "wget"),
    ("dpkg-deb", "dpkg"),
    ("grub-mkstandalone", "grub-common"),
    ("mkfs.vfat", "dosfstools"),
    ("mcopy", "mtools"),
    ("mksquashfs", "squashfs-tools"),
    ("cpio", "cpio"),
    ("gzip", "gzip"),
    ("sfdisk", "fdisk"),
    ("dd", "coreutils"),
];

/// Everything a build for `model` needs, including its cross compiler.
pub fn required_tools(model: &Model) -> Vec<(String, &'static str)> {
    let compiler = format!("{}gcc", model.arch.cross_prefix());
    let package = match model.arch {
        Arch::Arm64 => "gcc-aarch64-linux-gnu",
        Arch::Armhf => "gcc-arm-linux-gnueabihf",
    };

    let mut tools = vec![(compiler, package)];
    tools.extend(
        REQUIRED_TOOLS
            .iter()
            .map(|(tool, package)| (tool.to_string(), *package)),
    );
    tools
}

/// Check that specific tools are available.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(String, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !process::exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check all tools a build for `model` needs.
pub fn check_host_tools(model: &Model) -> Result<()> {
    check_required_tools(&required_tools(model))
}
