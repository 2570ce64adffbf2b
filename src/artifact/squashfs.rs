//! Squashfs image builder.
//!
//! Provides a wrapper around `mksquashfs` for creating compressed
//! filesystem images.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::error::ImageError;
use crate::process::Cmd;

/// Options for building a squashfs image.
#[derive(Debug, Clone)]
pub struct SquashfsOptions<'a> {
    /// Compression algorithm (gzip, zstd, xz, lzo, lz4).
    ///
    /// GRUB's squash4 module reads gzip, xz and lzo.
    /// Default: "gzip"
    pub compression: &'a str,

    /// Block size (e.g., "128K", "256K", "512K", "1M").
    ///
    /// Default: "1M"
    pub block_size: &'a str,

    /// Whether to include extended attributes.
    ///
    /// Default: false
    pub xattrs: bool,
}

impl Default for SquashfsOptions<'_> {
    fn default() -> Self {
        Self {
            compression: "gzip",
            block_size: "1M",
            xattrs: false,
        }
    }
}

/// Build a squashfs image from a directory, returning its size in bytes.
///
/// Any existing `output` is replaced.
///
/// ```rust,ignore
/// let bytes = build_squashfs(
///     Path::new("work/installer"),
///     Path::new("work/installer.squashfs"),
///     &SquashfsOptions::default(),
/// )?;
/// ```
pub fn build_squashfs(source_dir: &Path, output: &Path, options: &SquashfsOptions) -> Result<u64> {
    if !source_dir.is_dir() {
        bail!(
            "Squashfs source is not a directory: {}",
            source_dir.display()
        );
    }

    let mut cmd = Cmd::new("mksquashfs")
        .arg_path(source_dir)
        .arg_path(output)
        .args(["-noappend", "-quiet", "-no-progress"])
        .args(["-comp", options.compression])
        .args(["-b", options.block_size]);
    if !options.xattrs {
        cmd = cmd.arg("-no-xattrs");
    }

    cmd.error_msg("mksquashfs failed. Install squashfs-tools.")
        .run()
        .map_err(|source| ImageError::Format {
            path: output.to_path_buf(),
            source,
        })?;

    let len = fs::metadata(output)
        .with_context(|| format!("mksquashfs produced no image at {}", output.display()))?
        .len();
    Ok(len)
}
