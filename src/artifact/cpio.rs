//! Compressed cpio archives for initramfs appending.
//!
//! The kernel unpacks concatenated gzip'd newc archives in order, so extra
//! files can be added to an existing initrd by appending a second archive
//! instead of unpacking and repacking the original.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::ImageError;
use crate::process::{Cmd, Pipeline};

/// Relative paths under `root`, parents before children, one per line.
pub fn cpio_listing(root: &Path) -> Result<String> {
    let mut listing = String::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} escaped {}", entry.path().display(), root.display()))?;
        listing.push_str(&rel.to_string_lossy());
        listing.push('\n');
    }
    Ok(listing)
}

/// Append the contents of `root` to `archive` as a gzip-compressed newc cpio.
///
/// `cpio` runs in `root` reading the listing on stdin, its output is piped
/// straight into `gzip`, and gzip's output is appended to `archive`
/// (created if missing).
///
/// ```rust,ignore
/// append_cpio_gz(Path::new("work/preseed"), Path::new("work/installer/initrd.gz"))?;
/// ```
pub fn append_cpio_gz(root: &Path, archive: &Path) -> Result<()> {
    let listing = cpio_listing(root)?;

    let output = OpenOptions::new()
        .create(true)
        .append(true)
        .open(archive)
        .with_context(|| format!("Failed to open {} for appending", archive.display()))?;

    let cpio = Cmd::new("cpio")
        .args(["--create", "--format=newc", "--owner=0:0", "--quiet"])
        .dir(root)
        .error_msg("cpio failed to archive files");
    let gzip = Cmd::new("gzip")
        .args(["-c", "-9"])
        .error_msg("gzip failed to compress archive");

    Pipeline::new(cpio, gzip)
        .run(listing.into_bytes(), output)
        .map_err(|source| ImageError::Archive {
            path: archive.to_path_buf(),
            source,
        })?;

    Ok(())
}
