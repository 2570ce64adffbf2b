//! FAT partition images.

use anyhow::Result;
use log::debug;
use std::path::Path;

use super::helpers::{allocate_sparse, content_size};
use super::mtools;
use crate::error::ImageError;
use crate::process::Cmd;

/// Create a FAT partition image holding `files`.
///
/// Preallocates exactly `size_bytes`, formats it with `mkfs.vfat` and copies
/// every path (files, or directories recursively) into the filesystem root.
///
/// File sets whose raw size already exceeds `size_bytes` are rejected up
/// front. That is a necessary condition only: FAT overhead can still make a
/// nearly full partition fail inside `mcopy`.
pub fn make_fat_partition(
    path: &Path,
    size_bytes: u64,
    label: &str,
    files: &[impl AsRef<Path>],
) -> Result<()> {
    let needed = content_size(files)?;
    if needed > size_bytes {
        return Err(ImageError::Copy {
            path: path.to_path_buf(),
            reason: format!(
                "contents need {} bytes but the partition holds {} bytes",
                needed, size_bytes
            ),
            source: None,
        }
        .into());
    }
    debug!(
        "  {}: {} bytes of content in {} bytes",
        label, needed, size_bytes
    );

    allocate_sparse(path, size_bytes)?;

    Cmd::new("mkfs.vfat")
        .args(["-n", label])
        .arg_path(path)
        .error_msg("mkfs.vfat failed. Install dosfstools.")
        .run()
        .map_err(|source| ImageError::Format {
            path: path.to_path_buf(),
            source,
        })?;

    if files.is_empty() {
        return Ok(());
    }

    mtools::mtools_copy_to_root(path, files).map_err(|source| ImageError::Copy {
        path: path.to_path_buf(),
        reason: "mcopy failed".to_string(),
        source: Some(source),
    })?;

    Ok(())
}
