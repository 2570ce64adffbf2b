//! Sizing and allocation helpers for partition images.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use super::layout::MIB;

/// Create (or truncate) `path` as a zero-filled sparse file of exactly `len` bytes.
pub fn allocate_sparse(path: &Path, len: u64) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.set_len(len)
        .with_context(|| format!("Failed to size {} to {} bytes", path.display(), len))?;
    Ok(())
}

/// Total bytes of regular files under the given paths (files or directories).
///
/// Symlinks are not followed.
pub fn content_size(paths: &[impl AsRef<Path>]) -> Result<u64> {
    let mut total = 0;
    for path in paths {
        let path = path.as_ref();
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            if entry.file_type().is_file() {
                total += entry
                    .metadata()
                    .with_context(|| format!("Failed to stat {}", entry.path().display()))?
                    .len();
            }
        }
    }
    Ok(total)
}

/// Whole MiB needed to hold `bytes`, rounded up.
pub fn mib_rounded_up(bytes: u64) -> u64 {
    bytes.div_ceil(MIB)
}
