//! mtools file operations for FAT image manipulation.

use std::path::Path;

use crate::process::{Cmd, CommandError};

/// Copy files or directories (recursively) into the root of a FAT image.
pub fn mtools_copy_to_root(image: &Path, sources: &[impl AsRef<Path>]) -> Result<(), CommandError> {
    let mut cmd = Cmd::new("mcopy").args(["-s", "-Q", "-i"]).arg_path(image);
    for src in sources {
        cmd = cmd.arg_path(src.as_ref());
    }
    cmd.arg("::/")
        .error_msg(format!("mcopy into {} failed", image.display()))
        .run()?;
    Ok(())
}

/// Read a file out of a FAT image with mtype.
#[cfg(test)]
pub fn mtools_read_file(image: &Path, path: &str) -> Result<String, CommandError> {
    let result = Cmd::new("mtype")
        .args(["-i"])
        .arg_path(image)
        .arg(format!("::{}", path))
        .error_msg(format!("mtype failed for {}", path))
        .run()?;
    Ok(result.stdout)
}
