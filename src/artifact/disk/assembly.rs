//! Disk assembly: MBR creation and partition splicing.

use anyhow::Result;
use log::{info, warn};
use std::fs;
use std::path::Path;

use super::helpers::allocate_sparse;
use super::layout::{ImageLayout, PartitionDescriptor, MIB};
use crate::error::ImageError;
use crate::process::Cmd;

/// Assemble a raw MBR disk image from partition images.
///
/// Creates a sparse file of exactly `(1 + Σ size_mb)` MiB, writes the
/// partition table with sfdisk, then splices each partition image in at its
/// offset. On failure the partial output is removed.
pub fn assemble_disk(partitions: &[PartitionDescriptor], output: &Path) -> Result<ImageLayout> {
    let layout = ImageLayout::compute(partitions);
    check_partitions_fit(partitions, output)?;

    if let Err(err) = write_image(partitions, &layout, output) {
        warn!("Removing incomplete image {}", output.display());
        if let Err(e) = fs::remove_file(output) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Could not remove {} ({}); it is not a usable image",
                    output.display(),
                    e
                );
            }
        }
        return Err(err);
    }
    Ok(layout)
}

fn write_image(partitions: &[PartitionDescriptor], layout: &ImageLayout, output: &Path) -> Result<()> {
    info!(
        "  Allocating {} MB image at {}...",
        layout.total_bytes / MIB,
        output.display()
    );
    allocate_sparse(output, layout.total_bytes)?;

    write_partition_table(output, layout)?;

    for (partition, entry) in partitions.iter().zip(&layout.entries) {
        info!(
            "  Writing {} partition at offset {}...",
            partition.name,
            entry.offset_bytes()
        );
        copy_partition(&partition.file, output, entry.offset_bytes())?;
    }

    Ok(())
}

/// Every backing file must fit inside its declared extent, or the copy
/// would run into the next partition.
fn check_partitions_fit(partitions: &[PartitionDescriptor], output: &Path) -> Result<()> {
    for partition in partitions {
        let len = fs::metadata(&partition.file)
            .map_err(|e| ImageError::Layout {
                path: output.to_path_buf(),
                reason: format!(
                    "cannot read {} partition image {}: {}",
                    partition.name,
                    partition.file.display(),
                    e
                ),
                source: None,
            })?
            .len();
        if len > partition.size_bytes() {
            return Err(ImageError::Layout {
                path: output.to_path_buf(),
                reason: format!(
                    "{} partition image is {} bytes but only {} MB were declared",
                    partition.name, len, partition.size_mb
                ),
                source: None,
            }
            .into());
        }
    }
    Ok(())
}

/// Write the DOS partition table with sfdisk.
pub fn write_partition_table(image: &Path, layout: &ImageLayout) -> Result<()> {
    Cmd::new("sfdisk")
        .arg("--quiet")
        .arg_path(image)
        .stdin(layout.sfdisk_script())
        .error_msg("sfdisk failed to create partition table")
        .run()
        .map_err(|source| ImageError::Layout {
            path: image.to_path_buf(),
            reason: "partition table not written".to_string(),
            source: Some(source),
        })?;
    Ok(())
}

/// Copy `src` into `image` at `offset_bytes` without materializing zero runs.
///
/// The offset must be MiB-aligned; the image is never truncated.
pub fn copy_partition(src: &Path, image: &Path, offset_bytes: u64) -> Result<()> {
    if offset_bytes % MIB != 0 {
        anyhow::bail!(
            "partition offset {} is not MiB-aligned (copying {})",
            offset_bytes,
            src.display()
        );
    }

    Cmd::new("dd")
        .arg(format!("if={}", src.display()))
        .arg(format!("of={}", image.display()))
        .args(["bs=1M", "conv=sparse,notrunc", "status=none"])
        .arg(format!("seek={}", offset_bytes / MIB))
        .error_msg(format!("dd failed for {}", src.display()))
        .run()
        .map_err(|source| ImageError::Copy {
            path: image.to_path_buf(),
            reason: format!("splicing {}", src.display()),
            source: Some(source),
        })?;
    Ok(())
}
