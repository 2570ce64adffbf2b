//! JSON record of a finished build, written next to the intermediate files.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::artifact::disk::{ImageLayout, LayoutEntry, PartitionDescriptor};
use crate::board::Model;

pub const FILE_NAME: &str = "manifest.json";

#[derive(Debug, Serialize)]
pub struct BuildManifest {
    pub model: &'static str,
    pub arch: &'static str,
    pub created_at: String,
    pub output: PathBuf,
    pub total_bytes: u64,
    pub partitions: Vec<PartitionRecord>,
}

#[derive(Debug, Serialize)]
pub struct PartitionRecord {
    pub name: &'static str,
    pub file: PathBuf,
    pub size_mb: u64,
    #[serde(flatten)]
    pub placement: LayoutEntry,
    /// Length of the backing file, which may be shorter than the extent.
    pub file_bytes: u64,
    pub sha256: String,
}

impl BuildManifest {
    /// Hash every partition file and pair it with its computed placement.
    pub fn collect(
        model: &Model,
        partitions: &[PartitionDescriptor],
        layout: &ImageLayout,
        output: &Path,
    ) -> Result<Self> {
        let mut records = Vec::with_capacity(partitions.len());
        for (part, entry) in partitions.iter().zip(&layout.entries) {
            let (sha256, file_bytes) = sha256_file(&part.file)?;
            records.push(PartitionRecord {
                name: part.name,
                file: part.file.clone(),
                size_mb: part.size_mb,
                placement: *entry,
                file_bytes,
                sha256,
            });
        }

        Ok(Self {
            model: model.name,
            arch: model.arch.debian_name(),
            created_at: now_utc_compact(),
            output: output.to_path_buf(),
            total_bytes: layout.total_bytes,
            partitions: records,
        })
    }

    pub fn write(&self, work_dir: &Path) -> Result<PathBuf> {
        let path = work_dir.join(FILE_NAME);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let n = r
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::disk::PartitionType;
    use crate::board;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_records_layout_and_hashes() {
        let temp = TempDir::new().unwrap();
        let fw = temp.path().join("firmware.vfat");
        let sq = temp.path().join("installer.squashfs");
        fs::write(&fw, b"abc").unwrap();
        fs::write(&sq, b"").unwrap();

        let partitions = vec![
            PartitionDescriptor {
                name: "firmware",
                file: fw,
                size_mb: 16,
                type_code: PartitionType::FAT32_LBA,
                bootable: true,
            },
            PartitionDescriptor {
                name: "installer",
                file: sq,
                size_mb: 40,
                type_code: PartitionType::LINUX,
                bootable: false,
            },
        ];
        let layout = ImageLayout::compute(&partitions);
        let model = board::lookup("4b").unwrap();

        let manifest =
            BuildManifest::collect(model, &partitions, &layout, Path::new("pi.img")).unwrap();
        let path = manifest.write(temp.path()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["model"], "4b");
        assert_eq!(json["total_bytes"], 57 * 1024 * 1024);
        assert_eq!(
            json["partitions"][0]["sha256"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(json["partitions"][0]["file_bytes"], 3);
        assert_eq!(json["partitions"][0]["start_sector"], 2048);
        assert_eq!(json["partitions"][1]["start_sector"], 2048 + 16 * 2048);
        assert_eq!(json["partitions"][1]["type_code"], 0x83);
        assert_eq!(
            json["partitions"][1]["sha256"],
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(json["created_at"].as_str().unwrap().len(), 16);
    }
}
