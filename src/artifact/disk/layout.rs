//! MBR partition layout.
//!
//! Partitions are packed back to back after a reserved first MiB, each one a
//! whole number of MiB. Offsets are therefore always MiB-aligned.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Sector size in bytes.
pub const SECTOR_SIZE: u64 = 512;

pub const MIB: u64 = 1024 * 1024;

pub const SECTORS_PER_MIB: u64 = MIB / SECTOR_SIZE;

/// First partition starts at this offset (1MB for the MBR + alignment).
pub const FIRST_PARTITION_OFFSET_SECTORS: u64 = 2048; // 1MB / 512

/// MBR partition type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PartitionType(pub u8);

impl PartitionType {
    /// W95 FAT32 (LBA).
    pub const FAT32_LBA: Self = Self(0x0c);
    /// EFI system partition.
    pub const EFI_SYSTEM: Self = Self(0xef);
    pub const LINUX: Self = Self(0x83);
}

impl fmt::Display for PartitionType {
    /// sfdisk syntax: bare hex.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// One partition to place in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub name: &'static str,
    /// Backing image file copied into the partition.
    pub file: PathBuf,
    pub size_mb: u64,
    pub type_code: PartitionType,
    pub bootable: bool,
}

impl PartitionDescriptor {
    pub fn size_bytes(&self) -> u64 {
        self.size_mb * MIB
    }
}

/// Position of one partition within the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayoutEntry {
    pub start_sector: u64,
    pub sector_count: u64,
    pub type_code: PartitionType,
    pub bootable: bool,
}

impl LayoutEntry {
    pub fn offset_bytes(&self) -> u64 {
        self.start_sector * SECTOR_SIZE
    }

    pub fn end_sector(&self) -> u64 {
        self.start_sector + self.sector_count
    }
}

/// Computed placement of an ordered partition list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageLayout {
    pub entries: Vec<LayoutEntry>,
    pub total_bytes: u64,
}

impl ImageLayout {
    /// Place partitions in order: the first at sector 2048, each following
    /// one directly after its predecessor.
    pub fn compute(partitions: &[PartitionDescriptor]) -> Self {
        let mut next = FIRST_PARTITION_OFFSET_SECTORS;
        let entries: Vec<LayoutEntry> = partitions
            .iter()
            .map(|p| {
                let entry = LayoutEntry {
                    start_sector: next,
                    sector_count: p.size_mb * SECTORS_PER_MIB,
                    type_code: p.type_code,
                    bootable: p.bootable,
                };
                next = entry.end_sector();
                entry
            })
            .collect();

        Self {
            entries,
            total_bytes: next * SECTOR_SIZE,
        }
    }

    /// Script for `sfdisk`'s standard input.
    pub fn sfdisk_script(&self) -> String {
        let mut script = String::from("label: dos\n");
        for entry in &self.entries {
            script.push_str(&format!(
                "start={}, size={}, type={}",
                entry.start_sector, entry.sector_count, entry.type_code
            ));
            if entry.bootable {
                script.push_str(", bootable");
            }
            script.push('\n');
        }
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptors(sizes: &[u64]) -> Vec<PartitionDescriptor> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size_mb)| PartitionDescriptor {
                name: "part",
                file: PathBuf::from(format!("part{}.img", i)),
                size_mb,
                type_code: PartitionType::LINUX,
                bootable: false,
            })
            .collect()
    }

    #[test]
    fn test_partition_constants() {
        assert_eq!(SECTOR_SIZE, 512);
        assert_eq!(FIRST_PARTITION_OFFSET_SECTORS, 2048);
        assert_eq!(SECTORS_PER_MIB, 2048);
    }

    #[test]
    fn test_standard_three_partition_layout() {
        let layout = ImageLayout::compute(&descriptors(&[16, 16, 40]));
        let starts: Vec<u64> = layout.entries.iter().map(|e| e.start_sector).collect();
        assert_eq!(starts, vec![2048, 34816, 67584]);
        // 1 MiB lead-in plus 16 + 16 + 40.
        assert_eq!(layout.total_bytes, 73 * MIB);
    }

    #[test]
    fn test_start_sector_formula_and_total() {
        let cases: &[&[u64]] = &[&[], &[1], &[3, 1, 4, 1, 5], &[256, 16, 900], &[7; 9]];
        for sizes in cases {
            let layout = ImageLayout::compute(&descriptors(sizes));
            for (i, entry) in layout.entries.iter().enumerate() {
                let before: u64 = sizes[..i].iter().sum();
                assert_eq!(entry.start_sector, 2048 + 2048 * before);
                assert_eq!(entry.sector_count, sizes[i] * 2048);
            }
            let total: u64 = sizes.iter().sum();
            assert_eq!(layout.total_bytes, (1 + total) * MIB);
        }
    }

    #[test]
    fn test_entries_never_overlap() {
        let layout = ImageLayout::compute(&descriptors(&[16, 1, 33, 2]));
        for pair in layout.entries.windows(2) {
            assert_eq!(pair[0].end_sector(), pair[1].start_sector);
        }
        let last = layout.entries.last().unwrap();
        assert_eq!(last.end_sector() * SECTOR_SIZE, layout.total_bytes);
    }

    #[test]
    fn test_sfdisk_script() {
        let mut parts = descriptors(&[16, 16, 40]);
        parts[0].type_code = PartitionType::FAT32_LBA;
        parts[0].bootable = true;
        parts[1].type_code = PartitionType::EFI_SYSTEM;

        let script = ImageLayout::compute(&parts).sfdisk_script();
        assert_eq!(
            script,
            "label: dos\n\
             start=2048, size=32768, type=c, bootable\n\
             start=34816, size=32768, type=ef\n\
             start=67584, size=81920, type=83\n"
        );
    }
}
