//! Raw MBR disk image building.
//!
//! Partition images are built as standalone files ([`partitions`] for FAT,
//! [`crate::artifact::squashfs`] for the installer), then [`assembly`] lays
//! them out back to back behind a DOS partition table. Nothing here needs
//! root: no loop devices, no mounts.

pub mod assembly;
pub mod helpers;
pub mod layout;
pub mod mtools;
pub mod partitions;

pub use assembly::assemble_disk;
pub use layout::{ImageLayout, LayoutEntry, PartitionDescriptor, PartitionType, MIB};
pub use partitions::make_fat_partition;
