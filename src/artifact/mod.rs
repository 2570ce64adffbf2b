//! Image artifact builders.
//!
//! - [`cpio`] - Appending gzip'd newc archives to an initrd
//! - [`squashfs`] - Compressed filesystem images (mksquashfs)
//! - [`disk`] - FAT partition images and the final MBR disk image

pub mod cpio;
pub mod disk;
pub mod squashfs;
