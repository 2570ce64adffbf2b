//! Build configuration.
//!
//! Everything has a default; a TOML file passed with `--config` overrides
//! individual keys. Unknown keys are rejected so typos fail loudly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::board::Arch;

pub const DEFAULT_FIRMWARE_PARTITION_MB: u64 = 16;
pub const DEFAULT_EFI_PARTITION_MB: u64 = 16;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Download cache; flat for firmware blobs, per-arch subdirs for installer files.
    pub cache_dir: PathBuf,

    /// U-Boot git checkout. Reset and cleaned on every build.
    pub uboot_source: PathBuf,

    /// Parent of the per-run work directory. `None` means the system temp dir.
    pub work_root: Option<PathBuf>,

    pub debian_mirror: String,
    pub debian_suite: String,

    /// Version of the `grub-efi-<arch>-bin` package taken from the mirror pool.
    pub grub_package_version: String,

    /// Branch, tag or commit of the Raspberry Pi firmware repository.
    pub firmware_ref: String,

    pub squashfs_compression: String,
    pub squashfs_block_size: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("download"),
            uboot_source: PathBuf::from("u-boot"),
            work_root: None,
            debian_mirror: "https://deb.debian.org/debian".to_string(),
            debian_suite: "bookworm".to_string(),
            grub_package_version: "2.06-13+deb12u1".to_string(),
            firmware_ref: "1.20240529".to_string(),
            squashfs_compression: "gzip".to_string(),
            squashfs_block_size: "1M".to_string(),
        }
    }
}

impl BuildConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults, or the given file when present.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Base URL of the netboot tree for an architecture, with trailing slash.
    pub fn installer_base_url(&self, arch: Arch) -> String {
        format!(
            "{}/dists/{}/main/installer-{}/current/images/netboot/",
            self.debian_mirror.trim_end_matches('/'),
            self.debian_suite,
            arch.debian_name()
        )
    }

    /// URL of the Debian GRUB EFI package for an architecture.
    pub fn grub_package_url(&self, arch: Arch) -> String {
        format!(
            "{}/pool/main/g/grub2/{}_{}_{}.deb",
            self.debian_mirror.trim_end_matches('/'),
            arch.grub_package(),
            self.grub_package_version,
            arch.debian_name()
        )
    }

    /// URL of a file under `boot/` in the Raspberry Pi firmware repository.
    pub fn firmware_url(&self, file: &str) -> String {
        format!(
            "https://github.com/raspberrypi/firmware/raw/{}/boot/{}",
            self.firmware_ref, file
        )
    }

    /// Per-architecture installer cache directory.
    pub fn installer_cache_dir(&self, arch: Arch) -> PathBuf {
        self.cache_dir
            .join(format!("debian-installer-{}", arch.debian_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config = BuildConfig::from_toml("").unwrap();
        assert_eq!(config, BuildConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = BuildConfig::from_toml(
            "debian_suite = \"trixie\"\ncache_dir = \"/var/cache/pi\"\n",
        )
        .unwrap();
        assert_eq!(config.debian_suite, "trixie");
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/pi"));
        assert_eq!(config.uboot_source, PathBuf::from("u-boot"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(BuildConfig::from_toml("debian_sutie = \"trixie\"\n").is_err());
    }

    #[test]
    fn test_installer_urls() {
        let config = BuildConfig::default();
        assert_eq!(
            config.installer_base_url(Arch::Arm64),
            "https://deb.debian.org/debian/dists/bookworm/main/installer-arm64/current/images/netboot/"
        );
        assert_eq!(
            config.grub_package_url(Arch::Armhf),
            "https://deb.debian.org/debian/pool/main/g/grub2/grub-efi-arm-bin_2.06-13+deb12u1_armhf.deb"
        );
        assert_eq!(
            config.installer_cache_dir(Arch::Arm64),
            PathBuf::from("download/debian-installer-arm64")
        );
    }

    #[test]
    fn test_mirror_trailing_slash() {
        let config = BuildConfig {
            debian_mirror: "http://mirror.local/debian/".into(),
            ..BuildConfig::default()
        };
        assert!(config
            .installer_base_url(Arch::Arm64)
            .starts_with("http://mirror.local/debian/dists/"));
    }
}
