//! Download-if-absent cache for external blobs.
//!
//! A file that already exists at its destination is returned untouched: the
//! cache is keyed by path only and never revalidated. Downloads land in a
//! `.part` sibling first and are renamed into place, so an interrupted
//! download is never mistaken for a cached file.

use anyhow::{Context, Result};
use fs2::FileExt;
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::ImageError;
use crate::process::{Cmd, CommandError};

/// Something that can copy a URL to a local file.
pub trait Downloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), CommandError>;
}

/// Downloads with `wget`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Wget;

impl Downloader for Wget {
    fn download(&self, url: &str, dest: &Path) -> Result<(), CommandError> {
        Cmd::new("wget")
            .args(["--quiet", "--output-document"])
            .arg_path(dest)
            .arg(url)
            .error_msg(format!("wget failed for {}", url))
            .run()?;
        Ok(())
    }
}

/// Fetches into a cache directory held under an exclusive lock.
pub struct Fetcher<D: Downloader = Wget> {
    cache_dir: PathBuf,
    downloader: D,
    _lock: CacheLock,
}

impl Fetcher<Wget> {
    pub fn open(cache_dir: &Path) -> Result<Self> {
        Self::with_downloader(cache_dir, Wget)
    }
}

impl<D: Downloader> Fetcher<D> {
    /// Open the cache, failing fast if another build holds it.
    pub fn with_downloader(cache_dir: &Path, downloader: D) -> Result<Self> {
        fs::create_dir_all(cache_dir).with_context(|| {
            format!("Failed to create download cache {}", cache_dir.display())
        })?;
        let lock = CacheLock::acquire(cache_dir)?;
        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            downloader,
            _lock: lock,
        })
    }

    /// Download `url` to `dest` unless `dest` already exists.
    pub fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        if dest.exists() {
            debug!("  [CACHED] {}", dest.display());
            return Ok(dest.to_path_buf());
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        info!("  Downloading {}", url);
        let partial = partial_path(dest);
        if let Err(source) = self.downloader.download(url, &partial) {
            let _ = fs::remove_file(&partial);
            return Err(ImageError::Fetch {
                url: url.to_string(),
                source,
            }
            .into());
        }

        fs::rename(&partial, dest).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                partial.display(),
                dest.display()
            )
        })?;
        Ok(dest.to_path_buf())
    }

    /// Fetch into the flat cache, keyed by the URL's file name.
    pub fn fetch_to_cache(&self, url: &str) -> Result<PathBuf> {
        let name = url_file_name(url)
            .with_context(|| format!("URL has no file name: {}", url))?;
        self.fetch(url, &self.cache_dir.join(name))
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Last path segment of a URL, without query or fragment.
pub fn url_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Exclusive advisory lock on `<cache>/.lock`, released when the file closes.
///
/// The lock file itself is left in place: unlinking it could let a second
/// process lock a fresh inode at the same path while the first still holds
/// the old one.
#[derive(Debug)]
struct CacheLock {
    _file: File,
}

impl CacheLock {
    fn acquire(cache_dir: &Path) -> Result<Self> {
        let path = cache_dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to create lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            anyhow::bail!(
                "Download cache is in use by another build: {}",
                cache_dir.display()
            );
        }
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Writes the URL as file content and counts calls.
    #[derive(Default)]
    struct FakeDownloader {
        calls: Cell<usize>,
        fail: bool,
    }

    impl Downloader for &FakeDownloader {
        fn download(&self, url: &str, dest: &Path) -> Result<(), CommandError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                fs::write(dest, b"partial").unwrap();
                return Err(CommandError::Failed {
                    program: "wget".into(),
                    message: "wget failed".into(),
                    code: Some(8),
                    stderr: String::new(),
                });
            }
            fs::write(dest, url).unwrap();
            Ok(())
        }
    }

    #[test]
    fn test_fetch_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let fake = FakeDownloader::default();
        let fetcher = Fetcher::with_downloader(temp.path(), &fake).unwrap();
        let dest = temp.path().join("start4.elf");

        let first = fetcher.fetch("https://example.com/start4.elf", &dest).unwrap();
        let second = fetcher.fetch("https://example.com/start4.elf", &dest).unwrap();

        assert_eq!(first, second);
        assert_eq!(fake.calls.get(), 1);
        assert_eq!(
            fs::read_to_string(&dest).unwrap(),
            "https://example.com/start4.elf"
        );
    }

    #[test]
    fn test_existing_file_is_trusted() {
        let temp = TempDir::new().unwrap();
        let fake = FakeDownloader::default();
        let fetcher = Fetcher::with_downloader(temp.path(), &fake).unwrap();
        let dest = temp.path().join("bootcode.bin");
        fs::write(&dest, b"stale").unwrap();

        fetcher.fetch("https://example.com/bootcode.bin", &dest).unwrap();

        assert_eq!(fake.calls.get(), 0);
        assert_eq!(fs::read(&dest).unwrap(), b"stale");
    }

    #[test]
    fn test_failed_download_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let fake = FakeDownloader {
            fail: true,
            ..Default::default()
        };
        let fetcher = Fetcher::with_downloader(temp.path(), &fake).unwrap();
        let dest = temp.path().join("linux");

        let err = fetcher.fetch("https://example.com/linux", &dest).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ImageError>(),
            Some(ImageError::Fetch { .. })
        ));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn test_fetch_to_cache_keys_by_file_name() {
        let temp = TempDir::new().unwrap();
        let fake = FakeDownloader::default();
        let fetcher = Fetcher::with_downloader(temp.path(), &fake).unwrap();

        let path = fetcher
            .fetch_to_cache("https://example.com/raw/1.2/boot/fixup4.dat?raw=true")
            .unwrap();

        assert_eq!(path, temp.path().join("fixup4.dat"));
    }

    #[test]
    fn test_fetch_creates_nested_destination() {
        let temp = TempDir::new().unwrap();
        let fake = FakeDownloader::default();
        let fetcher = Fetcher::with_downloader(temp.path(), &fake).unwrap();
        let dest = temp
            .path()
            .join("debian-installer-arm64/debian-installer/arm64/grub/grub.cfg");

        fetcher.fetch("https://example.com/grub.cfg", &dest).unwrap();
        assert!(dest.is_file());
    }

    #[test]
    fn test_second_fetcher_on_same_cache_fails() {
        let temp = TempDir::new().unwrap();
        let _held = Fetcher::open(temp.path()).unwrap();
        assert!(Fetcher::open(temp.path()).is_err());
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(url_file_name("https://a/b/linux"), Some("linux"));
        assert_eq!(url_file_name("https://a/b/c.dtb#x"), Some("c.dtb"));
        assert_eq!(url_file_name("https://a/b/"), None);
    }
}
