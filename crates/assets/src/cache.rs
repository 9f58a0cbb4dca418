//! The asset cache: download once, reuse afterwards.
//!
//! A cached asset is a file named after the remote `filename_disk` inside the
//! per-kind cache directory. Existence on disk is the primary cache test. A
//! JSON sidecar (`<filename>.fingerprint`) stores the remote fingerprint the
//! file was downloaded under (when the remote supplied one) together with the
//! BLAKE3 hash and length of the body, so a changed remote file can be
//! detected without deleting the cache by hand.

use crate::error::{ErrorKind, Result};
use crate::layout::{AssetKind, CacheLayout};
use crate::path::validate_filename;
use crate::DownloaderHandle;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::UtcDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

const PART_SUFFIX: &str = ".part";
const FINGERPRINT_SUFFIX: &str = ".fingerprint";

/// Indicates how much work was required to produce an [`Acquired`] asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireEffort {
    /// The asset was already on disk (or already acquired during this run);
    /// no network request was made.
    Cached,
    /// The asset was on disk, but its remote fingerprint changed, so it was
    /// downloaded again.
    Refreshed,
    /// No cached copy existed; the asset was downloaded.
    Downloaded,
}

/// A cached asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    /// Path to publish on the record (public prefix convention).
    pub path: String,
    /// Where the asset lives on disk.
    pub local: PathBuf,
    pub effort: AcquireEffort,
}

/// Sidecar stored next to every downloaded asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Fingerprint {
    remote: Option<String>,
    blake3: String,
    length: u64,
    downloaded_at: i64,
}

/// Filesystem-backed download deduplication.
///
/// Downloads are written to `<filename>.part` and renamed into place once
/// complete, so an interrupted download never leaves a truncated file where
/// a later run would mistake it for a cache hit.
pub struct AssetCache {
    layout: CacheLayout,
    downloader: DownloaderHandle,
    token: Option<String>,
    /// Destinations already acquired during this run.
    acquired: Mutex<HashSet<PathBuf>>,
}
impl AssetCache {
    pub fn new(layout: CacheLayout, downloader: DownloaderHandle) -> Self {
        Self {
            layout,
            downloader,
            token: None,
            acquired: Mutex::default(),
        }
    }

    /// Bearer token sent with every download.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Make sure `url` is cached under `filename` and return its published
    /// path.
    ///
    /// The first call for a destination in a run checks the disk: a present
    /// file whose sidecar matches `fingerprint` (or any present file, when no
    /// fingerprint is given) is reused without a network request. Every later
    /// call for the same destination in the same run is a cache hit.
    #[instrument(skip(self, url, fingerprint), fields(downloader = self.downloader.name()))]
    pub async fn acquire(
        &self,
        url: &str,
        filename: &str,
        kind: AssetKind,
        fingerprint: Option<&str>,
    ) -> Result<Acquired> {
        let filename = validate_filename(filename)?;
        let dir = self.layout.dir(kind);
        fs::create_dir_all(&dir).await.map_err(|e| map_io_error(e, &dir))?;
        let local = dir.join(&filename);
        let path = self.layout.public_path(kind, &filename);

        if self.seen(&local) {
            return Ok(Acquired { path, local, effort: AcquireEffort::Cached });
        }
        let effort = match fs::try_exists(&local).await.map_err(ErrorKind::Io)? {
            true if self.is_fresh(&local, fingerprint).await => {
                tracing::debug!(path = %local.display(), "Asset already cached");
                AcquireEffort::Cached
            },
            true => {
                tracing::info!(path = %local.display(), "Cached asset changed remotely; downloading again");
                self.download(url, &local, fingerprint).await?;
                AcquireEffort::Refreshed
            },
            false => {
                tracing::info!(path = %local.display(), "Downloading asset");
                self.download(url, &local, fingerprint).await?;
                AcquireEffort::Downloaded
            },
        };
        self.mark(local.clone());
        Ok(Acquired { path, local, effort })
    }

    fn seen(&self, local: &Path) -> bool {
        self.acquired.lock().map(|acquired| acquired.contains(local)).unwrap_or(false)
    }

    fn mark(&self, local: PathBuf) {
        if let Ok(mut acquired) = self.acquired.lock() {
            acquired.insert(local);
        }
    }

    /// Without a remote fingerprint there is nothing to compare against, so
    /// existence is enough. With one, the sidecar must exist and agree.
    async fn is_fresh(&self, local: &Path, fingerprint: Option<&str>) -> bool {
        let Some(expected) = fingerprint else {
            return true;
        };
        match read_fingerprint(local).await {
            Some(stored) => stored.remote.as_deref() == Some(expected),
            None => false,
        }
    }

    async fn download(&self, url: &str, local: &Path, fingerprint: Option<&str>) -> Result<()> {
        let part = with_suffix(local, PART_SUFFIX);
        let (length, hash) = match self.write_part(url, &part).await {
            Ok(written) => written,
            Err(e) => {
                // Best effort: the .part file may not even exist yet.
                _ = fs::remove_file(&part).await;
                return Err(e);
            },
        };
        fs::rename(&part, local).await.map_err(|e| map_io_error(e, local))?;

        let sidecar = Fingerprint {
            remote: fingerprint.map(str::to_string),
            blake3: hash,
            length,
            downloaded_at: UtcDateTime::now().unix_timestamp(),
        };
        let sidecar_path = with_suffix(local, FINGERPRINT_SUFFIX);
        let bytes = serde_json::to_vec(&sidecar).map_err(|e| ErrorKind::Io(e.into()))?;
        fs::write(&sidecar_path, bytes).await.map_err(|e| map_io_error(e, &sidecar_path))?;
        tracing::debug!(path = %local.display(), bytes = length, "Asset downloaded");
        Ok(())
    }

    async fn write_part(&self, url: &str, part: &Path) -> Result<(u64, String)> {
        let mut body = self.downloader.fetch(url, self.token.as_deref()).await?;
        let mut file = fs::File::create(part).await.map_err(|e| map_io_error(e, part))?;
        let mut hasher = blake3::Hasher::new();
        let mut length = 0u64;
        while let Some(chunk) = body.try_next().await? {
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(ErrorKind::Io)?;
            length += chunk.len() as u64;
        }
        file.flush().await.map_err(ErrorKind::Io)?;
        Ok((length, hasher.finalize().to_hex().to_string()))
    }
}

async fn read_fingerprint(local: &Path) -> Option<Fingerprint> {
    let bytes = fs::read(with_suffix(local, FINGERPRINT_SUFFIX)).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}
