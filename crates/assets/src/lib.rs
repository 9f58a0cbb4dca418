mod cache;
mod download;
pub mod error;
mod layout;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod path;

pub use crate::cache::{AcquireEffort, Acquired, AssetCache};
pub use crate::download::{ChunkStream, Downloader, HttpDownloader};
pub use crate::layout::{AssetKind, CacheLayout, DEFAULT_ASSETS_ROOT, DEFAULT_CACHE_DIR, DEFAULT_PUBLIC_PREFIX};
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockDownloader;
pub use crate::path::{validate as validate_path, validate_filename};
use std::sync::Arc;

pub type DownloaderHandle = Arc<dyn Downloader + Send + Sync>;
