//! In-memory downloader for testing.

use crate::download::{ChunkStream, Downloader};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Chunk size bodies are split into, so consumers see multi-chunk streams.
const CHUNK_SIZE: usize = 4;

/// Serves bodies from a `HashMap` keyed by URL and records every request.
///
/// # Examples
///
/// ```
/// use graft_assets::{Downloader, MockDownloader};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let downloader = MockDownloader::with_files([("https://cms.example/assets/1", b"...")]);
/// downloader.fetch("https://cms.example/assets/1", Some("token")).await?;
/// assert_eq!(downloader.requests().await, ["https://cms.example/assets/1"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockDownloader {
    files: RwLock<HashMap<String, Vec<u8>>>,
    requests: RwLock<Vec<(String, Option<String>)>>,
}
impl MockDownloader {
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let files = files.into_iter().map(|(url, body)| (url.into(), body.into())).collect();
        Self {
            files: RwLock::new(files),
            requests: RwLock::default(),
        }
    }

    /// Replace (or add) the body served for `url`.
    pub async fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.files.write().await.insert(url.into(), body.into());
    }

    /// URLs requested so far, in order.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.read().await.iter().map(|(url, _)| url.clone()).collect()
    }

    /// Bearer tokens sent so far, in request order.
    pub async fn tokens(&self) -> Vec<Option<String>> {
        self.requests.read().await.iter().map(|(_, token)| token.clone()).collect()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, url: &str, token: Option<&str>) -> Result<ChunkStream> {
        self.requests.write().await.push((url.to_string(), token.map(str::to_string)));
        let Some(body) = self.files.read().await.get(url).cloned() else {
            exn::bail!(ErrorKind::Status(404, url.to_string()));
        };
        let chunks: Vec<Result<Vec<u8>>> = body.chunks(CHUNK_SIZE).map(|chunk| Ok(chunk.to_vec())).collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
