//! Downloader trait and its HTTP implementation.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// Body of a download, yielded chunk by chunk.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Fetches remote asset bodies.
///
/// Implementations only open the request; writing the body to disk, hashing
/// and cache bookkeeping belong to [`AssetCache`](crate::AssetCache).
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str;

    /// Request `url`, authenticating with `token` as a bearer token when
    /// given. Fails on connection errors and non-success statuses before any
    /// of the body is yielded.
    async fn fetch(&self, url: &str, token: Option<&str>) -> Result<ChunkStream>;
}

/// Streams downloads over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}
impl HttpDownloader {
    /// Build a downloader with its own connection pool.
    ///
    /// Only connecting is bounded; a body streams for as long as it takes.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().connect_timeout(connect_timeout).build().or_raise(|| ErrorKind::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &str, token: Option<&str>) -> Result<ChunkStream> {
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.or_raise(|| ErrorKind::Network(url.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16(), url.to_string()));
        }
        let url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map(|bytes| bytes.to_vec()).or_raise(|| ErrorKind::Network(url.clone())));
        Ok(Box::pin(body))
    }
}
