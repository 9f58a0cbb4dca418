//! In-memory remote source for testing.

use crate::error::{ErrorKind, Result};
use crate::{Query, RemoteSource};
use async_trait::async_trait;
use graft_assets::AssetKind;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const MOCK_API_URL: &str = "https://cms.example/";

/// Serves collection payloads from a `HashMap` keyed by remote path.
///
/// Every read is recorded together with the query it was sent with, so tests
/// can assert on the parameters a fetch used.
///
/// # Examples
///
/// ```
/// use graft_source::{MockSource, Query, RemoteSource};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MockSource::with_collections([("posts", json!([{"id": 1}]))]);
/// let items = source.read_items("posts", &Query::default()).await?;
/// assert_eq!(items, json!([{"id": 1}]));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockSource {
    collections: HashMap<String, Value>,
    token: Option<String>,
    reads: RwLock<Vec<(String, Query)>>,
    logged_out: RwLock<bool>,
}
impl MockSource {
    pub fn with_collections(collections: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Self {
            collections: collections.into_iter().map(|(path, data)| (path.into(), data)).collect(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Remote paths read so far, with their queries, in order.
    pub async fn reads(&self) -> Vec<(String, Query)> {
        self.reads.read().await.clone()
    }

    pub async fn is_logged_out(&self) -> bool {
        *self.logged_out.read().await
    }
}

#[async_trait]
impl RemoteSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn read_items(&self, path: &str, query: &Query) -> Result<Value> {
        self.reads.write().await.push((path.to_string(), query.clone()));
        match self.collections.get(path) {
            Some(data) => Ok(data.clone()),
            None => exn::bail!(ErrorKind::Status(404, format!("{MOCK_API_URL}items/{path}"))),
        }
    }

    fn token(&self) -> Option<String> {
        self.token.clone()
    }

    fn asset_url(&self, kind: AssetKind, id: &str) -> String {
        format!("{MOCK_API_URL}{}/{id}", kind.endpoint())
    }

    async fn logout(&self) -> Result<()> {
        *self.logged_out.write().await = true;
        Ok(())
    }
}
