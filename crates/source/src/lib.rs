mod directus;
pub mod error;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod query;

pub use crate::directus::{Auth, DirectusClient};
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::{MOCK_API_URL, MockSource};
pub use crate::query::Query;
use crate::error::Result;
use async_trait::async_trait;
use graft_assets::AssetKind;
use serde_json::Value;
use std::sync::Arc;
pub use url::Url;

pub type SourceHandle = Arc<dyn RemoteSource + Send + Sync>;

/// Read access to a remote collection API.
///
/// A source is authenticated once, when it is constructed, and stays
/// authenticated until [`logout()`](Self::logout).
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str;

    /// Read the items of the collection at remote `path`.
    ///
    /// Returns the `data` member of the response: an array of items, or a
    /// single object for singleton collections.
    async fn read_items(&self, path: &str, query: &Query) -> Result<Value>;

    /// Bearer token to authenticate asset downloads with.
    fn token(&self) -> Option<String>;

    /// Download URL of the asset with remote `id`.
    fn asset_url(&self, kind: AssetKind, id: &str) -> String;

    /// End the session. Sources without a session do nothing.
    async fn logout(&self) -> Result<()>;
}
