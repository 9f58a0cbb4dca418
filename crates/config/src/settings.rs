use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use graft_assets::{CacheLayout, DEFAULT_ASSETS_ROOT, DEFAULT_CACHE_DIR, DEFAULT_PUBLIC_PREFIX};
use graft_graph::{RefRule, Schema, UnresolvedPolicy};
use graft_source::{Auth, Query};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_OUTPUT: &str = "./.graft";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Everything a sync run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root URL of the remote API.
    #[serde(alias = "apiUrl")]
    pub api_url: Url,
    pub auth: Auth,
    /// Collections to synchronize, in output order.
    pub collections: Vec<CollectionSpec>,
    #[serde(default)]
    pub assets: AssetSettings,
    /// Directory the JSON output store writes into.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub unresolved: UnresolvedPolicy,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}
impl Settings {
    /// Check everything deserialization can't: non-empty and unique
    /// collection names, and reference rules that point at configured
    /// collections.
    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            exn::bail!(ErrorKind::NoCollections);
        }
        let mut names = HashSet::new();
        for (position, collection) in self.collections.iter().enumerate() {
            if collection.name.trim().is_empty() {
                exn::bail!(ErrorKind::EmptyName(position + 1));
            }
            if !names.insert(collection.name.as_str()) {
                exn::bail!(ErrorKind::DuplicateName(collection.name.clone()));
            }
        }
        for collection in &self.collections {
            for rule in &collection.refs {
                let targets = rule.collection.names();
                if targets.iter().all(|target| target.is_empty()) {
                    exn::bail!(ErrorKind::MissingTarget {
                        collection: collection.name.clone(),
                        field: rule.field.clone(),
                    });
                }
                if let Some(target) = targets.iter().find(|target| !names.contains(target.as_str())) {
                    exn::bail!(ErrorKind::UnknownTarget {
                        collection: collection.name.clone(),
                        field: rule.field.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Reference schema of the configured collections.
    pub fn schema(&self) -> Schema {
        schema(&self.collections)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// One remote collection and how it is turned into output nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Output collection name.
    pub name: String,
    /// Remote collection path, when it differs from `name`.
    #[serde(default, alias = "directusPathName", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// The remote returns a single object rather than a list.
    #[serde(default)]
    pub singleton: bool,
    #[serde(default, alias = "queryParams", skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default)]
    pub refs: Vec<RefRule>,
    #[serde(default, alias = "downloadImages")]
    pub download_images: bool,
    #[serde(default, alias = "downloadFiles")]
    pub download_files: bool,
}
impl CollectionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            singleton: false,
            query: None,
            refs: Vec::new(),
            download_images: false,
            download_files: false,
        }
    }

    pub fn remote(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }

    /// Query to read the collection with: read everything when none is
    /// configured, and never paginate.
    pub fn query(&self) -> Query {
        self.query.clone().map(Query::with_default_limit).unwrap_or_default()
    }
}

/// Where downloaded assets are cached and how their paths are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettings {
    #[serde(default = "default_assets_root")]
    pub root: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}
impl AssetSettings {
    pub fn layout(&self) -> Result<CacheLayout> {
        CacheLayout::new(&self.root, &self.cache_dir, &self.public_prefix).or_raise(|| ErrorKind::Assets)
    }
}
impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            root: default_assets_root(),
            cache_dir: default_cache_dir(),
            public_prefix: default_public_prefix(),
        }
    }
}

/// Reference schema of `collections`, in the order given.
pub fn schema(collections: &[CollectionSpec]) -> Schema {
    collections.iter().fold(Schema::new(), |schema, collection| {
        schema.with_collection(&collection.name, collection.remote(), collection.refs.clone())
    })
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_assets_root() -> PathBuf {
    PathBuf::from(DEFAULT_ASSETS_ROOT)
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_public_prefix() -> String {
    DEFAULT_PUBLIC_PREFIX.to_string()
}
