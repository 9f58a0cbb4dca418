//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything here is fatal: the run never starts with a configuration
/// that fails to load or validate.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The configuration file extension is not one of yaml, yml, toml or json.
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// The merged configuration does not have the expected shape.
    #[display("invalid configuration: {_0}")]
    Parse(#[error(not(source))] String),
    #[display("no collections configured")]
    NoCollections,
    #[display("collection #{_0} has an empty name")]
    EmptyName(#[error(not(source))] usize),
    #[display("collection `{_0}` is configured more than once")]
    DuplicateName(#[error(not(source))] String),
    /// A reference rule names no target collection.
    #[display("reference `{collection}.{field}` has no target collection")]
    MissingTarget { collection: String, field: String },
    /// A reference rule targets a collection that is not configured.
    #[display("reference `{collection}.{field}` targets unknown collection `{target}`")]
    UnknownTarget {
        collection: String,
        field: String,
        target: String,
    },
    /// The asset cache settings cannot be turned into a cache layout.
    #[display("invalid asset settings")]
    Assets,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
