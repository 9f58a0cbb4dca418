//! Graph Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction, matching the other crates in the workspace.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A graph error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A fetched value could not be turned into a [`Record`](crate::Record).
    #[display("invalid record: {_0}")]
    InvalidRecord(#[error(not(source))] String),
    /// A reference rule's dot-path is empty or contains empty segments.
    #[display("invalid source path: `{_0}`")]
    InvalidSourcePath(#[error(not(source))] String),
    /// A reference could not be resolved and the configured
    /// [`UnresolvedPolicy`](crate::UnresolvedPolicy) treats that as fatal.
    #[display("unresolved reference {collection}[{record}].{field}: {reason}")]
    Unresolved {
        collection: String,
        record: String,
        field: String,
        reason: String,
    },
    /// Data was pushed into an output store for a collection it never saw
    /// declared.
    #[display("collection `{_0}` was not declared")]
    UndeclaredCollection(#[error(not(source))] String),
    /// Collection name cannot be used as an output file name.
    #[display("invalid output name: `{_0}`")]
    InvalidOutputName(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Node serialization failed.
    #[display("failed to serialize nodes")]
    Serialize,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
