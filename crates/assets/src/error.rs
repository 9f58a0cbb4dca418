//! Asset Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// An asset cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for asset cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Access denied while writing into the cache directory.
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The request never produced a response, or the body stream broke off.
    #[display("network error fetching {_0}")]
    Network(#[error(not(source))] String),
    /// The remote answered with a non-success status.
    #[display("unexpected status {_0} fetching {_1}")]
    Status(u16, String),
    /// Filename or cache directory contains invalid characters or escapes
    /// the cache root.
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// The HTTP client could not be constructed.
    #[display("failed to build HTTP client")]
    Client,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Network(_) => true,
            Self::Status(status, _) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
