//! Source Error Types

use derive_more::{Display, Error};

/// A remote source error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Login was refused, or the login response carried no token.
    #[display("authentication failed against {_0}")]
    Authentication(#[error(not(source))] String),
    /// The request never produced a response.
    #[display("request to {_0} failed")]
    Request(#[error(not(source))] String),
    /// The remote answered with a non-success status.
    #[display("unexpected status {_0} from {_1}")]
    Status(u16, String),
    /// The response body was not the JSON envelope expected.
    #[display("invalid response from {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// The API base URL cannot be used to build endpoint URLs.
    #[display("invalid API URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// The HTTP client could not be constructed.
    #[display("failed to build HTTP client")]
    Client,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status(status, _) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
