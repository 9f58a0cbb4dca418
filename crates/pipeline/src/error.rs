//! Pipeline Error Types
//!
//! Every variant names the stage that failed; the cause is attached as a
//! child in the `exn` error tree.

use derive_more::{Display, Error};

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a failed run.
///
/// ### Operational Errors
/// - [`ErrorKind::Fetch`]
/// - [`ErrorKind::Assets`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Schema`]
/// - [`ErrorKind::Resolve`]
/// - [`ErrorKind::Store`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Reading a collection failed, or it returned something other than
    /// records.
    #[display("failed to load collection `{_0}`")]
    Fetch(#[error(not(source))] String),
    /// An asset referenced by a record of the collection could not be cached.
    #[display("failed to cache assets for collection `{_0}`")]
    Assets(#[error(not(source))] String),
    /// The output store rejected the collection or reference declarations.
    #[display("failed to declare output schema")]
    Schema,
    /// A reference could not be resolved under the `error` policy.
    #[display("reference resolution failed")]
    Resolve,
    /// The output store rejected a node or failed to persist.
    #[display("failed to write output")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            _ => false,
        }
    }
}
