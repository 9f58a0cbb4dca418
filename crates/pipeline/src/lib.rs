//! A sync run end to end: fetch every configured collection, cache the
//! assets its records embed, resolve cross-collection references and hand
//! the resulting nodes to an output store.

pub mod assets;
pub mod error;
mod fetch;
mod sync;

pub use crate::fetch::{SINGLETON_ID, fetch_collection};
pub use crate::sync::{SyncEvent, SyncRun, SyncSummary};
