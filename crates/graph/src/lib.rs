//! Record model and relational graph building for graft.
//!
//! Records fetched from the remote collections are held in a
//! [`CollectionRecordSet`], their raw relation values are turned into edge
//! lists by the [`Resolver`] according to a [`Schema`] of [`RefRule`]s, and
//! the result is handed node by node to an [`OutputStore`].

mod assemble;
pub mod error;
mod record;
pub mod refs;
mod schema;
mod set;
mod store;

pub use crate::assemble::{assemble, declare_schema};
pub use crate::record::{ID_FIELD, Record, RecordId};
pub use crate::refs::{Resolver, ResolveStats, UnresolvedPolicy};
pub use crate::schema::{CollectionIndex, CollectionSchema, RefRule, Schema, SourcePath, Target};
pub use crate::set::CollectionRecordSet;
pub use crate::store::{JsonDirStore, MemoryStore, OutputStore, StoredCollection};
