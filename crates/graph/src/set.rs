//! The cross-collection record set built up during a run.

use crate::record::{Record, RecordId};
use indexmap::IndexMap;

type Records = IndexMap<RecordId, Record>;

/// Every fetched record of every collection, keyed by collection name and
/// then by record id.
///
/// Both levels keep insertion order: collections in the order they were
/// declared, records in the order they were fetched. Re-inserting an id
/// replaces the record but keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct CollectionRecordSet {
    collections: IndexMap<String, Records>,
}
impl CollectionRecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a (possibly empty) slot for a collection, fixing its position
    /// in iteration order.
    pub fn declare(&mut self, collection: impl Into<String>) {
        self.collections.entry(collection.into()).or_default();
    }

    /// Insert a record, returning the record previously stored under the
    /// same id (if any).
    pub fn insert(&mut self, collection: &str, record: Record) -> Option<Record> {
        let records = self.collections.entry(collection.to_string()).or_default();
        records.insert(record.id().clone(), record)
    }

    pub fn get(&self, collection: &str, id: &RecordId) -> Option<&Record> {
        self.collections.get(collection)?.get(id)
    }

    pub fn get_mut(&mut self, collection: &str, id: &RecordId) -> Option<&mut Record> {
        self.collections.get_mut(collection)?.get_mut(id)
    }

    pub fn collection(&self, collection: &str) -> Option<&Records> {
        self.collections.get(collection)
    }

    /// Snapshot of a collection's ids, so records can be mutated one at a
    /// time while walking the collection.
    pub fn ids(&self, collection: &str) -> Vec<RecordId> {
        self.collections.get(collection).map(|records| records.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Total number of records across all collections.
    pub fn len(&self) -> usize {
        self.collections.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Records)> {
        self.collections.iter().map(|(name, records)| (name.as_str(), records))
    }
}
impl IntoIterator for CollectionRecordSet {
    type Item = (String, Records);
    type IntoIter = indexmap::map::IntoIter<String, Records>;

    fn into_iter(self) -> Self::IntoIter {
        self.collections.into_iter()
    }
}
