//! Output stores: where assembled nodes end up.
//!
//! The store is the hand-off point to whatever builds the site. The schema
//! (collections and their reference fields) must be declared before any
//! record is added.

use crate::error::{ErrorKind, Result};
use crate::record::Record;
use async_trait::async_trait;
use exn::ResultExt;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Destination for assembled nodes.
#[async_trait]
pub trait OutputStore: Send {
    /// Declare an output collection. Declaring twice is a no-op.
    async fn declare_collection(&mut self, name: &str) -> Result<()>;

    /// Declare that `field` on `collection` holds ids of `target` records.
    /// A later declaration of the same field replaces the earlier one.
    async fn declare_reference(&mut self, collection: &str, field: &str, target: &str) -> Result<()>;

    /// Append a node to a declared collection.
    async fn add_record(&mut self, collection: &str, record: Record) -> Result<()>;

    /// Flush everything that was added. Called once, after the last record.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A declared collection and the nodes added to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoredCollection {
    /// Reference field name → target collection name.
    pub references: IndexMap<String, String>,
    pub nodes: Vec<Record>,
}

/// Keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: IndexMap<String, StoredCollection>,
}
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, name: &str) -> Option<&StoredCollection> {
        self.collections.get(name)
    }

    pub fn collections(&self) -> impl Iterator<Item = (&str, &StoredCollection)> {
        self.collections.iter().map(|(name, collection)| (name.as_str(), collection))
    }

    fn declared(&mut self, name: &str) -> Result<&mut StoredCollection> {
        match self.collections.get_mut(name) {
            Some(collection) => Ok(collection),
            None => exn::bail!(ErrorKind::UndeclaredCollection(name.to_string())),
        }
    }
}

#[async_trait]
impl OutputStore for MemoryStore {
    async fn declare_collection(&mut self, name: &str) -> Result<()> {
        self.collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn declare_reference(&mut self, collection: &str, field: &str, target: &str) -> Result<()> {
        self.declared(collection)?.references.insert(field.to_string(), target.to_string());
        Ok(())
    }

    async fn add_record(&mut self, collection: &str, record: Record) -> Result<()> {
        self.declared(collection)?.nodes.push(record);
        Ok(())
    }
}

/// Writes one `<collection>.json` file per declared collection into a
/// directory when the run finishes.
///
/// Each file holds the collection's declared `references` and its `nodes`,
/// in the order they were added.
#[derive(Debug)]
pub struct JsonDirStore {
    root: PathBuf,
    inner: MemoryStore,
}
impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inner: MemoryStore::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_name(collection: &str) -> Result<PathBuf> {
        let usable = !collection.is_empty()
            && collection != "."
            && collection != ".."
            && !collection.contains(['/', '\\', '\0']);
        if !usable {
            exn::bail!(ErrorKind::InvalidOutputName(collection.to_string()));
        }
        Ok(PathBuf::from(format!("{collection}.json")))
    }
}

#[async_trait]
impl OutputStore for JsonDirStore {
    async fn declare_collection(&mut self, name: &str) -> Result<()> {
        Self::file_name(name)?;
        self.inner.declare_collection(name).await
    }

    async fn declare_reference(&mut self, collection: &str, field: &str, target: &str) -> Result<()> {
        self.inner.declare_reference(collection, field, target).await
    }

    async fn add_record(&mut self, collection: &str, record: Record) -> Result<()> {
        self.inner.add_record(collection, record).await
    }

    async fn finish(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(ErrorKind::Io)?;
        for (name, collection) in self.inner.collections() {
            let path = self.root.join(Self::file_name(name)?);
            let bytes = serde_json::to_vec_pretty(collection).or_raise(|| ErrorKind::Serialize)?;
            tokio::fs::write(&path, bytes).await.map_err(ErrorKind::Io)?;
            tracing::debug!(path = %path.display(), nodes = collection.nodes.len(), "Wrote collection");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_requires_declaration() {
        let mut store = MemoryStore::new();
        let err = store.add_record("posts", record(json!({"id": 1}))).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UndeclaredCollection(_)));
        assert!(store.declare_reference("posts", "author", "authors").await.is_err());

        store.declare_collection("posts").await.unwrap();
        store.declare_reference("posts", "author", "authors").await.unwrap();
        store.add_record("posts", record(json!({"id": 1}))).await.unwrap();
        let posts = store.collection("posts").unwrap();
        assert_eq!(posts.references.get("author").map(String::as_str), Some("authors"));
        assert_eq!(posts.nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_json_dir_store_writes_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::new(temp_dir.path().join("out"));
        store.declare_collection("posts").await.unwrap();
        store.declare_collection("authors").await.unwrap();
        store.declare_reference("posts", "author", "authors").await.unwrap();
        store.add_record("posts", record(json!({"id": 1, "author": [7]}))).await.unwrap();
        store.finish().await.unwrap();

        let posts = std::fs::read(temp_dir.path().join("out/posts.json")).unwrap();
        let posts: serde_json::Value = serde_json::from_slice(&posts).unwrap();
        assert_eq!(posts, json!({"references": {"author": "authors"}, "nodes": [{"id": 1, "author": [7]}]}));
        let authors = std::fs::read(temp_dir.path().join("out/authors.json")).unwrap();
        let authors: serde_json::Value = serde_json::from_slice(&authors).unwrap();
        assert_eq!(authors, json!({"references": {}, "nodes": []}));
    }

    #[tokio::test]
    async fn test_json_dir_store_rejects_path_like_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::new(temp_dir.path());
        assert!(store.declare_collection("../escape").await.is_err());
        assert!(store.declare_collection("").await.is_err());
        assert!(store.declare_collection("ok_name").await.is_ok());
    }
}
