//! Graph assembly: declaring the schema and handing records to the store.

use crate::error::Result;
use crate::schema::{Schema, Target};
use crate::set::CollectionRecordSet;
use crate::store::OutputStore;

/// Declare every collection, then every reference field, on the store.
///
/// Static rules declare their field on the owning collection. Rules with an
/// inverse field declare it on each of their target collections, pointing
/// back at the owning collection. Polymorphic fields have no single target
/// and are left undeclared.
pub async fn declare_schema<S: OutputStore + ?Sized>(schema: &Schema, store: &mut S) -> Result<()> {
    for (name, _) in schema.collections() {
        store.declare_collection(name).await?;
    }
    for (name, collection) in schema.collections() {
        for rule in collection.rules() {
            if let Target::One(target) = &rule.collection {
                store.declare_reference(name, &rule.field, target).await?;
            }
            if let Some(related_field) = &rule.related_field {
                for target in rule.collection.names() {
                    store.declare_reference(target, related_field, name).await?;
                }
            }
        }
    }
    Ok(())
}

/// Emit every record as a node, collection by collection, in insertion
/// order. Returns the number of nodes emitted.
pub async fn assemble<S: OutputStore + ?Sized>(set: CollectionRecordSet, store: &mut S) -> Result<u64> {
    let mut emitted = 0;
    for (collection, records) in set {
        let count = records.len();
        for (_, record) in records {
            store.add_record(&collection, record).await?;
            emitted += 1;
        }
        tracing::debug!(collection = %collection, nodes = count, "Collection assembled");
    }
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, RecordId, RefRule, Record};
    use serde_json::json;

    #[tokio::test]
    async fn test_declares_forward_and_inverse_references() {
        let schema = Schema::new()
            .with_collection(
                "posts",
                "posts",
                vec![
                    RefRule::new("author", "author", "authors").unwrap().with_related_field("posts"),
                    RefRule::new("blocks", "blocks.item", ["media", "quotes"]).unwrap().with_related_field("pages"),
                ],
            )
            .with_collection("authors", "authors", vec![])
            .with_collection("media", "directus_files", vec![])
            .with_collection("quotes", "quotes", vec![]);
        let mut store = MemoryStore::new();
        declare_schema(&schema, &mut store).await.unwrap();

        let posts = store.collection("posts").unwrap();
        assert_eq!(posts.references.get("author").map(String::as_str), Some("authors"));
        assert!(posts.references.get("blocks").is_none());
        let authors = store.collection("authors").unwrap();
        assert_eq!(authors.references.get("posts").map(String::as_str), Some("posts"));
        for target in ["media", "quotes"] {
            assert_eq!(store.collection(target).unwrap().references.get("pages").map(String::as_str), Some("posts"));
        }
    }

    #[tokio::test]
    async fn test_assemble_emits_in_insertion_order() {
        let mut set = CollectionRecordSet::new();
        set.declare("posts");
        set.declare("authors");
        for id in [3, 1, 2] {
            set.insert("posts", Record::from_value(json!({"id": id})).unwrap());
        }
        set.insert("authors", Record::from_value(json!({"id": 7})).unwrap());

        let mut store = MemoryStore::new();
        store.declare_collection("posts").await.unwrap();
        store.declare_collection("authors").await.unwrap();
        assert_eq!(assemble(set, &mut store).await.unwrap(), 4);

        let ids: Vec<_> = store.collection("posts").unwrap().nodes.iter().map(|r| r.id().clone()).collect();
        assert_eq!(ids, [RecordId::Int(3), RecordId::Int(1), RecordId::Int(2)]);
        assert_eq!(store.collection("authors").unwrap().nodes.len(), 1);
    }
}
