use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use graft_config::CollectionSpec;
use graft_graph::error::ErrorKind as GraphErrorKind;
use graft_graph::{ID_FIELD, Record};
use graft_source::SourceHandle;
use serde_json::Value;
use tracing::instrument;

/// Id given to a singleton that comes back without one.
pub const SINGLETON_ID: i64 = 1;

/// Read every item of a collection and turn each one into a [`Record`].
///
/// The whole collection is read in one request (see
/// [`CollectionSpec::query`]). A singleton collection answers with a single
/// object, which becomes the only record.
#[instrument(skip(source, spec), fields(collection = %spec.name, remote = spec.remote()))]
pub async fn fetch_collection(source: &SourceHandle, spec: &CollectionSpec) -> Result<Vec<Record>> {
    let fetch_error = || ErrorKind::Fetch(spec.name.clone());
    let data = source.read_items(spec.remote(), &spec.query()).await.or_raise(fetch_error)?;
    let items = match (spec.singleton, data) {
        (true, Value::Object(mut item)) => {
            if item.get(ID_FIELD).is_none_or(Value::is_null) {
                item.insert(ID_FIELD.to_string(), Value::from(SINGLETON_ID));
            }
            vec![Value::Object(item)]
        },
        (false, Value::Array(items)) => items,
        (singleton, other) => {
            let expected = if singleton { "an object" } else { "a list of items" };
            let found = GraphErrorKind::InvalidRecord(format!("expected {expected}, found {}", kind_of(&other)));
            return Err(found).or_raise(fetch_error);
        },
    };
    let records = items.into_iter().map(Record::from_value).collect::<graft_graph::error::Result<Vec<_>>>();
    let records = records.or_raise(fetch_error)?;
    tracing::debug!(records = records.len(), "Collection fetched");
    Ok(records)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_graph::RecordId;
    use graft_source::MockSource;
    use serde_json::json;
    use std::sync::Arc;

    fn source(collections: impl IntoIterator<Item = (&'static str, Value)>) -> (Arc<MockSource>, SourceHandle) {
        let mock = Arc::new(MockSource::with_collections(collections));
        let handle: SourceHandle = mock.clone();
        (mock, handle)
    }

    #[tokio::test]
    async fn test_reads_whole_collection_from_remote_path() {
        let (mock, handle) = source([("blog_posts", json!([{"id": 1}, {"id": "2"}]))]);
        let spec = CollectionSpec {
            path: Some("blog_posts".to_string()),
            ..CollectionSpec::new("posts")
        };
        let records = fetch_collection(&handle, &spec).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id().clone()).collect();
        assert_eq!(ids, [RecordId::from(1), RecordId::from(2)]);

        let reads = mock.reads().await;
        assert_eq!(reads[0].0, "blog_posts");
        assert_eq!(reads[0].1.get("limit"), Some(&json!(-1)));
        assert_eq!(reads[0].1.get("fields"), Some(&json!("*")));
    }

    #[tokio::test]
    async fn test_configured_query_keeps_unlimited_reads() {
        let (mock, handle) = source([("posts", json!([]))]);
        let spec = CollectionSpec {
            query: Some(serde_json::from_value(json!({"fields": ["*", "author.*"]})).unwrap()),
            ..CollectionSpec::new("posts")
        };
        assert!(fetch_collection(&handle, &spec).await.unwrap().is_empty());
        let reads = mock.reads().await;
        assert_eq!(reads[0].1.get("limit"), Some(&json!(-1)));
        assert_eq!(reads[0].1.get("fields"), Some(&json!(["*", "author.*"])));
    }

    #[tokio::test]
    async fn test_singleton_is_wrapped() {
        let (_, handle) = source([("settings", json!({"title": "My site"}))]);
        let spec = CollectionSpec {
            singleton: true,
            ..CollectionSpec::new("settings")
        };
        let records = fetch_collection(&handle, &spec).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), &RecordId::from(SINGLETON_ID));
        assert_eq!(records[0].get("title"), Some(&json!("My site")));
    }

    #[tokio::test]
    async fn test_unexpected_shapes_fail_the_collection() {
        let (_, handle) = source([("posts", json!({"id": 1})), ("tags", json!([{"id": 1}, "tag"]))]);
        for name in ["posts", "tags", "missing"] {
            let err = fetch_collection(&handle, &CollectionSpec::new(name)).await.unwrap_err();
            assert!(matches!(&*err, ErrorKind::Fetch(collection) if collection == name));
        }
    }
}
