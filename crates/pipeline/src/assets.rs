//! Asset discovery and caching for fetched records.
//!
//! Records embed file metadata objects ("descriptors") wherever the remote
//! expanded a file relation. Resolution runs in two passes per asset kind:
//!
//! 1. [`find_descriptors`] walks the record depth first and classifies every
//!    nested value as a [`Node`], collecting descriptors with their location.
//! 2. [`AssetResolver::resolve`] hands each descriptor to the
//!    [`AssetCache`], one at a time in document order, and writes the
//!    returned public path onto the descriptor (`gridsome_image` for images,
//!    `gridsome_link` for files). The rest of the descriptor is left as is.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use graft_assets::{AssetCache, AssetKind};
use graft_graph::Record;
use graft_source::SourceHandle;
use serde_json::{Map, Value};

/// Nesting levels below the record root that are searched for descriptors.
pub const MAX_DEPTH: usize = 32;
/// Relation to the record's owning user; never searched.
pub const OWNER_FIELD: &str = "owner";
pub const IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/gif"];

const TYPE: &str = "type";
const DATA: &str = "data";
const ID: &str = "id";
const FILENAME_DISK: &str = "filename_disk";
const MODIFIED_ON: &str = "modified_on";
const CHECKSUM: &str = "checksum";

/// Everything needed to cache one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: AssetKind,
    /// Remote file id.
    pub id: String,
    /// Name the file is stored under, remotely and in the cache.
    pub filename: String,
    /// Remote version marker, when the remote supplies one.
    pub fingerprint: Option<String>,
}
impl Descriptor {
    /// Read a descriptor of `kind` out of an object.
    ///
    /// An image descriptor has one of the [`IMAGE_TYPES`]; a file descriptor
    /// has a non-empty `type` and `data`. Both need a remote `id` and a
    /// `filename_disk`.
    pub fn decode(object: &Map<String, Value>, kind: AssetKind) -> Option<Self> {
        let mime = object.get(TYPE).and_then(Value::as_str).filter(|mime| !mime.is_empty())?;
        let matches = match kind {
            AssetKind::Image => IMAGE_TYPES.contains(&mime),
            AssetKind::File => object.get(DATA).is_some_and(is_truthy),
        };
        if !matches {
            return None;
        }
        let id = match object.get(ID)? {
            Value::String(id) if !id.is_empty() => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        let filename = object.get(FILENAME_DISK).and_then(Value::as_str).filter(|f| !f.is_empty())?;
        let fingerprint = [MODIFIED_ON, CHECKSUM]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        Some(Self {
            kind,
            id,
            filename: filename.to_string(),
            fingerprint,
        })
    }
}

/// What a nested value is, as far as asset discovery is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A descriptor of the kind being searched for.
    Asset(Descriptor),
    /// A non-empty object or array to search inside.
    Nested,
    /// A scalar or an empty container.
    Leaf,
    /// A container that is deliberately not searched.
    Skipped,
}
impl Node {
    /// Classify the value found under `key` (`None` for array elements).
    pub fn classify(key: Option<&str>, value: &Value, kind: AssetKind) -> Self {
        match value {
            Value::Object(object) => match Descriptor::decode(object, kind) {
                Some(descriptor) => Self::Asset(descriptor),
                None if key == Some(OWNER_FIELD) => Self::Skipped,
                None if object.is_empty() => Self::Leaf,
                None => Self::Nested,
            },
            Value::Array(_) if key == Some(OWNER_FIELD) => Self::Skipped,
            Value::Array(items) if items.is_empty() => Self::Leaf,
            Value::Array(_) => Self::Nested,
            _ => Self::Leaf,
        }
    }
}

/// One step from a container to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A descriptor and where it sits in the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub path: Vec<Segment>,
    pub descriptor: Descriptor,
}

/// Result of a [`find_descriptors`] walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Descriptors in depth-first document order.
    pub found: Vec<Found>,
    /// Whether some values were left unvisited because they sit deeper than
    /// [`MAX_DEPTH`].
    pub truncated: bool,
}

/// Find every descriptor of `kind` inside a record's fields. The record
/// root is never a descriptor itself, and descriptors are not searched
/// inside.
pub fn find_descriptors(fields: &Map<String, Value>, kind: AssetKind) -> Discovery {
    let mut discovery = Discovery::default();
    let mut stack: Vec<(Vec<Segment>, Option<&str>, &Value)> = fields
        .iter()
        .rev()
        .map(|(key, value)| (vec![Segment::Key(key.clone())], Some(key.as_str()), value))
        .collect();

    while let Some((path, key, value)) = stack.pop() {
        if path.len() > MAX_DEPTH {
            discovery.truncated = true;
            continue;
        }
        match Node::classify(key, value, kind) {
            Node::Asset(descriptor) => discovery.found.push(Found { path, descriptor }),
            Node::Nested => match value {
                Value::Object(object) => stack.extend(object.iter().rev().map(|(key, child)| {
                    (child_path(&path, Segment::Key(key.clone())), Some(key.as_str()), child)
                })),
                Value::Array(items) => stack.extend(
                    items.iter().enumerate().rev().map(|(index, child)| (child_path(&path, Segment::Index(index)), None, child)),
                ),
                _ => {},
            },
            Node::Leaf | Node::Skipped => {},
        }
    }
    discovery
}

fn child_path(parent: &[Segment], segment: Segment) -> Vec<Segment> {
    let mut path = Vec::with_capacity(parent.len() + 1);
    path.extend_from_slice(parent);
    path.push(segment);
    path
}

/// Follow `path` down to the object it points at.
fn locate_mut<'a>(fields: &'a mut Map<String, Value>, path: &[Segment]) -> Option<&'a mut Map<String, Value>> {
    let (Segment::Key(first), rest) = path.split_first()? else {
        return None;
    };
    let mut current = fields.get_mut(first)?;
    for segment in rest {
        current = match segment {
            Segment::Key(key) => current.as_object_mut()?.get_mut(key)?,
            Segment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }
    current.as_object_mut()
}

/// `null`, `false`, `0` and `""` count as absent file data.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Caches the assets of records fetched from `source`.
pub struct AssetResolver<'a> {
    source: &'a SourceHandle,
    cache: &'a AssetCache,
}
impl<'a> AssetResolver<'a> {
    pub fn new(source: &'a SourceHandle, cache: &'a AssetCache) -> Self {
        Self { source, cache }
    }

    /// Cache every descriptor of each of `kinds` in `record`, in that order,
    /// and return how many descriptors were handled.
    ///
    /// Kinds are searched one after another, so a descriptor that matches
    /// both kinds gets both attributes.
    pub async fn resolve(&self, collection: &str, record: &mut Record, kinds: &[AssetKind]) -> Result<u64> {
        let mut handled = 0;
        for &kind in kinds {
            let discovery = find_descriptors(record.fields(), kind);
            if discovery.truncated {
                tracing::warn!(
                    collection,
                    record = %record.id(),
                    max_depth = MAX_DEPTH,
                    "Record nests deeper than asset discovery searches"
                );
            }
            for Found { path, descriptor } in discovery.found {
                let url = self.source.asset_url(kind, &descriptor.id);
                let acquired = self
                    .cache
                    .acquire(&url, &descriptor.filename, kind, descriptor.fingerprint.as_deref())
                    .await
                    .or_raise(|| ErrorKind::Assets(collection.to_string()))?;
                tracing::debug!(
                    collection,
                    record = %record.id(),
                    asset = %descriptor.id,
                    path = %acquired.path,
                    "Asset cached"
                );
                if let Some(object) = locate_mut(record.fields_mut(), &path) {
                    object.insert(kind.attribute().to_string(), Value::String(acquired.path));
                }
                handled += 1;
            }
        }
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_assets::{CacheLayout, MockDownloader};
    use graft_source::MockSource;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(object) => object,
            _ => panic!("not an object"),
        }
    }

    fn image(id: u64, filename: &str) -> Value {
        json!({"id": id, "type": "image/png", "filename_disk": filename})
    }

    #[rstest]
    #[case::jpeg(json!({"id": "a", "type": "image/jpeg", "filename_disk": "a.jpg"}), true)]
    #[case::gif(json!({"id": 3, "type": "image/gif", "filename_disk": "c.gif"}), true)]
    #[case::svg(json!({"id": 4, "type": "image/svg+xml", "filename_disk": "d.svg"}), false)]
    #[case::no_filename(json!({"id": 5, "type": "image/png"}), false)]
    #[case::no_id(json!({"type": "image/png", "filename_disk": "e.png"}), false)]
    fn test_image_descriptors(#[case] value: Value, #[case] is_image: bool) {
        assert_eq!(Descriptor::decode(&object(value), AssetKind::Image).is_some(), is_image);
    }

    #[rstest]
    #[case::with_data(json!({"id": 1, "type": "application/pdf", "data": {"full_url": "/x"}, "filename_disk": "a.pdf"}), true)]
    #[case::empty_data(json!({"id": 1, "type": "application/pdf", "data": "", "filename_disk": "a.pdf"}), false)]
    #[case::no_type(json!({"id": 1, "type": "", "data": "x", "filename_disk": "a.pdf"}), false)]
    #[case::image_without_data(json!({"id": 1, "type": "image/png", "filename_disk": "a.png"}), false)]
    fn test_file_descriptors(#[case] value: Value, #[case] is_file: bool) {
        assert_eq!(Descriptor::decode(&object(value), AssetKind::File).is_some(), is_file);
    }

    #[test]
    fn test_fingerprint_prefers_modification_time() {
        let value = json!({"id": 1, "type": "image/png", "filename_disk": "a.png", "modified_on": "2024-03-01", "checksum": "abc"});
        let descriptor = Descriptor::decode(&object(value), AssetKind::Image).unwrap();
        assert_eq!(descriptor.fingerprint.as_deref(), Some("2024-03-01"));

        let value = json!({"id": 1, "type": "image/png", "filename_disk": "a.png", "checksum": "abc"});
        let descriptor = Descriptor::decode(&object(value), AssetKind::Image).unwrap();
        assert_eq!(descriptor.fingerprint.as_deref(), Some("abc"));
    }

    #[rstest]
    #[case(Some("cover"), json!({"id": 1}), Node::Nested)]
    #[case(Some("owner"), json!({"avatar": {"id": 1}}), Node::Skipped)]
    #[case(Some("owner"), json!([{"id": 1}]), Node::Skipped)]
    #[case(Some("tags"), json!([]), Node::Leaf)]
    #[case(Some("meta"), json!({}), Node::Leaf)]
    #[case(None, json!("text"), Node::Leaf)]
    fn test_classify(#[case] key: Option<&str>, #[case] value: Value, #[case] expected: Node) {
        assert_eq!(Node::classify(key, &value, AssetKind::Image), expected);
    }

    #[test]
    fn test_find_descriptors_in_document_order() {
        let fields = object(json!({
            "id": 1,
            "cover": image(10, "cover.png"),
            "owner": {"avatar": image(11, "avatar.png")},
            "gallery": [image(12, "one.png"), {"caption": "x", "image": image(13, "two.png")}],
            "body": "text",
        }));
        let discovery = find_descriptors(&fields, AssetKind::Image);
        assert!(!discovery.truncated);
        let ids: Vec<_> = discovery.found.iter().map(|f| f.descriptor.id.as_str()).collect();
        assert_eq!(ids, ["10", "12", "13"]);
        assert_eq!(
            discovery.found[2].path,
            [Segment::Key("gallery".to_string()), Segment::Index(1), Segment::Key("image".to_string())]
        );
    }

    #[test]
    fn test_owner_descriptor_is_still_an_asset() {
        let fields = object(json!({"owner": image(1, "owner.png")}));
        assert_eq!(find_descriptors(&fields, AssetKind::Image).found.len(), 1);
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut deep = image(1, "deep.png");
        for _ in 0..MAX_DEPTH {
            deep = json!({ "next": deep });
        }
        let fields = object(json!({ "root": deep }));
        let discovery = find_descriptors(&fields, AssetKind::Image);
        assert!(discovery.truncated);
        assert!(discovery.found.is_empty());

        let mut shallow = image(2, "shallow.png");
        for _ in 0..(MAX_DEPTH - 2) {
            shallow = json!({ "next": shallow });
        }
        let fields = object(json!({ "root": shallow }));
        let discovery = find_descriptors(&fields, AssetKind::Image);
        assert!(!discovery.truncated);
        assert_eq!(discovery.found.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_writes_public_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        let downloader = Arc::new(MockDownloader::with_files([
            ("https://cms.example/assets/10", b"png".to_vec()),
            ("https://cms.example/files/20", b"pdf".to_vec()),
        ]));
        let layout = CacheLayout::new(temp_dir.path(), "static/.cache-directus", "~/assets").unwrap();
        let cache = AssetCache::new(layout, downloader.clone());
        let source: SourceHandle = Arc::new(MockSource::default());

        let mut record = Record::from_value(json!({
            "id": 1,
            "cover": image(10, "cover.png"),
            "attachments": [{"id": 20, "type": "application/pdf", "data": "x", "filename_disk": "doc.pdf"}],
        }))
        .unwrap();
        let handled = AssetResolver::new(&source, &cache)
            .resolve("posts", &mut record, &[AssetKind::Image, AssetKind::File])
            .await
            .unwrap();

        assert_eq!(handled, 2);
        assert_eq!(
            record.get("cover").unwrap()["gridsome_image"],
            "~/assets/static/.cache-directus/img-cache/cover.png"
        );
        assert_eq!(record.get("cover").unwrap()["filename_disk"], "cover.png");
        assert_eq!(
            record.get("attachments").unwrap()[0]["gridsome_link"],
            "~/assets/static/.cache-directus/file-cache/doc.pdf"
        );
        assert_eq!(downloader.requests().await, ["https://cms.example/assets/10", "https://cms.example/files/20"]);
    }

    #[tokio::test]
    async fn test_failed_download_names_collection() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(temp_dir.path(), "cache", "~/assets").unwrap();
        let cache = AssetCache::new(layout, Arc::new(MockDownloader::default()));
        let source: SourceHandle = Arc::new(MockSource::default());
        let mut record = Record::from_value(json!({"id": 1, "cover": image(10, "cover.png")})).unwrap();
        let err = AssetResolver::new(&source, &cache).resolve("posts", &mut record, &[AssetKind::Image]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Assets(collection) if collection == "posts"));
    }
}
