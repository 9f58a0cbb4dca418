use graft_assets::{AssetCache, CacheLayout, MockDownloader};
use graft_config::CollectionSpec;
use graft_graph::{JsonDirStore, MemoryStore, RecordId, RefRule, ResolveStats, UnresolvedPolicy};
use graft_pipeline::{SyncRun, SyncSummary};
use graft_source::{MockSource, SourceHandle};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

fn source() -> Arc<MockSource> {
    Arc::new(
        MockSource::with_collections([
            (
                "blog_posts",
                json!([
                    {
                        "id": 1,
                        "title": "Hello",
                        "author_ref": {"id": 7, "name": "Ada"},
                        "tags": [{"items": {"tag_id": 3}}, {"items": {"tag_id": 4}}],
                        "hero": {"collection": "directus_files", "item": "42"},
                        "cover": {"id": "c0ffee", "type": "image/jpeg", "filename_disk": "cover.jpg", "modified_on": "2024-05-01"},
                        "owner": {"avatar": {"id": "a", "type": "image/png", "filename_disk": "avatar.png"}},
                    },
                    {"id": 2, "title": "Draft", "author_ref": null, "tags": [], "hero": null},
                ]),
            ),
            ("authors", json!([{"id": 7, "name": "Ada"}, {"id": 8, "name": "Grace"}])),
            ("tags", json!([{"id": 3, "label": "rust"}, {"id": 4, "label": "cms"}])),
            ("directus_files", json!([{"id": 42, "title": "Banner"}])),
            ("settings", json!({"site_name": "Example"})),
        ])
        .with_token("session-token"),
    )
}

fn collections() -> Vec<CollectionSpec> {
    vec![
        CollectionSpec {
            path: Some("blog_posts".to_string()),
            download_images: true,
            refs: vec![
                RefRule::new("author", "author_ref.id", "authors").unwrap().with_related_field("posts"),
                RefRule::new("tags", "tags.items.tag_id", "tags").unwrap(),
                RefRule::new("hero", "hero", ["media"]).unwrap(),
            ],
            ..CollectionSpec::new("posts")
        },
        CollectionSpec::new("authors"),
        CollectionSpec::new("tags"),
        CollectionSpec {
            path: Some("directus_files".to_string()),
            ..CollectionSpec::new("media")
        },
        CollectionSpec {
            singleton: true,
            ..CollectionSpec::new("settings")
        },
    ]
}

fn cache(root: &Path, downloader: &Arc<MockDownloader>, token: &str) -> AssetCache {
    let layout = CacheLayout::new(root, "static/.cache-directus", "~/assets").unwrap();
    AssetCache::new(layout, downloader.clone()).with_token(token)
}

fn node(store: &MemoryStore, collection: &str, id: i64) -> Value {
    let nodes = &store.collection(collection).unwrap().nodes;
    nodes.iter().find(|r| r.id() == &RecordId::from(id)).unwrap().clone().into_value()
}

#[tokio::test]
async fn test_full_sync_into_memory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let downloader = Arc::new(MockDownloader::with_files([("https://cms.example/assets/c0ffee", b"jpeg".to_vec())]));
    let mock = source();
    let handle: SourceHandle = mock.clone();
    let run = SyncRun::new(handle, collections())
        .with_assets(cache(temp_dir.path(), &downloader, "session-token"))
        .with_policy(UnresolvedPolicy::Warn);

    let mut store = MemoryStore::new();
    let summary = run.execute(&mut store).await.unwrap();
    assert_eq!(
        summary,
        SyncSummary {
            collections: 5,
            records: 8,
            assets: 1,
            references: ResolveStats {
                records: 2,
                edges: 4,
                inverse_edges: 1,
                dropped: 0,
            },
            nodes: 8,
        }
    );

    let post = node(&store, "posts", 1);
    assert_eq!(post["author"], json!([7]));
    assert_eq!(post["tags"], json!([3, 4]));
    assert_eq!(post["hero"], json!([42]));
    assert_eq!(post["hero__collection"], "media");
    assert!(post.get("author_ref").is_none());
    assert_eq!(post["cover"]["gridsome_image"], "~/assets/static/.cache-directus/img-cache/cover.jpg");
    assert!(post["owner"]["avatar"].get("gridsome_image").is_none());

    let draft = node(&store, "posts", 2);
    assert_eq!(draft["author"], json!([]));
    assert_eq!(draft["tags"], json!([]));
    assert_eq!(draft["hero"], json!([]));

    assert_eq!(node(&store, "authors", 7)["posts"], json!([1]));
    assert!(node(&store, "authors", 8).get("posts").is_none());
    assert_eq!(node(&store, "settings", 1)["site_name"], "Example");

    let posts = store.collection("posts").unwrap();
    assert_eq!(posts.references.get("author").map(String::as_str), Some("authors"));
    assert_eq!(posts.references.get("tags").map(String::as_str), Some("tags"));
    assert!(posts.references.get("hero").is_none());
    let authors = store.collection("authors").unwrap();
    assert_eq!(authors.references.get("posts").map(String::as_str), Some("posts"));

    assert_eq!(downloader.requests().await, ["https://cms.example/assets/c0ffee"]);
    assert_eq!(downloader.tokens().await, [Some("session-token".to_string())]);
    assert_eq!(mock.reads().await.len(), 5);

    assert!(!mock.is_logged_out().await);
    run.logout().await;
    assert!(mock.is_logged_out().await);
}

#[tokio::test]
async fn test_second_run_reuses_cached_assets_and_writes_json() {
    let assets_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let downloader = Arc::new(MockDownloader::with_files([("https://cms.example/assets/c0ffee", b"jpeg".to_vec())]));

    for _ in 0..2 {
        let handle: SourceHandle = source();
        let run = SyncRun::new(handle, collections()).with_assets(cache(assets_dir.path(), &downloader, "t"));
        let mut store = JsonDirStore::new(output_dir.path());
        run.execute(&mut store).await.unwrap();
    }
    assert_eq!(downloader.requests().await.len(), 1);

    let written: Value = serde_json::from_slice(&std::fs::read(output_dir.path().join("authors.json")).unwrap()).unwrap();
    assert_eq!(written["references"], json!({"posts": "posts"}));
    assert_eq!(written["nodes"][0]["posts"], json!([1]));
    assert!(output_dir.path().join("settings.json").exists());
}

#[tokio::test]
async fn test_failed_download_aborts_without_output() {
    let assets_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    let downloader = Arc::new(MockDownloader::default());
    let handle: SourceHandle = source();
    let run = SyncRun::new(handle, collections()).with_assets(cache(assets_dir.path(), &downloader, "t"));

    let mut store = JsonDirStore::new(output_dir.path().join("out"));
    assert!(run.execute(&mut store).await.is_err());
    assert!(!output_dir.path().join("out").exists());
}
