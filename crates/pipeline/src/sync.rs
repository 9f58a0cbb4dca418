//! One synchronization run, from remote collections to output nodes.

use crate::assets::AssetResolver;
use crate::error::{ErrorKind, Result};
use crate::fetch::fetch_collection;
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use graft_assets::{AssetCache, AssetKind};
use graft_config::{CollectionSpec, Settings};
use graft_graph::{
    CollectionRecordSet, OutputStore, ResolveStats, Resolver, Schema, UnresolvedPolicy, assemble, declare_schema,
};
use graft_source::SourceHandle;
use std::pin::pin;

/// Progress events emitted by [`SyncRun::run`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) once.
/// 2. [`SchemaDeclared`](Self::SchemaDeclared) once, before any data reaches
///    the store.
/// 3. [`CollectionLoaded`](Self::CollectionLoaded) once per collection, in
///    configuration order.
/// 4. [`Resolved`](Self::Resolved) once, after every collection is loaded.
/// 5. [`Assembled`](Self::Assembled) once.
/// 6. [`Complete`](Self::Complete) once, after the store has persisted.
///
/// The first error ends the stream; [`Complete`](Self::Complete) is then
/// never emitted and the store is never asked to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started,
    SchemaDeclared { collections: usize },
    CollectionLoaded { collection: String, records: usize, assets: u64 },
    Resolved(ResolveStats),
    /// Nodes handed to the store.
    Assembled(u64),
    Complete,
}

/// Totals of a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub collections: usize,
    pub records: usize,
    pub assets: u64,
    pub references: ResolveStats,
    pub nodes: u64,
}

/// Everything one run needs: where records come from, where assets go, and
/// how collections relate to each other.
///
/// The record set itself only exists for the duration of [`run`](Self::run);
/// nothing is kept between runs.
pub struct SyncRun {
    source: SourceHandle,
    cache: Option<AssetCache>,
    collections: Vec<CollectionSpec>,
    schema: Schema,
    policy: UnresolvedPolicy,
}
impl SyncRun {
    pub fn new(source: SourceHandle, collections: Vec<CollectionSpec>) -> Self {
        let schema = graft_config::schema(&collections);
        Self {
            source,
            cache: None,
            collections,
            schema,
            policy: UnresolvedPolicy::default(),
        }
    }

    pub fn from_settings(source: SourceHandle, settings: &Settings) -> Self {
        Self::new(source, settings.collections.clone()).with_policy(settings.unresolved)
    }

    /// Cache used for collections that download images or files. Without
    /// one, downloads are skipped.
    pub fn with_assets(mut self, cache: AssetCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Streams [`SyncEvent`]s while synchronizing every configured collection
    /// into `store`.
    ///
    /// Collections are fetched one after another, each record's assets
    /// cached before the next record is looked at. References are resolved
    /// once the whole record set is loaded, since a record may point at any
    /// collection.
    pub fn run<'a, S: OutputStore + ?Sized>(&'a self, store: &'a mut S) -> impl Stream<Item = Result<SyncEvent>> + 'a {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            yield Ok(SyncEvent::Started);
            tracing::info!(source = self.source.name(), collections = self.collections.len(), "Synchronizing");

            if let Err(e) = declare_schema(&self.schema, store).await.or_raise(|| ErrorKind::Schema) {
                yield Err(e);
                return;
            }
            yield Ok(SyncEvent::SchemaDeclared { collections: self.collections.len() });

            let mut set = CollectionRecordSet::new();
            for spec in &self.collections {
                match self.load(spec, &mut set).await {
                    Ok(event) => yield Ok(event),
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                }
            }

            let index = self.schema.index();
            let resolver = Resolver::new(&index, self.policy);
            match resolver.resolve_all(&self.schema, &mut set).or_raise(|| ErrorKind::Resolve) {
                Ok(stats) => {
                    tracing::info!(
                        edges = stats.edges,
                        inverse_edges = stats.inverse_edges,
                        dropped = stats.dropped,
                        "References resolved"
                    );
                    yield Ok(SyncEvent::Resolved(stats));
                },
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }

            match assemble(set, store).await.or_raise(|| ErrorKind::Store) {
                Ok(nodes) => yield Ok(SyncEvent::Assembled(nodes)),
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }
            if let Err(e) = store.finish().await.or_raise(|| ErrorKind::Store) {
                yield Err(e);
                return;
            }

            tracing::info!("Synchronization complete");
            yield Ok(SyncEvent::Complete);
        })
    }

    /// Drive [`run`](Self::run) to the end and total up its events.
    pub async fn execute<S: OutputStore + ?Sized>(&self, store: &mut S) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        let mut events = pin!(self.run(store));
        while let Some(event) = events.next().await {
            match event? {
                SyncEvent::CollectionLoaded { records, assets, .. } => {
                    summary.collections += 1;
                    summary.records += records;
                    summary.assets += assets;
                },
                SyncEvent::Resolved(stats) => summary.references = stats,
                SyncEvent::Assembled(nodes) => summary.nodes = nodes,
                SyncEvent::Started | SyncEvent::SchemaDeclared { .. } | SyncEvent::Complete => {},
            }
        }
        Ok(summary)
    }

    /// End the remote session. Called once the run is over, whether or not
    /// it succeeded; a failure here is only logged.
    pub async fn logout(&self) {
        if let Err(err) = self.source.logout().await {
            tracing::warn!(source = self.source.name(), error = ?err, "Logout failed");
        }
    }

    /// Fetch one collection into `set`, caching assets record by record.
    async fn load(&self, spec: &CollectionSpec, set: &mut CollectionRecordSet) -> Result<SyncEvent> {
        let records = fetch_collection(&self.source, spec).await?;
        let kinds = asset_kinds(spec);
        let resolver = match (&self.cache, kinds.is_empty()) {
            (Some(cache), false) => Some(AssetResolver::new(&self.source, cache)),
            (None, false) => {
                tracing::warn!(collection = %spec.name, "No asset cache configured; skipping downloads");
                None
            },
            (_, true) => None,
        };

        set.declare(spec.name.as_str());
        let count = records.len();
        let mut assets = 0;
        for mut record in records {
            if let Some(resolver) = &resolver {
                assets += resolver.resolve(&spec.name, &mut record, &kinds).await?;
            }
            if set.insert(&spec.name, record).is_some() {
                tracing::warn!(collection = %spec.name, "Duplicate record id; keeping the later record");
            }
        }
        tracing::info!(collection = %spec.name, records = count, assets, "Collection loaded");
        Ok(SyncEvent::CollectionLoaded {
            collection: spec.name.clone(),
            records: count,
            assets,
        })
    }
}

/// Images are searched before files, matching the order attributes are
/// written in.
fn asset_kinds(spec: &CollectionSpec) -> Vec<AssetKind> {
    let mut kinds = Vec::with_capacity(2);
    if spec.download_images {
        kinds.push(AssetKind::Image);
    }
    if spec.download_files {
        kinds.push(AssetKind::File);
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use graft_graph::{MemoryStore, RefRule};
    use graft_source::MockSource;
    use serde_json::json;
    use std::sync::Arc;

    fn posts_and_authors() -> Vec<CollectionSpec> {
        let rule = RefRule::new("author", "author_ref.id", "authors").unwrap().with_related_field("posts");
        vec![
            CollectionSpec {
                refs: vec![rule],
                ..CollectionSpec::new("posts")
            },
            CollectionSpec::new("authors"),
        ]
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let source: SourceHandle = Arc::new(MockSource::with_collections([
            ("posts", json!([{"id": 1, "author_ref": {"id": 7}}])),
            ("authors", json!([{"id": 7}])),
        ]));
        let run = SyncRun::new(source, posts_and_authors());
        let mut store = MemoryStore::new();
        let events: Vec<_> = run.run(&mut store).try_collect().await.unwrap();
        assert_eq!(
            events,
            [
                SyncEvent::Started,
                SyncEvent::SchemaDeclared { collections: 2 },
                SyncEvent::CollectionLoaded {
                    collection: "posts".to_string(),
                    records: 1,
                    assets: 0
                },
                SyncEvent::CollectionLoaded {
                    collection: "authors".to_string(),
                    records: 1,
                    assets: 0
                },
                SyncEvent::Resolved(ResolveStats {
                    records: 1,
                    edges: 1,
                    inverse_edges: 1,
                    dropped: 0
                }),
                SyncEvent::Assembled(2),
                SyncEvent::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_ends_stream_before_output() {
        let mock = Arc::new(MockSource::with_collections([("posts", json!([{"id": 1}]))]));
        let source: SourceHandle = mock.clone();
        let run = SyncRun::new(source, posts_and_authors());
        let mut store = MemoryStore::new();
        let err = run.execute(&mut store).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Fetch(collection) if collection == "authors"));
        assert!(store.collection("posts").unwrap().nodes.is_empty());

        run.logout().await;
        assert!(mock.is_logged_out().await);
    }

    #[tokio::test]
    async fn test_error_policy_fails_run() {
        let source: SourceHandle = Arc::new(MockSource::with_collections([
            ("posts", json!([{"id": 1, "author_ref": {"id": 99}}])),
            ("authors", json!([])),
        ]));
        let run = SyncRun::new(source, posts_and_authors()).with_policy(UnresolvedPolicy::Error);
        let err = run.execute(&mut MemoryStore::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Resolve));
    }

    #[test]
    fn test_asset_kinds() {
        let spec = CollectionSpec {
            download_images: true,
            download_files: true,
            ..CollectionSpec::new("posts")
        };
        assert_eq!(asset_kinds(&spec), [AssetKind::Image, AssetKind::File]);
        assert!(asset_kinds(&CollectionSpec::new("posts")).is_empty());
    }
}
