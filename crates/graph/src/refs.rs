//! Reference resolution.
//!
//! Turns the raw relation values embedded in fetched records into flat edge
//! lists of target ids, and optionally writes inverse edges back onto the
//! target records. Resolution reads (and, for inverse edges, writes) sibling
//! collections, so it must only start once every collection of the run is
//! fully loaded into the [`CollectionRecordSet`].
//!
//! Resolution happens in three steps per [`RefRule`]:
//!
//! 1. [`extract_raw_refs`] follows the rule's dot-path, fanning out over
//!    arrays, and collects every raw value at the end of the path.
//! 2. [`RawRef::decode`] classifies each raw value as empty, a static id, or
//!    a polymorphic `{collection, item}` pair.
//! 3. [`Resolver`] places each decoded reference in an output collection,
//!    rewrites the record and records inverse edges.

use crate::error::{ErrorKind, Result};
use crate::record::{ID_FIELD, Record, RecordId};
use crate::schema::{CollectionIndex, RefRule, Schema, SourcePath, Target};
use crate::set::CollectionRecordSet;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Suffix of the attribute recording which collection a polymorphic edge
/// list points into.
pub const COLLECTION_SUFFIX: &str = "__collection";

/// What to do with a reference that can't be resolved.
///
/// Empty relations (`null`, `0`, a missing path) are never reported; this
/// only concerns values that look like references but lead nowhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Drop the reference silently.
    Ignore,
    /// Drop the reference and log a warning.
    #[default]
    Warn,
    /// Fail the run.
    Error,
}

/// A raw reference value, decoded once right after extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRef {
    /// `null`, `false`, `0`, `"0"` or `""`: no relation.
    Empty,
    /// Bare id into the rule's static target collection. `raw` is the value
    /// as sent, which is what ends up in the edge list.
    Static { id: RecordId, raw: Value },
    /// Self-describing reference into a remote collection.
    Polymorphic { collection: String, item: Value },
    /// Anything else (nested arrays, objects without `collection`/`item`).
    Malformed(Value),
}
impl RawRef {
    pub fn decode(value: &Value) -> Self {
        match value {
            Value::Null | Value::Bool(false) => Self::Empty,
            Value::Number(n) if n.as_i64() == Some(0) => Self::Empty,
            Value::String(s) if s.is_empty() => Self::Empty,
            Value::Number(_) | Value::String(_) => match RecordId::from_value(value) {
                Some(RecordId::Int(0)) => Self::Empty,
                Some(id) => Self::Static { id, raw: value.clone() },
                None => Self::Malformed(value.clone()),
            },
            Value::Object(map) => match (map.get("collection"), map.get("item")) {
                (Some(Value::String(collection)), Some(item)) => Self::Polymorphic {
                    collection: collection.clone(),
                    item: item.clone(),
                },
                _ => Self::Malformed(value.clone()),
            },
            _ => Self::Malformed(value.clone()),
        }
    }
}

/// Why a reference was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Unresolved {
    #[display("value {_0} is not a reference")]
    Malformed(Value),
    #[display("id {_0} is not positive")]
    NonPositive(RecordId),
    #[display("remote collection `{_0}` is not synchronized")]
    UnknownCollection(String),
    #[display("item {_0} is not an integer id")]
    InvalidItem(Value),
    #[display("collection `{_0}` is not one of the rule's targets")]
    NotCandidate(String),
    #[display("bare id {_0} can't be placed without a single target collection")]
    Ambiguous(RecordId),
    #[display("target {_0}[{_1}] does not exist")]
    MissingTarget(String, RecordId),
}

/// A back-reference to append onto a target record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InverseEdge {
    /// Collection of the target record.
    pub collection: String,
    pub target: RecordId,
    /// Field on the target holding the edge list.
    pub field: String,
    /// Id of the record holding the reference.
    pub source: RecordId,
    /// The source record's `id` as sent, appended to the target's edge list.
    pub value: Value,
}

/// Outcome of resolving one record.
#[derive(Debug, Default)]
pub struct RecordResolution {
    /// Inverse edges waiting to be applied to the record set.
    pub inverse: Vec<InverseEdge>,
    /// Number of edges written onto the record.
    pub edges: usize,
    /// Number of references dropped as unresolvable.
    pub dropped: usize,
}

/// Totals of a [`Resolver::resolve_all`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    pub records: usize,
    pub edges: usize,
    pub inverse_edges: usize,
    pub dropped: usize,
}

/// A reference placed in its output collection.
struct Placed {
    collection: String,
    id: RecordId,
    /// Value written into the edge list.
    value: Value,
    polymorphic: bool,
}

/// Follow a dot-path through a record and collect every raw value at its
/// end.
///
/// An array met before the final segment fans out: the rest of the path is
/// followed into each of its elements and the results are concatenated. An
/// array at the final segment contributes its elements. A path that runs
/// into a missing field or a scalar contributes nothing.
pub fn extract_raw_refs<'a>(fields: &'a Map<String, Value>, path: &SourcePath) -> Vec<&'a Value> {
    let mut found = Vec::new();
    collect(fields, path.segments(), &mut found);
    found
}

fn collect<'a>(fields: &'a Map<String, Value>, segments: &[String], found: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Some(value) = fields.get(head) else {
        return;
    };
    match (value, rest.is_empty()) {
        (Value::Array(items), true) => found.extend(items),
        (_, true) => found.push(value),
        (Value::Array(items), false) => {
            for item in items {
                if let Value::Object(map) = item {
                    collect(map, rest, found);
                }
            }
        },
        (Value::Object(map), false) => collect(map, rest, found),
        (_, false) => {},
    }
}

/// Resolves reference rules against a fully loaded record set.
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    index: &'a CollectionIndex,
    policy: UnresolvedPolicy,
}
impl<'a> Resolver<'a> {
    pub fn new(index: &'a CollectionIndex, policy: UnresolvedPolicy) -> Self {
        Self { index, policy }
    }

    /// Resolve every rule of every collection in `schema`, applying inverse
    /// edges as soon as each record has been rewritten.
    pub fn resolve_all(&self, schema: &Schema, set: &mut CollectionRecordSet) -> Result<ResolveStats> {
        let mut stats = ResolveStats::default();
        for (collection, collection_schema) in schema.collections() {
            let rules = collection_schema.rules();
            if rules.is_empty() {
                continue;
            }
            for id in set.ids(collection) {
                let Some(record) = set.get_mut(collection, &id) else {
                    continue;
                };
                let resolution = self.resolve_record(collection, record, rules)?;
                stats.records += 1;
                stats.edges += resolution.edges;
                stats.dropped += resolution.dropped;
                for edge in &resolution.inverse {
                    match self.link(set, collection, edge)? {
                        true => stats.inverse_edges += 1,
                        false => stats.dropped += 1,
                    }
                }
            }
            tracing::debug!(collection, "References resolved");
        }
        Ok(stats)
    }

    /// Rewrite every reference field of a single record.
    ///
    /// For each rule the top-level field the source path starts from is
    /// removed, and the rule's field is set to the list of resolved target
    /// ids (always a list, even for single-valued relations). When any
    /// polymorphic reference resolved, `<field>__collection` holds the last
    /// resolved collection name.
    pub fn resolve_record(
        &self,
        collection: &str,
        record: &mut Record,
        rules: &[RefRule],
    ) -> Result<RecordResolution> {
        let source_id = record.id().clone();
        let source_value = record.get(ID_FIELD).cloned().unwrap_or_else(|| source_id.to_value());
        let mut resolution = RecordResolution::default();
        for rule in rules {
            let raw: Vec<RawRef> = extract_raw_refs(record.fields(), &rule.source).into_iter().map(RawRef::decode).collect();
            record.remove(rule.source.head());

            let mut ids = Vec::with_capacity(raw.len());
            let mut polymorphic_collection = None;
            for raw_ref in raw {
                let placed = match self.place(rule, raw_ref) {
                    Ok(Some(placed)) => placed,
                    Ok(None) => continue,
                    Err(reason) => {
                        self.report(collection, &source_id, &rule.field, reason)?;
                        resolution.dropped += 1;
                        continue;
                    },
                };
                if let Some(related_field) = &rule.related_field {
                    resolution.inverse.push(InverseEdge {
                        collection: placed.collection.clone(),
                        target: placed.id.clone(),
                        field: related_field.clone(),
                        source: source_id.clone(),
                        value: source_value.clone(),
                    });
                }
                if placed.polymorphic {
                    polymorphic_collection = Some(placed.collection);
                }
                ids.push(placed.value);
            }

            resolution.edges += ids.len();
            record.insert(rule.field.clone(), Value::Array(ids));
            if let Some(target) = polymorphic_collection {
                record.insert(format!("{}{COLLECTION_SUFFIX}", rule.field), Value::String(target));
            }
        }
        Ok(resolution)
    }

    /// Append an inverse edge onto its target. Returns `false` when the
    /// target record isn't part of the run.
    ///
    /// The source id is only appended once per target list; an existing
    /// non-list value is kept as the first element of a new list.
    pub fn link(&self, set: &mut CollectionRecordSet, source_collection: &str, edge: &InverseEdge) -> Result<bool> {
        let Some(target) = set.get_mut(&edge.collection, &edge.target) else {
            let reason = Unresolved::MissingTarget(edge.collection.clone(), edge.target.clone());
            self.report(source_collection, &edge.source, &edge.field, reason)?;
            return Ok(false);
        };
        let source = edge.value.clone();
        match target.get_mut(&edge.field) {
            Some(Value::Array(list)) => {
                if !list.contains(&source) {
                    list.push(source);
                }
            },
            Some(Value::Null) | None => {
                target.insert(edge.field.clone(), Value::Array(vec![source]));
            },
            Some(existing) => {
                let mut list = vec![existing.take()];
                if !list.contains(&source) {
                    list.push(source);
                }
                *existing = Value::Array(list);
            },
        }
        Ok(true)
    }

    /// Work out which output collection and id a raw reference points at.
    /// `Ok(None)` is an empty relation, `Err` a reference that leads nowhere.
    fn place(&self, rule: &RefRule, raw_ref: RawRef) -> std::result::Result<Option<Placed>, Unresolved> {
        let (collection, id, value, polymorphic) = match raw_ref {
            RawRef::Empty => return Ok(None),
            RawRef::Malformed(value) => return Err(Unresolved::Malformed(value)),
            RawRef::Static { id, raw } => match &rule.collection {
                Target::One(collection) => (collection.clone(), id, raw, false),
                Target::Any(_) => return Err(Unresolved::Ambiguous(id)),
            },
            RawRef::Polymorphic { collection, item } => {
                if parse_item(&item) == Some(RecordId::Int(0)) {
                    return Ok(None);
                }
                let output = self.index.output_name(&collection).ok_or(Unresolved::UnknownCollection(collection))?;
                if let Target::Any(candidates) = &rule.collection
                    && !candidates.iter().any(|c| c == output)
                {
                    return Err(Unresolved::NotCandidate(output.to_string()));
                }
                let id = parse_item(&item).ok_or(Unresolved::InvalidItem(item))?;
                let value = id.to_value();
                (output.to_string(), id, value, true)
            },
        };
        if !id.is_positive() {
            return Err(Unresolved::NonPositive(id));
        }
        Ok(Some(Placed {
            collection,
            id,
            value,
            polymorphic,
        }))
    }

    fn report(&self, collection: &str, record: &RecordId, field: &str, reason: Unresolved) -> Result<()> {
        match self.policy {
            UnresolvedPolicy::Ignore => Ok(()),
            UnresolvedPolicy::Warn => {
                tracing::warn!(collection, record = %record, field, %reason, "Dropping unresolved reference");
                Ok(())
            },
            UnresolvedPolicy::Error => exn::bail!(ErrorKind::Unresolved {
                collection: collection.to_string(),
                record: record.to_string(),
                field: field.to_string(),
                reason: reason.to_string(),
            }),
        }
    }
}

/// Polymorphic items are integer ids, sent either as numbers or as strings.
fn parse_item(item: &Value) -> Option<RecordId> {
    match item {
        Value::Number(n) => n.as_i64().map(RecordId::Int),
        Value::String(s) => s.trim().parse::<i64>().ok().map(RecordId::Int),
        _ => None,
    }
}
