//! Reference schema: which fields of which collections point where.
//!
//! The schema is static configuration. It is built once before any data is
//! fetched, declared onto the output store, and then consulted by the
//! [`Resolver`](crate::Resolver) for every record.

use crate::error::{Error, ErrorKind, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Target collection(s) of a reference rule.
///
/// A single name means every raw reference is a bare id into that collection.
/// A list of names means the raw references are polymorphic: each one names
/// its own remote collection, and the list holds the acceptable candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    One(String),
    Any(Vec<String>),
}
impl Target {
    pub fn names(&self) -> &[String] {
        match self {
            Self::One(name) => std::slice::from_ref(name),
            Self::Any(names) => names,
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self, Self::Any(_))
    }
}
impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::One(name.to_string())
    }
}
impl From<Vec<String>> for Target {
    fn from(names: Vec<String>) -> Self {
        Self::Any(names)
    }
}
impl<const N: usize> From<[&str; N]> for Target {
    fn from(names: [&str; N]) -> Self {
        Self::Any(names.iter().map(|n| n.to_string()).collect())
    }
}

/// Dot-separated path into a raw record, e.g. `tags.items.tag_id`.
///
/// Arrays met along the way fan out: the rest of the path is followed into
/// every element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourcePath {
    segments: Vec<String>,
}
impl SourcePath {
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The top-level field the path starts from. This is the field removed
    /// from the record once the reference has been rewritten.
    pub fn head(&self) -> &str {
        // Parsing guarantees at least one segment.
        &self.segments[0]
    }
}
impl FromStr for SourcePath {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::try_from(s.to_string())?)
    }
}
impl TryFrom<String> for SourcePath {
    type Error = ErrorKind;
    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let segments: Vec<String> = value.split('.').map(str::to_string).collect();
        match segments.iter().any(String::is_empty) {
            true => Err(ErrorKind::InvalidSourcePath(value)),
            false => Ok(Self { segments }),
        }
    }
}
impl From<SourcePath> for String {
    fn from(path: SourcePath) -> Self {
        path.to_string()
    }
}
impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// One reference field of a collection.
///
/// Field names follow snake_case, but the camelCase spelling used by older
/// configuration files (`collectionName`, `relatedField`) is accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefRule {
    /// Output field the resolved edge list is written to.
    pub field: String,
    /// Where the raw reference id(s) live inside the fetched record.
    pub source: SourcePath,
    #[serde(alias = "collectionName")]
    pub collection: Target,
    /// Inverse edge written onto every resolved target record.
    #[serde(default, alias = "relatedField", skip_serializing_if = "Option::is_none")]
    pub related_field: Option<String>,
}
impl RefRule {
    pub fn new(field: impl Into<String>, source: &str, collection: impl Into<Target>) -> Result<Self> {
        Ok(Self {
            field: field.into(),
            source: source.parse()?,
            collection: collection.into(),
            related_field: None,
        })
    }

    pub fn with_related_field(mut self, related_field: impl Into<String>) -> Self {
        self.related_field = Some(related_field.into());
        self
    }
}

/// Reference rules of a single output collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    remote: String,
    rules: Vec<RefRule>,
}
impl CollectionSchema {
    /// Name of the collection on the remote API.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn rules(&self) -> &[RefRule] {
        &self.rules
    }
}

/// Every output collection in configuration order, with its reference rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    collections: IndexMap<String, CollectionSchema>,
}
impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output collection backed by the `remote` collection.
    pub fn add_collection(&mut self, name: impl Into<String>, remote: impl Into<String>, rules: Vec<RefRule>) {
        let schema = CollectionSchema {
            remote: remote.into(),
            rules,
        };
        self.collections.insert(name.into(), schema);
    }

    pub fn with_collection(mut self, name: impl Into<String>, remote: impl Into<String>, rules: Vec<RefRule>) -> Self {
        self.add_collection(name, remote, rules);
        self
    }

    pub fn collections(&self) -> impl Iterator<Item = (&str, &CollectionSchema)> {
        self.collections.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    pub fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Reverse index from remote collection name to output collection name.
    pub fn index(&self) -> CollectionIndex {
        self.collections.iter().map(|(name, schema)| (schema.remote.clone(), name.clone())).collect()
    }
}

/// Maps remote collection names onto output collection names, used to place
/// polymorphic references that name their own (remote) collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionIndex {
    by_remote: HashMap<String, String>,
}
impl CollectionIndex {
    pub fn insert(&mut self, remote: impl Into<String>, output: impl Into<String>) {
        self.by_remote.insert(remote.into(), output.into());
    }

    pub fn output_name(&self, remote: &str) -> Option<&str> {
        self.by_remote.get(remote).map(String::as_str)
    }
}
impl FromIterator<(String, String)> for CollectionIndex {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            by_remote: iter.into_iter().collect(),
        }
    }
}
