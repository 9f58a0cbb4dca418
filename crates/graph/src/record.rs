//! Records and record identifiers.
//!
//! A [`Record`] is one item fetched from a remote collection: an arbitrary
//! JSON object that always carries an `id`. Its shape changes as it moves
//! through the pipeline (asset descriptors gain local paths, raw reference
//! sub-objects are replaced by edge lists) but its identity does not.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the attribute every record is keyed by.
pub const ID_FIELD: &str = "id";

/// Identifier of a record within its collection.
///
/// Remote collections use either integer or string primary keys. Strings
/// holding a plain integer are normalized to [`RecordId::Int`] so that a raw
/// reference `"7"` and a record whose id is `7` meet in the same map slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordId {
    Int(i64),
    Str(String),
}
impl RecordId {
    /// Decode an id from a JSON value. Returns `None` for anything that can't
    /// identify a record (null, booleans, floats, objects, empty strings).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }

    /// Parse an id from its textual form.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match trimmed.parse::<i64>() {
            Ok(n) => Self::Int(n),
            Err(_) => Self::Str(s.to_string()),
        })
    }

    /// Zero and negative integers never identify a remote record.
    pub fn is_positive(&self) -> bool {
        match self {
            Self::Int(n) => *n > 0,
            Self::Str(s) => !s.is_empty(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }
}
impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}
impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}
impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| Self::Str(s.to_string()))
    }
}
impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// A single fetched item, keyed by arbitrary field names.
///
/// The id is captured when the record is constructed; rewriting the `id`
/// field afterwards does not move the record within a
/// [`CollectionRecordSet`](crate::CollectionRecordSet).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    fields: Map<String, Value>,
}
impl Record {
    /// Build a record from a JSON object, which must carry a usable `id`.
    pub fn new(fields: Map<String, Value>) -> Result<Self> {
        let Some(raw) = fields.get(ID_FIELD) else {
            exn::bail!(ErrorKind::InvalidRecord("missing `id` field".to_string()));
        };
        let Some(id) = RecordId::from_value(raw) else {
            exn::bail!(ErrorKind::InvalidRecord(format!("unusable `id` value: {raw}")));
        };
        Ok(Self { id, fields })
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Self::new(fields),
            other => exn::bail!(ErrorKind::InvalidRecord(format!("expected an object, found: {other}"))),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Remove a field, keeping the order of the remaining fields.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}
impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let fields = Map::deserialize(deserializer)?;
        Self::new(fields).map_err(|e| serde::de::Error::custom(&*e))
    }
}
