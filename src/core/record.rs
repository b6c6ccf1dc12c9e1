//! Stored records
//!
//! A [`Record`] is a JSON object kept by a [`RecordStore`](crate::core::store::RecordStore).
//! Values are read through typed [`FieldPath`]s, never by splitting strings.

use crate::core::field::{FieldKind, FieldPath, FieldValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A JSON object stored in a collection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value; only objects are records
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Raw value at a path; `None` when any segment is missing
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = self.0.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Whether the path holds a non-null value
    pub fn is_present(&self, path: &FieldPath) -> bool {
        self.get(path).is_some_and(|v| !v.is_null())
    }

    /// Typed scalar at a path; `None` when absent, null or of the wrong shape
    pub fn field_value(&self, path: &FieldPath, kind: FieldKind) -> Option<FieldValue> {
        self.get(path)
            .and_then(|value| FieldValue::from_json(kind, value))
    }

    /// Tag strings at a path; non-string elements are ignored
    pub fn tags(&self, path: &FieldPath) -> Option<Vec<&str>> {
        self.get(path)?
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).collect())
    }

    /// Canonical join key of the value at a path
    pub fn join_key(&self, path: &FieldPath) -> Option<String> {
        self.get(path).and_then(join_key)
    }

    /// Order two records on one field; absent values sort first
    pub fn compare_on(&self, other: &Record, path: &FieldPath, kind: FieldKind) -> Ordering {
        let left = self.field_value(path, kind);
        let right = other.field_value(path, kind);
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.compare(&b).unwrap_or(Ordering::Equal),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Canonical string form used to match join columns
///
/// UUIDs may be stored in either case, so strings are lowercased.
pub fn join_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
