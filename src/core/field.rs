//! Field kinds, typed field paths and scalar field values

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// Semantic type of a collection field, without its payload
///
/// The operator registry decides operator validity on this kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Enum,
    Tags,
    #[serde(rename = "datetime")]
    DateTime,
    Uuid,
    Integer,
    Float,
    Boolean,
    Object,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Enum => "enum",
            FieldKind::Tags => "tags",
            FieldKind::DateTime => "datetime",
            FieldKind::Uuid => "uuid",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
        }
    }

    /// Whether records can be ordered by a field of this kind
    pub fn is_sortable(&self) -> bool {
        !matches!(self, FieldKind::Tags | FieldKind::Object)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised when a dotted path cannot be turned into segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPathError {
    pub raw: String,
    pub segment: String,
}

impl fmt::Display for FieldPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segment.is_empty() {
            write!(f, "field path '{}' contains an empty segment", self.raw)
        } else {
            write!(
                f,
                "field path '{}' contains an invalid segment '{}'",
                self.raw, self.segment
            )
        }
    }
}

impl std::error::Error for FieldPathError {}

/// An ordered sequence of field-name segments
///
/// Paths are resolved against a recursive collection schema; callers never
/// split strings at use sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parse a dotted path such as `state.type`
    pub fn parse(raw: &str) -> Result<Self, FieldPathError> {
        let mut segments = Vec::new();
        for segment in raw.split('.') {
            if !Self::is_valid_segment(segment) {
                return Err(FieldPathError {
                    raw: raw.to_string(),
                    segment: segment.to_string(),
                });
            }
            segments.push(segment.to_string());
        }
        Ok(Self(segments))
    }

    /// Build a single-segment path
    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append another path to this one
    pub fn join(&self, other: &FieldPath) -> FieldPath {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        FieldPath(segments)
    }

    fn is_valid_segment(segment: &str) -> bool {
        static SEGMENT_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = SEGMENT_REGEX
            .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));
        regex.is_match(segment)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A typed scalar value taken from a criteria operand or a stored record
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    /// Interpret a JSON value as a scalar of the given field kind
    ///
    /// Returns `None` when the JSON shape does not fit the kind. `tags` and
    /// `object` fields have no scalar form; a tag element is read as a string.
    pub fn from_json(kind: FieldKind, value: &Value) -> Option<Self> {
        match kind {
            FieldKind::String | FieldKind::Enum | FieldKind::Tags => {
                value.as_str().map(|s| FieldValue::String(s.to_string()))
            }
            FieldKind::Uuid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(FieldValue::Uuid),
            FieldKind::DateTime => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| FieldValue::DateTime(dt.with_timezone(&Utc))),
            FieldKind::Integer => value.as_i64().map(FieldValue::Integer),
            FieldKind::Float => value.as_f64().map(FieldValue::Float),
            FieldKind::Boolean => value.as_bool().map(FieldValue::Boolean),
            FieldKind::Object => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Order two values of the same variant; mixed variants are unordered
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => Some(a.cmp(b)),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{s:?}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::Uuid(u) => write!(f, "{u}"),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}
