//! Request body splitting
//!
//! A filter request body mixes criteria (keyed by collection name) with a few
//! reserved keys controlling sort, paging and history bucketing:
//!
//! ```json
//! {
//!   "flows": { "tags": { "all_": ["prod"] } },
//!   "sort": "expected_start_time:desc",
//!   "limit": 50,
//!   "offset": 100
//! }
//! ```

use crate::core::error::{IssueKind, ValidationError, ValidationIssue};
use serde_json::{Map, Value};

/// Body keys that are never collection names
pub const RESERVED_KEYS: [&str; 8] = [
    "sort",
    "limit",
    "offset",
    "history_start",
    "history_end",
    "history_interval_seconds",
    "history_field",
    "history_group_by",
];

/// Raw history parameters, checked by [`HistorySpec::resolve`](crate::query::history::HistorySpec::resolve)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryParams {
    pub start: Option<Value>,
    pub end: Option<Value>,
    pub interval_seconds: Option<Value>,
    pub field: Option<Value>,
    pub group_by: Option<Value>,
}

impl HistoryParams {
    /// Whether any history key was supplied
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.interval_seconds.is_none()
            && self.field.is_none()
            && self.group_by.is_none()
    }
}

/// A request body split into criteria and reserved parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRequest {
    pub criteria: Map<String, Value>,
    pub sort: Option<Value>,
    pub limit: Option<Value>,
    pub offset: Option<Value>,
    pub history: HistoryParams,
}

impl FilterRequest {
    /// Split a JSON body; `null` is treated as an empty body
    pub fn from_body(body: &Value) -> Result<Self, ValidationError> {
        let object = match body {
            Value::Null => return Ok(Self::default()),
            Value::Object(object) => object,
            other => {
                return Err(ValidationError::single(ValidationIssue::new(
                    IssueKind::MalformedCriteria,
                    "body",
                    format!("request body must be a JSON object, got {}", other),
                )));
            }
        };

        let mut request = Self::default();
        for (key, value) in object {
            let value = Some(value.clone());
            match key.as_str() {
                "sort" => request.sort = value,
                "limit" => request.limit = value,
                "offset" => request.offset = value,
                "history_start" => request.history.start = value,
                "history_end" => request.history.end = value,
                "history_interval_seconds" => request.history.interval_seconds = value,
                "history_field" => request.history.field = value,
                "history_group_by" => request.history.group_by = value,
                _ => {
                    request.criteria.insert(key.clone(), value.unwrap_or_default());
                }
            }
        }

        Ok(request)
    }
}
