//! Sorting and pagination
//!
//! Every query gets a deterministic order: the requested sort (if any)
//! followed by the primary key ascending as a tie-breaker. Page windows are
//! validated, never clamped.
//!
//! # Format
//! - `"field"` or `"field:asc"` (ascending)
//! - `"field.path:desc"` (descending)

use crate::config::LimitsConfig;
use crate::core::error::{IssueKind, ValidationIssue};
use crate::core::field::{FieldKind, FieldPath};
use crate::core::record::Record;
use crate::core::schema::CollectionSchema;
use crate::query::planner::QueryPlan;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// One sort key on a scalar field of the primary collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub path: FieldPath,
    pub kind: FieldKind,
    pub direction: SortDirection,
}

impl SortSpec {
    /// Parse `"<field.path>[:asc|desc]"` against a collection schema
    pub fn parse(raw: &Value, schema: &CollectionSchema) -> Result<Self, ValidationIssue> {
        let invalid = |message: String| ValidationIssue::new(IssueKind::InvalidSort, "sort", message);

        let text = raw
            .as_str()
            .ok_or_else(|| invalid(format!("sort must be a string, got {}", raw)))?;

        let (field, direction) = match text.split_once(':') {
            Some((field, dir)) => {
                let direction = SortDirection::parse(dir).ok_or_else(|| {
                    invalid(format!("unknown sort direction '{}', use asc or desc", dir))
                })?;
                (field, direction)
            }
            None => (text, SortDirection::Asc),
        };

        let path = FieldPath::parse(field).map_err(|e| invalid(e.to_string()))?;
        let kind = schema
            .resolve(&path)
            .map_err(|_| invalid(format!("'{}' has no field '{}'", schema.name(), path)))?
            .kind();
        if !kind.is_sortable() {
            return Err(invalid(format!(
                "cannot sort on '{}': {} fields are not sortable",
                path, kind
            )));
        }

        Ok(Self {
            path,
            kind,
            direction,
        })
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ordering = a.compare_on(b, &self.path, self.kind);
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        write!(f, "{}:{}", self.path, direction)
    }
}

/// The full ordering of a query, tie-breaker included
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    keys: Vec<SortSpec>,
}

impl OrderBy {
    /// Requested sort (defaults to the primary key) plus the primary key tie-breaker
    pub fn resolve(sort: Option<&Value>, schema: &CollectionSchema) -> Result<Self, ValidationIssue> {
        let tie_breaker = SortSpec {
            path: schema.primary_key_path(),
            kind: schema.primary_key_kind(),
            direction: SortDirection::Asc,
        };

        let mut keys = Vec::with_capacity(2);
        if let Some(raw) = sort.filter(|v| !v.is_null()) {
            keys.push(SortSpec::parse(raw, schema)?);
        }
        if keys.iter().all(|k| k.path != tie_breaker.path) {
            keys.push(tie_breaker);
        }

        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[SortSpec] {
        &self.keys
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.keys
            .iter()
            .map(|key| key.compare(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

/// A validated `limit`/`offset` window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageSpec {
    pub limit: usize,
    pub offset: usize,
}

impl PageSpec {
    /// Validate raw `limit` and `offset` values from a request body
    ///
    /// Both problems are reported when both are wrong.
    pub fn resolve(
        limit: Option<&Value>,
        offset: Option<&Value>,
        limits: &LimitsConfig,
    ) -> Result<Self, Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        let limit = match limit.filter(|v| !v.is_null()) {
            None => limits.default_limit,
            Some(raw) => match raw.as_u64() {
                Some(n) if n >= 1 && n as usize <= limits.max_limit => n as usize,
                _ => {
                    issues.push(ValidationIssue::new(
                        IssueKind::InvalidPageSpec,
                        "limit",
                        format!(
                            "limit must be an integer between 1 and {}, got {}",
                            limits.max_limit, raw
                        ),
                    ));
                    0
                }
            },
        };

        let offset = match offset.filter(|v| !v.is_null()) {
            None => 0,
            Some(raw) => match raw.as_u64() {
                Some(n) => n as usize,
                None => {
                    issues.push(ValidationIssue::new(
                        IssueKind::InvalidPageSpec,
                        "offset",
                        format!("offset must be a non-negative integer, got {}", raw),
                    ));
                    0
                }
            },
        };

        if issues.is_empty() {
            Ok(Self { limit, offset })
        } else {
            Err(issues)
        }
    }

    /// Apply the window to an already-ordered sequence
    pub fn window<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

/// A plan with its ordering and page window attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedQuery {
    pub plan: QueryPlan,
    pub order: OrderBy,
    pub page: PageSpec,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::core::schema::SchemaRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn flow_runs() -> Arc<CollectionSchema> {
        SchemaRegistry::from_config(&FilterConfig::default_config())
            .unwrap()
            .get("flow_runs")
            .unwrap()
            .clone()
    }

    #[test]
    fn test_default_order_is_primary_key() {
        let order = OrderBy::resolve(None, &flow_runs()).unwrap();
        assert_eq!(order.keys().len(), 1);
        assert_eq!(order.keys()[0].to_string(), "id:asc");
    }

    #[test]
    fn test_requested_sort_gets_tie_breaker() {
        let sort = json!("expected_start_time:desc");
        let order = OrderBy::resolve(Some(&sort), &flow_runs()).unwrap();
        let keys: Vec<String> = order.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["expected_start_time:desc", "id:asc"]);
    }

    #[test]
    fn test_sort_on_primary_key_not_duplicated() {
        let sort = json!("id:desc");
        let order = OrderBy::resolve(Some(&sort), &flow_runs()).unwrap();
        assert_eq!(order.keys().len(), 1);
        assert_eq!(order.keys()[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_nested_sort_field() {
        let sort = json!("state.type");
        let order = OrderBy::resolve(Some(&sort), &flow_runs()).unwrap();
        assert_eq!(order.keys()[0].kind, FieldKind::Enum);
    }

    #[test]
    fn test_invalid_sorts() {
        let schema = flow_runs();
        for raw in [
            json!("tags"),
            json!("state"),
            json!("colour:asc"),
            json!("name:sideways"),
            json!(42),
            json!("state..type"),
        ] {
            let issue = OrderBy::resolve(Some(&raw), &schema).unwrap_err();
            assert_eq!(issue.kind, IssueKind::InvalidSort, "sort {}", raw);
        }
    }

    #[test]
    fn test_order_compare_uses_tie_breaker() {
        let order = OrderBy::resolve(Some(&json!("run_count:desc")), &flow_runs()).unwrap();
        let a = Record::from_value(json!({"id": "00000000-0000-4000-8000-000000000001", "run_count": 1})).unwrap();
        let b = Record::from_value(json!({"id": "00000000-0000-4000-8000-000000000002", "run_count": 1})).unwrap();
        let c = Record::from_value(json!({"id": "00000000-0000-4000-8000-000000000003", "run_count": 5})).unwrap();

        assert_eq!(order.compare(&a, &b), Ordering::Less);
        assert_eq!(order.compare(&c, &a), Ordering::Less);
    }

    #[test]
    fn test_page_defaults() {
        let page = PageSpec::resolve(None, None, &LimitsConfig::default()).unwrap();
        assert_eq!(page, PageSpec { limit: 200, offset: 0 });
    }

    #[test]
    fn test_page_not_clamped() {
        let limits = LimitsConfig::default();
        let issues = PageSpec::resolve(Some(&json!(500)), Some(&json!(-1)), &limits).unwrap_err();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.kind == IssueKind::InvalidPageSpec));

        assert!(PageSpec::resolve(Some(&json!(0)), None, &limits).is_err());
        assert!(PageSpec::resolve(Some(&json!(2.5)), None, &limits).is_err());
        assert!(PageSpec::resolve(Some(&json!("10")), None, &limits).is_err());
        assert!(PageSpec::resolve(Some(&json!(200)), Some(&json!(0)), &limits).is_ok());
    }

    #[test]
    fn test_window() {
        let page = PageSpec { limit: 2, offset: 1 };
        assert_eq!(page.window(vec![1, 2, 3, 4]), vec![2, 3]);
        let page = PageSpec { limit: 2, offset: 10 };
        assert!(page.window(vec![1, 2, 3]).is_empty());
    }
}
