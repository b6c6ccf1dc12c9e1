//! Run-history bucketing
//!
//! Matching records are counted into fixed-width intervals over
//! `[history_start, history_end)`. Every interval in range is reported, with a
//! zero count when nothing matched; the last interval is clipped to the end of
//! the range.

use crate::config::LimitsConfig;
use crate::core::error::{IssueKind, ValidationIssue};
use crate::core::field::{FieldKind, FieldPath};
use crate::core::schema::CollectionSchema;
use crate::query::request::HistoryParams;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Validated history parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySpec {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: Duration,
    /// Datetime field the records are bucketed by
    pub field: FieldPath,
    /// Optional enum or string field broken down per bucket
    pub group_by: Option<FieldPath>,
}

impl HistorySpec {
    /// Validate raw history parameters against the primary collection
    pub fn resolve(
        params: &HistoryParams,
        schema: &CollectionSchema,
        limits: &LimitsConfig,
    ) -> Result<Self, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let mut issue = |location: &str, message: String| {
            issues.push(ValidationIssue::new(IssueKind::InvalidHistory, location, message));
        };

        let start = parse_datetime(params.start.as_ref(), "history_start", &mut issue);
        let end = parse_datetime(params.end.as_ref(), "history_end", &mut issue);

        let interval = match present(params.interval_seconds.as_ref()) {
            None => {
                issue("history_interval_seconds", "history_interval_seconds is required".to_string());
                None
            }
            Some(raw) => match raw.as_f64().map(|s| (s * 1_000_000.0).round()) {
                Some(micros) if micros >= 1.0 && micros <= i64::MAX as f64 => {
                    Some(Duration::microseconds(micros as i64))
                }
                _ => {
                    issue(
                        "history_interval_seconds",
                        format!("history_interval_seconds must be a positive number, got {}", raw),
                    );
                    None
                }
            },
        };

        let field = match present(params.field.as_ref()) {
            None => match schema.time_field() {
                Some(path) => Some(path.clone()),
                None => {
                    issue(
                        "history_field",
                        format!("'{}' declares no time field; history_field is required", schema.name()),
                    );
                    None
                }
            },
            Some(raw) => resolve_field(raw, schema, &[FieldKind::DateTime])
                .map_err(|message| issue("history_field", message))
                .ok(),
        };

        let group_by = match present(params.group_by.as_ref()) {
            None => Ok(None),
            Some(raw) => resolve_field(raw, schema, &[FieldKind::Enum, FieldKind::String]).map(Some),
        }
        .map_err(|message| issue("history_group_by", message))
        .ok()
        .flatten();

        if let (Some(start), Some(end), Some(interval)) = (start, end, interval) {
            if start >= end {
                issue(
                    "history_end",
                    format!("history_end {} must be after history_start {}", end, start),
                );
            } else if start.checked_add_signed(interval).is_none() {
                issue(
                    "history_interval_seconds",
                    format!(
                        "history_interval_seconds {} from {} leaves the representable date range",
                        interval.num_seconds(),
                        start
                    ),
                );
            } else {
                let buckets = bucket_count(start, end, interval);
                if buckets > limits.max_history_buckets as u64 {
                    issue(
                        "history_interval_seconds",
                        format!(
                            "range would produce {} buckets; at most {} are allowed",
                            buckets, limits.max_history_buckets
                        ),
                    );
                }
            }
        }

        match (start, end, interval, field) {
            (Some(start), Some(end), Some(interval), Some(field)) if issues.is_empty() => Ok(Self {
                start,
                end,
                interval,
                field,
                group_by,
            }),
            _ => Err(issues),
        }
    }

    /// Number of buckets the range splits into
    pub fn bucket_count(&self) -> u64 {
        bucket_count(self.start, self.end, self.interval)
    }

    /// Index of the bucket holding `at`, if it falls inside the range
    pub fn bucket_index(&self, at: DateTime<Utc>) -> Option<usize> {
        if at < self.start || at >= self.end {
            return None;
        }
        let offset = (at - self.start).num_microseconds()?;
        let width = self.interval.num_microseconds()?;
        usize::try_from(offset / width).ok()
    }
}

/// One matching record's contribution to a history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPoint {
    pub at: DateTime<Utc>,
    pub group: Option<String>,
}

/// Aggregated counts for one interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryBucket {
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    pub count: u64,
    /// Per-value counts of `history_group_by`, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeMap<String, u64>>,
}

/// Count points into every bucket of the range; out-of-range points are dropped
///
/// A point without a group value is counted in the bucket total only.
pub fn bucketize(spec: &HistorySpec, points: &[HistoryPoint]) -> Vec<HistoryBucket> {
    let grouped = spec.group_by.is_some();
    let count = spec.bucket_count() as usize;

    let mut buckets: Vec<HistoryBucket> = (0..count)
        .map(|i| {
            let interval_start = i32::try_from(i)
                .ok()
                .and_then(|i| spec.interval.checked_mul(i))
                .and_then(|offset| spec.start.checked_add_signed(offset))
                .unwrap_or(spec.end);
            let interval_end = interval_start
                .checked_add_signed(spec.interval)
                .map_or(spec.end, |end| end.min(spec.end));
            HistoryBucket {
                interval_start,
                interval_end,
                count: 0,
                groups: grouped.then(BTreeMap::new),
            }
        })
        .collect();

    for point in points {
        let Some(bucket) = spec.bucket_index(point.at).and_then(|i| buckets.get_mut(i)) else {
            continue;
        };
        bucket.count += 1;
        if let (Some(groups), Some(group)) = (bucket.groups.as_mut(), point.group.as_ref()) {
            *groups.entry(group.clone()).or_insert(0) += 1;
        }
    }

    buckets
}

fn bucket_count(start: DateTime<Utc>, end: DateTime<Utc>, interval: Duration) -> u64 {
    let span = (end - start).num_microseconds().unwrap_or(i64::MAX);
    let width = interval.num_microseconds().unwrap_or(i64::MAX).max(1);
    if span <= 0 {
        return 0;
    }
    (span as u64).div_ceil(width as u64)
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn parse_datetime(
    raw: Option<&Value>,
    location: &str,
    issue: &mut impl FnMut(&str, String),
) -> Option<DateTime<Utc>> {
    let Some(raw) = present(raw) else {
        issue(location, format!("{} is required", location));
        return None;
    };
    match raw.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()) {
        Some(dt) => Some(dt.with_timezone(&Utc)),
        None => {
            issue(location, format!("{} must be an RFC 3339 datetime, got {}", location, raw));
            None
        }
    }
}

fn resolve_field(
    raw: &Value,
    schema: &CollectionSchema,
    kinds: &[FieldKind],
) -> Result<FieldPath, String> {
    let text = raw
        .as_str()
        .ok_or_else(|| format!("expected a field path, got {}", raw))?;
    let path = FieldPath::parse(text).map_err(|e| e.to_string())?;
    let field = schema
        .resolve(&path)
        .map_err(|_| format!("'{}' has no field '{}'", schema.name(), path))?;
    if kinds.contains(&field.kind()) {
        Ok(path)
    } else {
        let expected: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        Err(format!(
            "'{}' is a {} field, expected {}",
            path,
            field.kind(),
            expected.join(" or ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::core::schema::SchemaRegistry;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn flow_runs() -> Arc<CollectionSchema> {
        SchemaRegistry::from_config(&FilterConfig::default_config())
            .unwrap()
            .get("flow_runs")
            .unwrap()
            .clone()
    }

    fn params(start: &str, end: &str, seconds: Value) -> HistoryParams {
        HistoryParams {
            start: Some(json!(start)),
            end: Some(json!(end)),
            interval_seconds: Some(seconds),
            field: None,
            group_by: None,
        }
    }

    fn t(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, second).unwrap()
    }

    #[test]
    fn test_resolve_defaults_to_time_field() {
        let spec = HistorySpec::resolve(
            &params("2024-01-01T00:00:00Z", "2024-01-01T00:10:00Z", json!(60)),
            &flow_runs(),
            &LimitsConfig::default(),
        )
        .unwrap();
        assert_eq!(spec.field.to_string(), "expected_start_time");
        assert_eq!(spec.bucket_count(), 10);
        assert!(spec.group_by.is_none());
    }

    #[test]
    fn test_fractional_interval_and_clipped_last_bucket() {
        let spec = HistorySpec::resolve(
            &params("2024-01-01T00:00:00Z", "2024-01-01T00:00:10Z", json!(4.0)),
            &flow_runs(),
            &LimitsConfig::default(),
        )
        .unwrap();
        let buckets = bucketize(&spec, &[]);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[2].interval_start, t(0, 8));
        assert_eq!(buckets[2].interval_end, t(0, 10));
        assert!(buckets.iter().all(|b| b.count == 0));

        let spec = HistorySpec::resolve(
            &params("2024-01-01T00:00:00Z", "2024-01-01T00:00:01Z", json!(0.25)),
            &flow_runs(),
            &LimitsConfig::default(),
        )
        .unwrap();
        assert_eq!(spec.bucket_count(), 4);
    }

    #[test]
    fn test_collects_every_problem() {
        let mut raw = params("yesterday", "2024-01-01T00:00:00Z", json!(-5));
        raw.field = Some(json!("name"));
        raw.group_by = Some(json!("tags"));
        let issues = HistorySpec::resolve(&raw, &flow_runs(), &LimitsConfig::default()).unwrap_err();
        let locations: Vec<&str> = issues.iter().map(|i| i.location.as_str()).collect();
        assert_eq!(
            locations,
            vec!["history_start", "history_interval_seconds", "history_field", "history_group_by"]
        );
        assert!(issues.iter().all(|i| i.kind == IssueKind::InvalidHistory));
    }

    #[test]
    fn test_missing_parameters() {
        let issues = HistorySpec::resolve(&HistoryParams::default(), &flow_runs(), &LimitsConfig::default())
            .unwrap_err();
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn test_empty_or_inverted_range() {
        let raw = params("2024-01-01T00:10:00Z", "2024-01-01T00:00:00Z", json!(60));
        assert!(HistorySpec::resolve(&raw, &flow_runs(), &LimitsConfig::default()).is_err());
        let raw = params("2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z", json!(60));
        assert!(HistorySpec::resolve(&raw, &flow_runs(), &LimitsConfig::default()).is_err());
    }

    #[test]
    fn test_bucket_cap() {
        let raw = params("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z", json!(1));
        let issues = HistorySpec::resolve(&raw, &flow_runs(), &LimitsConfig::default()).unwrap_err();
        assert!(issues[0].message.contains("86400 buckets"));
    }

    #[test]
    fn test_bucketize_counts_and_groups() {
        let mut raw = params("2024-01-01T00:00:00Z", "2024-01-01T00:03:00Z", json!(60));
        raw.group_by = Some(json!("state.type"));
        let spec = HistorySpec::resolve(&raw, &flow_runs(), &LimitsConfig::default()).unwrap();

        let point = |at, group: Option<&str>| HistoryPoint {
            at,
            group: group.map(str::to_string),
        };
        let points = vec![
            point(t(0, 0), Some("FAILED")),
            point(t(0, 59), Some("COMPLETED")),
            point(t(0, 30), Some("FAILED")),
            point(t(2, 0), None),
            point(t(3, 0), Some("FAILED")),
            point(t(0, 0) - Duration::seconds(1), Some("FAILED")),
        ];
        let buckets = bucketize(&spec, &points);

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].count, 3);
        assert_eq!(buckets[0].groups.as_ref().unwrap()["FAILED"], 2);
        assert_eq!(buckets[0].groups.as_ref().unwrap()["COMPLETED"], 1);
        assert_eq!(buckets[1].count, 0);
        assert!(buckets[1].groups.as_ref().unwrap().is_empty());
        assert_eq!(buckets[2].count, 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 4);
    }

    #[test]
    fn test_interval_past_representable_dates() {
        let raw = params("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z", json!(9.0e12));
        let issues = HistorySpec::resolve(&raw, &flow_runs(), &LimitsConfig::default()).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].location, "history_interval_seconds");
        assert_eq!(issues[0].kind, IssueKind::InvalidHistory);
    }

    #[test]
    fn test_bucketize_clips_at_max_datetime() {
        let end = DateTime::<Utc>::MAX_UTC;
        let spec = HistorySpec {
            start: end - Duration::hours(1),
            end,
            interval: Duration::hours(2),
            field: FieldPath::parse("expected_start_time").unwrap(),
            group_by: None,
        };
        let buckets = bucketize(&spec, &[HistoryPoint { at: end - Duration::minutes(1), group: None }]);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].interval_end, end);
        assert_eq!(buckets[0].count, 1);
    }
}
