//! Integration tests for the filter engine over the in-memory store
//!
//! These tests verify that:
//! - Cross-collection criteria select the right primary records
//! - Invalid criteria are rejected before any storage access
//! - Sorting, paging and counting agree with each other
//! - History buckets cover the requested range

use flowscope::prelude::*;
use serde_json::{Value, json};

const FLOW_ETL: &str = "6f1c1f0e-0000-4000-8000-000000000001";
const FLOW_REPORT: &str = "6f1c1f0e-0000-4000-8000-000000000002";
const FLOW_UNTAGGED: &str = "6f1c1f0e-0000-4000-8000-000000000003";

fn run_id(n: u32) -> String {
    format!("a0000000-0000-4000-8000-{:012}", n)
}

fn engine() -> FilterEngine {
    FilterEngine::from_config(&FilterConfig::default_config()).unwrap()
}

fn seeded_store() -> InMemoryRecordStore {
    let store = InMemoryRecordStore::new();
    store
        .insert_many(
            "flows",
            vec![
                json!({"id": FLOW_ETL, "name": "nightly-etl", "tags": ["prod", "etl"]}),
                json!({"id": FLOW_REPORT, "name": "weekly-report", "tags": ["dev"]}),
                json!({"id": FLOW_UNTAGGED, "name": "scratch"}),
            ],
        )
        .unwrap();

    let runs = vec![
        (1, FLOW_ETL, "FAILED", "2024-01-01T00:10:00Z"),
        (2, FLOW_ETL, "COMPLETED", "2024-01-01T00:40:00Z"),
        (3, FLOW_ETL, "FAILED", "2024-01-01T01:20:00Z"),
        (4, FLOW_REPORT, "FAILED", "2024-01-01T01:50:00Z"),
        (5, FLOW_REPORT, "RUNNING", "2024-01-01T02:30:00Z"),
        (6, FLOW_UNTAGGED, "COMPLETED", "2024-01-01T03:05:00Z"),
    ];
    store
        .insert_many(
            "flow_runs",
            runs.into_iter().map(|(n, flow, state, start)| {
                json!({
                    "id": run_id(n),
                    "name": format!("run-{}", n),
                    "flow_id": flow,
                    "state": {"type": state},
                    "run_count": n,
                    "expected_start_time": start,
                })
            }),
        )
        .unwrap();

    // no state and no expected start time
    store
        .insert(
            "flow_runs",
            Record::from_value(json!({"id": run_id(7), "flow_id": FLOW_ETL, "run_count": 0}))
                .unwrap(),
        )
        .unwrap();
    store
}

fn ids(result: &ActionResult) -> Vec<String> {
    result
        .records()
        .unwrap()
        .iter()
        .map(|r| r.as_map()["id"].as_str().unwrap().to_string())
        .collect()
}

async fn filter(primary: &str, body: Value) -> Vec<String> {
    let result = engine()
        .run(&seeded_store(), primary, ActionMode::Filter, &body)
        .await
        .unwrap();
    ids(&result)
}

async fn rejection(primary: &str, mode: ActionMode, body: Value) -> ValidationError {
    match engine().run(&seeded_store(), primary, mode, &body).await {
        Err(FilterError::Validation(err)) => err,
        other => panic!("expected a validation error, got {:?}", other),
    }
}

// =============================================================================
// Criteria
// =============================================================================

mod criteria_tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_runs_of_prod_flows() {
        let found = filter(
            "flow_runs",
            json!({
                "flows": {"tags": {"all_": ["prod"]}},
                "flow_runs": {"state": {"type": {"any_": ["FAILED"]}}}
            }),
        )
        .await;
        assert_eq!(found, vec![run_id(1), run_id(3)]);
    }

    #[tokio::test]
    async fn test_tagged_flows_with_failed_runs() {
        let document = |tag: &str, state: &str| {
            json!({
                "flows": {"tags": {"all_": [tag]}},
                "flow_runs": {"state": {"type": {"any_": [state]}}}
            })
        };

        assert_eq!(filter("flows", document("prod", "FAILED")).await, vec![FLOW_ETL]);
        assert_eq!(filter("flows", document("dev", "FAILED")).await, vec![FLOW_REPORT]);
        assert!(filter("flows", document("prod", "RUNNING")).await.is_empty());
    }

    #[tokio::test]
    async fn test_flows_with_failed_runs() {
        let found = filter(
            "flows",
            json!({"flow_runs": {"state.type": {"any_": ["FAILED"]}}}),
        )
        .await;
        assert_eq!(found, vec![FLOW_ETL, FLOW_REPORT]);
    }

    #[tokio::test]
    async fn test_empty_document_returns_everything() {
        let store = seeded_store();
        let found = filter("flow_runs", json!({})).await;
        assert_eq!(found.len(), store.len("flow_runs").unwrap());

        let found = filter("flows", Value::Null).await;
        assert_eq!(found, vec![FLOW_ETL, FLOW_REPORT, FLOW_UNTAGGED]);
    }

    #[tokio::test]
    async fn test_is_null_partitions_records() {
        let nulls = filter("flow_runs", json!({"flow_runs": {"state": {"is_null_": true}}})).await;
        let present = filter("flow_runs", json!({"flow_runs": {"state": {"is_null_": false}}})).await;

        assert_eq!(nulls, vec![run_id(7)]);
        assert_eq!(present.len(), 6);
        assert!(present.iter().all(|id| !nulls.contains(id)));
    }

    #[tokio::test]
    async fn test_datetime_bounds() {
        let found = filter(
            "flow_runs",
            json!({"flow_runs": {"expected_start_time": {
                "between_": ["2024-01-01T00:40:00Z", "2024-01-01T01:50:00Z"]
            }}}),
        )
        .await;
        assert_eq!(found, vec![run_id(2), run_id(3), run_id(4)]);

        let found = filter(
            "flow_runs",
            json!({"flow_runs": {"expected_start_time": {"before_": "2024-01-01T00:40:00Z"}}}),
        )
        .await;
        assert_eq!(found, vec![run_id(1), run_id(2)]);
    }

    #[tokio::test]
    async fn test_like_is_case_insensitive_substring() {
        let found = filter("flows", json!({"flows": {"name": {"like_": "REPORT"}}})).await;
        assert_eq!(found, vec![FLOW_REPORT]);
    }

    #[tokio::test]
    async fn test_related_group_requires_related_record() {
        // an empty related node still requires a related record
        let found = filter("flows", json!({"flow_runs": {}})).await;
        assert_eq!(found, vec![FLOW_ETL, FLOW_REPORT, FLOW_UNTAGGED]);

        let found = filter("flows", json!({"task_runs": {}})).await;
        assert!(found.is_empty());
    }
}

// =============================================================================
// Rejections
// =============================================================================

mod rejection_tests {
    use super::*;

    #[tokio::test]
    async fn test_operator_invalid_for_field_type() {
        let err = rejection(
            "flows",
            ActionMode::Filter,
            json!({"flows": {"name": {"before_": "2024-01-01T00:00:00Z"}}}),
        )
        .await;
        assert!(err.has(IssueKind::UnsupportedOperator));
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].location, "flows.name.before_");
    }

    #[tokio::test]
    async fn test_every_issue_is_reported() {
        let err = rejection(
            "flow_runs",
            ActionMode::Filter,
            json!({
                "flows": {"tags": {"all_": "prod"}},
                "flow_runs": {"colour": {"eq_": "red"}},
                "work_queues": {"name": {"eq_": "default"}},
                "limit": 500
            }),
        )
        .await;
        assert!(err.has(IssueKind::TypeMismatch));
        assert!(err.has(IssueKind::UnknownField));
        assert!(err.has(IssueKind::UnknownCollection));
        assert!(err.has(IssueKind::InvalidPageSpec));
    }

    #[tokio::test]
    async fn test_combinators_are_rejected() {
        let err = rejection(
            "flows",
            ActionMode::Count,
            json!({"flows": {"or_": [{"name": {"eq_": "a"}}]}}),
        )
        .await;
        assert!(err.has(IssueKind::UnsupportedCombinator));
    }

    #[tokio::test]
    async fn test_unknown_primary_collection() {
        let err = rejection("work_queues", ActionMode::Filter, json!({})).await;
        assert_eq!(err.issues().len(), 1);
        assert!(err.has(IssueKind::UnknownCollection));
    }

    #[tokio::test]
    async fn test_limit_is_never_clamped() {
        let err = rejection("flows", ActionMode::Filter, json!({"limit": 201})).await;
        assert!(err.has(IssueKind::InvalidPageSpec));

        let err = rejection("flows", ActionMode::Filter, json!({"offset": -1})).await;
        assert!(err.has(IssueKind::InvalidPageSpec));
    }
}

// =============================================================================
// Sort, page and count
// =============================================================================

mod paging_tests {
    use super::*;

    #[tokio::test]
    async fn test_sort_descending_with_window() {
        let found = filter(
            "flow_runs",
            json!({"sort": "run_count:desc", "limit": 3, "offset": 1}),
        )
        .await;
        assert_eq!(found, vec![run_id(5), run_id(4), run_id(3)]);
    }

    #[tokio::test]
    async fn test_absent_values_sort_first() {
        let found = filter(
            "flow_runs",
            json!({"sort": "expected_start_time", "limit": 2}),
        )
        .await;
        assert_eq!(found, vec![run_id(7), run_id(1)]);
    }

    #[tokio::test]
    async fn test_count_ignores_window() {
        let result = engine()
            .run(
                &seeded_store(),
                "flow_runs",
                ActionMode::Count,
                &json!({"flows": {"tags": {"any_": ["prod"]}}, "limit": 1}),
            )
            .await
            .unwrap();
        assert_eq!(result.count(), Some(4));
    }
}

// =============================================================================
// History
// =============================================================================

mod history_tests {
    use super::*;

    #[tokio::test]
    async fn test_hourly_history_with_groups() {
        let result = engine()
            .run(
                &seeded_store(),
                "flow_runs",
                ActionMode::History,
                &json!({
                    "history_start": "2024-01-01T00:00:00Z",
                    "history_end": "2024-01-01T04:00:00Z",
                    "history_interval_seconds": 3600,
                    "history_group_by": "state.type"
                }),
            )
            .await
            .unwrap();

        let buckets = result.history().unwrap();
        let counts: Vec<u64> = buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 2, 1, 1]);

        let first = buckets[0].groups.as_ref().unwrap();
        assert_eq!(first.get("FAILED"), Some(&1));
        assert_eq!(first.get("COMPLETED"), Some(&1));
        assert!(buckets.iter().all(|b| b.groups.is_some()));
    }

    #[tokio::test]
    async fn test_history_reports_empty_buckets() {
        let result = engine()
            .run(
                &seeded_store(),
                "flow_runs",
                ActionMode::History,
                &json!({
                    "flow_runs": {"state.type": {"eq_": "RUNNING"}},
                    "history_start": "2024-01-01T00:00:00Z",
                    "history_end": "2024-01-01T03:00:00Z",
                    "history_interval_seconds": 1800
                }),
            )
            .await
            .unwrap();

        let counts: Vec<u64> = result.history().unwrap().iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![0, 0, 0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn test_history_rejects_inverted_range() {
        let err = rejection(
            "flow_runs",
            ActionMode::History,
            json!({
                "history_start": "2024-01-02T00:00:00Z",
                "history_end": "2024-01-01T00:00:00Z",
                "history_interval_seconds": 60
            }),
        )
        .await;
        assert!(err.has(IssueKind::InvalidHistory));
    }

    #[tokio::test]
    async fn test_history_rejects_interval_beyond_date_range() {
        let err = rejection(
            "flow_runs",
            ActionMode::History,
            json!({
                "history_start": "2024-01-01T00:00:00Z",
                "history_end": "2024-01-02T00:00:00Z",
                "history_interval_seconds": 9.0e12
            }),
        )
        .await;
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].location, "history_interval_seconds");
    }
}
