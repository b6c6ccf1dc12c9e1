//! Property tests over generated flows and flow runs

use chrono::{DateTime, Duration, TimeZone};
use flowscope::prelude::*;
use proptest::prelude::*;
use serde_json::{Map, Value, json};

const STATES: [&str; 4] = ["COMPLETED", "FAILED", "RUNNING", "CRASHED"];
const TAGS: [&str; 3] = ["prod", "dev", "etl"];

#[derive(Clone, Debug)]
struct GeneratedRun {
    flow: usize,
    state: Option<usize>,
    run_count: i64,
    minute: i64,
}

#[derive(Clone, Debug)]
struct Fixture {
    flow_tags: Vec<Vec<usize>>,
    runs: Vec<GeneratedRun>,
}

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn flow_id(n: usize) -> String {
    format!("f0000000-0000-4000-8000-{:012}", n)
}

fn run_id(n: usize) -> String {
    format!("e0000000-0000-4000-8000-{:012}", n)
}

fn arb_fixture() -> impl Strategy<Value = Fixture> {
    let flows = prop::collection::vec(prop::collection::vec(0..TAGS.len(), 0..3), 1..5);
    flows.prop_flat_map(|flow_tags| {
        let count = flow_tags.len();
        let run = (
            0..count,
            prop::option::of(0..STATES.len()),
            0i64..4,
            0i64..1440,
        )
            .prop_map(|(flow, state, run_count, minute)| GeneratedRun {
                flow,
                state,
                run_count,
                minute,
            });
        (Just(flow_tags), prop::collection::vec(run, 0..40))
            .prop_map(|(flow_tags, runs)| Fixture { flow_tags, runs })
    })
}

/// Criteria on the primary collection and, optionally, its flow
fn arb_criteria() -> impl Strategy<Value = Vec<(String, Value)>> {
    let state = prop::option::of(prop::collection::vec(0..STATES.len(), 1..3).prop_map(|picked| {
        let values: Vec<&str> = picked.into_iter().map(|i| STATES[i]).collect();
        ("state.type".to_string(), json!({"any_": values}))
    }));
    let run_count = prop::option::of((0i64..4).prop_map(|n| ("run_count".to_string(), json!({"eq_": n}))));
    let null_state = prop::option::of(any::<bool>().prop_map(|b| ("state".to_string(), json!({"is_null_": b}))));
    (state, run_count, null_state)
        .prop_map(|(a, b, c)| [a, b, c].into_iter().flatten().collect())
}

fn arb_flow_tag() -> impl Strategy<Value = Option<usize>> {
    prop::option::of(0..TAGS.len())
}

fn store_for(fixture: &Fixture) -> InMemoryRecordStore {
    let store = InMemoryRecordStore::new();
    store
        .insert_many(
            "flows",
            fixture.flow_tags.iter().enumerate().map(|(i, tags)| {
                let tags: Vec<&str> = tags.iter().map(|&t| TAGS[t]).collect();
                json!({"id": flow_id(i), "name": format!("flow-{}", i), "tags": tags})
            }),
        )
        .unwrap();
    store
        .insert_many(
            "flow_runs",
            fixture.runs.iter().enumerate().map(|(i, run)| {
                let mut record = json!({
                    "id": run_id(i),
                    "flow_id": flow_id(run.flow),
                    "run_count": run.run_count,
                    "expected_start_time": origin() + Duration::minutes(run.minute),
                });
                if let Some(state) = run.state {
                    record["state"] = json!({"type": STATES[state]});
                }
                record
            }),
        )
        .unwrap();
    store
}

fn body(clauses: &[(String, Value)], flow_tag: Option<usize>) -> Map<String, Value> {
    let mut body = Map::new();
    let node: Map<String, Value> = clauses.iter().cloned().collect();
    body.insert("flow_runs".to_string(), Value::Object(node));
    if let Some(tag) = flow_tag {
        body.insert("flows".to_string(), json!({"tags": {"any_": [TAGS[tag]]}}));
    }
    body
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

fn engine() -> FilterEngine {
    FilterEngine::from_config(&FilterConfig::default_config()).unwrap()
}

fn run(store: &InMemoryRecordStore, mode: ActionMode, body: &Map<String, Value>) -> ActionResult {
    block_on(engine().run(store, "flow_runs", mode, &Value::Object(body.clone()))).unwrap()
}

fn ids(result: &ActionResult) -> Vec<String> {
    result
        .records()
        .unwrap()
        .iter()
        .map(|r| r.as_map()["id"].as_str().unwrap().to_string())
        .collect()
}

proptest! {
    #[test]
    fn plan_is_independent_of_clause_order(
        clauses in arb_criteria(),
        flow_tag in arb_flow_tag(),
    ) {
        let engine = engine();
        let forward = body(&clauses, flow_tag);
        let reversed: Vec<_> = clauses.iter().rev().cloned().collect();
        let backward = body(&reversed, flow_tag);

        let a = engine.parse_and_plan("flow_runs", &Value::Object(forward)).unwrap();
        let b = engine.parse_and_plan("flow_runs", &Value::Object(backward)).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn dotted_and_nested_paths_agree(picked in prop::collection::vec(0..STATES.len(), 1..4)) {
        let values: Vec<&str> = picked.into_iter().map(|i| STATES[i]).collect();
        let engine = engine();

        let dotted = json!({"flow_runs": {"state.type": {"any_": values}}});
        let nested = json!({"flow_runs": {"state": {"type": {"any_": values}}}});

        prop_assert_eq!(
            engine.parse_and_plan("flow_runs", &dotted).unwrap(),
            engine.parse_and_plan("flow_runs", &nested).unwrap()
        );
    }

    #[test]
    fn count_matches_filter_length(
        fixture in arb_fixture(),
        clauses in arb_criteria(),
        flow_tag in arb_flow_tag(),
    ) {
        let store = store_for(&fixture);
        let mut request = body(&clauses, flow_tag);

        let count = run(&store, ActionMode::Count, &request).count().unwrap();
        request.insert("limit".to_string(), json!(200));
        let filtered = ids(&run(&store, ActionMode::Filter, &request));

        prop_assert_eq!(count as usize, filtered.len());
    }

    #[test]
    fn history_sums_to_matches_in_range(
        fixture in arb_fixture(),
        clauses in arb_criteria(),
        start_minute in 0i64..720,
        span_minutes in 1i64..720,
        interval_minutes in 2i64..240,
    ) {
        let store = store_for(&fixture);
        let start = origin() + Duration::minutes(start_minute);
        let end = start + Duration::minutes(span_minutes);

        let mut request = body(&clauses, None);
        request.insert("history_start".to_string(), json!(start));
        request.insert("history_end".to_string(), json!(end));
        request.insert("history_interval_seconds".to_string(), json!(interval_minutes * 60));
        let result = run(&store, ActionMode::History, &request);
        let buckets = result.history().unwrap();

        let mut listing = body(&clauses, None);
        listing.insert("limit".to_string(), json!(200));
        let matched = run(&store, ActionMode::Filter, &listing);
        let in_range = matched
            .records()
            .unwrap()
            .iter()
            .filter(|record| {
                let at: DateTime<Utc> = record.as_map()["expected_start_time"]
                    .as_str()
                    .unwrap()
                    .parse()
                    .unwrap();
                at >= start && at < end
            })
            .count();

        let total: u64 = buckets.iter().map(|b| b.count).sum();
        prop_assert_eq!(total as usize, in_range);
        prop_assert_eq!(buckets.first().unwrap().interval_start, start);
        prop_assert_eq!(buckets.last().unwrap().interval_end, end);
    }

    #[test]
    fn pages_are_contiguous(
        fixture in arb_fixture(),
        page_size in 1usize..7,
        descending in any::<bool>(),
    ) {
        let store = store_for(&fixture);
        let sort = if descending { "run_count:desc" } else { "run_count" };

        let mut full = Map::new();
        full.insert("sort".to_string(), json!(sort));
        full.insert("limit".to_string(), json!(200));
        let everything = ids(&run(&store, ActionMode::Filter, &full));

        let mut paged = Vec::new();
        let mut offset = 0;
        loop {
            let mut request = Map::new();
            request.insert("sort".to_string(), json!(sort));
            request.insert("limit".to_string(), json!(page_size));
            request.insert("offset".to_string(), json!(offset));
            let page = ids(&run(&store, ActionMode::Filter, &request));
            if page.is_empty() {
                break;
            }
            offset += page.len();
            paged.extend(page);
        }

        prop_assert_eq!(paged, everything);
    }
}
