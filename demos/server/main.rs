//! Filter server over an in-memory store seeded with a few flows and runs
//!
//! ```text
//! cargo run --example server
//! curl -X POST localhost:3000/flow_runs/filter \
//!      -d '{"flows": {"tags": {"all_": ["prod"]}}, "sort": "expected_start_time:desc"}'
//! ```

use chrono::{Duration, TimeZone};
use flowscope::prelude::*;
use serde_json::json;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn seed(store: &InMemoryRecordStore) -> Result<()> {
    let etl = Uuid::new_v4();
    let report = Uuid::new_v4();
    let origin = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now);

    store.insert_many(
        "flows",
        vec![
            json!({"id": etl, "name": "nightly-etl", "tags": ["prod", "etl"], "created": origin}),
            json!({"id": report, "name": "weekly-report", "tags": ["dev"], "created": origin}),
        ],
    )?;

    let states = ["COMPLETED", "FAILED", "COMPLETED", "RUNNING", "CRASHED", "SCHEDULED"];
    let runs = states.iter().enumerate().map(|(i, state)| {
        let flow = if i % 2 == 0 { etl } else { report };
        json!({
            "id": Uuid::new_v4(),
            "name": format!("run-{}", i),
            "flow_id": flow,
            "state": {"type": state, "name": state.to_lowercase()},
            "run_count": i,
            "expected_start_time": origin + Duration::hours(i as i64),
        })
    });
    let inserted = store.insert_many("flow_runs", runs)?;

    tracing::info!(flows = 2, flow_runs = inserted, "sample data loaded");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = InMemoryRecordStore::new();
    seed(&store)?;

    let addr = std::env::var("FLOWSCOPE_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

    ServerBuilder::new()
        .with_config(FilterConfig::default_config())
        .with_store(store)
        .serve(&addr)
        .await
}
