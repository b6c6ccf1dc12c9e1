//! REST routes for the filter actions
//!
//! The handlers only forward to [`FilterEngine`]; all query logic lives in the
//! core. Bodies are read as raw bytes so an empty body means "no criteria" and
//! malformed JSON surfaces as a validation error like any other.

use crate::core::error::{FilterError, IssueKind, ValidationError, ValidationIssue};
use crate::core::store::RecordStore;
use crate::engine::FilterEngine;
use crate::query::dispatch::{ActionMode, ActionResult};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;

/// State shared across filter handlers
#[derive(Clone)]
pub struct FilterState {
    pub engine: Arc<FilterEngine>,
    pub store: Arc<dyn RecordStore>,
}

impl FilterState {
    pub fn new(engine: FilterEngine, store: impl RecordStore + 'static) -> Self {
        Self {
            engine: Arc::new(engine),
            store: Arc::new(store),
        }
    }
}

/// Build the filter routes
///
/// - POST /{collection}/filter - matching records, sorted and paged
/// - POST /{collection}/count - number of matching records
/// - POST /{collection}/history - matching records bucketed over time
/// - GET /health - liveness check
pub fn build_filter_routes(state: FilterState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/{collection}/filter", post(filter_records))
        .route("/{collection}/count", post(count_records))
        .route("/{collection}/history", post(record_history))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "flowscope"
    }))
}

async fn filter_records(
    State(state): State<FilterState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> Result<Json<ActionResult>, FilterError> {
    run_action(&state, &collection, ActionMode::Filter, &body).await
}

async fn count_records(
    State(state): State<FilterState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> Result<Json<ActionResult>, FilterError> {
    run_action(&state, &collection, ActionMode::Count, &body).await
}

async fn record_history(
    State(state): State<FilterState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> Result<Json<ActionResult>, FilterError> {
    run_action(&state, &collection, ActionMode::History, &body).await
}

async fn run_action(
    state: &FilterState,
    collection: &str,
    mode: ActionMode,
    body: &[u8],
) -> Result<Json<ActionResult>, FilterError> {
    let body = parse_body(body)?;
    let result = state
        .engine
        .run(state.store.as_ref(), collection, mode, &body)
        .await?;
    Ok(Json(result))
}

fn parse_body(body: &[u8]) -> Result<Value, FilterError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        ValidationError::single(ValidationIssue::new(
            IssueKind::MalformedCriteria,
            "body",
            format!("request body is not valid JSON: {}", e),
        ))
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_body() {
        assert_eq!(parse_body(b"").unwrap(), Value::Null);
        assert_eq!(parse_body(b"  \n").unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_invalid_body() {
        let err = parse_body(b"{flows").unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_parse_json_body() {
        assert_eq!(parse_body(br#"{"limit": 5}"#).unwrap(), json!({"limit": 5}));
    }
}
