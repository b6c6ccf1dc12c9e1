//! Action dispatch
//!
//! Runs a compiled request as `filter`, `count` or `history` against a
//! [`RecordStore`]. All validation has already happened; the store call is the
//! only await point. Storage failures discard the whole result.

use crate::core::error::{FilterError, FilterResult, IssueKind, ValidationError, ValidationIssue};
use crate::core::record::Record;
use crate::core::store::RecordStore;
use crate::query::history::{HistoryBucket, HistorySpec, bucketize};
use crate::query::pagination::ResolvedQuery;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// The read-only actions a collection exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    Filter,
    Count,
    History,
}

impl ActionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionMode::Filter => "filter",
            ActionMode::Count => "count",
            ActionMode::History => "history",
        }
    }
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filter" => Ok(ActionMode::Filter),
            "count" => Ok(ActionMode::Count),
            "history" => Ok(ActionMode::History),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// Everything needed to execute one request
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRequest {
    pub query: ResolvedQuery,
    /// Present when the request was compiled for `history`
    pub history: Option<HistorySpec>,
}

/// Typed outcome of an action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionResult {
    Records(Vec<Record>),
    Count(u64),
    History(Vec<HistoryBucket>),
}

impl ActionResult {
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            ActionResult::Records(records) => Some(records),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            ActionResult::Count(count) => Some(*count),
            _ => None,
        }
    }

    pub fn history(&self) -> Option<&[HistoryBucket]> {
        match self {
            ActionResult::History(buckets) => Some(buckets),
            _ => None,
        }
    }
}

/// Execute a compiled request
#[tracing::instrument(
    skip_all,
    fields(collection = %compiled.query.plan.primary(), mode = %mode)
)]
pub async fn execute(
    store: &dyn RecordStore,
    compiled: &CompiledRequest,
    mode: ActionMode,
) -> FilterResult<ActionResult> {
    let outcome = match mode {
        ActionMode::Filter => store
            .select(&compiled.query)
            .await
            .map(ActionResult::Records),
        ActionMode::Count => store
            .count(&compiled.query.plan)
            .await
            .map(ActionResult::Count),
        ActionMode::History => {
            let spec = compiled.history.as_ref().ok_or_else(|| {
                FilterError::from(ValidationError::single(ValidationIssue::new(
                    IssueKind::InvalidHistory,
                    "history",
                    "request was not compiled with history parameters",
                )))
            })?;
            store
                .history_points(&compiled.query.plan, spec)
                .await
                .map(|points| ActionResult::History(bucketize(spec, &points)))
        }
    };

    match outcome {
        Ok(result) => {
            tracing::debug!("action completed");
            Ok(result)
        }
        Err(err) => {
            tracing::error!(error = %err, transient = err.is_transient(), "storage failure");
            Err(FilterError::Storage(err))
        }
    }
}

/// Execute a compiled request, aborting the store call when `token` fires
pub async fn execute_cancellable(
    store: &dyn RecordStore,
    compiled: &CompiledRequest,
    mode: ActionMode,
    token: &CancellationToken,
) -> FilterResult<ActionResult> {
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::warn!(collection = %compiled.query.plan.primary(), mode = %mode, "request cancelled");
            Err(FilterError::Cancelled)
        }
        result = execute(store, compiled, mode) => result,
    }
}
