//! Record store abstraction
//!
//! The filter pipeline is storage-agnostic: it hands a validated plan to a
//! [`RecordStore`] and awaits the result. Stores evaluate related predicate
//! groups with semi-join semantics: a primary record matches a group when at
//! least one record reachable along the group's join path satisfies it.

use crate::core::error::StorageError;
use crate::core::record::Record;
use crate::query::history::{HistoryPoint, HistorySpec};
use crate::query::pagination::ResolvedQuery;
use crate::query::planner::QueryPlan;
use async_trait::async_trait;

/// Backing store executing query plans
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Matching primary records, ordered and windowed
    async fn select(&self, query: &ResolvedQuery) -> Result<Vec<Record>, StorageError>;

    /// Number of matching primary records
    async fn count(&self, plan: &QueryPlan) -> Result<u64, StorageError>;

    /// One point per matching primary record holding a value in `spec.field`
    ///
    /// Points outside the history range may be returned; they are dropped
    /// during bucketing.
    async fn history_points(
        &self,
        plan: &QueryPlan,
        spec: &HistorySpec,
    ) -> Result<Vec<HistoryPoint>, StorageError>;
}
