//! In-memory implementation of RecordStore for testing and development

use crate::core::error::StorageError;
use crate::core::evaluate::PredicateFilter;
use crate::core::field::FieldKind;
use crate::core::record::Record;
use crate::core::store::RecordStore;
use crate::query::history::{HistoryPoint, HistorySpec};
use crate::query::pagination::ResolvedQuery;
use crate::query::planner::{PredicateGroup, QueryPlan};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

const BACKEND: &str = "in-memory";

type Collections = HashMap<String, Vec<Record>>;

/// In-memory record store
///
/// Useful for testing and development. Uses RwLock for thread-safe access.
/// Collections that were never written to are empty.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    collections: Arc<RwLock<Collections>>,
}

impl InMemoryRecordStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to a collection
    pub fn insert(&self, collection: &str, record: Record) -> Result<(), StorageError> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    /// Append JSON objects to a collection; non-objects are rejected
    pub fn insert_many(
        &self,
        collection: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<usize, StorageError> {
        let records = values
            .into_iter()
            .map(|value| {
                Record::from_value(value).ok_or_else(|| StorageError::IntegrityError {
                    message: format!("records of '{}' must be JSON objects", collection),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let inserted = records.len();
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(records);
        Ok(inserted)
    }

    /// Number of records stored in a collection
    pub fn len(&self, collection: &str) -> Result<usize, StorageError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections.get(collection).map_or(0, Vec::len))
    }

    pub fn is_empty(&self, collection: &str) -> Result<bool, StorageError> {
        Ok(self.len(collection)? == 0)
    }

    /// Remove every record of every collection
    pub fn clear(&self) -> Result<(), StorageError> {
        self.collections.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }

    /// Primary records satisfying every group of a plan, in storage order
    fn matching<'a>(collections: &'a Collections, plan: &QueryPlan) -> Vec<&'a Record> {
        let Some(primary) = collections.get(plan.primary()) else {
            return Vec::new();
        };

        let related: Vec<RelatedFilter> = plan
            .related_groups()
            .iter()
            .map(|group| RelatedFilter::build(collections, group))
            .collect();

        primary
            .iter()
            .filter(|record| PredicateFilter::matches(record, &plan.primary_group().predicates))
            .filter(|record| related.iter().all(|filter| filter.admits(record)))
            .collect()
    }
}

/// Join keys a primary record must hold to satisfy a related group
///
/// Built by walking the join path backwards from the matching related
/// records, so each group is evaluated once per request.
struct RelatedFilter<'p> {
    group: &'p PredicateGroup,
    keys: HashSet<String>,
}

impl<'p> RelatedFilter<'p> {
    fn build(collections: &Collections, group: &'p PredicateGroup) -> Self {
        let steps = group.join.as_ref().map(|j| j.steps()).unwrap_or_default();

        let mut current: Vec<&Record> = records_of(collections, &group.collection)
            .iter()
            .filter(|record| PredicateFilter::matches(record, &group.predicates))
            .collect();
        let mut keys = HashSet::new();

        for (index, step) in steps.iter().enumerate().rev() {
            keys = current
                .iter()
                .filter_map(|record| record.join_key(&step.target_field))
                .collect();
            if index == 0 {
                break;
            }
            current = records_of(collections, &step.from)
                .iter()
                .filter(|record| {
                    record
                        .join_key(&step.source_field)
                        .is_some_and(|key| keys.contains(&key))
                })
                .collect();
        }

        Self { group, keys }
    }

    fn admits(&self, record: &Record) -> bool {
        let Some(first) = self.group.join.as_ref().and_then(|j| j.steps().first()) else {
            return true;
        };
        record
            .join_key(&first.source_field)
            .is_some_and(|key| self.keys.contains(&key))
    }
}

fn records_of<'c>(collections: &'c Collections, name: &str) -> &'c [Record] {
    collections.get(name).map(Vec::as_slice).unwrap_or_default()
}

fn poisoned() -> StorageError {
    StorageError::Unavailable {
        backend: BACKEND.to_string(),
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn select(&self, query: &ResolvedQuery) -> Result<Vec<Record>, StorageError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;

        let mut records = Self::matching(&collections, &query.plan);
        records.sort_by(|a, b| query.order.compare(a, b));

        Ok(query.page.window(records.into_iter().cloned()))
    }

    async fn count(&self, plan: &QueryPlan) -> Result<u64, StorageError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(Self::matching(&collections, plan).len() as u64)
    }

    async fn history_points(
        &self,
        plan: &QueryPlan,
        spec: &HistorySpec,
    ) -> Result<Vec<HistoryPoint>, StorageError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;

        Ok(Self::matching(&collections, plan)
            .into_iter()
            .filter_map(|record| {
                let at = record
                    .field_value(&spec.field, FieldKind::DateTime)?
                    .as_datetime()?;
                let group = spec
                    .group_by
                    .as_ref()
                    .and_then(|path| record.get(path))
                    .and_then(|value| match value {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    });
                Some(HistoryPoint { at, group })
            })
            .collect())
    }
}
