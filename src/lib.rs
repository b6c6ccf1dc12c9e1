//! # flowscope
//!
//! Filter-criteria compiler and evaluator for the read-only query surface of a
//! workflow-orchestration API (`POST /<collection>/filter`, `/count`,
//! `/history`).
//!
//! ## Features
//!
//! - **Cross-Collection Criteria**: filter flow runs by the tags of their flow,
//!   flows by the state of their runs, through declared joins
//! - **Typed Operators**: `eq_`, `any_`, `not_any_`, `all_`, `is_null_`,
//!   `before_`, `after_`, `between_`, `like_`, checked against field types
//! - **Batch Validation**: every problem in a request is reported at once
//! - **Deterministic Paging**: requested sort plus a primary-key tie-breaker
//! - **Run History**: fixed-interval buckets with zero-filled gaps
//! - **Configuration-Based**: collections, joins and limits from YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowscope::prelude::*;
//!
//! let engine = FilterEngine::from_config(&FilterConfig::default_config())?;
//! let store = InMemoryRecordStore::new();
//!
//! let failed_prod_runs = engine
//!     .run(
//!         &store,
//!         "flow_runs",
//!         ActionMode::Filter,
//!         &serde_json::json!({
//!             "flows": { "tags": { "all_": ["prod"] } },
//!             "flow_runs": { "state": { "type": { "any_": ["FAILED"] } } },
//!             "sort": "expected_start_time:desc",
//!             "limit": 50
//!         }),
//!     )
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod joins;
pub mod query;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        criteria::{CriteriaNode, CriteriaParser, CriteriaTree, Predicate},
        error::{
            ConfigError, FilterError, FilterResult, IssueKind, StorageError, ValidationError,
            ValidationIssue,
        },
        field::{FieldKind, FieldPath, FieldValue},
        operator::{OperatorKind, OperatorRegistry},
        pluralize::Pluralizer,
        record::Record,
        schema::SchemaRegistry,
        store::RecordStore,
    };

    // === Engine & Query ===
    pub use crate::engine::FilterEngine;
    pub use crate::joins::{JoinPathError, JoinRegistry};
    pub use crate::query::{
        ActionMode, ActionResult, CompiledRequest, HistoryBucket, PageSpec, QueryPlan,
        SortDirection, execute, execute_cancellable,
    };

    // === Storage ===
    pub use crate::storage::InMemoryRecordStore;

    // === Config ===
    pub use crate::config::{CollectionConfig, FieldConfig, FilterConfig, JoinConfig, LimitsConfig};

    // === Server ===
    pub use crate::server::{FilterState, ServerBuilder, build_filter_routes};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use tokio_util::sync::CancellationToken;
    pub use uuid::Uuid;
}
