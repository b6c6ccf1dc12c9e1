//! From request body to executed action
//!
//! [`request`] splits the body, [`planner`] builds the plan, [`pagination`]
//! and [`history`] attach ordering, windows and buckets, and [`dispatch`]
//! runs the result against a record store.

pub mod dispatch;
pub mod history;
pub mod pagination;
pub mod planner;
pub mod request;

pub use dispatch::{ActionMode, ActionResult, CompiledRequest, execute, execute_cancellable};
pub use history::{HistoryBucket, HistoryPoint, HistorySpec, bucketize};
pub use pagination::{OrderBy, PageSpec, ResolvedQuery, SortDirection, SortSpec};
pub use planner::{PredicateGroup, QueryPlan, QueryPlanner};
pub use request::{FilterRequest, HistoryParams, RESERVED_KEYS};
