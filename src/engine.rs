//! The filter engine
//!
//! [`FilterEngine`] owns the immutable registries built from a
//! [`FilterConfig`] and runs the whole pipeline:
//!
//! ```text
//! body ─► FilterRequest ─► CriteriaParser ─► QueryPlanner ─► OrderBy/PageSpec
//!                                                         └► HistorySpec
//!      ─► dispatch::execute ─► RecordStore ─► ActionResult
//! ```
//!
//! Registries are shared behind `Arc` and never mutated, so one engine serves
//! any number of concurrent requests.

use crate::config::{FilterConfig, LimitsConfig};
use crate::core::criteria::CriteriaParser;
use crate::core::error::{
    ConfigError, FilterError, FilterResult, IssueKind, ValidationError, ValidationIssue,
};
use crate::core::operator::OperatorRegistry;
use crate::core::schema::{CollectionSchema, SchemaRegistry};
use crate::core::store::RecordStore;
use crate::joins::registry::JoinRegistry;
use crate::query::dispatch::{self, ActionMode, ActionResult, CompiledRequest};
use crate::query::history::HistorySpec;
use crate::query::pagination::{OrderBy, PageSpec, ResolvedQuery};
use crate::query::planner::{QueryPlan, QueryPlanner};
use crate::query::request::FilterRequest;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Compiles and runs filter requests
#[derive(Debug, Clone)]
pub struct FilterEngine {
    schemas: Arc<SchemaRegistry>,
    operators: Arc<OperatorRegistry>,
    joins: Arc<JoinRegistry>,
    limits: LimitsConfig,
}

impl FilterEngine {
    /// Build every registry from a configuration
    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        config.limits.check()?;
        let schemas = SchemaRegistry::from_config(config)?;
        let joins = JoinRegistry::new(config, &schemas)?;

        tracing::info!(
            collections = config.collections.len(),
            joins = config.joins.len(),
            max_limit = config.limits.max_limit,
            "filter engine ready"
        );

        Ok(Self {
            schemas: Arc::new(schemas),
            operators: Arc::new(OperatorRegistry::standard()),
            joins: Arc::new(joins),
            limits: config.limits.clone(),
        })
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    pub fn joins(&self) -> &JoinRegistry {
        &self.joins
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Parse and plan a filter document (collection name → criteria node)
    pub fn parse_and_plan(&self, primary: &str, document: &Value) -> FilterResult<QueryPlan> {
        let criteria = match document {
            Value::Null => serde_json::Map::new(),
            Value::Object(criteria) => criteria.clone(),
            other => {
                return Err(ValidationError::single(ValidationIssue::new(
                    IssueKind::MalformedCriteria,
                    "document",
                    format!("filter document must be a JSON object, got {}", other),
                ))
                .into());
            }
        };

        let tree = self.parser().parse(primary, &criteria)?;
        Ok(self.planner().plan(tree)?)
    }

    /// Validate a request body for an action, reporting every issue at once
    pub fn compile(
        &self,
        primary: &str,
        mode: ActionMode,
        body: &Value,
    ) -> FilterResult<CompiledRequest> {
        let schema = self.primary_schema(primary)?;
        let request = FilterRequest::from_body(body)?;
        let mut issues: Vec<ValidationIssue> = Vec::new();

        let tree = self
            .parser()
            .parse(primary, &request.criteria)
            .map_err(|err| issues.extend(err.into_issues()))
            .ok();

        // count ignores the window but still rejects a malformed one
        let order = OrderBy::resolve(request.sort.as_ref(), schema)
            .map_err(|issue| issues.push(issue))
            .ok();
        let page = PageSpec::resolve(request.limit.as_ref(), request.offset.as_ref(), &self.limits)
            .map_err(|found| issues.extend(found))
            .ok();

        let history = match mode {
            ActionMode::History => HistorySpec::resolve(&request.history, schema, &self.limits)
                .map_err(|found| issues.extend(found))
                .ok(),
            _ => None,
        };

        let (Some(tree), Some(order), Some(page)) = (tree, order, page) else {
            return Err(self.rejected(primary, mode, issues));
        };
        if !issues.is_empty() {
            return Err(self.rejected(primary, mode, issues));
        }

        let plan = self
            .planner()
            .plan(tree)
            .map_err(|err| self.rejected(primary, mode, err.into_issues()))?;

        tracing::debug!(
            collection = primary,
            mode = %mode,
            groups = plan.groups().len(),
            limit = page.limit,
            offset = page.offset,
            "request compiled"
        );

        Ok(CompiledRequest {
            query: ResolvedQuery { plan, order, page },
            history,
        })
    }

    /// Compile and execute a request
    pub async fn run(
        &self,
        store: &dyn RecordStore,
        primary: &str,
        mode: ActionMode,
        body: &Value,
    ) -> FilterResult<ActionResult> {
        let compiled = self.compile(primary, mode, body)?;
        dispatch::execute(store, &compiled, mode).await
    }

    /// Compile and execute a request that can be cancelled mid-flight
    pub async fn run_cancellable(
        &self,
        store: &dyn RecordStore,
        primary: &str,
        mode: ActionMode,
        body: &Value,
        token: &CancellationToken,
    ) -> FilterResult<ActionResult> {
        let compiled = self.compile(primary, mode, body)?;
        dispatch::execute_cancellable(store, &compiled, mode, token).await
    }

    fn primary_schema(&self, primary: &str) -> FilterResult<&CollectionSchema> {
        self.schemas.get(primary).map(|s| s.as_ref()).ok_or_else(|| {
            ValidationError::single(ValidationIssue::new(
                IssueKind::UnknownCollection,
                primary,
                format!("unknown collection '{}'", primary),
            ))
            .into()
        })
    }

    fn parser(&self) -> CriteriaParser<'_> {
        CriteriaParser::new(
            &self.schemas,
            &self.operators,
            &self.joins,
            self.limits.max_join_depth,
        )
    }

    fn planner(&self) -> QueryPlanner {
        QueryPlanner::new()
    }

    fn rejected(&self, primary: &str, mode: ActionMode, issues: Vec<ValidationIssue>) -> FilterError {
        tracing::warn!(
            collection = primary,
            mode = %mode,
            issues = issues.len(),
            "request rejected"
        );
        ValidationError::new(issues).into()
    }
}
