//! Configuration loading and management
//!
//! A [`FilterConfig`] declares the queryable collections (with their field
//! schemas), the join edges between them and the query limits. It is read
//! once at start-up, usually from YAML:
//!
//! ```yaml
//! collections:
//!   - name: flows
//!     time_field: created
//!     fields:
//!       - { name: id, type: uuid }
//!       - { name: tags, type: tags }
//!       - { name: created, type: datetime }
//!   - name: flow_runs
//!     fields:
//!       - { name: id, type: uuid }
//!       - { name: flow_id, type: uuid }
//!       - name: state
//!         type: object
//!         fields:
//!           - { name: type, type: enum, values: [COMPLETED, FAILED] }
//! joins:
//!   - from: flow_runs
//!     to: flows
//! limits:
//!   default_limit: 200
//!   max_limit: 200
//! ```

use crate::core::error::ConfigError;
use crate::core::field::FieldKind;
use crate::core::pluralize::Pluralizer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Declaration of one field, possibly with nested fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: FieldKind,

    /// Allowed values for `enum` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    /// Children of `object` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldConfig>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            values: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            values: values.iter().map(|v| v.to_string()).collect(),
            ..Self::new(name, FieldKind::Enum)
        }
    }

    pub fn object(name: impl Into<String>, fields: Vec<FieldConfig>) -> Self {
        Self {
            fields,
            ..Self::new(name, FieldKind::Object)
        }
    }
}

/// Configuration for a queryable collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionConfig {
    /// Plural snake_case name (e.g., "flow_runs")
    pub name: String,

    /// Field holding the record identity, used as the sort tie-breaker
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Default datetime field for history buckets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_field: Option<String>,

    pub fields: Vec<FieldConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// A declared relationship between two collections
///
/// `from.local_field` references `to.foreign_field`. Joins are traversable in
/// both directions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinConfig {
    pub from: String,
    pub to: String,

    /// Defaults to the singular of `to` suffixed with `_id` (`flows` → `flow_id`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_field: Option<String>,

    /// Defaults to the primary key of `to`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl JoinConfig {
    /// `local_field`, or the default derived from `to`
    pub fn resolved_local_field(&self) -> String {
        self.local_field
            .clone()
            .unwrap_or_else(|| Pluralizer::foreign_key(&self.to))
    }
}

/// Query limits applied by the pagination, planner and history stages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct LimitsConfig {
    /// Limit applied when a request does not supply one
    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    pub default_limit: usize,

    /// Largest accepted limit; larger requests are rejected, not clamped
    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    pub max_limit: usize,

    /// Longest join path the planner will build
    #[serde(default = "default_max_join_depth")]
    #[validate(range(min = 1, max = 8))]
    pub max_join_depth: usize,

    /// Most buckets a single history request may produce
    #[serde(default = "default_max_history_buckets")]
    #[validate(range(min = 1))]
    pub max_history_buckets: usize,
}

fn default_limit() -> usize {
    200
}

fn default_max_join_depth() -> usize {
    3
}

fn default_max_history_buckets() -> usize {
    500
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_limit(),
            max_join_depth: default_max_join_depth(),
            max_history_buckets: default_max_history_buckets(),
        }
    }
}

impl LimitsConfig {
    /// Check ranges and that the default limit does not exceed the cap
    pub fn check(&self) -> std::result::Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::InvalidValue {
            field: "limits".to_string(),
            message: e.to_string(),
        })?;
        if self.default_limit > self.max_limit {
            return Err(ConfigError::InvalidValue {
                field: "limits.default_limit".to_string(),
                message: format!(
                    "default_limit {} exceeds max_limit {}",
                    self.default_limit, self.max_limit
                ),
            });
        }
        Ok(())
    }
}

/// Complete configuration for the filter engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterConfig {
    pub collections: Vec<CollectionConfig>,

    #[serde(default)]
    pub joins: Vec<JoinConfig>,

    #[serde(default)]
    pub limits: LimitsConfig,
}

impl FilterConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Merge several configurations into one
    ///
    /// Collections are keyed by name and later declarations replace earlier
    /// ones. Joins are deduplicated on `(from, to, local_field)`, with an
    /// omitted `local_field` compared as its default. Limits come from the
    /// last configuration.
    pub fn merge(configs: Vec<FilterConfig>) -> Self {
        let mut collections: Vec<CollectionConfig> = Vec::new();
        let mut joins: Vec<JoinConfig> = Vec::new();
        let mut limits = LimitsConfig::default();

        for config in configs {
            for collection in config.collections {
                match collections.iter_mut().find(|c| c.name == collection.name) {
                    Some(existing) => *existing = collection,
                    None => collections.push(collection),
                }
            }

            for join in config.joins {
                let local_field = join.resolved_local_field();
                let duplicate = joins.iter().any(|j| {
                    j.from == join.from
                        && j.to == join.to
                        && j.resolved_local_field() == local_field
                });
                if !duplicate {
                    joins.push(join);
                }
            }

            limits = config.limits;
        }

        Self {
            collections,
            joins,
            limits,
        }
    }

    /// Find a collection declaration by name
    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// The workflow-orchestration collections: flows, deployments, flow runs
    /// and task runs
    pub fn default_config() -> Self {
        let state = || {
            FieldConfig::object(
                "state",
                vec![
                    FieldConfig::enumeration(
                        "type",
                        &[
                            "SCHEDULED",
                            "PENDING",
                            "RUNNING",
                            "COMPLETED",
                            "FAILED",
                            "CANCELLED",
                            "CRASHED",
                        ],
                    ),
                    FieldConfig::new("name", FieldKind::String),
                    FieldConfig::new("timestamp", FieldKind::DateTime),
                ],
            )
        };

        Self {
            collections: vec![
                CollectionConfig {
                    name: "flows".to_string(),
                    primary_key: default_primary_key(),
                    time_field: Some("created".to_string()),
                    fields: vec![
                        FieldConfig::new("id", FieldKind::Uuid),
                        FieldConfig::new("name", FieldKind::String),
                        FieldConfig::new("tags", FieldKind::Tags),
                        FieldConfig::new("created", FieldKind::DateTime),
                        FieldConfig::new("updated", FieldKind::DateTime),
                    ],
                    description: Some("Registered workflows".to_string()),
                },
                CollectionConfig {
                    name: "deployments".to_string(),
                    primary_key: default_primary_key(),
                    time_field: Some("created".to_string()),
                    fields: vec![
                        FieldConfig::new("id", FieldKind::Uuid),
                        FieldConfig::new("name", FieldKind::String),
                        FieldConfig::new("flow_id", FieldKind::Uuid),
                        FieldConfig::new("is_schedule_active", FieldKind::Boolean),
                        FieldConfig::new("tags", FieldKind::Tags),
                        FieldConfig::new("created", FieldKind::DateTime),
                    ],
                    description: Some("Server-side flow configurations".to_string()),
                },
                CollectionConfig {
                    name: "flow_runs".to_string(),
                    primary_key: default_primary_key(),
                    time_field: Some("expected_start_time".to_string()),
                    fields: vec![
                        FieldConfig::new("id", FieldKind::Uuid),
                        FieldConfig::new("name", FieldKind::String),
                        FieldConfig::new("flow_id", FieldKind::Uuid),
                        FieldConfig::new("deployment_id", FieldKind::Uuid),
                        FieldConfig::new("parent_task_run_id", FieldKind::Uuid),
                        FieldConfig::new("tags", FieldKind::Tags),
                        state(),
                        FieldConfig::new("run_count", FieldKind::Integer),
                        FieldConfig::new("expected_start_time", FieldKind::DateTime),
                        FieldConfig::new("start_time", FieldKind::DateTime),
                        FieldConfig::new("end_time", FieldKind::DateTime),
                        FieldConfig::new("total_run_time", FieldKind::Float),
                        FieldConfig::new("created", FieldKind::DateTime),
                    ],
                    description: Some("Executions of flows".to_string()),
                },
                CollectionConfig {
                    name: "task_runs".to_string(),
                    primary_key: default_primary_key(),
                    time_field: Some("expected_start_time".to_string()),
                    fields: vec![
                        FieldConfig::new("id", FieldKind::Uuid),
                        FieldConfig::new("name", FieldKind::String),
                        FieldConfig::new("flow_run_id", FieldKind::Uuid),
                        FieldConfig::new("task_key", FieldKind::String),
                        FieldConfig::new("tags", FieldKind::Tags),
                        state(),
                        FieldConfig::new("run_count", FieldKind::Integer),
                        FieldConfig::new("expected_start_time", FieldKind::DateTime),
                        FieldConfig::new("start_time", FieldKind::DateTime),
                        FieldConfig::new("end_time", FieldKind::DateTime),
                        FieldConfig::new("created", FieldKind::DateTime),
                    ],
                    description: Some("Executions of tasks inside flow runs".to_string()),
                },
            ],
            joins: vec![
                JoinConfig {
                    from: "flow_runs".to_string(),
                    to: "flows".to_string(),
                    local_field: None,
                    foreign_field: None,
                    description: Some("Flow run belongs to a flow".to_string()),
                },
                JoinConfig {
                    from: "flow_runs".to_string(),
                    to: "deployments".to_string(),
                    local_field: None,
                    foreign_field: None,
                    description: Some("Flow run created from a deployment".to_string()),
                },
                JoinConfig {
                    from: "deployments".to_string(),
                    to: "flows".to_string(),
                    local_field: None,
                    foreign_field: None,
                    description: Some("Deployment targets a flow".to_string()),
                },
                JoinConfig {
                    from: "task_runs".to_string(),
                    to: "flow_runs".to_string(),
                    local_field: None,
                    foreign_field: None,
                    description: Some("Task run executes inside a flow run".to_string()),
                },
            ],
            limits: LimitsConfig::default(),
        }
    }
}
