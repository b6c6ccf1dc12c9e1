//! Join registry
//!
//! Holds the declared edges between collections and resolves the join path
//! from a primary collection to any related one. Edges are walkable in both
//! directions; the shortest path wins, ties broken by collection name and
//! then by declaration order.

use crate::config::{FilterConfig, JoinConfig};
use crate::core::error::ConfigError;
use crate::core::field::{FieldKind, FieldPath};
use crate::core::join::{JoinDefinition, JoinPath, JoinStep};
use crate::core::schema::{CollectionSchema, SchemaRegistry};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Why no join path could be produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinPathError {
    /// No chain of declared joins within the depth bound connects the two
    Unreachable {
        from: String,
        to: String,
        max_depth: usize,
    },
}

impl fmt::Display for JoinPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinPathError::Unreachable {
                from,
                to,
                max_depth,
            } => write!(
                f,
                "no join path from '{}' to '{}' within {} joins",
                from, to, max_depth
            ),
        }
    }
}

impl std::error::Error for JoinPathError {}

/// Registry of declared joins
#[derive(Debug, Default)]
pub struct JoinRegistry {
    definitions: Vec<JoinDefinition>,
    /// collection -> indices into `definitions` touching it
    adjacency: HashMap<String, Vec<usize>>,
}

impl JoinRegistry {
    /// Validate the join declarations of a configuration
    pub fn new(config: &FilterConfig, schemas: &SchemaRegistry) -> Result<Self, ConfigError> {
        let mut definitions: Vec<JoinDefinition> = Vec::with_capacity(config.joins.len());

        for join in &config.joins {
            let definition = Self::definition(join, schemas)?;

            let duplicate = definitions.iter().any(|d| {
                d.from == definition.from
                    && d.to == definition.to
                    && d.local_field == definition.local_field
            });
            if duplicate {
                return Err(ConfigError::Duplicate {
                    what: "join".to_string(),
                    name: format!(
                        "{}.{} -> {}",
                        definition.from, definition.local_field, definition.to
                    ),
                });
            }
            definitions.push(definition);
        }

        let mut adjacency: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, definition) in definitions.iter().enumerate() {
            adjacency
                .entry(definition.from.clone())
                .or_default()
                .push(index);
            adjacency
                .entry(definition.to.clone())
                .or_default()
                .push(index);
        }

        tracing::debug!(joins = definitions.len(), "join registry built");

        Ok(Self {
            definitions,
            adjacency,
        })
    }

    fn definition(
        join: &JoinConfig,
        schemas: &SchemaRegistry,
    ) -> Result<JoinDefinition, ConfigError> {
        let context = format!("join {} -> {}", join.from, join.to);

        if join.from == join.to {
            return Err(ConfigError::JoinCycle {
                collection: join.from.clone(),
            });
        }

        let lookup = |name: &str| {
            schemas
                .get(name)
                .ok_or_else(|| ConfigError::UnknownCollection {
                    collection: name.to_string(),
                    context: context.clone(),
                })
        };
        let from = lookup(&join.from)?;
        let to = lookup(&join.to)?;

        let local_raw = join.resolved_local_field();
        let foreign_raw = join
            .foreign_field
            .clone()
            .unwrap_or_else(|| to.primary_key().to_string());

        let local_field = Self::join_column(from, &local_raw, &context)?;
        let foreign_field = Self::join_column(to, &foreign_raw, &context)?;

        Ok(JoinDefinition {
            from: join.from.clone(),
            to: join.to.clone(),
            local_field,
            foreign_field,
            description: join.description.clone(),
        })
    }

    /// A join column must exist and hold a scalar
    fn join_column(
        schema: &CollectionSchema,
        raw: &str,
        context: &str,
    ) -> Result<FieldPath, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            field: context.to_string(),
            message,
        };

        let path = FieldPath::parse(raw).map_err(|e| invalid(e.to_string()))?;
        let field = schema.resolve(&path).map_err(|_| {
            invalid(format!(
                "field '{}' is not declared on '{}'",
                raw,
                schema.name()
            ))
        })?;
        match field.kind() {
            FieldKind::Tags | FieldKind::Object | FieldKind::Float => Err(invalid(format!(
                "'{}.{}' is a {} field and cannot be joined on",
                schema.name(),
                raw,
                field.kind()
            ))),
            _ => Ok(path),
        }
    }

    /// Every declared join, in declaration order
    pub fn definitions(&self) -> &[JoinDefinition] {
        &self.definitions
    }

    /// Steps leaving a collection, sorted by destination then declaration order
    pub fn steps_from(&self, collection: &str) -> Vec<JoinStep> {
        let mut steps: Vec<(usize, JoinStep)> = self
            .adjacency
            .get(collection)
            .into_iter()
            .flatten()
            .filter_map(|&index| {
                self.definitions[index]
                    .step_from(collection)
                    .map(|step| (index, step))
            })
            .collect();
        steps.sort_by(|(ia, a), (ib, b)| a.to.cmp(&b.to).then(ia.cmp(ib)));
        steps.into_iter().map(|(_, step)| step).collect()
    }

    /// Collections directly joined to `collection`
    pub fn neighbours(&self, collection: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .steps_from(collection)
            .into_iter()
            .map(|s| s.to)
            .collect();
        names.dedup();
        names
    }

    /// Shortest join path from `from` to `to`, at most `max_depth` hops
    ///
    /// A collection joined to itself yields an empty path.
    pub fn resolve_path(
        &self,
        from: &str,
        to: &str,
        max_depth: usize,
    ) -> Result<JoinPath, JoinPathError> {
        if from == to {
            return Ok(JoinPath::default());
        }

        // collection -> step that first reached it
        let mut parents: HashMap<String, JoinStep> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([from.to_string()]);
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(from.to_string(), 0)]);
        let mut found = false;

        while let Some((current, depth)) = queue.pop_front() {
            if current == to {
                found = true;
                break;
            }
            if depth >= max_depth {
                continue;
            }
            for step in self.steps_from(&current) {
                if visited.insert(step.to.clone()) {
                    queue.push_back((step.to.clone(), depth + 1));
                    parents.insert(step.to.clone(), step);
                }
            }
        }

        if !found {
            return Err(JoinPathError::Unreachable {
                from: from.to_string(),
                to: to.to_string(),
                max_depth,
            });
        }

        // each collection enters `parents` once, so the walk back is a simple path
        let mut steps = Vec::new();
        let mut cursor = to;
        while cursor != from {
            let step = parents.get(cursor).ok_or_else(|| JoinPathError::Unreachable {
                from: from.to_string(),
                to: to.to_string(),
                max_depth,
            })?;
            cursor = step.from.as_str();
            steps.push(step.clone());
        }
        steps.reverse();

        Ok(JoinPath::new(steps))
    }
}
