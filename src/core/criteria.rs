//! Criteria documents and their parser
//!
//! A filter document maps collection names to criteria nodes:
//!
//! ```json
//! {
//!   "flows": { "tags": { "all_": ["prod"] } },
//!   "flow_runs": { "state": { "type": { "any_": ["FAILED", "CRASHED"] } } }
//! }
//! ```
//!
//! Nested field objects and dotted keys (`"state.type"`) resolve to the same
//! [`FieldPath`]. The parser never stops at the first problem: every issue in
//! the document is collected into one [`ValidationError`].

use crate::core::error::{IssueKind, ValidationError, ValidationIssue};
use crate::core::field::{FieldKind, FieldPath};
use crate::core::join::JoinPath;
use crate::core::operator::{LookupError, Operand, OperatorKind, OperatorRegistry};
use crate::core::schema::{CollectionSchema, FieldSchema, PathError, SchemaRegistry};
use crate::joins::registry::JoinRegistry;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Logical combinator keys; only the implicit AND is supported
pub const COMBINATOR_KEYS: [&str; 3] = ["and_", "or_", "not_"];

/// Key selecting the combinator of a node or clause
pub const OPERATOR_KEY: &str = "operator";

/// A single typed comparison against one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub path: FieldPath,
    pub field_kind: FieldKind,
    pub operator: OperatorKind,
    pub operand: Operand,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.operator, self.operand)
    }
}

/// The ANDed predicates targeting one collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriteriaNode {
    pub collection: String,
    pub predicates: Vec<Predicate>,
    /// Path back to the primary collection; `None` on the primary node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinPath>,
}

impl CriteriaNode {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            predicates: Vec::new(),
            join: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// A parsed, validated filter document
///
/// The primary collection always has a node, possibly empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriteriaTree {
    pub primary: String,
    pub nodes: BTreeMap<String, CriteriaNode>,
}

impl CriteriaTree {
    pub fn primary_node(&self) -> Option<&CriteriaNode> {
        self.nodes.get(&self.primary)
    }

    /// Nodes of every collection other than the primary one, in name order
    pub fn related(&self) -> impl Iterator<Item = &CriteriaNode> {
        self.nodes
            .values()
            .filter(move |node| node.collection != self.primary)
    }

    pub fn predicate_count(&self) -> usize {
        self.nodes.values().map(|n| n.predicates.len()).sum()
    }
}

/// Turns raw criteria maps into a [`CriteriaTree`]
pub struct CriteriaParser<'a> {
    schemas: &'a SchemaRegistry,
    operators: &'a OperatorRegistry,
    joins: &'a JoinRegistry,
    max_join_depth: usize,
}

impl<'a> CriteriaParser<'a> {
    pub fn new(
        schemas: &'a SchemaRegistry,
        operators: &'a OperatorRegistry,
        joins: &'a JoinRegistry,
        max_join_depth: usize,
    ) -> Self {
        Self {
            schemas,
            operators,
            joins,
            max_join_depth,
        }
    }

    /// Parse the criteria of a request whose primary collection is `primary`
    pub fn parse(
        &self,
        primary: &str,
        criteria: &Map<String, Value>,
    ) -> Result<CriteriaTree, ValidationError> {
        let mut issues = Vec::new();
        let mut nodes = BTreeMap::new();

        if !self.schemas.contains(primary) {
            return Err(ValidationError::single(ValidationIssue::new(
                IssueKind::UnknownCollection,
                primary,
                format!("unknown collection '{}'", primary),
            )));
        }
        nodes.insert(primary.to_string(), CriteriaNode::new(primary));

        for (key, value) in criteria {
            if COMBINATOR_KEYS.contains(&key.as_str()) {
                issues.push(combinator_issue(key, key));
                continue;
            }

            let Some(schema) = self.schemas.get(key) else {
                issues.push(ValidationIssue::new(
                    IssueKind::UnknownCollection,
                    key.as_str(),
                    format!("unknown collection '{}'", key),
                ));
                continue;
            };

            let join = if key == primary {
                None
            } else {
                match self.joins.resolve_path(primary, key, self.max_join_depth) {
                    Ok(path) => Some(path),
                    Err(err) => {
                        issues.push(ValidationIssue::new(
                            IssueKind::UnreachableCollection,
                            key.as_str(),
                            err.to_string(),
                        ));
                        continue;
                    }
                }
            };

            let Some(object) = value.as_object() else {
                issues.push(ValidationIssue::new(
                    IssueKind::MalformedCriteria,
                    key.as_str(),
                    format!("criteria for '{}' must be an object, got {}", key, value),
                ));
                continue;
            };

            let mut predicates = Vec::new();
            self.parse_object(schema, None, object, key, &mut predicates, &mut issues);
            canonical_order(&mut predicates);

            nodes.insert(
                key.clone(),
                CriteriaNode {
                    collection: key.clone(),
                    predicates,
                    join,
                },
            );
        }

        if issues.is_empty() {
            Ok(CriteriaTree {
                primary: primary.to_string(),
                nodes,
            })
        } else {
            Err(ValidationError::new(issues))
        }
    }

    /// Walk one level of a criteria node
    fn parse_object(
        &self,
        schema: &CollectionSchema,
        prefix: Option<&FieldPath>,
        object: &Map<String, Value>,
        location: &str,
        predicates: &mut Vec<Predicate>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for (key, value) in object {
            let here = format!("{}.{}", location, key);

            if COMBINATOR_KEYS.contains(&key.as_str()) {
                issues.push(combinator_issue(&here, key));
                continue;
            }
            if key == OPERATOR_KEY {
                check_operator_key(&here, value, issues);
                continue;
            }

            let relative = match FieldPath::parse(key) {
                Ok(path) => path,
                Err(err) => {
                    issues.push(ValidationIssue::new(
                        IssueKind::InvalidFieldPath,
                        here,
                        err.to_string(),
                    ));
                    continue;
                }
            };
            let path = match prefix {
                Some(prefix) => prefix.join(&relative),
                None => relative,
            };

            let field = match schema.resolve(&path) {
                Ok(field) => field,
                Err(err) => {
                    issues.push(path_issue(schema, &path, &here, err));
                    continue;
                }
            };

            let Some(clause) = value.as_object() else {
                issues.push(ValidationIssue::new(
                    IssueKind::MalformedCriteria,
                    here,
                    format!("expected an operator clause for '{}', got {}", path, value),
                ));
                continue;
            };

            // `{}` is a clause naming no operator, even on object fields
            if field.kind() == FieldKind::Object && !clause.is_empty() && !looks_like_clause(clause) {
                self.parse_object(schema, Some(&path), clause, &here, predicates, issues);
                continue;
            }

            if let Some(predicate) = self.parse_clause(&path, field, clause, &here, issues) {
                predicates.push(predicate);
            }
        }
    }

    /// Parse `{ "<operator>": <operand> }` for a resolved field
    fn parse_clause(
        &self,
        path: &FieldPath,
        field: &FieldSchema,
        clause: &Map<String, Value>,
        location: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Predicate> {
        let mut operators: Vec<(&String, &Value)> = Vec::with_capacity(1);
        let mut failed = false;

        for (key, value) in clause {
            let here = format!("{}.{}", location, key);
            if COMBINATOR_KEYS.contains(&key.as_str()) {
                issues.push(combinator_issue(&here, key));
                failed = true;
            } else if key == OPERATOR_KEY {
                failed |= !check_operator_key(&here, value, issues);
            } else {
                operators.push((key, value));
            }
        }

        let (name, raw) = match operators.as_slice() {
            [] => {
                issues.push(ValidationIssue::new(
                    IssueKind::MalformedCriteria,
                    location,
                    format!("clause for '{}' names no operator", path),
                ));
                return None;
            }
            [single] => *single,
            many => {
                let names: Vec<&str> = many.iter().map(|(k, _)| k.as_str()).collect();
                issues.push(ValidationIssue::new(
                    IssueKind::MultipleOperators,
                    location,
                    format!(
                        "clause for '{}' names {} operators ({}); use one per clause",
                        path,
                        many.len(),
                        names.join(", ")
                    ),
                ));
                return None;
            }
        };
        let here = format!("{}.{}", location, name);

        let spec = match self.operators.lookup(name, field.kind()) {
            Ok(spec) => spec,
            Err(err) => {
                let message = match &err {
                    LookupError::Unknown { .. } => err.to_string(),
                    LookupError::Unsupported { .. } => format!(
                        "{}; '{}' accepts {}",
                        err,
                        path,
                        self.describe_operators(field.kind())
                    ),
                };
                issues.push(ValidationIssue::new(
                    IssueKind::UnsupportedOperator,
                    here,
                    message,
                ));
                return None;
            }
        };

        let operand = match spec.coerce(&field.field_type, raw) {
            Ok(operand) => operand,
            Err(message) => {
                issues.push(ValidationIssue::new(IssueKind::TypeMismatch, here, message));
                return None;
            }
        };

        if failed {
            return None;
        }

        Some(Predicate {
            path: path.clone(),
            field_kind: field.kind(),
            operator: spec.kind,
            operand,
        })
    }

    fn describe_operators(&self, kind: FieldKind) -> String {
        let names: Vec<&str> = self
            .operators
            .operators_for(kind)
            .iter()
            .map(|op| op.name())
            .collect();
        names.join(", ")
    }
}

/// An object value on an `object` field is a clause when all of its keys are
/// operator-shaped (`*_`) and none is a combinator
fn looks_like_clause(value: &Map<String, Value>) -> bool {
    !value.is_empty()
        && value.keys().all(|key| {
            key == OPERATOR_KEY || (key.ends_with('_') && !COMBINATOR_KEYS.contains(&key.as_str()))
        })
}

/// Accept `"operator": "and_"`; anything else is an unsupported combinator
fn check_operator_key(location: &str, value: &Value, issues: &mut Vec<ValidationIssue>) -> bool {
    if value.as_str() == Some("and_") {
        return true;
    }
    issues.push(ValidationIssue::new(
        IssueKind::UnsupportedCombinator,
        location,
        format!("only the 'and_' combinator is supported, got {}", value),
    ));
    false
}

fn combinator_issue(location: &str, key: &str) -> ValidationIssue {
    ValidationIssue::new(
        IssueKind::UnsupportedCombinator,
        location,
        format!(
            "combinator '{}' is not supported; criteria are always ANDed",
            key
        ),
    )
}

fn path_issue(
    schema: &CollectionSchema,
    path: &FieldPath,
    location: &str,
    err: PathError,
) -> ValidationIssue {
    match err {
        PathError::UnknownField { depth } => ValidationIssue::new(
            IssueKind::UnknownField,
            location,
            format!(
                "'{}' has no field '{}'",
                schema.name(),
                display_prefix(path, depth + 1)
            ),
        ),
        PathError::NotAnObject { depth } => ValidationIssue::new(
            IssueKind::InvalidFieldPath,
            location,
            format!(
                "'{}' is not an object field and has no '{}'",
                display_prefix(path, depth),
                path.segments()[depth]
            ),
        ),
    }
}

fn display_prefix(path: &FieldPath, len: usize) -> String {
    path.segments()[..len.min(path.len())].join(".")
}

/// Sort predicates by (path, operator) so key order never changes a plan
fn canonical_order(predicates: &mut [Predicate]) {
    predicates.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then(a.operator.cmp(&b.operator))
            .then_with(|| a.operand.to_string().cmp(&b.operand.to_string()))
    });
}
