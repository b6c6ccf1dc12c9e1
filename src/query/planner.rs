//! Query planning
//!
//! Turns a [`CriteriaTree`] into a [`QueryPlan`]: one predicate group per
//! collection, the primary group first, related groups in name order, each
//! related group carrying the join path that links it back to the primary
//! collection.

use crate::core::criteria::{CriteriaTree, Predicate};
use crate::core::error::{IssueKind, ValidationError, ValidationIssue};
use crate::core::join::JoinPath;
use serde::Serialize;
use std::fmt;

/// Predicates targeting one collection
///
/// A related group matches a primary record when at least one record reached
/// along `join` satisfies all of `predicates`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredicateGroup {
    pub collection: String,
    pub predicates: Vec<Predicate>,
    /// `None` for the primary group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinPath>,
}

impl PredicateGroup {
    pub fn is_primary(&self) -> bool {
        self.join.is_none()
    }
}

/// An executable, storage-independent query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    primary: String,
    groups: Vec<PredicateGroup>,
}

impl QueryPlan {
    /// A plan matching every record of a collection
    pub fn unfiltered(primary: impl Into<String>) -> Self {
        let primary = primary.into();
        Self {
            groups: vec![PredicateGroup {
                collection: primary.clone(),
                predicates: Vec::new(),
                join: None,
            }],
            primary,
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// All groups, primary first
    pub fn groups(&self) -> &[PredicateGroup] {
        &self.groups
    }

    pub fn primary_group(&self) -> &PredicateGroup {
        &self.groups[0]
    }

    pub fn related_groups(&self) -> &[PredicateGroup] {
        &self.groups[1..]
    }

    /// Whether the plan places no constraint at all
    pub fn is_unfiltered(&self) -> bool {
        self.groups.len() == 1 && self.groups[0].predicates.is_empty()
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, group) in self.groups.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            match &group.join {
                None => write!(f, "{}", group.collection)?,
                Some(join) => write!(f, "{} via [{}]", group.collection, join)?,
            }
            let predicates: Vec<String> = group.predicates.iter().map(|p| p.to_string()).collect();
            write!(f, " where [{}]", predicates.join(" AND "))?;
        }
        Ok(())
    }
}

/// Assembles query plans from parsed criteria
///
/// Join paths are resolved once, by the parser; a related node arriving
/// without one is rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, tree: CriteriaTree) -> Result<QueryPlan, ValidationError> {
        let CriteriaTree { primary, mut nodes } = tree;
        let mut issues = Vec::new();

        let primary_group = PredicateGroup {
            collection: primary.clone(),
            predicates: nodes
                .remove(&primary)
                .map(|node| node.predicates)
                .unwrap_or_default(),
            join: None,
        };
        let mut groups = vec![primary_group];

        // BTreeMap iteration keeps related groups in name order
        for (collection, node) in nodes {
            match node.join {
                Some(join) => groups.push(PredicateGroup {
                    collection,
                    predicates: node.predicates,
                    join: Some(join),
                }),
                None => {
                    let message = format!("no join path from '{}' to '{}'", primary, collection);
                    issues.push(ValidationIssue::new(
                        IssueKind::UnreachableCollection,
                        collection,
                        message,
                    ));
                }
            }
        }

        if !issues.is_empty() {
            return Err(ValidationError::new(issues));
        }

        let plan = QueryPlan { primary, groups };
        tracing::debug!(plan = %plan, "query planned");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::core::criteria::{CriteriaNode, CriteriaParser};
    use crate::core::operator::OperatorRegistry;
    use crate::core::schema::SchemaRegistry;
    use crate::joins::registry::JoinRegistry;
    use serde_json::{Value, json};

    fn plan(primary: &str, doc: Value) -> QueryPlan {
        let config = FilterConfig::default_config();
        let schemas = SchemaRegistry::from_config(&config).unwrap();
        let joins = JoinRegistry::new(&config, &schemas).unwrap();
        let operators = OperatorRegistry::standard();
        let tree = CriteriaParser::new(&schemas, &operators, &joins, 3)
            .parse(primary, doc.as_object().unwrap())
            .unwrap();
        QueryPlanner::new().plan(tree).unwrap()
    }

    #[test]
    fn test_primary_group_first_even_when_empty() {
        let plan = plan(
            "flow_runs",
            json!({"flows": {"tags": {"all_": ["prod"]}}}),
        );
        assert_eq!(plan.primary(), "flow_runs");
        assert!(plan.primary_group().is_primary());
        assert!(plan.primary_group().predicates.is_empty());
        assert_eq!(plan.related_groups().len(), 1);
        assert_eq!(plan.related_groups()[0].collection, "flows");
        assert_eq!(
            plan.related_groups()[0].join.as_ref().unwrap().to_string(),
            "flow_runs.flow_id = flows.id"
        );
    }

    #[test]
    fn test_related_groups_in_name_order() {
        let plan = plan(
            "flow_runs",
            json!({
                "task_runs": {"name": {"eq_": "a"}},
                "deployments": {"name": {"eq_": "b"}},
                "flows": {"name": {"eq_": "c"}}
            }),
        );
        let names: Vec<&str> = plan
            .related_groups()
            .iter()
            .map(|g| g.collection.as_str())
            .collect();
        assert_eq!(names, vec!["deployments", "flows", "task_runs"]);
    }

    #[test]
    fn test_unfiltered() {
        assert!(plan("flows", json!({})).is_unfiltered());
        assert!(QueryPlan::unfiltered("flows").is_unfiltered());
        assert!(!plan("flows", json!({"flows": {"name": {"eq_": "x"}}})).is_unfiltered());
    }

    #[test]
    fn test_display() {
        let plan = plan(
            "flow_runs",
            json!({"flow_runs": {"run_count": {"eq_": 2}}}),
        );
        assert_eq!(plan.to_string(), "flow_runs where [run_count eq_ 2]");
    }

    #[test]
    fn test_related_node_without_join_rejected() {
        let mut tree = CriteriaTree {
            primary: "task_runs".to_string(),
            nodes: Default::default(),
        };
        tree.nodes
            .insert("task_runs".to_string(), CriteriaNode::new("task_runs"));
        tree.nodes.insert("flows".to_string(), CriteriaNode::new("flows"));

        let err = QueryPlanner::new().plan(tree).unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].kind, IssueKind::UnreachableCollection);
        assert_eq!(err.issues()[0].location, "flows");
    }

    #[test]
    fn test_join_path_taken_from_tree() {
        let plan = plan(
            "task_runs",
            json!({"flows": {"name": {"eq_": "x"}}}),
        );
        let join = plan.related_groups()[0].join.as_ref().unwrap();
        assert_eq!(join.origin(), Some("task_runs"));
        assert_eq!(join.target(), Some("flows"));
        assert_eq!(join.len(), 2);
    }
}
