//! Join edges between collections
//!
//! A [`JoinDefinition`] is a declared edge `from.local_field → to.foreign_field`.
//! Every edge can be walked in both directions; a walk is a sequence of
//! [`JoinStep`]s collected into a [`JoinPath`].

use crate::core::field::FieldPath;
use serde::Serialize;
use std::fmt;

/// A validated join declaration with its defaults filled in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinDefinition {
    /// Collection holding the referencing column
    pub from: String,

    /// Collection being referenced
    pub to: String,

    /// Column of `from` (e.g. `flow_id`)
    pub local_field: FieldPath,

    /// Column of `to` (usually its primary key)
    pub foreign_field: FieldPath,

    pub description: Option<String>,
}

impl JoinDefinition {
    /// The step walking this edge away from `collection`
    ///
    /// Returns `None` when the edge does not touch `collection`.
    pub fn step_from(&self, collection: &str) -> Option<JoinStep> {
        if self.from == collection {
            Some(JoinStep {
                from: self.from.clone(),
                to: self.to.clone(),
                source_field: self.local_field.clone(),
                target_field: self.foreign_field.clone(),
                direction: JoinDirection::Forward,
            })
        } else if self.to == collection {
            Some(JoinStep {
                from: self.to.clone(),
                to: self.from.clone(),
                source_field: self.foreign_field.clone(),
                target_field: self.local_field.clone(),
                direction: JoinDirection::Reverse,
            })
        } else {
            None
        }
    }
}

/// Direction a join edge is walked in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinDirection {
    /// From the referencing collection to the referenced one
    Forward,
    /// From the referenced collection back to the referencing one
    Reverse,
}

/// One hop of a join path
///
/// Records `a` of `from` and `b` of `to` are connected when
/// `a[source_field] == b[target_field]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinStep {
    pub from: String,
    pub to: String,
    pub source_field: FieldPath,
    pub target_field: FieldPath,
    pub direction: JoinDirection,
}

impl fmt::Display for JoinStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} = {}.{}",
            self.from, self.source_field, self.to, self.target_field
        )
    }
}

/// Ordered hops from the primary collection to a related one
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JoinPath {
    steps: Vec<JoinStep>,
}

impl JoinPath {
    pub fn new(steps: Vec<JoinStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[JoinStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Collection the path starts from
    pub fn origin(&self) -> Option<&str> {
        self.steps.first().map(|s| s.from.as_str())
    }

    /// Collection the path ends at
    pub fn target(&self) -> Option<&str> {
        self.steps.last().map(|s| s.to.as_str())
    }
}

impl fmt::Display for JoinPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hops: Vec<String> = self.steps.iter().map(|s| s.to_string()).collect();
        f.write_str(&hops.join(" -> "))
    }
}
