//! Operator registry
//!
//! The registry is a read-only table built once with
//! [`OperatorRegistry::standard`]. It answers two questions for the criteria
//! parser: is this operator valid for this field kind, and does this JSON
//! operand have the right shape for it.

use crate::core::field::{FieldKind, FieldValue};
use crate::core::schema::FieldType;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Every supported field operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OperatorKind {
    #[serde(rename = "eq_")]
    Eq,
    #[serde(rename = "any_")]
    Any,
    #[serde(rename = "not_any_")]
    NotAny,
    #[serde(rename = "all_")]
    All,
    #[serde(rename = "is_null_")]
    IsNull,
    #[serde(rename = "before_")]
    Before,
    #[serde(rename = "after_")]
    After,
    #[serde(rename = "between_")]
    Between,
    #[serde(rename = "like_")]
    Like,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 9] = [
        OperatorKind::Eq,
        OperatorKind::Any,
        OperatorKind::NotAny,
        OperatorKind::All,
        OperatorKind::IsNull,
        OperatorKind::Before,
        OperatorKind::After,
        OperatorKind::Between,
        OperatorKind::Like,
    ];

    /// Wire name of the operator, always suffixed with `_`
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Eq => "eq_",
            OperatorKind::Any => "any_",
            OperatorKind::NotAny => "not_any_",
            OperatorKind::All => "all_",
            OperatorKind::IsNull => "is_null_",
            OperatorKind::Before => "before_",
            OperatorKind::After => "after_",
            OperatorKind::Between => "between_",
            OperatorKind::Like => "like_",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of the operand an operator takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// One scalar
    Single,
    /// A JSON array of scalars
    List,
    /// Exactly two ordered bounds
    Range,
    /// A boolean switch
    Flag,
}

/// How an operator compares the stored value against its operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equality,
    /// Value is one of the operand values; for tags, the sets overlap
    Membership,
    /// Negated membership
    Exclusion,
    /// Tag set contains every operand value
    Containment,
    /// Absent/null versus present
    NullCheck,
    /// Value ≥ bound
    LowerBound,
    /// Value ≤ bound
    UpperBound,
    /// lo ≤ value ≤ hi
    Bounded,
    /// Case-insensitive substring
    Substring,
}

/// A validated operand, typed after the target field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Operand {
    Scalar(FieldValue),
    List(Vec<FieldValue>),
    Range(FieldValue, FieldValue),
    Flag(bool),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Scalar(value) => write!(f, "{value}"),
            Operand::List(values) => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Operand::Range(lo, hi) => write!(f, "[{lo}, {hi}]"),
            Operand::Flag(flag) => write!(f, "{flag}"),
        }
    }
}

/// Declaration of one operator
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorSpec {
    pub kind: OperatorKind,
    pub arity: Arity,
    pub accepted: &'static [FieldKind],
    pub comparison: Comparison,
}

impl OperatorSpec {
    pub fn accepts(&self, kind: FieldKind) -> bool {
        self.accepted.contains(&kind)
    }

    /// Check an operand against this operator's arity and the field type
    pub fn coerce(&self, field_type: &FieldType, raw: &Value) -> Result<Operand, String> {
        match self.arity {
            Arity::Flag => raw
                .as_bool()
                .map(Operand::Flag)
                .ok_or_else(|| format!("{} expects a boolean, got {}", self.kind, raw)),
            Arity::Single => coerce_scalar(field_type, raw).map(Operand::Scalar),
            Arity::List => {
                let items = raw
                    .as_array()
                    .ok_or_else(|| format!("{} expects a list, got {}", self.kind, raw))?;
                items
                    .iter()
                    .map(|item| coerce_scalar(field_type, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Operand::List)
            }
            Arity::Range => {
                let bounds = raw
                    .as_array()
                    .filter(|items| items.len() == 2)
                    .ok_or_else(|| {
                        format!("{} expects a list of two bounds, got {}", self.kind, raw)
                    })?;
                let lo = coerce_scalar(field_type, &bounds[0])?;
                let hi = coerce_scalar(field_type, &bounds[1])?;
                if lo.compare(&hi) == Some(std::cmp::Ordering::Greater) {
                    return Err(format!("{} lower bound {} is after upper bound {}", self.kind, lo, hi));
                }
                Ok(Operand::Range(lo, hi))
            }
        }
    }
}

/// Read one operand scalar for a field; enum values must be declared
fn coerce_scalar(field_type: &FieldType, raw: &Value) -> Result<FieldValue, String> {
    let kind = field_type.kind();
    let value = FieldValue::from_json(kind, raw)
        .ok_or_else(|| format!("expected a {} value, got {}", expected_shape(kind), raw))?;

    if let (Some(variants), Some(s)) = (field_type.variants(), value.as_string()) {
        if !variants.iter().any(|v| v == s) {
            return Err(format!(
                "'{}' is not one of {}",
                s,
                variants.join(", ")
            ));
        }
    }

    Ok(value)
}

fn expected_shape(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Tags => "tag (string)",
        FieldKind::DateTime => "RFC 3339 datetime",
        other => other.as_str(),
    }
}

/// Why an operator lookup failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No operator with this name exists
    Unknown { name: String },
    /// The operator exists but does not apply to the field kind
    Unsupported { operator: OperatorKind, field: FieldKind },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Unknown { name } => write!(f, "unknown operator '{}'", name),
            LookupError::Unsupported { operator, field } => {
                write!(f, "operator {} is not supported on {} fields", operator, field)
            }
        }
    }
}

impl std::error::Error for LookupError {}

const EQUALITY_KINDS: &[FieldKind] = &[
    FieldKind::String,
    FieldKind::Enum,
    FieldKind::Uuid,
    FieldKind::DateTime,
    FieldKind::Integer,
    FieldKind::Float,
    FieldKind::Boolean,
];

const MEMBERSHIP_KINDS: &[FieldKind] = &[
    FieldKind::String,
    FieldKind::Enum,
    FieldKind::Uuid,
    FieldKind::Integer,
    FieldKind::Tags,
];

const TAGS_ONLY: &[FieldKind] = &[FieldKind::Tags];
const DATETIME_ONLY: &[FieldKind] = &[FieldKind::DateTime];
const STRING_ONLY: &[FieldKind] = &[FieldKind::String];

const ALL_KINDS: &[FieldKind] = &[
    FieldKind::String,
    FieldKind::Enum,
    FieldKind::Tags,
    FieldKind::DateTime,
    FieldKind::Uuid,
    FieldKind::Integer,
    FieldKind::Float,
    FieldKind::Boolean,
    FieldKind::Object,
];

/// Read-only table of operator declarations
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    specs: HashMap<OperatorKind, OperatorSpec>,
}

impl OperatorRegistry {
    /// The standard operator set
    pub fn standard() -> Self {
        let specs = [
            (OperatorKind::Eq, Arity::Single, EQUALITY_KINDS, Comparison::Equality),
            (OperatorKind::Any, Arity::List, MEMBERSHIP_KINDS, Comparison::Membership),
            (OperatorKind::NotAny, Arity::List, MEMBERSHIP_KINDS, Comparison::Exclusion),
            (OperatorKind::All, Arity::List, TAGS_ONLY, Comparison::Containment),
            (OperatorKind::IsNull, Arity::Flag, ALL_KINDS, Comparison::NullCheck),
            (OperatorKind::Before, Arity::Single, DATETIME_ONLY, Comparison::UpperBound),
            (OperatorKind::After, Arity::Single, DATETIME_ONLY, Comparison::LowerBound),
            (OperatorKind::Between, Arity::Range, DATETIME_ONLY, Comparison::Bounded),
            (OperatorKind::Like, Arity::Single, STRING_ONLY, Comparison::Substring),
        ]
        .into_iter()
        .map(|(kind, arity, accepted, comparison)| {
            (
                kind,
                OperatorSpec {
                    kind,
                    arity,
                    accepted,
                    comparison,
                },
            )
        })
        .collect();

        Self { specs }
    }

    /// Find the operator spec for a name, checking it applies to the field kind
    pub fn lookup(&self, name: &str, field: FieldKind) -> Result<&OperatorSpec, LookupError> {
        let spec = OperatorKind::from_name(name)
            .and_then(|kind| self.specs.get(&kind))
            .ok_or_else(|| LookupError::Unknown {
                name: name.to_string(),
            })?;

        if spec.accepts(field) {
            Ok(spec)
        } else {
            Err(LookupError::Unsupported {
                operator: spec.kind,
                field,
            })
        }
    }

    pub fn get(&self, kind: OperatorKind) -> Option<&OperatorSpec> {
        self.specs.get(&kind)
    }

    /// Whether a key names an operator at all
    pub fn is_operator_name(&self, name: &str) -> bool {
        OperatorKind::from_name(name).is_some_and(|kind| self.specs.contains_key(&kind))
    }

    /// Operators valid for a field kind, in declaration order
    pub fn operators_for(&self, field: FieldKind) -> Vec<OperatorKind> {
        OperatorKind::ALL
            .into_iter()
            .filter(|kind| self.specs.get(kind).is_some_and(|spec| spec.accepts(field)))
            .collect()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
