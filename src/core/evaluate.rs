//! Predicate evaluation against stored records
//!
//! Predicates are ANDed. A missing or null value matches nothing except
//! `is_null_: true`, including the negated `not_any_`.

use crate::core::criteria::Predicate;
use crate::core::field::{FieldKind, FieldValue};
use crate::core::operator::{Operand, OperatorKind};
use crate::core::record::Record;
use std::cmp::Ordering;

/// Evaluates typed predicates against records
pub struct PredicateFilter;

impl PredicateFilter {
    /// Whether a record satisfies every predicate
    pub fn matches(record: &Record, predicates: &[Predicate]) -> bool {
        predicates
            .iter()
            .all(|predicate| Self::matches_predicate(record, predicate))
    }

    /// Whether a record satisfies one predicate
    pub fn matches_predicate(record: &Record, predicate: &Predicate) -> bool {
        if predicate.operator == OperatorKind::IsNull {
            let present = record.is_present(&predicate.path);
            return match predicate.operand {
                Operand::Flag(true) => !present,
                Operand::Flag(false) => present,
                _ => false,
            };
        }

        if predicate.field_kind == FieldKind::Tags {
            return match record.tags(&predicate.path) {
                Some(tags) => Self::tags_match(&tags, predicate),
                None => false,
            };
        }

        let Some(value) = record.field_value(&predicate.path, predicate.field_kind) else {
            return false;
        };

        match (&predicate.operator, &predicate.operand) {
            (OperatorKind::Eq, Operand::Scalar(expected)) => equal(&value, expected),
            (OperatorKind::Any, Operand::List(options)) => {
                options.iter().any(|option| equal(&value, option))
            }
            (OperatorKind::NotAny, Operand::List(options)) => {
                !options.iter().any(|option| equal(&value, option))
            }
            (OperatorKind::Before, Operand::Scalar(bound)) => {
                matches!(value.compare(bound), Some(Ordering::Less | Ordering::Equal))
            }
            (OperatorKind::After, Operand::Scalar(bound)) => {
                matches!(value.compare(bound), Some(Ordering::Greater | Ordering::Equal))
            }
            (OperatorKind::Between, Operand::Range(lo, hi)) => {
                matches!(value.compare(lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(value.compare(hi), Some(Ordering::Less | Ordering::Equal))
            }
            (OperatorKind::Like, Operand::Scalar(FieldValue::String(needle))) => value
                .as_string()
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
            _ => false,
        }
    }

    fn tags_match(tags: &[&str], predicate: &Predicate) -> bool {
        let Operand::List(options) = &predicate.operand else {
            return false;
        };
        let contains = |option: &FieldValue| {
            option
                .as_string()
                .is_some_and(|wanted| tags.contains(&wanted))
        };

        match predicate.operator {
            OperatorKind::Any => options.iter().any(contains),
            OperatorKind::NotAny => !options.iter().any(contains),
            OperatorKind::All => options.iter().all(contains),
            _ => false,
        }
    }
}

fn equal(actual: &FieldValue, expected: &FieldValue) -> bool {
    actual.compare(expected) == Some(Ordering::Equal)
}
