//! Core types of the filter pipeline: schemas, operators, criteria, joins,
//! records and errors

pub mod criteria;
pub mod error;
pub mod evaluate;
pub mod field;
pub mod join;
pub mod operator;
pub mod pluralize;
pub mod record;
pub mod schema;
pub mod store;

pub use criteria::{CriteriaNode, CriteriaParser, CriteriaTree, Predicate};
pub use error::{
    ConfigError, ErrorResponse, FilterError, FilterResult, IssueKind, StorageError,
    ValidationError, ValidationIssue,
};
pub use evaluate::PredicateFilter;
pub use field::{FieldKind, FieldPath, FieldValue};
pub use join::{JoinDefinition, JoinDirection, JoinPath, JoinStep};
pub use operator::{Arity, Comparison, Operand, OperatorKind, OperatorRegistry, OperatorSpec};
pub use pluralize::Pluralizer;
pub use record::Record;
pub use schema::{CollectionSchema, FieldSchema, FieldType, ObjectSchema, SchemaRegistry};
pub use store::RecordStore;
