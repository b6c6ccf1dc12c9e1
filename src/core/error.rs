//! Typed error handling for flowscope
//!
//! Every failure the filter pipeline can produce is one of:
//!
//! - [`ValidationError`]: the request is wrong. Carries *every* offending
//!   collection, field, operator and page parameter, never only the first.
//! - [`StorageError`]: the backing store failed while executing a plan.
//! - [`ConfigError`]: collection schemas or join declarations are invalid.
//!
//! [`FilterError`] wraps them and maps each onto an HTTP status and a stable
//! error code for the REST exposure.
//!
//! # Example
//!
//! ```rust,ignore
//! match engine.parse_and_plan("flows", &document) {
//!     Ok(plan) => println!("{plan}"),
//!     Err(FilterError::Validation(err)) => {
//!         for issue in err.issues() {
//!             println!("{}: {}", issue.location, issue.message);
//!         }
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type for flowscope
#[derive(Debug)]
pub enum FilterError {
    /// The filter document, sort, page or history parameters are invalid
    Validation(ValidationError),

    /// The backing store failed while executing a plan
    Storage(StorageError),

    /// Schema or join configuration errors
    Config(ConfigError),

    /// The caller cancelled the request before execution finished
    Cancelled,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::Validation(e) => write!(f, "{}", e),
            FilterError::Storage(e) => write!(f, "{}", e),
            FilterError::Config(e) => write!(f, "{}", e),
            FilterError::Cancelled => write!(f, "Request cancelled before completion"),
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FilterError::Validation(e) => Some(e),
            FilterError::Storage(e) => Some(e),
            FilterError::Config(e) => Some(e),
            FilterError::Cancelled => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl FilterError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            FilterError::Validation(_) => StatusCode::BAD_REQUEST,
            FilterError::Storage(e) => e.status_code(),
            FilterError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FilterError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            FilterError::Validation(_) => "VALIDATION_ERROR",
            FilterError::Storage(e) => e.error_code(),
            FilterError::Config(_) => "CONFIG_ERROR",
            FilterError::Cancelled => "REQUEST_CANCELLED",
        }
    }

    /// Whether the failure is the client's to fix
    pub fn is_client_error(&self) -> bool {
        matches!(self, FilterError::Validation(_))
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            FilterError::Validation(e) => Some(serde_json::json!({ "issues": e.issues() })),
            FilterError::Storage(StorageError::QueryError { backend, .. })
            | FilterError::Storage(StorageError::Unavailable { backend }) => {
                Some(serde_json::json!({ "backend": backend }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for FilterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Category of a single validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    /// Collection name not recognised
    UnknownCollection,
    /// Field path does not exist in the collection schema
    UnknownField,
    /// Field path is malformed or descends into a non-object field
    InvalidFieldPath,
    /// Operator unknown, or not valid for the field's type
    UnsupportedOperator,
    /// Operand shape or type incompatible with the field
    TypeMismatch,
    /// Negative offset, non-positive or over-cap limit
    InvalidPageSpec,
    /// Join cycle; self-joins are rejected when the registry is built, so
    /// only the code is shared with `ConfigError::JoinCycle`
    JoinCycle,
    /// Known collection with no join path from the primary collection
    UnreachableCollection,
    /// Logical combinator other than the implicit AND
    UnsupportedCombinator,
    /// More than one operator supplied in a single clause
    MultipleOperators,
    /// Criteria are not shaped as nested objects
    MalformedCriteria,
    /// Sort string unparsable or targeting an unsortable field
    InvalidSort,
    /// History range, interval or field invalid
    InvalidHistory,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::UnknownCollection => "UNKNOWN_COLLECTION",
            IssueKind::UnknownField => "UNKNOWN_FIELD",
            IssueKind::InvalidFieldPath => "INVALID_FIELD_PATH",
            IssueKind::UnsupportedOperator => "UNSUPPORTED_OPERATOR",
            IssueKind::TypeMismatch => "TYPE_MISMATCH",
            IssueKind::InvalidPageSpec => "INVALID_PAGE_SPEC",
            IssueKind::JoinCycle => "JOIN_CYCLE",
            IssueKind::UnreachableCollection => "UNREACHABLE_COLLECTION",
            IssueKind::UnsupportedCombinator => "UNSUPPORTED_COMBINATOR",
            IssueKind::MultipleOperators => "MULTIPLE_OPERATORS",
            IssueKind::MalformedCriteria => "MALFORMED_CRITERIA",
            IssueKind::InvalidSort => "INVALID_SORT",
            IssueKind::InvalidHistory => "INVALID_HISTORY",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single offending element of a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    /// Where in the request the issue sits, e.g. `flow_runs.state.type`
    pub location: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// All validation issues found in one request
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn single(issue: ValidationIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Whether any issue has the given kind
    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|issue| issue.kind == kind)
    }

    /// Issues of the given kind
    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msgs: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
        write!(f, "Invalid filter request: {}", msgs.join("; "))
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for FilterError {
    fn from(err: ValidationError) -> Self {
        FilterError::Validation(err)
    }
}

impl From<Vec<ValidationIssue>> for FilterError {
    fn from(issues: Vec<ValidationIssue>) -> Self {
        FilterError::Validation(ValidationError::new(issues))
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors raised by a record store while executing a plan
///
/// Whether a failure is transient is decided by the store; the dispatcher
/// never retries.
#[derive(Debug)]
pub enum StorageError {
    /// Connection error (transient)
    ConnectionError { backend: String, message: String },

    /// Query execution error
    QueryError { backend: String, message: String },

    /// Stored data could not be interpreted
    IntegrityError { message: String },

    /// Backend not available (transient)
    Unavailable { backend: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionError { backend, message } => {
                write!(f, "Failed to connect to {}: {}", backend, message)
            }
            StorageError::QueryError { backend, message } => {
                write!(f, "{} query error: {}", backend, message)
            }
            StorageError::IntegrityError { message } => {
                write!(f, "Data integrity error: {}", message)
            }
            StorageError::Unavailable { backend } => {
                write!(f, "Storage backend '{}' is unavailable", backend)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::ConnectionError { .. } | StorageError::Unavailable { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            StorageError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::ConnectionError { .. } => "STORAGE_CONNECTION_ERROR",
            StorageError::QueryError { .. } => "STORAGE_QUERY_ERROR",
            StorageError::IntegrityError { .. } => "STORAGE_INTEGRITY_ERROR",
            StorageError::Unavailable { .. } => "STORAGE_UNAVAILABLE",
        }
    }
}

impl From<StorageError> for FilterError {
    fn from(err: StorageError) -> Self {
        FilterError::Storage(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors in collection schemas, join declarations or limits
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown collection '{collection}' referenced by {context}")]
    UnknownCollection { collection: String, context: String },

    #[error("Duplicate {what} '{name}'")]
    Duplicate { what: String, name: String },

    #[error("Join declared from '{collection}' to itself")]
    JoinCycle { collection: String },
}

impl From<ConfigError> for FilterError {
    fn from(err: ConfigError) -> Self {
        FilterError::Config(err)
    }
}

/// A specialized Result type for flowscope operations
pub type FilterResult<T> = Result<T, FilterError>;

// =============================================================================
// Tests
// =============================================================================
