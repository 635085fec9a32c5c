//! # Query Errors
//!
//! Error taxonomy for schema validation, paging and store execution.
//!
//! Validation errors are raised at the first violation. Store failures are
//! wrapped once with the operation that failed and are never reclassified
//! as validation errors.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for engine operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum QueryError {
    // ==================
    // Validation Errors
    // ==================
    /// Referenced path is absent from the flattened schema
    #[error("Field [{0}] does not exist in schema")]
    UnknownField(String),

    /// Operator is not in the compatibility matrix
    #[error("Unknown operator {0}")]
    UnknownOperator(String),

    /// Declared type is not permitted for the operator
    #[error("{field} type cannot be used with operator {operator}")]
    TypeOperatorMismatch { field: String, operator: String },

    /// Operand shape does not match the declared type
    #[error("Value of property [{field}] does not match schema type: {reason}")]
    ValueTypeMismatch { field: String, reason: String },

    /// Empty predicate, bad sort/project value or mixed projection
    #[error("{0}")]
    InvalidExpression(String),

    /// Declared type reached a dispatch arm that cannot handle it
    #[error("Schema field type {0} unknown or not yet supported")]
    UnsupportedFieldType(String),

    /// `limit`/`page` combination is not allowed
    #[error("{0}")]
    InvalidPagingParameters(String),

    /// No schema supplied to the orchestrator
    #[error("Please input field for validation data")]
    MissingSchema,

    /// `$lookup` stage missing required sub-fields
    #[error("Missing field : {}", format_missing(.0))]
    MalformedLookup(Vec<String>),

    // ==================
    // Execution Errors
    // ==================
    /// Failure returned by the storage driver
    #[error("Store execution failed during {operation}: {source}")]
    StoreExecution {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

fn format_missing(fields: &[String]) -> String {
    serde_json::to_string(fields).unwrap_or_default()
}

impl QueryError {
    pub(crate) fn value_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::ValueTypeMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn type_operator(field: impl Into<String>, operator: impl Into<String>) -> Self {
        QueryError::TypeOperatorMismatch {
            field: field.into(),
            operator: operator.into(),
        }
    }

    pub(crate) fn store(operation: &'static str, source: StoreError) -> Self {
        QueryError::StoreExecution { operation, source }
    }

    /// Stable error code for callers and logs
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::UnknownField(_) => "QG_UNKNOWN_FIELD",
            QueryError::UnknownOperator(_) => "QG_UNKNOWN_OPERATOR",
            QueryError::TypeOperatorMismatch { .. } => "QG_TYPE_OPERATOR_MISMATCH",
            QueryError::ValueTypeMismatch { .. } => "QG_VALUE_TYPE_MISMATCH",
            QueryError::InvalidExpression(_) => "QG_INVALID_EXPRESSION",
            QueryError::UnsupportedFieldType(_) => "QG_UNSUPPORTED_FIELD_TYPE",
            QueryError::InvalidPagingParameters(_) => "QG_INVALID_PAGING_PARAMETERS",
            QueryError::MissingSchema => "QG_MISSING_SCHEMA",
            QueryError::MalformedLookup(_) => "QG_MALFORMED_LOOKUP",
            QueryError::StoreExecution { .. } => "QG_STORE_EXECUTION_FAILURE",
        }
    }

    /// Whether this error was raised before touching the store
    pub fn is_validation(&self) -> bool {
        !matches!(self, QueryError::StoreExecution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_names_path() {
        let err = QueryError::UnknownField("testZ".into());
        assert_eq!(err.to_string(), "Field [testZ] does not exist in schema");
        assert_eq!(err.code(), "QG_UNKNOWN_FIELD");
    }

    #[test]
    fn test_malformed_lookup_lists_fields() {
        let err = QueryError::MalformedLookup(vec!["from".into(), "as".into()]);
        assert_eq!(err.to_string(), r#"Missing field : ["from","as"]"#);
    }

    #[test]
    fn test_store_errors_are_not_validation() {
        let err = QueryError::store("aggregate", StoreError::new("connection reset"));
        assert!(!err.is_validation());
        assert!(err.to_string().contains("aggregate"));
        assert!(err.to_string().contains("connection reset"));
        assert!(QueryError::MissingSchema.is_validation());
    }
}
