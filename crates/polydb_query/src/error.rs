//! Error types for the query crate.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur when building or parsing a query.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The filter operator string is not one of the supported operators.
    #[error("unknown filter operator: {0}")]
    UnknownOperator(String),

    /// The query could not be parsed from its serialized form.
    #[error("invalid query: {0}")]
    Json(#[from] serde_json::Error),
}
