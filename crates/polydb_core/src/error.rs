//! Error types for PolyDB.

use crate::validation::ValidationError;
use std::io;
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in PolyDB operations.
///
/// Not-found is not an error for lookups: `get_by_ids` omits missing rows.
/// Only the `require*` family turns a missing row into [`DbError::NotFound`].
#[derive(Debug, Error)]
pub enum DbError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A row that was required is missing.
    #[error("{table}.{id} is required, but not found")]
    NotFound {
        /// Table searched.
        table: String,
        /// Id that was not found.
        id: String,
    },

    /// Insert of a row whose id already exists.
    #[error("entity exists: {table}.{id}")]
    AlreadyExists {
        /// Table written to.
        table: String,
        /// Colliding id.
        id: String,
    },

    /// Update of a row that does not exist.
    #[error("cannot update {table}.{id}: row does not exist")]
    MissingOnUpdate {
        /// Table written to.
        table: String,
        /// Missing id.
        id: String,
    },

    /// Mutation of an immutable table.
    #[error("{operation} is not allowed on immutable table {table}")]
    ImmutableViolation {
        /// Immutable table.
        table: String,
        /// Rejected operation.
        operation: String,
    },

    /// A generated id collided within one batch.
    #[error("duplicate id {id} in {table}")]
    DuplicateId {
        /// Table written to.
        table: String,
        /// Duplicated id.
        id: String,
    },

    /// A row without `id` was passed to an adapter that does not generate ids.
    #[error("row without id passed to {table}")]
    MissingId {
        /// Table written to.
        table: String,
    },

    /// Transaction failed.
    #[error("transaction failed: {reason}")]
    Transaction {
        /// Reason for the failure.
        reason: String,
    },

    /// A read was attempted inside a transaction after a write.
    #[error("read after write is forbidden inside a transaction")]
    TransactionReadAfterWrite,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Persisted data could not be parsed.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// The adapter declines this operation.
    #[error("{adapter} does not support {operation}")]
    Unsupported {
        /// Adapter name.
        adapter: String,
        /// Operation name.
        operation: String,
    },

    /// Error reported by a downstream store.
    #[error("adapter error: {message}")]
    Adapter {
        /// Message from the store.
        message: String,
    },

    /// Several errors collected by [`crate::ErrorMode::ThrowAggregated`].
    #[error("{} error(s) occurred: {}", .errors.len(), join_messages(.errors))]
    Aggregate {
        /// Collected errors, in the order they occurred.
        errors: Vec<DbError>,
    },
}

fn join_messages(errors: &[DbError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DbError {
    /// Creates a not-found error.
    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Creates an already-exists error.
    pub fn already_exists(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Creates a missing-on-update error.
    pub fn missing_on_update(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::MissingOnUpdate {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Creates an immutable-violation error.
    pub fn immutable(table: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::ImmutableViolation {
            table: table.into(),
            operation: operation.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(reason: impl Into<String>) -> Self {
        Self::Transaction {
            reason: reason.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(adapter: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            adapter: adapter.into(),
            operation: operation.into(),
        }
    }

    /// Creates an adapter error.
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter {
            message: message.into(),
        }
    }

    /// Returns true for the integrity family (collisions, missing rows on
    /// update, immutability).
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists { .. }
                | Self::MissingOnUpdate { .. }
                | Self::ImmutableViolation { .. }
                | Self::DuplicateId { .. }
        )
    }

    /// Number of underlying errors (1 unless this is an aggregate).
    #[must_use]
    pub fn error_count(&self) -> usize {
        match self {
            Self::Aggregate { errors } => errors.len(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            DbError::not_found("users", "u1").to_string(),
            "users.u1 is required, but not found"
        );
        assert_eq!(
            DbError::already_exists("users", "u1").to_string(),
            "entity exists: users.u1"
        );
        assert_eq!(
            DbError::unsupported("CacheDB", "increment_batch").to_string(),
            "CacheDB does not support increment_batch"
        );
    }

    #[test]
    fn aggregate_lists_every_error() {
        let err = DbError::Aggregate {
            errors: vec![
                DbError::adapter("first"),
                DbError::invalid_operation("second"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 error(s) occurred"));
        assert!(msg.contains("adapter error: first"));
        assert!(msg.contains("invalid operation: second"));
        assert_eq!(err.error_count(), 2);
    }

    #[test]
    fn integrity_family() {
        assert!(DbError::already_exists("t", "a").is_integrity());
        assert!(DbError::immutable("t", "delete").is_integrity());
        assert!(!DbError::not_found("t", "a").is_integrity());
    }
}
