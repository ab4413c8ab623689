//! Per-call option types of the `CommonDB` contract.

use crate::row::Row;

/// How `save_batch` treats existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMethod {
    /// Insert or overwrite.
    #[default]
    Upsert,
    /// Fail if the id already exists.
    Insert,
    /// Fail if the id does not exist.
    Update,
}

/// Options for `save_batch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Save method.
    pub save_method: SaveMethod,
    /// Let the adapter assign ids to rows that have none.
    pub assign_generated_ids: bool,
}

impl SaveOptions {
    /// Options with the given save method.
    #[must_use]
    pub fn with_method(save_method: SaveMethod) -> Self {
        Self {
            save_method,
            ..Self::default()
        }
    }
}

/// Options for reads.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Read the state as of this unix timestamp (time-machine stores only).
    pub read_at: Option<i64>,
}

/// Options for `create_table`.
#[derive(Debug, Clone, Default)]
pub struct CreateTableOptions {
    /// Drop (and empty) the table first if it exists.
    pub drop_if_exists: bool,
}

/// Options for `create_transaction`.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Reject writes.
    pub read_only: bool,
}

/// Result of `run_query`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunQueryResult {
    /// Matching rows.
    pub rows: Vec<Row>,
    /// Cursor to continue from, for stores with cursor support.
    pub end_cursor: Option<String>,
}

impl RunQueryResult {
    /// Wraps rows without a cursor.
    #[must_use]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            end_cursor: None,
        }
    }
}
