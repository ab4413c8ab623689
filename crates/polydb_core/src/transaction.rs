//! Transaction contract and the buffered-op state shared by adapters.

use crate::error::{DbError, DbResult};
use crate::options::{ReadOptions, RunQueryResult, SaveOptions};
use crate::row::Row;
use async_trait::async_trait;
use polydb_query::DBQuery;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting operations.
    Open,
    /// `commit()` is applying buffered operations.
    Committing,
    /// All buffered operations were applied.
    Committed,
    /// Buffered operations were discarded, either by `rollback()` or by a
    /// failed commit.
    RolledBack,
}

/// A buffered write.
#[derive(Debug, Clone, PartialEq)]
pub enum DBOperation {
    /// Deferred `save_batch`.
    SaveBatch {
        /// Target table.
        table: String,
        /// Rows to save.
        rows: Vec<Row>,
        /// Save options.
        opt: SaveOptions,
    },
    /// Deferred `delete_by_ids`.
    DeleteByIds {
        /// Target table.
        table: String,
        /// Ids to delete.
        ids: Vec<String>,
    },
}

impl DBOperation {
    /// Table the operation writes to.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::SaveBatch { table, .. } | Self::DeleteByIds { table, .. } => table,
        }
    }
}

/// A transaction opened by [`crate::CommonDB::create_transaction`].
///
/// A transaction is owned by one caller and is not meant to be shared.
/// Writes are buffered until [`DBTransaction::commit`], which applies them
/// all or none.
#[async_trait]
pub trait DBTransaction: Send {
    /// Current state.
    fn state(&self) -> TransactionState;

    /// Whether writes are rejected.
    fn read_only(&self) -> bool;

    /// Whether a write has been buffered.
    fn write_occurred(&self) -> bool;

    /// Reads rows by id.
    async fn get_by_ids(
        &mut self,
        table: &str,
        ids: &[String],
        opt: &ReadOptions,
    ) -> DbResult<Vec<Row>>;

    /// Runs a query.
    async fn run_query(&mut self, q: &DBQuery, opt: &ReadOptions) -> DbResult<RunQueryResult>;

    /// Buffers a batch save.
    async fn save_batch(&mut self, table: &str, rows: Vec<Row>, opt: &SaveOptions) -> DbResult<()>;

    /// Buffers a delete.
    async fn delete_by_ids(&mut self, table: &str, ids: &[String]) -> DbResult<()>;

    /// Applies every buffered operation in order, or none of them.
    ///
    /// On failure the store is restored and the error of the failing
    /// operation is returned.
    async fn commit(&mut self) -> DbResult<()>;

    /// Discards buffered operations. Never fails.
    async fn rollback(&mut self);
}

/// Buffered operations plus the flags every transaction tracks.
#[derive(Debug)]
pub struct PendingOps {
    state: TransactionState,
    read_only: bool,
    write_occurred: bool,
    ops: Vec<DBOperation>,
}

impl PendingOps {
    /// Creates an empty, open buffer.
    #[must_use]
    pub fn new(read_only: bool) -> Self {
        Self {
            state: TransactionState::Open,
            read_only,
            write_occurred: false,
            ops: Vec::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether writes are rejected.
    #[must_use]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Whether a write has been buffered.
    #[must_use]
    pub fn write_occurred(&self) -> bool {
        self.write_occurred
    }

    /// Buffered operations in submission order.
    #[must_use]
    pub fn ops(&self) -> &[DBOperation] {
        &self.ops
    }

    /// Buffers `op`.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not open or is read-only.
    pub fn push(&mut self, op: DBOperation) -> DbResult<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(DbError::transaction(format!(
                "write to {} in a read-only transaction",
                op.table()
            )));
        }
        self.ops.push(op);
        self.write_occurred = true;
        Ok(())
    }

    /// Checks that a read is allowed.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not open, or if a write already happened
    /// and `forbid_read_after_write` is set.
    pub fn ensure_readable(&self, forbid_read_after_write: bool) -> DbResult<()> {
        self.ensure_open()?;
        if forbid_read_after_write && self.write_occurred {
            return Err(DbError::TransactionReadAfterWrite);
        }
        Ok(())
    }

    /// Moves to `Committing` and hands out the buffered operations.
    ///
    /// # Errors
    ///
    /// Fails if the transaction is not open.
    pub fn begin_commit(&mut self) -> DbResult<Vec<DBOperation>> {
        self.ensure_open()?;
        self.state = TransactionState::Committing;
        Ok(std::mem::take(&mut self.ops))
    }

    /// Marks the transaction as committed.
    pub fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    /// Discards buffered operations and marks the transaction rolled back.
    ///
    /// A committed transaction stays committed.
    pub fn mark_rolled_back(&mut self) {
        self.ops.clear();
        if self.state != TransactionState::Committed {
            self.state = TransactionState::RolledBack;
        }
    }

    fn ensure_open(&self) -> DbResult<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            TransactionState::Committing => {
                Err(DbError::invalid_operation("transaction is committing"))
            }
            TransactionState::Committed => {
                Err(DbError::invalid_operation("transaction already committed"))
            }
            TransactionState::RolledBack => {
                Err(DbError::invalid_operation("transaction already rolled back"))
            }
        }
    }
}
