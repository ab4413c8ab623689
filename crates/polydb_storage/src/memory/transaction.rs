//! Optimistic transactions over an [`super::InMemoryDB`].

use super::{apply_op, Store};
use async_trait::async_trait;
use polydb_core::{
    deep_copy_row, DBOperation, DBQuery, DBTransaction, DbResult, PendingOps, ReadOptions, Row,
    RunQueryResult, SaveOptions, TransactionState,
};
use polydb_query::query_in_memory;
use std::sync::Arc;
use tracing::debug;

/// A transaction of an [`super::InMemoryDB`].
///
/// Writes are buffered. Reads go to the committed state of the store and,
/// by default, are refused once a write has been buffered.
///
/// `commit()` runs entirely under the store's write lock: it snapshots the
/// whole table set, applies the buffered operations in order, and on the
/// first failure puts the snapshot back and returns that failure.
#[derive(Debug)]
pub struct InMemoryDBTransaction {
    store: Arc<Store>,
    pending: PendingOps,
}

impl InMemoryDBTransaction {
    pub(crate) fn new(store: Arc<Store>, read_only: bool) -> Self {
        Self {
            store,
            pending: PendingOps::new(read_only),
        }
    }

    fn ensure_readable(&self) -> DbResult<()> {
        self.pending
            .ensure_readable(self.store.cfg.forbid_transaction_read_after_write)
    }
}

#[async_trait]
impl DBTransaction for InMemoryDBTransaction {
    fn state(&self) -> TransactionState {
        self.pending.state()
    }

    fn read_only(&self) -> bool {
        self.pending.read_only()
    }

    fn write_occurred(&self) -> bool {
        self.pending.write_occurred()
    }

    async fn get_by_ids(
        &mut self,
        table: &str,
        ids: &[String],
        _opt: &ReadOptions,
    ) -> DbResult<Vec<Row>> {
        self.ensure_readable()?;
        let data = self.store.data.read();
        let Some(rows) = data.get(&self.store.table_name(table)) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| rows.get(id).map(deep_copy_row)).collect())
    }

    async fn run_query(&mut self, q: &DBQuery, _opt: &ReadOptions) -> DbResult<RunQueryResult> {
        self.ensure_readable()?;
        let data = self.store.data.read();
        let rows = match data.get(&self.store.table_name(&q.table)) {
            Some(rows) => query_in_memory(q, rows.values().cloned()),
            None => Vec::new(),
        };
        Ok(RunQueryResult::from_rows(rows))
    }

    async fn save_batch(&mut self, table: &str, rows: Vec<Row>, opt: &SaveOptions) -> DbResult<()> {
        self.pending.push(DBOperation::SaveBatch {
            table: self.store.table_name(table),
            rows,
            opt: opt.clone(),
        })
    }

    async fn delete_by_ids(&mut self, table: &str, ids: &[String]) -> DbResult<()> {
        self.pending.push(DBOperation::DeleteByIds {
            table: self.store.table_name(table),
            ids: ids.to_vec(),
        })
    }

    async fn commit(&mut self) -> DbResult<()> {
        let ops = self.pending.begin_commit()?;
        if ops.is_empty() {
            self.pending.mark_committed();
            return Ok(());
        }

        let result = {
            let mut data = self.store.data.write();
            let snapshot = data.clone();
            let mut result = Ok(());
            for (i, op) in ops.iter().enumerate() {
                if let Err(e) = apply_op(&mut data, op) {
                    let table = op.table();
                    debug!(op = i, table, error = %e, "commit failed, restoring snapshot");
                    *data = snapshot;
                    result = Err(e);
                    break;
                }
            }
            result
        };

        match result {
            Ok(()) => {
                self.pending.mark_committed();
                debug!(ops = ops.len(), "transaction committed");
                self.store.after_write()
            }
            Err(e) => {
                self.pending.mark_rolled_back();
                Err(e)
            }
        }
    }

    async fn rollback(&mut self) {
        self.pending.mark_rolled_back();
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::{InMemoryDB, InMemoryDBCfg};
    use polydb_core::{
        row_from_value, run_in_transaction, CommonDB, DbError, ReadOptions, Row, SaveMethod,
        SaveOptions, TransactionOptions, TransactionState,
    };
    use serde_json::json;

    fn row(id: &str, k: i64) -> Row {
        row_from_value(json!({"id": id, "k": k})).unwrap()
    }

    async fn seeded() -> InMemoryDB {
        let db = InMemoryDB::new();
        db.save_batch("t", vec![row("a", 1), row("b", 2)], &SaveOptions::default())
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn writes_are_buffered_until_commit() {
        let db = seeded().await;
        let mut tx = db.create_transaction(&TransactionOptions::default()).await.unwrap();

        tx.save_batch("t", vec![row("c", 3)], &SaveOptions::default()).await.unwrap();
        tx.delete_by_ids("t", &["a".to_string()]).await.unwrap();
        assert!(tx.write_occurred());
        assert_eq!(db.get_data_snapshot()["t"].len(), 2);

        tx.commit().await.unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        let snapshot = db.get_data_snapshot();
        assert!(snapshot["t"].contains_key("c"));
        assert!(!snapshot["t"].contains_key("a"));
    }

    #[tokio::test]
    async fn failing_op_restores_everything() {
        let db = seeded().await;
        let before = db.get_data_snapshot();

        let mut tx = db.create_transaction(&TransactionOptions::default()).await.unwrap();
        tx.save_batch("t", vec![row("c", 3)], &SaveOptions::default()).await.unwrap();
        tx.delete_by_ids("t", &["b".to_string()]).await.unwrap();
        tx.save_batch("t", vec![row("a", 9)], &SaveOptions::with_method(SaveMethod::Insert))
            .await
            .unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists { .. }));
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(db.get_data_snapshot(), before);
    }

    #[tokio::test]
    async fn read_after_write_is_refused_by_default() {
        let db = seeded().await;
        let mut tx = db.create_transaction(&TransactionOptions::default()).await.unwrap();
        let ids = vec!["a".to_string()];

        assert_eq!(tx.get_by_ids("t", &ids, &ReadOptions::default()).await.unwrap().len(), 1);
        tx.save_batch("t", vec![row("c", 3)], &SaveOptions::default()).await.unwrap();
        let err = tx.get_by_ids("t", &ids, &ReadOptions::default()).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionReadAfterWrite));
    }

    #[tokio::test]
    async fn read_after_write_can_be_allowed() {
        let db = InMemoryDB::with_config(
            InMemoryDBCfg::new().forbid_transaction_read_after_write(false),
        );
        let mut tx = db.create_transaction(&TransactionOptions::default()).await.unwrap();
        tx.save_batch("t", vec![row("c", 3)], &SaveOptions::default()).await.unwrap();
        let q = polydb_core::DBQuery::create("t");
        assert!(tx.run_query(&q, &ReadOptions::default()).await.unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn read_only_rejects_writes() {
        let db = seeded().await;
        let opt = TransactionOptions { read_only: true };
        let mut tx = db.create_transaction(&opt).await.unwrap();
        assert!(tx.read_only());
        assert!(tx.save_batch("t", vec![row("c", 3)], &SaveOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn rollback_discards() {
        let db = seeded().await;
        let before = db.get_data_snapshot();
        let mut tx = db.create_transaction(&TransactionOptions::default()).await.unwrap();
        tx.delete_by_ids("t", &["a".to_string(), "b".to_string()]).await.unwrap();
        tx.rollback().await;

        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert!(tx.commit().await.is_err());
        assert_eq!(db.get_data_snapshot(), before);
    }

    #[tokio::test]
    async fn run_in_transaction_commits_or_rolls_back() {
        let db = seeded().await;

        run_in_transaction(&db, &TransactionOptions::default(), |tx| {
            Box::pin(async move {
                tx.save_batch("t", vec![row("c", 3)], &SaveOptions::default()).await
            })
        })
        .await
        .unwrap();
        assert_eq!(db.get_data_snapshot()["t"].len(), 3);

        let err = run_in_transaction(&db, &TransactionOptions::default(), |tx| {
            Box::pin(async move {
                tx.delete_by_ids("t", &["a".to_string()]).await?;
                Err::<(), _>(DbError::adapter("boom"))
            })
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "adapter error: boom");
        assert_eq!(db.get_data_snapshot()["t"].len(), 3);
    }

    #[tokio::test]
    async fn concurrent_transactions_last_committer_wins() {
        let db = seeded().await;
        let mut first = db.create_transaction(&TransactionOptions::default()).await.unwrap();
        let mut second = db.create_transaction(&TransactionOptions::default()).await.unwrap();

        first.save_batch("t", vec![row("a", 10)], &SaveOptions::default()).await.unwrap();
        second.save_batch("t", vec![row("a", 20)], &SaveOptions::default()).await.unwrap();
        second.commit().await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(db.get_data_snapshot()["t"]["a"]["k"], json!(10));
    }
}
