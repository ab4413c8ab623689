//! Dao operations inside a [`DBTransaction`].

use crate::config::{DaoDeleteOptions, DaoPatchOptions, DaoReadOptions, DaoSaveOptions};
use crate::dao::write::PatchPlan;
use crate::dao::CommonDao;
use crate::entity::DaoModel;
use futures::future::BoxFuture;
use polydb_core::{
    order_by_ids, DBTransaction, DbResult, TransactionOptions, TransactionState,
};
use tracing::debug;

/// A transaction running dao pipelines.
///
/// Writes are buffered by the adapter until [`DaoTransaction::commit`].
pub struct DaoTransaction<BM: DaoModel, DBM: DaoModel = BM> {
    dao: CommonDao<BM, DBM>,
    tx: Box<dyn DBTransaction>,
}

impl<BM: DaoModel, DBM: DaoModel> DaoTransaction<BM, DBM> {
    /// Transaction state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.tx.state()
    }

    /// Loads one row through the read pipeline.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn get_by_id(&mut self, id: &str, opt: &DaoReadOptions) -> DbResult<Option<BM>> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self.get_by_ids(&[id.to_string()], opt).await?.pop())
    }

    /// Loads rows by id, in request order.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn get_by_ids(&mut self, ids: &[String], opt: &DaoReadOptions) -> DbResult<Vec<BM>> {
        let rows = self.tx.get_by_ids(self.dao.table(), ids, &opt.db()).await?;
        self.dao.rows_to_bms(order_by_ids(rows, ids), opt)
    }

    /// Buffers a save of one model.
    ///
    /// # Errors
    ///
    /// Returns validation errors and transaction errors.
    pub async fn save(&mut self, bm: &mut BM, opt: &DaoSaveOptions) -> DbResult<BM> {
        self.dao.require_writable("save")?;
        let prepared = self.dao.prepare_bm(bm, opt)?;
        if let Some(row) = prepared.row {
            let save_options = self.dao.save_options(opt);
            self.tx
                .save_batch(self.dao.table(), vec![row], &save_options)
                .await?;
        }
        Ok(prepared.value)
    }

    /// Buffers a save of many models.
    ///
    /// # Errors
    ///
    /// Returns validation errors and transaction errors.
    pub async fn save_batch(&mut self, bms: &mut [BM], opt: &DaoSaveOptions) -> DbResult<Vec<BM>> {
        self.dao.require_writable("save_batch")?;
        let mut values = Vec::with_capacity(bms.len());
        let mut rows = Vec::with_capacity(bms.len());
        for bm in bms.iter_mut() {
            let prepared = self.dao.prepare_bm(bm, opt)?;
            values.push(prepared.value);
            rows.extend(prepared.row);
        }
        if !rows.is_empty() {
            let save_options = self.dao.save_options(opt);
            self.tx.save_batch(self.dao.table(), rows, &save_options).await?;
        }
        Ok(values)
    }

    /// Loads, merges and buffers a save, like [`CommonDao::patch_by_id`].
    ///
    /// # Errors
    ///
    /// Same as [`CommonDao::patch_by_id`].
    pub async fn patch_by_id(
        &mut self,
        id: &str,
        patch: polydb_core::Row,
        opt: &DaoPatchOptions,
    ) -> DbResult<BM> {
        self.dao.require_mutable("patch_by_id", opt.allow_mutability)?;
        let loaded = self.get_by_id(id, &DaoReadOptions::unvalidated()).await?;
        match self.dao.plan_patch(id, loaded, patch, opt)? {
            PatchPlan::Unchanged(bm) => Ok(bm),
            PatchPlan::Save(mut bm) => self.save(&mut bm, &opt.save()).await,
        }
    }

    /// Buffers a delete of one row.
    ///
    /// # Errors
    ///
    /// Returns immutability and transaction errors.
    pub async fn delete_by_id(&mut self, id: &str, opt: &DaoDeleteOptions) -> DbResult<()> {
        self.delete_by_ids(&[id.to_string()], opt).await
    }

    /// Buffers a delete of rows by id.
    ///
    /// # Errors
    ///
    /// Returns immutability and transaction errors.
    pub async fn delete_by_ids(&mut self, ids: &[String], opt: &DaoDeleteOptions) -> DbResult<()> {
        self.dao.require_mutable("delete_by_ids", opt.allow_mutability)?;
        if ids.is_empty() {
            return Ok(());
        }
        self.tx.delete_by_ids(self.dao.table(), ids).await
    }

    /// Applies every buffered write, or none.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing write.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.tx.commit().await
    }

    /// Discards buffered writes.
    pub async fn rollback(&mut self) {
        self.tx.rollback().await;
    }
}

impl<BM: DaoModel, DBM: DaoModel> CommonDao<BM, DBM> {
    /// Opens a transaction on the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`polydb_core::DbError::Unsupported`] if the adapter has no
    /// transactions.
    pub async fn create_transaction(
        &self,
        opt: &TransactionOptions,
    ) -> DbResult<DaoTransaction<BM, DBM>> {
        let tx = self.cfg.db.create_transaction(opt).await?;
        Ok(DaoTransaction {
            dao: self.clone(),
            tx,
        })
    }

    /// Runs `f` inside a transaction, committing on success and rolling
    /// back on error.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, of opening the transaction, or of the
    /// commit.
    pub async fn run_in_transaction<T, F>(&self, opt: &TransactionOptions, f: F) -> DbResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut DaoTransaction<BM, DBM>) -> BoxFuture<'t, DbResult<T>> + Send,
    {
        let mut tx = self.create_transaction(opt).await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                debug!(table = %self.cfg.table, error = %e, "rolling back dao transaction");
                tx.rollback().await;
                Err(e)
            }
        }
    }
}
