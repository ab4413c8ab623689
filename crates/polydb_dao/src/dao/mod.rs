//! The [`CommonDao`] type and its read operations.

mod stream;
pub(crate) mod write;

use crate::config::{CommonDaoCfg, DaoReadOptions, DaoSaveOptions};
use crate::entity::{from_row, to_row, DaoModel};
use crate::hooks::HookOutcome;
use crate::query::RunnableDBQuery;
use polydb_core::{
    now_unix, order_by_ids, DBQuery, DbError, DbResult, Row, RowExt, SaveMethod, SaveOptions,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Rows of a query plus the cursor to continue from.
#[derive(Debug, Clone, PartialEq)]
pub struct DaoQueryResult<T> {
    /// Converted rows.
    pub rows: Vec<T>,
    /// Cursor for stores with cursor support.
    pub end_cursor: Option<String>,
}

/// Typed access to one table of a [`polydb_core::CommonDB`].
///
/// `BM` is the business model handed to callers, `DBM` the shape stored
/// in the adapter. Reads run `DBM → after_load → anonymize →
/// before_dbm_to_bm → validate → BM`; writes run `BM → id and timestamps
/// → validate → before_bm_to_dbm → before_save → save_batch`.
///
/// Lookups return `None` or omit missing rows. The `require*` variants
/// fail with [`DbError::NotFound`] instead.
///
/// Cloning is cheap; clones share the configuration.
pub struct CommonDao<BM: DaoModel, DBM: DaoModel = BM> {
    pub(crate) cfg: Arc<CommonDaoCfg<BM, DBM>>,
}

impl<BM: DaoModel, DBM: DaoModel> Clone for CommonDao<BM, DBM> {
    fn clone(&self) -> Self {
        Self {
            cfg: Arc::clone(&self.cfg),
        }
    }
}

impl<BM: DaoModel, DBM: DaoModel> CommonDao<BM, DBM> {
    /// Creates a dao.
    #[must_use]
    pub fn new(cfg: CommonDaoCfg<BM, DBM>) -> Self {
        Self { cfg: Arc::new(cfg) }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CommonDaoCfg<BM, DBM> {
        &self.cfg
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.cfg.table
    }

    /// Starts a query over this table, bound to this dao.
    #[must_use]
    pub fn query(&self) -> RunnableDBQuery<BM, DBM> {
        RunnableDBQuery::new(self.clone(), DBQuery::create(&self.cfg.table))
    }

    // Pipelines

    pub(crate) fn log_started(&self, op: &str) {
        if self.cfg.log_started {
            info!(table = %self.cfg.table, op, "started");
        }
    }

    pub(crate) fn bound(&self, q: &DBQuery) -> DBQuery {
        q.clone().with_table(&self.cfg.table)
    }

    /// Validates `bm` against the configured schema.
    pub(crate) fn validate(&self, bm: BM, skip: bool) -> DbResult<BM> {
        let Some(schema) = self.cfg.validation.as_ref().filter(|_| !skip) else {
            return Ok(bm);
        };
        let id = bm.id().map(str::to_string);
        match schema.validate(bm.clone()) {
            Ok(valid) => Ok(valid),
            Err(err) => {
                let err = err.for_object(&self.cfg.table, id);
                match self.cfg.hooks.on_validation_error(err) {
                    Some(mut err) => {
                        err.redact(&self.cfg.redacted_fields);
                        Err(DbError::Validation(err))
                    }
                    None => Ok(bm),
                }
            }
        }
    }

    /// Loaded row to DBM. `None` when `after_load` vetoes it.
    pub(crate) fn row_to_dbm(&self, row: Row, opt: &DaoReadOptions) -> DbResult<Option<DBM>> {
        let dbm: DBM = from_row(row)?;
        let HookOutcome::Keep(dbm) = self.cfg.hooks.after_load(dbm) else {
            return Ok(None);
        };
        Ok(Some(if opt.anonymize {
            self.cfg.hooks.anonymize(dbm)
        } else {
            dbm
        }))
    }

    /// Loaded row to BM. `None` when `after_load` vetoes it.
    pub(crate) fn row_to_bm(&self, row: Row, opt: &DaoReadOptions) -> DbResult<Option<BM>> {
        let Some(dbm) = self.row_to_dbm(row, opt)? else {
            return Ok(None);
        };
        let bm = self.cfg.hooks.before_dbm_to_bm(dbm)?;
        self.validate(bm, opt.skip_validation).map(Some)
    }

    pub(crate) fn rows_to_bms(&self, rows: Vec<Row>, opt: &DaoReadOptions) -> DbResult<Vec<BM>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.extend(self.row_to_bm(row, opt)?);
        }
        Ok(out)
    }

    pub(crate) fn rows_to_dbms(&self, rows: Vec<Row>, opt: &DaoReadOptions) -> DbResult<Vec<DBM>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.extend(self.row_to_dbm(row, opt)?);
        }
        Ok(out)
    }

    /// Assigns id and timestamps, mutating the caller's model.
    pub(crate) fn assign_id_and_timestamps<T, F>(
        &self,
        m: &mut T,
        opt: &DaoSaveOptions,
        natural_id: F,
    )
    where
        T: DaoModel,
        F: FnOnce(&T) -> Option<String>,
    {
        let now = now_unix();
        if self.cfg.use_created_property && m.created().is_none() {
            m.set_created(now);
        }
        if self.cfg.use_updated_property && !(opt.preserve_updated && m.updated().is_some()) {
            m.set_updated(now);
        }
        if m.id().is_none() && !self.cfg.assign_generated_ids {
            let id = natural_id(&*m).unwrap_or_else(|| self.cfg.hooks.create_random_id());
            m.set_id(id);
        }
    }

    /// BM on its way to storage: id and timestamps, validation,
    /// conversion and `before_save`. `None` when the save is vetoed.
    pub(crate) fn prepare_bm(&self, bm: &mut BM, opt: &DaoSaveOptions) -> DbResult<Prepared<BM>> {
        self.assign_id_and_timestamps(bm, opt, |bm| self.cfg.hooks.create_natural_id(bm));
        let valid = self.validate(bm.clone(), opt.skip_validation)?;
        let dbm = self.cfg.hooks.before_bm_to_dbm(valid.clone())?;
        match self.cfg.hooks.before_save(dbm) {
            HookOutcome::Keep(dbm) => Ok(Prepared {
                value: valid,
                row: Some(to_row(&dbm)?),
            }),
            HookOutcome::Drop => Ok(Prepared {
                value: bm.clone(),
                row: None,
            }),
        }
    }

    /// DBM on its way to storage: id and timestamps and `before_save`.
    pub(crate) fn prepare_dbm(
        &self,
        mut dbm: DBM,
        opt: &DaoSaveOptions,
    ) -> DbResult<Prepared<DBM>> {
        self.assign_id_and_timestamps(&mut dbm, opt, |_| None);
        match self.cfg.hooks.before_save(dbm.clone()) {
            HookOutcome::Keep(saved) => Ok(Prepared {
                row: Some(to_row(&saved)?),
                value: saved,
            }),
            HookOutcome::Drop => Ok(Prepared {
                value: dbm,
                row: None,
            }),
        }
    }

    pub(crate) fn save_options(&self, opt: &DaoSaveOptions) -> SaveOptions {
        let save_method = if self.cfg.immutable && !opt.allow_mutability {
            SaveMethod::Insert
        } else {
            opt.save_method
        };
        SaveOptions {
            save_method,
            assign_generated_ids: self.cfg.assign_generated_ids,
        }
    }

    pub(crate) fn require_writable(&self, op: &str) -> DbResult<()> {
        if self.cfg.read_only {
            return Err(DbError::invalid_operation(format!(
                "{op} is not allowed on read-only table {}",
                self.cfg.table
            )));
        }
        Ok(())
    }

    pub(crate) fn require_mutable(&self, op: &str, allow_mutability: bool) -> DbResult<()> {
        self.require_writable(op)?;
        if self.cfg.immutable && !allow_mutability {
            return Err(DbError::immutable(&self.cfg.table, op));
        }
        Ok(())
    }

    // Reads

    /// Loads one row. An empty id is never found.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn get_by_id(&self, id: &str, opt: &DaoReadOptions) -> DbResult<Option<BM>> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self.get_by_ids(&[id.to_string()], opt).await?.pop())
    }

    /// Loads one row or builds a new model from `part` with this id.
    ///
    /// The new model is not saved.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn get_by_id_or_empty(
        &self,
        id: &str,
        part: Row,
        opt: &DaoReadOptions,
    ) -> DbResult<BM> {
        if let Some(bm) = self.get_by_id(id, opt).await? {
            return Ok(bm);
        }
        let mut part = part;
        part.set_row_id(id);
        self.create(part, opt.skip_validation)
    }

    /// Loads rows by id, in request order. Missing ids are omitted.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn get_by_ids(&self, ids: &[String], opt: &DaoReadOptions) -> DbResult<Vec<BM>> {
        self.log_started("get_by_ids");
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.cfg.db.get_by_ids(&self.cfg.table, ids, &opt.db()).await?;
        self.rows_to_bms(order_by_ids(rows, ids), opt)
    }

    /// Loads one row, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] for a missing row.
    pub async fn require_by_id(&self, id: &str, opt: &DaoReadOptions) -> DbResult<BM> {
        self.get_by_id(id, opt)
            .await?
            .ok_or_else(|| DbError::not_found(&self.cfg.table, id))
    }

    /// Loads rows by id, failing if any is missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] naming the first missing id.
    pub async fn require_by_ids(&self, ids: &[String], opt: &DaoReadOptions) -> DbResult<Vec<BM>> {
        let bms = self.get_by_ids(ids, opt).await?;
        if let Some(missing) = ids
            .iter()
            .find(|id| !bms.iter().any(|bm| bm.id() == Some(id.as_str())))
        {
            return Err(DbError::not_found(&self.cfg.table, missing.as_str()));
        }
        Ok(bms)
    }

    /// Loads one row as the stored model.
    ///
    /// # Errors
    ///
    /// Returns adapter and conversion errors.
    pub async fn get_by_id_as_dbm(&self, id: &str, opt: &DaoReadOptions) -> DbResult<Option<DBM>> {
        if id.is_empty() {
            return Ok(None);
        }
        Ok(self.get_by_ids_as_dbm(&[id.to_string()], opt).await?.pop())
    }

    /// Loads rows by id as the stored model, in request order.
    ///
    /// # Errors
    ///
    /// Returns adapter and conversion errors.
    pub async fn get_by_ids_as_dbm(
        &self,
        ids: &[String],
        opt: &DaoReadOptions,
    ) -> DbResult<Vec<DBM>> {
        self.log_started("get_by_ids_as_dbm");
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.cfg.db.get_by_ids(&self.cfg.table, ids, &opt.db()).await?;
        self.rows_to_dbms(order_by_ids(rows, ids), opt)
    }

    /// Returns the first row whose `prop` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn get_one_by(
        &self,
        prop: &str,
        value: Value,
        opt: &DaoReadOptions,
    ) -> DbResult<Option<BM>> {
        let q = DBQuery::create(&self.cfg.table).filter_eq(prop, value).limit(1);
        Ok(self.run_query(&q, opt).await?.into_iter().next())
    }

    /// Returns every row whose `prop` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn get_all_by(
        &self,
        prop: &str,
        value: Value,
        opt: &DaoReadOptions,
    ) -> DbResult<Vec<BM>> {
        let q = DBQuery::create(&self.cfg.table).filter_eq(prop, value);
        self.run_query(&q, opt).await
    }

    /// Returns every row of the table.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn get_all(&self, opt: &DaoReadOptions) -> DbResult<Vec<BM>> {
        self.run_query(&DBQuery::create(&self.cfg.table), opt).await
    }

    /// Runs `q` against this table.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn run_query(&self, q: &DBQuery, opt: &DaoReadOptions) -> DbResult<Vec<BM>> {
        Ok(self.run_query_extended(q, opt).await?.rows)
    }

    /// Runs `q`, keeping the end cursor.
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn run_query_extended(
        &self,
        q: &DBQuery,
        opt: &DaoReadOptions,
    ) -> DbResult<DaoQueryResult<BM>> {
        self.log_started("run_query");
        let res = self.cfg.db.run_query(&self.bound(q), &opt.db()).await?;
        Ok(DaoQueryResult {
            rows: self.rows_to_bms(res.rows, opt)?,
            end_cursor: res.end_cursor,
        })
    }

    /// Runs `q`, returning stored models.
    ///
    /// # Errors
    ///
    /// Returns adapter and conversion errors.
    pub async fn run_query_as_dbm(&self, q: &DBQuery, opt: &DaoReadOptions) -> DbResult<Vec<DBM>> {
        self.log_started("run_query_as_dbm");
        let res = self.cfg.db.run_query(&self.bound(q), &opt.db()).await?;
        self.rows_to_dbms(res.rows, opt)
    }

    /// Counts rows matching `q`.
    ///
    /// # Errors
    ///
    /// Returns adapter errors.
    pub async fn run_query_count(&self, q: &DBQuery, opt: &DaoReadOptions) -> DbResult<u64> {
        self.cfg.db.run_query_count(&self.bound(q), &opt.db()).await
    }

    /// Returns the ids of rows matching `q`.
    ///
    /// # Errors
    ///
    /// Returns adapter errors.
    pub async fn query_ids(&self, q: &DBQuery, opt: &DaoReadOptions) -> DbResult<Vec<String>> {
        let q = self.bound(q).select(["id"]);
        let res = self.cfg.db.run_query(&q, &opt.db()).await?;
        Ok(res
            .rows
            .iter()
            .filter_map(|r| r.row_id().map(str::to_string))
            .collect())
    }

    /// Builds a model from `part` without saving it.
    ///
    /// Fields parsed from a natural id in `part` are merged under it. An id
    /// is assigned if `part` has none.
    ///
    /// # Errors
    ///
    /// Returns conversion and validation errors.
    pub fn create(&self, part: Row, skip_validation: bool) -> DbResult<BM> {
        let mut row = match part.row_id() {
            Some(id) => self.cfg.hooks.parse_natural_id(id),
            None => Row::new(),
        };
        row.extend(part);
        let mut bm: BM = from_row(row)?;
        if bm.id().is_none() {
            let id = self
                .cfg
                .hooks
                .create_natural_id(&bm)
                .unwrap_or_else(|| self.cfg.hooks.create_random_id());
            bm.set_id(id);
        }
        self.validate(bm, skip_validation)
    }
}

/// A model ready to be saved, or vetoed (`row` is `None`).
pub(crate) struct Prepared<T> {
    pub(crate) value: T,
    pub(crate) row: Option<Row>,
}

#[cfg(test)]
mod tests;
