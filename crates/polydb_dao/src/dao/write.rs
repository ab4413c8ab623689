//! Write operations of [`CommonDao`].

use super::CommonDao;
use crate::config::{DaoDeleteOptions, DaoPatchOptions, DaoReadOptions, DaoSaveOptions};
use crate::entity::{from_row, to_row, DaoModel};
use futures::StreamExt;
use polydb_core::{
    Capability, DBQuery, DbError, DbResult, ErrorMode, ReadOptions, Row, RowExt,
    TransactionOptions,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// What `patch_by_id` has to do after merging.
pub(crate) enum PatchPlan<BM> {
    /// The patch changes nothing; no write.
    Unchanged(BM),
    /// Save this merged model.
    Save(BM),
}

impl<BM: DaoModel, DBM: DaoModel> CommonDao<BM, DBM> {
    /// Merges `patch` onto the freshly loaded model.
    pub(crate) fn plan_patch(
        &self,
        id: &str,
        loaded: Option<BM>,
        patch: Row,
        opt: &DaoPatchOptions,
    ) -> DbResult<PatchPlan<BM>> {
        match loaded {
            Some(loaded) => {
                let loaded_row = to_row(&loaded)?;
                let mut merged = loaded_row.clone();
                merged.extend(patch);
                if merged == loaded_row {
                    return Ok(PatchPlan::Unchanged(loaded));
                }
                Ok(PatchPlan::Save(from_row(merged)?))
            }
            None if opt.create_if_missing => {
                let mut part = patch;
                part.set_row_id(id);
                // validated once on save
                Ok(PatchPlan::Save(self.create(part, true)?))
            }
            None => Err(DbError::not_found(&self.cfg.table, id)),
        }
    }

    /// Saves one model.
    ///
    /// Assigns id, `created` and `updated` on `bm` itself, then validates,
    /// converts and saves. If `before_save` vetoes the row, `bm` is returned
    /// unsaved. Otherwise the validated model is returned.
    ///
    /// # Errors
    ///
    /// Returns validation errors, integrity errors (an immutable table
    /// refuses to overwrite an existing id) and adapter errors.
    pub async fn save(&self, bm: &mut BM, opt: &DaoSaveOptions) -> DbResult<BM> {
        self.require_writable("save")?;
        self.log_started("save");
        let prepared = self.prepare_bm(bm, opt)?;
        match prepared.row {
            Some(row) => {
                self.cfg
                    .db
                    .save_batch(&self.cfg.table, vec![row], &self.save_options(opt))
                    .await?;
            }
            None => debug!(table = %self.cfg.table, "save vetoed by before_save"),
        }
        Ok(prepared.value)
    }

    /// Saves many models with one adapter call.
    ///
    /// # Errors
    ///
    /// Same as [`CommonDao::save`]. Nothing is saved if any model fails
    /// validation.
    pub async fn save_batch(&self, bms: &mut [BM], opt: &DaoSaveOptions) -> DbResult<Vec<BM>> {
        self.require_writable("save_batch")?;
        self.log_started("save_batch");
        let mut values = Vec::with_capacity(bms.len());
        let mut rows = Vec::with_capacity(bms.len());
        for bm in bms.iter_mut() {
            let prepared = self.prepare_bm(bm, opt)?;
            values.push(prepared.value);
            rows.extend(prepared.row);
        }
        if !rows.is_empty() {
            self.cfg
                .db
                .save_batch(&self.cfg.table, rows, &self.save_options(opt))
                .await?;
        }
        Ok(values)
    }

    /// Saves a stored-shape model, skipping BM validation.
    ///
    /// # Errors
    ///
    /// Returns integrity and adapter errors.
    pub async fn save_as_dbm(&self, dbm: DBM, opt: &DaoSaveOptions) -> DbResult<DBM> {
        let mut saved = self.save_batch_as_dbm(vec![dbm], opt).await?;
        saved
            .pop()
            .ok_or_else(|| DbError::invalid_operation("save_as_dbm produced no row"))
    }

    /// Saves stored-shape models with one adapter call.
    ///
    /// # Errors
    ///
    /// Returns integrity and adapter errors.
    pub async fn save_batch_as_dbm(
        &self,
        dbms: Vec<DBM>,
        opt: &DaoSaveOptions,
    ) -> DbResult<Vec<DBM>> {
        self.require_writable("save_batch_as_dbm")?;
        self.log_started("save_batch_as_dbm");
        let mut values = Vec::with_capacity(dbms.len());
        let mut rows = Vec::with_capacity(dbms.len());
        for dbm in dbms {
            let prepared = self.prepare_dbm(dbm, opt)?;
            values.push(prepared.value);
            rows.extend(prepared.row);
        }
        if !rows.is_empty() {
            self.cfg
                .db
                .save_batch(&self.cfg.table, rows, &self.save_options(opt))
                .await?;
        }
        Ok(values)
    }

    /// Loads the row, merges `patch` on top of it and saves the result.
    ///
    /// No write happens when the merge changes nothing. A missing row is
    /// created from `patch` with `create_if_missing`, otherwise it is an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] for a missing row without
    /// `create_if_missing`, and the errors of [`CommonDao::save`].
    pub async fn patch_by_id(&self, id: &str, patch: Row, opt: &DaoPatchOptions) -> DbResult<BM> {
        self.require_mutable("patch_by_id", opt.allow_mutability)?;
        self.log_started("patch_by_id");

        if self.cfg.patch_in_transaction && self.cfg.db.support().transactions {
            let id = id.to_string();
            let opt = opt.clone();
            return self
                .run_in_transaction(&TransactionOptions::default(), move |tx| {
                    Box::pin(async move { tx.patch_by_id(&id, patch, &opt).await })
                })
                .await;
        }

        let loaded = self.get_by_id(id, &DaoReadOptions::unvalidated()).await?;
        match self.plan_patch(id, loaded, patch, opt)? {
            PatchPlan::Unchanged(bm) => Ok(bm),
            PatchPlan::Save(mut bm) => self.save(&mut bm, &opt.save()).await,
        }
    }

    /// Patches the caller's model against the stored row.
    ///
    /// The stored row is loaded and `patch` is merged on top of it, not on
    /// top of `bm`. `bm` is then replaced by the loaded and patched state,
    /// so edits made elsewhere since `bm` was read show up in `bm` too,
    /// including removed fields. No write happens when the patch changes nothing
    /// relative to the stored row.
    ///
    /// With `skip_db_read`, `patch` is merged into `bm` directly and saved.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`CommonDao::save`].
    pub async fn patch(&self, bm: &mut BM, patch: Row, opt: &DaoPatchOptions) -> DbResult<BM> {
        self.require_mutable("patch", opt.allow_mutability)?;
        self.log_started("patch");
        let loaded = match bm.id().map(str::to_string) {
            Some(id) if !opt.skip_db_read => {
                self.get_by_id(&id, &DaoReadOptions::unvalidated()).await?
            }
            _ => None,
        };

        let merged = match loaded {
            Some(loaded) => {
                // fields absent from the stored row are dropped from bm
                let loaded_row = to_row(&loaded)?;
                let mut merged = loaded_row.clone();
                merged.extend(patch);
                if merged == loaded_row {
                    *bm = loaded;
                    return Ok(bm.clone());
                }
                merged
            }
            None => {
                let mut merged = to_row(&*bm)?;
                merged.extend(patch);
                merged
            }
        };
        *bm = from_row(merged)?;
        self.save(bm, &opt.save()).await
    }

    /// Patches the rows with the given ids.
    ///
    /// # Errors
    ///
    /// Same as [`CommonDao::patch_by_query`].
    pub async fn patch_by_ids(
        &self,
        ids: &[String],
        patch: &Row,
        opt: &DaoPatchOptions,
    ) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let values = ids.iter().cloned().map(Value::String).collect();
        let q = DBQuery::create(&self.cfg.table).filter_in("id", values);
        self.patch_by_query(&q, patch, opt).await
    }

    /// Merges `patch` into every row matching `q`, returning how many
    /// matched.
    ///
    /// Uses the adapter's `patch_by_query` when it has one; otherwise loads
    /// the rows and saves them back.
    ///
    /// # Errors
    ///
    /// Returns immutability and adapter errors.
    pub async fn patch_by_query(
        &self,
        q: &DBQuery,
        patch: &Row,
        opt: &DaoPatchOptions,
    ) -> DbResult<u64> {
        self.require_mutable("patch_by_query", opt.allow_mutability)?;
        self.log_started("patch_by_query");
        let q = self.bound(q);
        if self.cfg.db.support().patch_by_query {
            return self.cfg.db.patch_by_query(&q, patch).await;
        }

        let rows = self.cfg.db.run_query(&q, &ReadOptions::default()).await?.rows;
        let matched = rows.len() as u64;
        let patched: Vec<Row> = rows
            .into_iter()
            .map(|mut row| {
                row.extend(patch.clone());
                row
            })
            .collect();
        if !patched.is_empty() {
            self.cfg
                .db
                .save_batch(&self.cfg.table, patched, &self.save_options(&opt.save()))
                .await?;
        }
        Ok(matched)
    }

    /// Adds `by` to the integer field `prop` of row `id`, returning the new
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unsupported`] if the adapter cannot increment and
    /// [`DbError::NotFound`] for a missing row.
    pub async fn increment(&self, prop: &str, id: &str, by: i64) -> DbResult<i64> {
        let out = self
            .increment_batch(prop, &HashMap::from([(id.to_string(), by)]))
            .await?;
        out.get(id)
            .copied()
            .ok_or_else(|| DbError::not_found(&self.cfg.table, id))
    }

    /// Adds a delta per id to the integer field `prop`.
    ///
    /// # Errors
    ///
    /// Same as [`CommonDao::increment`].
    pub async fn increment_batch(
        &self,
        prop: &str,
        increments: &HashMap<String, i64>,
    ) -> DbResult<HashMap<String, i64>> {
        self.require_mutable("increment", false)?;
        self.cfg
            .db
            .support()
            .require(Capability::Increment, self.cfg.db.name(), "increment_batch")?;
        self.cfg.db.increment_batch(&self.cfg.table, prop, increments).await
    }

    /// Deletes one row, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns immutability and adapter errors.
    pub async fn delete_by_id(&self, id: &str, opt: &DaoDeleteOptions) -> DbResult<u64> {
        if id.is_empty() {
            return Ok(0);
        }
        self.delete_by_ids(&[id.to_string()], opt).await
    }

    /// Deletes rows by id, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns immutability and adapter errors.
    pub async fn delete_by_ids(&self, ids: &[String], opt: &DaoDeleteOptions) -> DbResult<u64> {
        self.require_mutable("delete_by_ids", opt.allow_mutability)?;
        self.log_started("delete_by_ids");
        if ids.is_empty() {
            return Ok(0);
        }
        self.cfg.db.delete_by_ids(&self.cfg.table, ids).await
    }

    /// Deletes rows matching `q`, returning how many were deleted.
    ///
    /// With `chunk_size > 0` the matching ids are streamed and deleted in
    /// chunks, up to `chunk_concurrency` at a time. Chunk failures follow
    /// `error_mode`.
    ///
    /// # Errors
    ///
    /// Returns immutability and adapter errors, or an aggregate of chunk
    /// errors under [`ErrorMode::ThrowAggregated`].
    pub async fn delete_by_query(&self, q: &DBQuery, opt: &DaoDeleteOptions) -> DbResult<u64> {
        self.require_mutable("delete_by_query", opt.allow_mutability)?;
        self.log_started("delete_by_query");
        let q = self.bound(q);
        if opt.chunk_size == 0 {
            return self.cfg.db.delete_by_query(&q).await;
        }

        let db = &self.cfg.db;
        let table = self.cfg.table.as_str();
        let ids_query = q.select(["id"]);
        let mut chunks = db
            .stream_query(&ids_query, &ReadOptions::default())
            .map(|res| {
                res.and_then(|row| {
                    row.row_id().map(str::to_string).ok_or_else(|| {
                        DbError::invalid_format(format!("row without id in {table}"))
                    })
                })
            })
            .chunks(opt.chunk_size)
            .map(move |chunk| async move {
                let ids = chunk.into_iter().collect::<DbResult<Vec<String>>>()?;
                db.delete_by_ids(table, &ids).await
            })
            .buffer_unordered(opt.chunk_concurrency.max(1));

        let mut deleted = 0;
        let mut errors = Vec::new();
        while let Some(res) = chunks.next().await {
            match res {
                Ok(n) => deleted += n,
                Err(e) => match opt.error_mode {
                    ErrorMode::ThrowImmediately => return Err(e),
                    ErrorMode::ThrowAggregated => errors.push(e),
                    ErrorMode::Suppress => warn!(table, error = %e, "chunk delete failed"),
                },
            }
        }
        opt.error_mode.finish(errors)?;
        Ok(deleted)
    }
}
