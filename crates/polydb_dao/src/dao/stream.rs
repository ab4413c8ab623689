//! Streaming operations of [`CommonDao`].

use super::CommonDao;
use crate::config::{DaoSaveOptions, DaoStreamOptions};
use crate::entity::DaoModel;
use futures::stream::BoxStream;
use futures::{future, Future, StreamExt};
use polydb_core::{
    run_pipeline, DBQuery, DbError, DbResult, Flow, PipelineReport, Row, RowExt,
};

impl<BM: DaoModel, DBM: DaoModel> CommonDao<BM, DBM> {
    fn pipeline_name(&self, op: &str) -> String {
        format!("{}.{op}", self.cfg.table)
    }

    /// Streams converted rows of `q`. Rows vetoed by `after_load` are
    /// skipped.
    pub fn stream_query<'a>(
        &'a self,
        q: &DBQuery,
        opt: &DaoStreamOptions,
    ) -> BoxStream<'a, DbResult<BM>> {
        let read = opt.read();
        let rows = self.cfg.db.stream_query(&self.bound(q), &read.db());
        let rows = if opt.limit > 0 {
            rows.take(opt.limit as usize).boxed()
        } else {
            rows
        };
        rows.filter_map(move |res| {
            future::ready(res.and_then(|row| self.row_to_bm(row, &read)).transpose())
        })
        .boxed()
    }

    /// Calls `f` for every converted row of `q`, up to `opt.concurrency`
    /// calls in flight.
    ///
    /// # Errors
    ///
    /// Follows `opt.error_mode`: the first error, an aggregate of all
    /// errors, or nothing.
    pub async fn stream_query_for_each<F, Fut>(
        &self,
        q: &DBQuery,
        opt: &DaoStreamOptions,
        f: F,
    ) -> DbResult<PipelineReport>
    where
        F: Fn(BM, u64) -> Fut,
        Fut: Future<Output = DbResult<()>>,
    {
        self.log_started("stream_query_for_each");
        let read = opt.read();
        let input = self.cfg.db.stream_query(&self.bound(q), &read.db());
        let (read, f) = (&read, &f);
        run_pipeline(
            input,
            &opt.pipeline(self.pipeline_name("stream_query_for_each")),
            move |row, index| async move {
                match self.row_to_bm(row, read)? {
                    Some(bm) => {
                        f(bm, index).await?;
                        Ok(Flow::Emit(()))
                    }
                    None => Ok::<_, DbError>(Flow::Skip),
                }
            },
            |_: Vec<()>| async { Ok::<(), DbError>(()) },
        )
        .await?
        .into_result()
    }

    /// Like [`CommonDao::stream_query_for_each`], with stored models.
    ///
    /// # Errors
    ///
    /// Follows `opt.error_mode`.
    pub async fn stream_query_as_dbm_for_each<F, Fut>(
        &self,
        q: &DBQuery,
        opt: &DaoStreamOptions,
        f: F,
    ) -> DbResult<PipelineReport>
    where
        F: Fn(DBM, u64) -> Fut,
        Fut: Future<Output = DbResult<()>>,
    {
        self.log_started("stream_query_as_dbm_for_each");
        let read = opt.read();
        let input = self.cfg.db.stream_query(&self.bound(q), &read.db());
        let (read, f) = (&read, &f);
        run_pipeline(
            input,
            &opt.pipeline(self.pipeline_name("stream_query_as_dbm_for_each")),
            move |row, index| async move {
                match self.row_to_dbm(row, read)? {
                    Some(dbm) => {
                        f(dbm, index).await?;
                        Ok(Flow::Emit(()))
                    }
                    None => Ok::<_, DbError>(Flow::Skip),
                }
            },
            |_: Vec<()>| async { Ok::<(), DbError>(()) },
        )
        .await?
        .into_result()
    }

    /// Calls `f` with the id of every row matching `q`.
    ///
    /// # Errors
    ///
    /// Follows `opt.error_mode`.
    pub async fn stream_query_ids_for_each<F, Fut>(
        &self,
        q: &DBQuery,
        opt: &DaoStreamOptions,
        f: F,
    ) -> DbResult<PipelineReport>
    where
        F: Fn(String, u64) -> Fut,
        Fut: Future<Output = DbResult<()>>,
    {
        self.log_started("stream_query_ids_for_each");
        let q = self.bound(q).select(["id"]);
        let input = self.cfg.db.stream_query(&q, &opt.read().db());
        let f = &f;
        run_pipeline(
            input,
            &opt.pipeline(self.pipeline_name("stream_query_ids_for_each")),
            move |row: Row, index| async move {
                match row.row_id() {
                    Some(id) => {
                        f(id.to_string(), index).await?;
                        Ok(Flow::Emit(()))
                    }
                    None => Ok::<_, DbError>(Flow::Skip),
                }
            },
            |_: Vec<()>| async { Ok::<(), DbError>(()) },
        )
        .await?
        .into_result()
    }

    /// Saves a stream of models in chunks of `opt.chunk_size`.
    ///
    /// Every model goes through the same pipeline as [`CommonDao::save`].
    /// Models vetoed by `before_save` are skipped.
    ///
    /// # Errors
    ///
    /// Follows `opt.error_mode`. Chunks saved before a failure stay saved.
    pub async fn stream_save<'s>(
        &self,
        input: BoxStream<'s, DbResult<BM>>,
        opt: &DaoStreamOptions,
        save_opt: &DaoSaveOptions,
    ) -> DbResult<PipelineReport> {
        self.require_writable("stream_save")?;
        self.log_started("stream_save");
        let save_options = self.save_options(save_opt);
        let save_options = &save_options;
        run_pipeline(
            input,
            &opt.pipeline(self.pipeline_name("stream_save")),
            move |mut bm, _| async move {
                let prepared = self.prepare_bm(&mut bm, save_opt)?;
                Ok::<_, DbError>(match prepared.row {
                    Some(row) => Flow::Emit(row),
                    None => Flow::Skip,
                })
            },
            move |rows: Vec<Row>| async move {
                self.cfg.db.save_batch(&self.cfg.table, rows, save_options).await
            },
        )
        .await?
        .into_result()
    }
}
