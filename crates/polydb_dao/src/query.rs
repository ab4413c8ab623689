//! Queries bound to a dao.

use crate::config::{DaoDeleteOptions, DaoPatchOptions, DaoReadOptions, DaoStreamOptions};
use crate::dao::{CommonDao, DaoQueryResult};
use crate::entity::DaoModel;
use futures::Future;
use polydb_core::{DBQuery, DBQueryFilterOperator, DbResult, PipelineReport, Row};
use serde_json::Value;

/// A [`DBQuery`] that knows which dao runs it.
///
/// ```rust
/// use polydb_core::Row;
/// use polydb_dao::{CommonDao, CommonDaoCfg, DaoReadOptions};
/// use polydb_storage::InMemoryDB;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let dao = CommonDao::new(CommonDaoCfg::<Row>::new(Arc::new(InMemoryDB::new()), "t"));
/// let rows = dao
///     .query()
///     .filter_eq("k", json!(1))
///     .limit(10)
///     .run_query(&DaoReadOptions::default())
///     .await
///     .unwrap();
/// assert!(rows.is_empty());
/// # });
/// ```
pub struct RunnableDBQuery<BM: DaoModel, DBM: DaoModel = BM> {
    dao: CommonDao<BM, DBM>,
    q: DBQuery,
}

impl<BM: DaoModel, DBM: DaoModel> RunnableDBQuery<BM, DBM> {
    pub(crate) fn new(dao: CommonDao<BM, DBM>, q: DBQuery) -> Self {
        Self { dao, q }
    }

    /// The underlying query.
    #[must_use]
    pub fn as_query(&self) -> &DBQuery {
        &self.q
    }

    /// Unbinds the query.
    #[must_use]
    pub fn into_query(self) -> DBQuery {
        self.q
    }

    fn map(mut self, f: impl FnOnce(DBQuery) -> DBQuery) -> Self {
        self.q = f(self.q);
        self
    }

    /// See [`DBQuery::filter`].
    #[must_use]
    pub fn filter(self, name: &str, op: DBQueryFilterOperator, val: Value) -> Self {
        self.map(|q| q.filter(name, op, val))
    }

    /// See [`DBQuery::filter_eq`].
    #[must_use]
    pub fn filter_eq(self, name: &str, val: Value) -> Self {
        self.map(|q| q.filter_eq(name, val))
    }

    /// See [`DBQuery::filter_in`].
    #[must_use]
    pub fn filter_in(self, name: &str, vals: Vec<Value>) -> Self {
        self.map(|q| q.filter_in(name, vals))
    }

    /// See [`DBQuery::order`].
    #[must_use]
    pub fn order(self, name: &str, descending: bool) -> Self {
        self.map(|q| q.order(name, descending))
    }

    /// See [`DBQuery::limit`].
    #[must_use]
    pub fn limit(self, limit: usize) -> Self {
        self.map(|q| q.limit(limit))
    }

    /// See [`DBQuery::offset`].
    #[must_use]
    pub fn offset(self, offset: usize) -> Self {
        self.map(|q| q.offset(offset))
    }

    /// See [`DBQuery::select`].
    #[must_use]
    pub fn select<S: Into<String>>(self, fields: impl IntoIterator<Item = S>) -> Self {
        self.map(|q| q.select(fields))
    }

    /// See [`CommonDao::run_query`].
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn run_query(&self, opt: &DaoReadOptions) -> DbResult<Vec<BM>> {
        self.dao.run_query(&self.q, opt).await
    }

    /// See [`CommonDao::run_query_extended`].
    ///
    /// # Errors
    ///
    /// Returns adapter, conversion and validation errors.
    pub async fn run_query_extended(&self, opt: &DaoReadOptions) -> DbResult<DaoQueryResult<BM>> {
        self.dao.run_query_extended(&self.q, opt).await
    }

    /// See [`CommonDao::run_query_as_dbm`].
    ///
    /// # Errors
    ///
    /// Returns adapter and conversion errors.
    pub async fn run_query_as_dbm(&self, opt: &DaoReadOptions) -> DbResult<Vec<DBM>> {
        self.dao.run_query_as_dbm(&self.q, opt).await
    }

    /// See [`CommonDao::run_query_count`].
    ///
    /// # Errors
    ///
    /// Returns adapter errors.
    pub async fn run_query_count(&self, opt: &DaoReadOptions) -> DbResult<u64> {
        self.dao.run_query_count(&self.q, opt).await
    }

    /// See [`CommonDao::query_ids`].
    ///
    /// # Errors
    ///
    /// Returns adapter errors.
    pub async fn query_ids(&self, opt: &DaoReadOptions) -> DbResult<Vec<String>> {
        self.dao.query_ids(&self.q, opt).await
    }

    /// See [`CommonDao::stream_query_for_each`].
    ///
    /// # Errors
    ///
    /// Follows `opt.error_mode`.
    pub async fn stream_query_for_each<F, Fut>(
        &self,
        opt: &DaoStreamOptions,
        f: F,
    ) -> DbResult<PipelineReport>
    where
        F: Fn(BM, u64) -> Fut,
        Fut: Future<Output = DbResult<()>>,
    {
        self.dao.stream_query_for_each(&self.q, opt, f).await
    }

    /// See [`CommonDao::delete_by_query`].
    ///
    /// # Errors
    ///
    /// Returns immutability and adapter errors.
    pub async fn delete_by_query(&self, opt: &DaoDeleteOptions) -> DbResult<u64> {
        self.dao.delete_by_query(&self.q, opt).await
    }

    /// See [`CommonDao::patch_by_query`].
    ///
    /// # Errors
    ///
    /// Returns immutability and adapter errors.
    pub async fn patch_by_query(&self, patch: &Row, opt: &DaoPatchOptions) -> DbResult<u64> {
        self.dao.patch_by_query(&self.q, patch, opt).await
    }
}
