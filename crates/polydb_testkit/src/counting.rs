//! A `CommonDB` wrapper that counts calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use polydb_core::{
    CommonDB, CommonDBSupport, CreateTableOptions, DBQuery, DBTransaction, DbResult,
    JsonSchemaObject, ReadOptions, Row, RowStream, RunQueryResult, SaveOptions,
    TransactionOptions,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Forwards every call to an inner adapter and records how often each
/// operation was invoked and how many ids or rows it carried.
pub struct CountingDB {
    inner: Arc<dyn CommonDB>,
    calls: Mutex<BTreeMap<&'static str, u64>>,
    rows: Mutex<BTreeMap<&'static str, u64>>,
}

impl CountingDB {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn CommonDB>) -> Self {
        Self {
            inner,
            calls: Mutex::new(BTreeMap::new()),
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of calls to `op`.
    #[must_use]
    pub fn calls(&self, op: &str) -> u64 {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    /// Total ids or rows passed to `op`.
    #[must_use]
    pub fn rows(&self, op: &str) -> u64 {
        self.rows.lock().get(op).copied().unwrap_or(0)
    }

    /// Forgets all counts.
    pub fn reset(&self) {
        self.calls.lock().clear();
        self.rows.lock().clear();
    }

    fn record(&self, op: &'static str, rows: usize) {
        *self.calls.lock().entry(op).or_default() += 1;
        *self.rows.lock().entry(op).or_default() += rows as u64;
    }
}

#[async_trait]
impl CommonDB for CountingDB {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn support(&self) -> &CommonDBSupport {
        self.inner.support()
    }

    async fn ping(&self) -> DbResult<()> {
        self.record("ping", 0);
        self.inner.ping().await
    }

    async fn get_tables(&self) -> DbResult<Vec<String>> {
        self.record("get_tables", 0);
        self.inner.get_tables().await
    }

    async fn get_table_schema(&self, table: &str) -> DbResult<JsonSchemaObject> {
        self.record("get_table_schema", 0);
        self.inner.get_table_schema(table).await
    }

    async fn create_table(
        &self,
        table: &str,
        schema: &JsonSchemaObject,
        opt: &CreateTableOptions,
    ) -> DbResult<()> {
        self.record("create_table", 0);
        self.inner.create_table(table, schema, opt).await
    }

    async fn get_by_ids(
        &self,
        table: &str,
        ids: &[String],
        opt: &ReadOptions,
    ) -> DbResult<Vec<Row>> {
        self.record("get_by_ids", ids.len());
        self.inner.get_by_ids(table, ids, opt).await
    }

    async fn run_query(&self, q: &DBQuery, opt: &ReadOptions) -> DbResult<RunQueryResult> {
        self.record("run_query", 0);
        self.inner.run_query(q, opt).await
    }

    async fn run_query_count(&self, q: &DBQuery, opt: &ReadOptions) -> DbResult<u64> {
        self.record("run_query_count", 0);
        self.inner.run_query_count(q, opt).await
    }

    fn stream_query<'a>(&'a self, q: &DBQuery, opt: &ReadOptions) -> RowStream<'a> {
        self.record("stream_query", 0);
        self.inner.stream_query(q, opt)
    }

    async fn save_batch(&self, table: &str, rows: Vec<Row>, opt: &SaveOptions) -> DbResult<()> {
        self.record("save_batch", rows.len());
        self.inner.save_batch(table, rows, opt).await
    }

    async fn delete_by_ids(&self, table: &str, ids: &[String]) -> DbResult<u64> {
        self.record("delete_by_ids", ids.len());
        self.inner.delete_by_ids(table, ids).await
    }

    async fn delete_by_query(&self, q: &DBQuery) -> DbResult<u64> {
        self.record("delete_by_query", 0);
        self.inner.delete_by_query(q).await
    }

    async fn patch_by_query(&self, q: &DBQuery, patch: &Row) -> DbResult<u64> {
        self.record("patch_by_query", 0);
        self.inner.patch_by_query(q, patch).await
    }

    async fn increment_batch(
        &self,
        table: &str,
        prop: &str,
        increments: &HashMap<String, i64>,
    ) -> DbResult<HashMap<String, i64>> {
        self.record("increment_batch", increments.len());
        self.inner.increment_batch(table, prop, increments).await
    }

    async fn create_transaction(
        &self,
        opt: &TransactionOptions,
    ) -> DbResult<Box<dyn DBTransaction>> {
        self.record("create_transaction", 0);
        self.inner.create_transaction(opt).await
    }
}
