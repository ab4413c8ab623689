//! Read-through / write-through cache adapter.
//!
//! [`CacheDB`] layers a cache store in front of a downstream store. Both are
//! full [`CommonDB`] instances. Writes go downstream first and are then
//! mirrored into the cache; reads are served from the cache where possible
//! and written back after a downstream hit.
//!
//! The cache is best-effort: failures while writing to it are logged and
//! never undo a downstream write.

use async_trait::async_trait;
use futures::StreamExt;
use polydb_core::{
    order_by_ids, Capability, CommonDB, CommonDBSupport, CreateTableOptions, DBQuery, DbResult,
    JsonSchemaObject, ReadOptions, Row, RowExt, RowStream, RunQueryResult, SaveOptions,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Streamed rows written back to the cache per `save_batch`.
const STREAM_CACHE_CHUNK: usize = 100;

/// Configuration of a [`CacheDB`].
#[derive(Clone)]
pub struct CacheDBCfg {
    /// Adapter name.
    pub name: String,
    /// The cache store.
    pub cache_db: Arc<dyn CommonDB>,
    /// The source of truth.
    pub downstream_db: Arc<dyn CommonDB>,
    /// Never read from or write to the cache.
    pub skip_cache: bool,
    /// Never touch the downstream store.
    pub only_cache: bool,
    /// Wait for cache writes instead of spawning them.
    pub await_cache: bool,
    /// Log rows served from the cache.
    pub log_cached: bool,
    /// Log rows fetched from downstream.
    pub log_downstream: bool,
}

impl CacheDBCfg {
    /// Creates a configuration with default policy flags.
    #[must_use]
    pub fn new(cache_db: Arc<dyn CommonDB>, downstream_db: Arc<dyn CommonDB>) -> Self {
        Self {
            name: "CacheDB".to_string(),
            cache_db,
            downstream_db,
            skip_cache: false,
            only_cache: false,
            await_cache: false,
            log_cached: false,
            log_downstream: false,
        }
    }

    /// Sets the adapter name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the default for skipping the cache.
    #[must_use]
    pub fn skip_cache(mut self, value: bool) -> Self {
        self.skip_cache = value;
        self
    }

    /// Sets the default for using only the cache.
    #[must_use]
    pub fn only_cache(mut self, value: bool) -> Self {
        self.only_cache = value;
        self
    }

    /// Sets whether cache writes are awaited.
    #[must_use]
    pub fn await_cache(mut self, value: bool) -> Self {
        self.await_cache = value;
        self
    }

    /// Sets whether cache hits are logged.
    #[must_use]
    pub fn log_cached(mut self, value: bool) -> Self {
        self.log_cached = value;
        self
    }

    /// Sets whether downstream fetches are logged.
    #[must_use]
    pub fn log_downstream(mut self, value: bool) -> Self {
        self.log_downstream = value;
        self
    }
}

/// Per-call routing flags. Each flag is OR-ed with the configured default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheDBOptions {
    /// Bypass the cache for this call.
    pub skip_cache: bool,
    /// Use only the cache for this call.
    pub only_cache: bool,
}

impl CacheDBOptions {
    /// Bypass the cache.
    pub const SKIP_CACHE: Self = Self {
        skip_cache: true,
        only_cache: false,
    };

    /// Use only the cache.
    pub const ONLY_CACHE: Self = Self {
        skip_cache: false,
        only_cache: true,
    };
}

#[derive(Debug, Clone, Copy)]
struct Route {
    skip_cache: bool,
    only_cache: bool,
}

/// A [`CommonDB`] that caches a downstream store.
///
/// Declines transactions and increments, since it cannot make two stores
/// change atomically.
pub struct CacheDB {
    cfg: CacheDBCfg,
    support: CommonDBSupport,
}

impl CacheDB {
    /// Creates the adapter.
    #[must_use]
    pub fn new(cfg: CacheDBCfg) -> Self {
        let support = cfg
            .downstream_db
            .support()
            .with(Capability::Transactions, false)
            .with(Capability::Increment, false);
        Self { cfg, support }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CacheDBCfg {
        &self.cfg
    }

    fn route(&self, opt: CacheDBOptions) -> Route {
        Route {
            skip_cache: opt.skip_cache || self.cfg.skip_cache,
            only_cache: opt.only_cache || self.cfg.only_cache,
        }
    }

    /// Saves rows into the cache, awaited or in the background.
    async fn write_to_cache(&self, table: &str, rows: Vec<Row>) {
        if rows.is_empty() {
            return;
        }
        let cache = Arc::clone(&self.cfg.cache_db);
        let table = table.to_string();
        let write = async move {
            if let Err(e) = cache.save_batch(&table, rows, &SaveOptions::default()).await {
                warn!(table = %table, error = %e, "cache write failed");
            }
        };
        if self.cfg.await_cache {
            write.await;
        } else {
            tokio::spawn(write);
        }
    }

    /// [`CommonDB::get_by_ids`] with per-call routing.
    ///
    /// Results follow the order of `ids`; ids found nowhere are omitted.
    ///
    /// # Errors
    ///
    /// Returns downstream errors. Cache read errors count as misses.
    pub async fn get_by_ids_with(
        &self,
        table: &str,
        ids: &[String],
        opt: &ReadOptions,
        cache_opt: CacheDBOptions,
    ) -> DbResult<Vec<Row>> {
        let route = self.route(cache_opt);
        let mut found: HashMap<String, Row> = HashMap::with_capacity(ids.len());

        if !route.skip_cache {
            match self.cfg.cache_db.get_by_ids(table, ids, opt).await {
                Ok(rows) => {
                    for row in rows {
                        if let Some(id) = row.row_id().map(str::to_string) {
                            found.insert(id, row);
                        }
                    }
                    if self.cfg.log_cached {
                        info!(db = %self.cfg.name, table, rows = found.len(), "served from cache");
                    }
                }
                Err(e) => warn!(table, error = %e, "cache read failed"),
            }
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains_key(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() && !route.only_cache {
            let rows = self.cfg.downstream_db.get_by_ids(table, &missing, opt).await?;
            if self.cfg.log_downstream {
                info!(db = %self.cfg.name, table, rows = rows.len(), "fetched from downstream");
            }
            if !route.skip_cache {
                self.write_to_cache(table, rows.clone()).await;
            }
            for row in rows {
                if let Some(id) = row.row_id().map(str::to_string) {
                    found.insert(id, row);
                }
            }
        }

        Ok(order_by_ids(found.into_values().collect(), ids))
    }

    /// [`CommonDB::run_query`] with per-call routing.
    ///
    /// # Errors
    ///
    /// Returns errors of the store that served the query.
    pub async fn run_query_with(
        &self,
        q: &DBQuery,
        opt: &ReadOptions,
        cache_opt: CacheDBOptions,
    ) -> DbResult<RunQueryResult> {
        let route = self.route(cache_opt);
        if route.only_cache {
            if !self.cfg.cache_db.support().queries {
                return Ok(RunQueryResult::default());
            }
            return self.cfg.cache_db.run_query(q, opt).await;
        }

        let res = self.cfg.downstream_db.run_query(q, opt).await?;
        if self.cfg.log_downstream {
            info!(db = %self.cfg.name, query = %q, rows = res.rows.len(), "queried downstream");
        }
        // projected rows are partial and must not replace cached rows
        if !route.skip_cache && !q.is_select_query() {
            self.write_to_cache(&q.table, res.rows.clone()).await;
        }
        Ok(res)
    }

    /// [`CommonDB::run_query_count`] with per-call routing.
    ///
    /// # Errors
    ///
    /// Returns errors of the store that served the count.
    pub async fn run_query_count_with(
        &self,
        q: &DBQuery,
        opt: &ReadOptions,
        cache_opt: CacheDBOptions,
    ) -> DbResult<u64> {
        if self.route(cache_opt).only_cache {
            if !self.cfg.cache_db.support().queries {
                return Ok(0);
            }
            return self.cfg.cache_db.run_query_count(q, opt).await;
        }
        self.cfg.downstream_db.run_query_count(q, opt).await
    }

    /// [`CommonDB::stream_query`] with per-call routing.
    pub fn stream_query_with<'a>(
        &'a self,
        q: &DBQuery,
        opt: &ReadOptions,
        cache_opt: CacheDBOptions,
    ) -> RowStream<'a> {
        let route = self.route(cache_opt);
        if route.only_cache {
            if !self.cfg.cache_db.support().queries {
                return futures::stream::empty().boxed();
            }
            return self.cfg.cache_db.stream_query(q, opt);
        }

        let stream = self.cfg.downstream_db.stream_query(q, opt);
        if route.skip_cache || q.is_select_query() {
            return stream;
        }
        let table = q.table.clone();
        stream
            .chunks(STREAM_CACHE_CHUNK)
            .then(move |results: Vec<DbResult<Row>>| {
                let table = table.clone();
                async move {
                    let rows = results.iter().filter_map(|r| r.as_ref().ok()).cloned().collect();
                    self.write_to_cache(&table, rows).await;
                    futures::stream::iter(results)
                }
            })
            .flatten()
            .boxed()
    }

    /// [`CommonDB::save_batch`] with per-call routing.
    ///
    /// # Errors
    ///
    /// Returns downstream errors, or cache errors under only-cache routing.
    pub async fn save_batch_with(
        &self,
        table: &str,
        rows: Vec<Row>,
        opt: &SaveOptions,
        cache_opt: CacheDBOptions,
    ) -> DbResult<()> {
        let route = self.route(cache_opt);
        if route.only_cache {
            return self.cfg.cache_db.save_batch(table, rows, opt).await;
        }
        let mirrored = (!route.skip_cache).then(|| rows.clone());
        self.cfg.downstream_db.save_batch(table, rows, opt).await?;
        if let Some(rows) = mirrored {
            self.write_to_cache(table, rows).await;
        }
        Ok(())
    }

    /// [`CommonDB::delete_by_ids`] with per-call routing.
    ///
    /// # Errors
    ///
    /// Returns downstream errors, or cache errors under only-cache routing.
    pub async fn delete_by_ids_with(
        &self,
        table: &str,
        ids: &[String],
        cache_opt: CacheDBOptions,
    ) -> DbResult<u64> {
        let route = self.route(cache_opt);
        if route.only_cache {
            return self.cfg.cache_db.delete_by_ids(table, ids).await;
        }
        let deleted = self.cfg.downstream_db.delete_by_ids(table, ids).await?;
        if !route.skip_cache {
            if let Err(e) = self.cfg.cache_db.delete_by_ids(table, ids).await {
                warn!(table, error = %e, "cache delete failed");
            }
        }
        Ok(deleted)
    }

    /// [`CommonDB::delete_by_query`] with per-call routing.
    ///
    /// # Errors
    ///
    /// Returns downstream errors, or cache errors under only-cache routing.
    pub async fn delete_by_query_with(
        &self,
        q: &DBQuery,
        cache_opt: CacheDBOptions,
    ) -> DbResult<u64> {
        let route = self.route(cache_opt);
        if route.only_cache {
            return self.cfg.cache_db.delete_by_query(q).await;
        }
        let deleted = self.cfg.downstream_db.delete_by_query(q).await?;
        if !route.skip_cache {
            if let Err(e) = self.cfg.cache_db.delete_by_query(q).await {
                warn!(table = %q.table, error = %e, "cache delete failed");
            }
        }
        Ok(deleted)
    }

    /// [`CommonDB::patch_by_query`] with per-call routing.
    ///
    /// # Errors
    ///
    /// Returns downstream errors, or cache errors under only-cache routing.
    pub async fn patch_by_query_with(
        &self,
        q: &DBQuery,
        patch: &Row,
        cache_opt: CacheDBOptions,
    ) -> DbResult<u64> {
        let route = self.route(cache_opt);
        if route.only_cache {
            return self.cfg.cache_db.patch_by_query(q, patch).await;
        }
        let patched = self.cfg.downstream_db.patch_by_query(q, patch).await?;
        if !route.skip_cache {
            if let Err(e) = self.cfg.cache_db.patch_by_query(q, patch).await {
                warn!(table = %q.table, error = %e, "cache patch failed");
            }
        }
        Ok(patched)
    }
}

#[async_trait]
impl CommonDB for CacheDB {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn support(&self) -> &CommonDBSupport {
        &self.support
    }

    async fn ping(&self) -> DbResult<()> {
        self.cfg.downstream_db.ping().await?;
        self.cfg.cache_db.ping().await
    }

    async fn get_tables(&self) -> DbResult<Vec<String>> {
        self.cfg.downstream_db.get_tables().await
    }

    async fn get_table_schema(&self, table: &str) -> DbResult<JsonSchemaObject> {
        self.cfg.downstream_db.get_table_schema(table).await
    }

    async fn create_table(
        &self,
        table: &str,
        schema: &JsonSchemaObject,
        opt: &CreateTableOptions,
    ) -> DbResult<()> {
        self.cfg.downstream_db.create_table(table, schema, opt).await?;
        if !self.cfg.skip_cache && self.cfg.cache_db.support().create_table {
            if let Err(e) = self.cfg.cache_db.create_table(table, schema, opt).await {
                warn!(table, error = %e, "cache create_table failed");
            }
        }
        Ok(())
    }

    async fn get_by_ids(
        &self,
        table: &str,
        ids: &[String],
        opt: &ReadOptions,
    ) -> DbResult<Vec<Row>> {
        self.get_by_ids_with(table, ids, opt, CacheDBOptions::default()).await
    }

    async fn run_query(&self, q: &DBQuery, opt: &ReadOptions) -> DbResult<RunQueryResult> {
        self.run_query_with(q, opt, CacheDBOptions::default()).await
    }

    async fn run_query_count(&self, q: &DBQuery, opt: &ReadOptions) -> DbResult<u64> {
        self.run_query_count_with(q, opt, CacheDBOptions::default()).await
    }

    fn stream_query<'a>(&'a self, q: &DBQuery, opt: &ReadOptions) -> RowStream<'a> {
        self.stream_query_with(q, opt, CacheDBOptions::default())
    }

    async fn save_batch(&self, table: &str, rows: Vec<Row>, opt: &SaveOptions) -> DbResult<()> {
        self.save_batch_with(table, rows, opt, CacheDBOptions::default()).await
    }

    async fn delete_by_ids(&self, table: &str, ids: &[String]) -> DbResult<u64> {
        self.delete_by_ids_with(table, ids, CacheDBOptions::default()).await
    }

    async fn delete_by_query(&self, q: &DBQuery) -> DbResult<u64> {
        self.delete_by_query_with(q, CacheDBOptions::default()).await
    }

    async fn patch_by_query(&self, q: &DBQuery, patch: &Row) -> DbResult<u64> {
        self.patch_by_query_with(q, patch, CacheDBOptions::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDB;
    use polydb_core::row_from_value;
    use polydb_testkit::CountingDB;
    use serde_json::json;

    fn row(id: &str, k: i64) -> Row {
        row_from_value(json!({"id": id, "k": k})).unwrap()
    }

    fn setup() -> (CacheDB, InMemoryDB, InMemoryDB) {
        let cache = InMemoryDB::new();
        let downstream = InMemoryDB::new();
        let cfg = CacheDBCfg::new(Arc::new(cache.clone()), Arc::new(downstream.clone()));
        let db = CacheDB::new(cfg.await_cache(true));
        (db, cache, downstream)
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn writes_go_to_both_stores() {
        let (db, cache, downstream) = setup();
        db.save_batch("t", vec![row("a", 1)], &SaveOptions::default()).await.unwrap();
        assert!(cache.get_data_snapshot()["t"].contains_key("a"));
        assert!(downstream.get_data_snapshot()["t"].contains_key("a"));

        assert_eq!(db.delete_by_ids("t", &ids(&["a"])).await.unwrap(), 1);
        assert!(cache.get_data_snapshot()["t"].is_empty());
        assert!(downstream.get_data_snapshot()["t"].is_empty());
    }

    #[tokio::test]
    async fn reads_fill_cache_in_request_order() {
        let (db, cache, downstream) = setup();
        downstream
            .save_batch("t", vec![row("a", 1), row("b", 2)], &SaveOptions::default())
            .await
            .unwrap();
        cache.save_batch("t", vec![row("b", 2)], &SaveOptions::default()).await.unwrap();

        let rows = db
            .get_by_ids("t", &ids(&["b", "x", "a"]), &ReadOptions::default())
            .await
            .unwrap();
        let got: Vec<_> = rows.iter().map(|r| r.row_id().unwrap()).collect();
        assert_eq!(got, vec!["b", "a"]);
        assert!(cache.get_data_snapshot()["t"].contains_key("a"));
    }

    #[tokio::test]
    async fn only_cache_and_skip_cache() {
        let (db, cache, downstream) = setup();
        downstream.save_batch("t", vec![row("a", 1)], &SaveOptions::default()).await.unwrap();

        let only = db
            .get_by_ids_with("t", &ids(&["a"]), &ReadOptions::default(), CacheDBOptions::ONLY_CACHE)
            .await
            .unwrap();
        assert!(only.is_empty());

        let skip = CacheDBOptions::SKIP_CACHE;
        db.save_batch_with("t", vec![row("b", 2)], &SaveOptions::default(), skip)
            .await
            .unwrap();
        assert!(cache.get_data_snapshot().get("t").is_none());
        assert_eq!(downstream.get_data_snapshot()["t"].len(), 2);
    }

    #[tokio::test]
    async fn projection_queries_are_not_cached() {
        let (db, cache, downstream) = setup();
        downstream.save_batch("t", vec![row("a", 1)], &SaveOptions::default()).await.unwrap();

        let q = DBQuery::create("t").select(["id"]);
        let res = db.run_query(&q, &ReadOptions::default()).await.unwrap();
        assert_eq!(res.rows.len(), 1);
        assert!(cache.get_data_snapshot().get("t").is_none());

        db.run_query(&DBQuery::create("t"), &ReadOptions::default()).await.unwrap();
        assert_eq!(cache.get_data_snapshot()["t"]["a"], row("a", 1));
    }

    #[tokio::test]
    async fn stream_writes_rows_back() {
        let (db, cache, downstream) = setup();
        downstream
            .save_batch("t", vec![row("a", 1), row("b", 2)], &SaveOptions::default())
            .await
            .unwrap();

        let rows: Vec<_> = db
            .stream_query(&DBQuery::create("t"), &ReadOptions::default())
            .collect()
            .await;
        assert_eq!(rows.len(), 2);
        assert_eq!(cache.get_data_snapshot()["t"].len(), 2);
    }

    #[tokio::test]
    async fn stream_writes_back_in_chunks() {
        let downstream = InMemoryDB::new();
        let rows = (0..250).map(|i| row(&format!("r{i:03}"), i)).collect();
        downstream.save_batch("t", rows, &SaveOptions::default()).await.unwrap();
        let cache = Arc::new(CountingDB::new(Arc::new(InMemoryDB::new())));
        let cfg = CacheDBCfg::new(cache.clone(), Arc::new(downstream));
        let db = CacheDB::new(cfg.await_cache(true));

        let streamed: Vec<_> = db
            .stream_query(&DBQuery::create("t"), &ReadOptions::default())
            .collect()
            .await;
        assert_eq!(streamed.len(), 250);
        assert_eq!(cache.calls("save_batch"), 3);
        assert_eq!(cache.rows("save_batch"), 250);
    }

    #[tokio::test]
    async fn declines_transactions_and_increments() {
        let (db, _, _) = setup();
        assert!(!db.support().transactions);
        assert!(!db.support().increment);
        assert!(db.support().queries);
        let inc: HashMap<String, i64> = HashMap::new();
        assert!(db.increment_batch("t", "k", &inc).await.is_err());
        assert!(db
            .create_transaction(&polydb_core::TransactionOptions::default())
            .await
            .is_err());
    }
}
