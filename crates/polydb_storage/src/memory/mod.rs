//! In-memory reference store.
//!
//! [`InMemoryDB`] keeps every table in a map guarded by a single
//! `parking_lot` lock. Rows are stored as independent copies of what the
//! caller passed, so later mutations on the caller side never leak in.
//!
//! Transactions buffer their writes and apply them on commit against a
//! snapshot of the whole table set; see [`InMemoryDBTransaction`].

mod config;
mod transaction;

pub use config::InMemoryDBCfg;
pub use transaction::InMemoryDBTransaction;

use async_trait::async_trait;
use parking_lot::RwLock;
use polydb_core::ndjson::{
    find_table_file, list_tables, read_ndjson_file, table_file_path, write_ndjson_file,
};
use polydb_core::{
    deep_copy_row, generate_id, CommonDB, CommonDBSupport, CreateTableOptions, DBOperation,
    DBQuery, DBTransaction, DbError, DbResult, JsonSchemaObject, NDJsonStats, ReadOptions, Row,
    RowExt, RunQueryResult, SaveMethod, SaveOptions, TransactionOptions,
};
use polydb_query::{count_in_memory, query_in_memory};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Rows of one table by id.
pub type TableRows = BTreeMap<String, Row>;

/// Every table by (prefixed) name.
pub type TableData = BTreeMap<String, TableRows>;

/// Shared state of an [`InMemoryDB`] and its transactions.
#[derive(Debug)]
pub(crate) struct Store {
    cfg: InMemoryDBCfg,
    data: RwLock<TableData>,
}

impl Store {
    fn table_name(&self, table: &str) -> String {
        format!("{}{table}", self.cfg.table_prefix)
    }

    /// Flushes after a write when persistence is enabled.
    fn after_write(&self) -> DbResult<()> {
        if self.cfg.persistence_enabled {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> DbResult<NDJsonStats> {
        let dir = self
            .cfg
            .persistent_storage_path
            .as_deref()
            .ok_or_else(|| DbError::invalid_operation("persistent_storage_path is not set"))?;
        let started = Instant::now();
        let data = self.data.read().clone();

        let mut total = NDJsonStats::default();
        for (table, rows) in data.iter().filter(|(_, rows)| !rows.is_empty()) {
            let path = table_file_path(dir, table, self.cfg.persist_zip);
            let stats = write_ndjson_file(&path, rows.values())?;
            if self.cfg.log_persistence {
                info!(table = %table, path = %path.display(), %stats, "flushed table");
            }
            total.merge(&stats);
        }
        total.elapsed = started.elapsed();
        Ok(total)
    }

    fn restore(&self) -> DbResult<NDJsonStats> {
        let dir = self
            .cfg
            .persistent_storage_path
            .as_deref()
            .ok_or_else(|| DbError::invalid_operation("persistent_storage_path is not set"))?;
        let started = Instant::now();

        let mut restored = TableData::new();
        let mut total = NDJsonStats::default();
        for table in list_tables(dir)? {
            let Some(path) = find_table_file(dir, &table) else {
                continue;
            };
            let rows = read_ndjson_file(&path)?;
            total.rows += rows.len() as u64;
            let mut by_id = TableRows::new();
            for row in rows {
                let id = row
                    .row_id()
                    .ok_or_else(|| {
                        DbError::invalid_format(format!("row without id in {}", path.display()))
                    })?
                    .to_string();
                by_id.insert(id, row);
            }
            if self.cfg.log_persistence {
                info!(table = %table, rows = by_id.len(), "restored table");
            }
            restored.insert(table, by_id);
        }

        *self.data.write() = restored;
        total.elapsed = started.elapsed();
        Ok(total)
    }
}

/// Saves `rows` into `table`, validating the whole batch first.
pub(crate) fn apply_save(
    data: &mut TableData,
    table: &str,
    rows: Vec<Row>,
    opt: &SaveOptions,
) -> DbResult<()> {
    let existing = data.get(table);
    let exists = |id: &str| existing.is_some_and(|t| t.contains_key(id));

    let mut batch_ids = HashSet::with_capacity(rows.len());
    let mut prepared = Vec::with_capacity(rows.len());
    for mut row in rows {
        let id = match row.row_id() {
            Some(id) => id.to_string(),
            None if opt.assign_generated_ids => {
                let id = generate_id();
                if exists(&id) || batch_ids.contains(&id) {
                    return Err(DbError::DuplicateId {
                        table: table.to_string(),
                        id,
                    });
                }
                row.set_row_id(id.clone());
                id
            }
            None => {
                return Err(DbError::MissingId {
                    table: table.to_string(),
                })
            }
        };

        match opt.save_method {
            SaveMethod::Insert if exists(&id) || batch_ids.contains(&id) => {
                return Err(DbError::already_exists(table, id));
            }
            SaveMethod::Update if !exists(&id) => {
                return Err(DbError::missing_on_update(table, id));
            }
            _ => {}
        }

        batch_ids.insert(id.clone());
        prepared.push((id, row));
    }

    if prepared.is_empty() {
        return Ok(());
    }
    let rows = data.entry(table.to_string()).or_default();
    for (id, row) in prepared {
        rows.insert(id, row);
    }
    Ok(())
}

/// Deletes `ids` from `table`, returning how many existed.
pub(crate) fn apply_delete(data: &mut TableData, table: &str, ids: &[String]) -> u64 {
    let Some(rows) = data.get_mut(table) else {
        return 0;
    };
    ids.iter().filter(|id| rows.remove(id.as_str()).is_some()).count() as u64
}

pub(crate) fn apply_op(data: &mut TableData, op: &DBOperation) -> DbResult<()> {
    match op {
        DBOperation::SaveBatch { table, rows, opt } => {
            apply_save(data, table, rows.iter().map(deep_copy_row).collect(), opt)
        }
        DBOperation::DeleteByIds { table, ids } => {
            apply_delete(data, table, ids);
            Ok(())
        }
    }
}

/// Ids of the rows `q` selects from `rows`.
fn matching_ids(q: &DBQuery, rows: Option<&TableRows>) -> Vec<String> {
    let Some(rows) = rows else {
        return Vec::new();
    };
    let mut by_id = q.clone();
    by_id.selected_fields = Some(vec!["id".to_string()]);
    query_in_memory(&by_id, rows.values().cloned())
        .iter()
        .filter_map(|r| r.row_id().map(str::to_string))
        .collect()
}

/// The in-memory reference store.
///
/// Cloning is cheap and yields a handle to the same data.
///
/// Supports every capability except time-machine reads. Isolation between
/// concurrent transactions is optimistic: each commit applies its own
/// buffered operations to whatever state it finds, so the last committer
/// wins.
#[derive(Debug, Clone)]
pub struct InMemoryDB {
    store: Arc<Store>,
    support: CommonDBSupport,
}

impl Default for InMemoryDB {
    fn default() -> Self {
        Self::with_config(InMemoryDBCfg::default())
    }
}

impl InMemoryDB {
    /// Creates an empty store with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store.
    #[must_use]
    pub fn with_config(cfg: InMemoryDBCfg) -> Self {
        Self {
            store: Arc::new(Store {
                cfg,
                data: RwLock::new(TableData::new()),
            }),
            support: CommonDBSupport::FULL,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &InMemoryDBCfg {
        &self.store.cfg
    }

    /// Empties `table`, or every table when `None`.
    pub fn reset_cache(&self, table: Option<&str>) {
        let mut data = self.store.data.write();
        match table {
            Some(table) => {
                data.remove(&self.store.table_name(table));
            }
            None => data.clear(),
        }
        debug!(table = table.unwrap_or("*"), "reset in-memory tables");
    }

    /// Returns a copy of every table, keyed by stored (prefixed) name.
    #[must_use]
    pub fn get_data_snapshot(&self) -> TableData {
        self.store.data.read().clone()
    }

    /// Writes every non-empty table to `${path}/${table}.ndjson[.gz]`.
    ///
    /// # Errors
    ///
    /// Returns an error if no storage path is configured or a file cannot
    /// be written.
    pub fn flush_to_disk(&self) -> DbResult<NDJsonStats> {
        self.store.flush()
    }

    /// Replaces the in-memory state with every table file found in the
    /// storage path.
    ///
    /// # Errors
    ///
    /// Returns an error if no storage path is configured or a file cannot
    /// be read. The in-memory state is unchanged on error.
    pub fn restore_from_disk(&self) -> DbResult<NDJsonStats> {
        self.store.restore()
    }
}

#[async_trait]
impl CommonDB for InMemoryDB {
    fn name(&self) -> &str {
        "InMemoryDB"
    }

    fn support(&self) -> &CommonDBSupport {
        &self.support
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn get_tables(&self) -> DbResult<Vec<String>> {
        let prefix = &self.store.cfg.table_prefix;
        Ok(self
            .store
            .data
            .read()
            .keys()
            .filter_map(|name| name.strip_prefix(prefix.as_str()))
            .map(str::to_string)
            .collect())
    }

    async fn get_table_schema(&self, table: &str) -> DbResult<JsonSchemaObject> {
        let data = self.store.data.read();
        let rows = data.get(&self.store.table_name(table));
        Ok(JsonSchemaObject::infer_from_rows(
            table,
            rows.into_iter().flat_map(BTreeMap::values),
        ))
    }

    async fn create_table(
        &self,
        table: &str,
        _schema: &JsonSchemaObject,
        opt: &CreateTableOptions,
    ) -> DbResult<()> {
        let name = self.store.table_name(table);
        let mut data = self.store.data.write();
        if opt.drop_if_exists {
            data.insert(name, TableRows::new());
        } else {
            data.entry(name).or_default();
        }
        Ok(())
    }

    async fn get_by_ids(
        &self,
        table: &str,
        ids: &[String],
        _opt: &ReadOptions,
    ) -> DbResult<Vec<Row>> {
        let data = self.store.data.read();
        let Some(rows) = data.get(&self.store.table_name(table)) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| rows.get(id).map(deep_copy_row)).collect())
    }

    async fn run_query(&self, q: &DBQuery, _opt: &ReadOptions) -> DbResult<RunQueryResult> {
        let data = self.store.data.read();
        let rows = match data.get(&self.store.table_name(&q.table)) {
            Some(rows) => query_in_memory(q, rows.values().cloned()),
            None => Vec::new(),
        };
        Ok(RunQueryResult::from_rows(rows))
    }

    async fn run_query_count(&self, q: &DBQuery, _opt: &ReadOptions) -> DbResult<u64> {
        let data = self.store.data.read();
        Ok(data
            .get(&self.store.table_name(&q.table))
            .map_or(0, |rows| count_in_memory(q, rows.values()) as u64))
    }

    async fn save_batch(&self, table: &str, rows: Vec<Row>, opt: &SaveOptions) -> DbResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let name = self.store.table_name(table);
        {
            let mut data = self.store.data.write();
            apply_save(&mut data, &name, rows, opt)?;
        }
        self.store.after_write()
    }

    async fn delete_by_ids(&self, table: &str, ids: &[String]) -> DbResult<u64> {
        let name = self.store.table_name(table);
        let deleted = apply_delete(&mut self.store.data.write(), &name, ids);
        if deleted > 0 {
            self.store.after_write()?;
        }
        Ok(deleted)
    }

    async fn delete_by_query(&self, q: &DBQuery) -> DbResult<u64> {
        let name = self.store.table_name(&q.table);
        let deleted = {
            let mut data = self.store.data.write();
            let ids = matching_ids(q, data.get(&name));
            apply_delete(&mut data, &name, &ids)
        };
        if deleted > 0 {
            self.store.after_write()?;
        }
        Ok(deleted)
    }

    async fn patch_by_query(&self, q: &DBQuery, patch: &Row) -> DbResult<u64> {
        let name = self.store.table_name(&q.table);
        let patched = {
            let mut data = self.store.data.write();
            let ids = matching_ids(q, data.get(&name));
            let Some(rows) = data.get_mut(&name) else {
                return Ok(0);
            };
            for id in &ids {
                if let Some(row) = rows.get_mut(id) {
                    for (k, v) in patch {
                        row.insert(k.clone(), v.clone());
                    }
                }
            }
            ids.len() as u64
        };
        if patched > 0 {
            self.store.after_write()?;
        }
        Ok(patched)
    }

    async fn increment_batch(
        &self,
        table: &str,
        prop: &str,
        increments: &HashMap<String, i64>,
    ) -> DbResult<HashMap<String, i64>> {
        if increments.is_empty() {
            return Ok(HashMap::new());
        }
        let name = self.store.table_name(table);
        let results = {
            let mut data = self.store.data.write();
            let Some(rows) = data.get_mut(&name) else {
                let id = increments.keys().next().map_or("", String::as_str);
                return Err(DbError::not_found(table, id));
            };

            let mut results = HashMap::with_capacity(increments.len());
            for (id, by) in increments {
                let row = rows.get(id).ok_or_else(|| DbError::not_found(table, id.as_str()))?;
                let current = match row.get(prop) {
                    None | Some(Value::Null) => 0,
                    Some(v) => v.as_i64().ok_or_else(|| {
                        DbError::invalid_operation(format!(
                            "cannot increment {table}.{id}.{prop}: not an integer"
                        ))
                    })?,
                };
                let value = current.checked_add(*by).ok_or_else(|| {
                    DbError::invalid_operation(format!(
                        "cannot increment {table}.{id}.{prop}: i64 overflow"
                    ))
                })?;
                results.insert(id.clone(), value);
            }
            for (id, value) in &results {
                if let Some(row) = rows.get_mut(id) {
                    row.insert(prop.to_string(), Value::from(*value));
                }
            }
            results
        };
        self.store.after_write()?;
        Ok(results)
    }

    async fn create_transaction(
        &self,
        opt: &TransactionOptions,
    ) -> DbResult<Box<dyn DBTransaction>> {
        Ok(Box::new(InMemoryDBTransaction::new(
            Arc::clone(&self.store),
            opt.read_only,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polydb_core::row_from_value;
    use serde_json::json;
    use tempfile::tempdir;

    fn row(v: Value) -> Row {
        row_from_value(v).unwrap()
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_ids_are_omitted() {
        let db = InMemoryDB::new();
        db.save_batch("t", vec![row(json!({"id": "a", "k": 1}))], &SaveOptions::default())
            .await
            .unwrap();

        let rows = db.get_by_ids("t", &ids(&["a", "b"]), &ReadOptions::default()).await.unwrap();
        assert_eq!(rows, vec![row(json!({"id": "a", "k": 1}))]);
    }

    #[tokio::test]
    async fn save_methods() {
        let db = InMemoryDB::new();
        let insert = SaveOptions::with_method(SaveMethod::Insert);
        let update = SaveOptions::with_method(SaveMethod::Update);

        db.save_batch("t", vec![row(json!({"id": "a"}))], &insert).await.unwrap();
        let err = db.save_batch("t", vec![row(json!({"id": "a"}))], &insert).await.unwrap_err();
        assert_eq!(err.to_string(), "entity exists: t.a");

        let err = db.save_batch("t", vec![row(json!({"id": "b"}))], &update).await.unwrap_err();
        assert!(matches!(err, DbError::MissingOnUpdate { .. }));
        db.save_batch("t", vec![row(json!({"id": "a", "v": 2}))], &update).await.unwrap();
    }

    #[tokio::test]
    async fn failed_batch_writes_nothing() {
        let db = InMemoryDB::new();
        db.save_batch("t", vec![row(json!({"id": "b"}))], &SaveOptions::default())
            .await
            .unwrap();
        let insert = SaveOptions::with_method(SaveMethod::Insert);
        let batch = vec![row(json!({"id": "a"})), row(json!({"id": "b"}))];
        assert!(db.save_batch("t", batch, &insert).await.is_err());
        assert_eq!(db.get_data_snapshot()["t"].len(), 1);
    }

    #[tokio::test]
    async fn rows_without_id() {
        let db = InMemoryDB::new();
        let err = db
            .save_batch("t", vec![row(json!({"k": 1}))], &SaveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::MissingId { .. }));

        let opt = SaveOptions {
            assign_generated_ids: true,
            ..SaveOptions::default()
        };
        db.save_batch("t", vec![row(json!({"k": 1}))], &opt).await.unwrap();
        let snapshot = db.get_data_snapshot();
        let (id, stored) = snapshot["t"].iter().next().unwrap();
        assert_eq!(stored.row_id(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn patch_delete_and_increment() {
        let db = InMemoryDB::new();
        let rows = (0..5).map(|i| row(json!({"id": format!("r{i}"), "k": i}))).collect();
        db.save_batch("t", rows, &SaveOptions::default()).await.unwrap();

        let q = DBQuery::create("t").filter("k", polydb_core::DBQueryFilterOperator::Gte, json!(3));
        let patched = db.patch_by_query(&q, &row(json!({"big": true}))).await.unwrap();
        assert_eq!(patched, 2);
        let big = DBQuery::create("t").filter_eq("big", json!(true));
        assert_eq!(db.run_query_count(&big, &ReadOptions::default()).await.unwrap(), 2);

        let inc: HashMap<String, i64> = [("r1".to_string(), 10)].into_iter().collect();
        let out = db.increment_batch("t", "k", &inc).await.unwrap();
        assert_eq!(out["r1"], 11);
        let out = db.increment_batch("t", "missing_field", &inc).await.unwrap();
        assert_eq!(out["r1"], 10);

        assert_eq!(db.delete_by_query(&q).await.unwrap(), 2);
        assert_eq!(db.delete_by_ids("t", &ids(&["r0", "zz"])).await.unwrap(), 1);
        assert_eq!(db.get_data_snapshot()["t"].len(), 2);
    }

    #[tokio::test]
    async fn increment_overflow_writes_nothing() {
        let db = InMemoryDB::new();
        let rows = vec![row(json!({"id": "a", "k": i64::MAX})), row(json!({"id": "b", "k": 1}))];
        db.save_batch("t", rows, &SaveOptions::default()).await.unwrap();

        let inc: HashMap<String, i64> =
            [("a".to_string(), 1), ("b".to_string(), 1)].into_iter().collect();
        let err = db.increment_batch("t", "k", &inc).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidOperation { .. }));

        let stored = db.get_data_snapshot();
        assert_eq!(stored["t"]["a"]["k"], json!(i64::MAX));
        assert_eq!(stored["t"]["b"]["k"], json!(1));
    }

    #[tokio::test]
    async fn increment_on_missing_table_creates_nothing() {
        let db = InMemoryDB::new();
        let inc: HashMap<String, i64> = [("a".to_string(), 1)].into_iter().collect();
        let err = db.increment_batch("nope", "k", &inc).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert!(db.get_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stored_rows_do_not_alias_results() {
        let db = InMemoryDB::new();
        db.save_batch("t", vec![row(json!({"id": "a", "n": {"k": 1}}))], &SaveOptions::default())
            .await
            .unwrap();
        let mut fetched = db.get_by_ids("t", &ids(&["a"]), &ReadOptions::default()).await.unwrap();
        fetched[0]["n"]["k"] = json!(99);

        let again = db.get_by_ids("t", &ids(&["a"]), &ReadOptions::default()).await.unwrap();
        assert_eq!(again[0]["n"]["k"], json!(1));
    }

    #[tokio::test]
    async fn table_prefix_is_hidden() {
        let db = InMemoryDB::with_config(InMemoryDBCfg::new().table_prefix("p_"));
        db.save_batch("t", vec![row(json!({"id": "a"}))], &SaveOptions::default())
            .await
            .unwrap();
        assert_eq!(db.get_tables().await.unwrap(), vec!["t"]);
        assert!(db.get_data_snapshot().contains_key("p_t"));

        db.reset_cache(Some("t"));
        assert!(db.get_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flush_and_restore() {
        let dir = tempdir().unwrap();
        let db = InMemoryDB::with_config(InMemoryDBCfg::new().persistent_storage_path(dir.path()));
        db.save_batch(
            "a",
            vec![row(json!({"id": "1", "v": null})), row(json!({"id": "2"}))],
            &SaveOptions::default(),
        )
        .await
        .unwrap();
        db.create_table("empty", &JsonSchemaObject::new("empty"), &CreateTableOptions::default())
            .await
            .unwrap();

        let stats = db.flush_to_disk().unwrap();
        assert_eq!(stats.rows, 2);
        assert!(dir.path().join("a.ndjson.gz").exists());
        assert!(!dir.path().join("empty.ndjson.gz").exists());

        let before = db.get_data_snapshot();
        db.save_batch("b", vec![row(json!({"id": "x"}))], &SaveOptions::default())
            .await
            .unwrap();
        db.restore_from_disk().unwrap();

        let mut expected = before;
        expected.remove("empty");
        assert_eq!(db.get_data_snapshot(), expected);
    }

    #[tokio::test]
    async fn persistence_flushes_after_writes() {
        let dir = tempdir().unwrap();
        let db = InMemoryDB::with_config(
            InMemoryDBCfg::new().persistence(dir.path()).persist_zip(false),
        );
        db.save_batch("t", vec![row(json!({"id": "a"}))], &SaveOptions::default())
            .await
            .unwrap();
        assert!(dir.path().join("t.ndjson").exists());
    }

    #[tokio::test]
    async fn flush_requires_path() {
        assert!(InMemoryDB::new().flush_to_disk().is_err());
    }

    #[tokio::test]
    async fn create_table_drop_if_exists() {
        let db = InMemoryDB::new();
        db.save_batch("t", vec![row(json!({"id": "a"}))], &SaveOptions::default())
            .await
            .unwrap();
        let schema = db.get_table_schema("t").await.unwrap();
        assert_eq!(schema.required, vec!["id"]);

        let opt = CreateTableOptions { drop_if_exists: true };
        db.create_table("t", &schema, &opt).await.unwrap();
        assert!(db.get_data_snapshot()["t"].is_empty());
    }
}
