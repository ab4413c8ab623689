//! Whole-file store adapter.
//!
//! [`FileDB`] serves backing stores that can only replace a complete table
//! file: every read loads the whole table and every write loads, merges and
//! saves it back. Queries run through the in-memory evaluator.
//!
//! Before a table is written its rows are canonicalized so the output is
//! byte-stable: optional deep key sorting, then rows sorted by the
//! configured field (by `id` when none is configured).

mod plugin;

pub use plugin::{
    DBSaveBatchOperation, FileDBPersistencePlugin, InMemoryPersistencePlugin,
    LocalFilePersistencePlugin,
};

use async_trait::async_trait;
use polydb_core::{
    generate_id, sort_object_keys_deep, strip_undefined, Capability, CommonDB, CommonDBSupport,
    DBQuery, DBQueryOrder, DbError, DbResult, JsonSchemaObject, ReadOptions, Row, RowExt,
    RunQueryResult, SaveMethod, SaveOptions,
};
use polydb_query::{cmp_field_values, count_in_memory, query_in_memory};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Configuration of a [`FileDB`].
#[derive(Clone)]
pub struct FileDBCfg {
    /// Where table files live.
    pub plugin: Arc<dyn FileDBPersistencePlugin>,
    /// Row order of written files. `None` sorts by `id`.
    pub sort_on_save: Option<DBQueryOrder>,
    /// Sort object keys recursively before writing.
    pub sort_objects: bool,
    /// Log when an operation starts.
    pub log_started: bool,
    /// Log when an operation finishes.
    pub log_finished: bool,
}

impl FileDBCfg {
    /// Creates a configuration over `plugin`.
    #[must_use]
    pub fn new(plugin: Arc<dyn FileDBPersistencePlugin>) -> Self {
        Self {
            plugin,
            sort_on_save: None,
            sort_objects: false,
            log_started: false,
            log_finished: false,
        }
    }

    /// Sorts written rows by `name`.
    #[must_use]
    pub fn sort_on_save(mut self, name: impl Into<String>, descending: bool) -> Self {
        self.sort_on_save = Some(DBQueryOrder {
            name: name.into(),
            descending,
        });
        self
    }

    /// Sets whether object keys are sorted before writing.
    #[must_use]
    pub fn sort_objects(mut self, value: bool) -> Self {
        self.sort_objects = value;
        self
    }

    /// Sets whether operation starts are logged.
    #[must_use]
    pub fn log_started(mut self, value: bool) -> Self {
        self.log_started = value;
        self
    }

    /// Sets whether operation ends are logged.
    #[must_use]
    pub fn log_finished(mut self, value: bool) -> Self {
        self.log_finished = value;
        self
    }
}

/// A [`CommonDB`] over whole-file persistence.
pub struct FileDB {
    cfg: FileDBCfg,
    support: CommonDBSupport,
}

impl FileDB {
    /// Creates an adapter.
    #[must_use]
    pub fn new(cfg: FileDBCfg) -> Self {
        let support = CommonDBSupport::FULL
            .with(Capability::Transactions, false)
            .with(Capability::Increment, false)
            .with(Capability::CreateTable, false);
        Self { cfg, support }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &FileDBCfg {
        &self.cfg
    }

    async fn load_by_id(&self, table: &str) -> DbResult<BTreeMap<String, Row>> {
        let rows = self.cfg.plugin.load_file(table).await?;
        let mut by_id = BTreeMap::new();
        for row in rows {
            let id = row
                .row_id()
                .ok_or_else(|| DbError::invalid_format(format!("row without id in {table}")))?
                .to_string();
            by_id.insert(id, row);
        }
        Ok(by_id)
    }

    async fn save_table(&self, table: &str, rows: impl IntoIterator<Item = Row>) -> DbResult<()> {
        let rows = self.canonicalize(rows);
        debug!(table, rows = rows.len(), "writing table file");
        self.cfg
            .plugin
            .save_files(vec![DBSaveBatchOperation {
                table: table.to_string(),
                rows,
            }])
            .await
    }

    /// Strips absent values, optionally sorts keys, then sorts rows.
    fn canonicalize(&self, rows: impl IntoIterator<Item = Row>) -> Vec<Row> {
        let mut rows: Vec<Row> = rows
            .into_iter()
            .map(strip_undefined)
            .map(|row| {
                if !self.cfg.sort_objects {
                    return row;
                }
                match sort_object_keys_deep(Value::Object(row)) {
                    Value::Object(sorted) => sorted,
                    _ => Row::new(),
                }
            })
            .collect();

        let (name, descending) = match &self.cfg.sort_on_save {
            Some(order) => (order.name.as_str(), order.descending),
            None => ("id", false),
        };
        rows.sort_by(|a, b| {
            let ord = cmp_field_values(a.get(name), b.get(name));
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        rows
    }

    fn started(&self, op: &str, table: &str) -> Instant {
        if self.cfg.log_started {
            info!(op, table, "started");
        }
        Instant::now()
    }

    fn finished(&self, op: &str, table: &str, rows: usize, started: Instant) {
        if self.cfg.log_finished {
            info!(op, table, rows, elapsed_ms = started.elapsed().as_millis() as u64, "finished");
        }
    }
}

#[async_trait]
impl CommonDB for FileDB {
    fn name(&self) -> &str {
        "FileDB"
    }

    fn support(&self) -> &CommonDBSupport {
        &self.support
    }

    async fn ping(&self) -> DbResult<()> {
        self.cfg.plugin.ping().await
    }

    async fn get_tables(&self) -> DbResult<Vec<String>> {
        self.cfg.plugin.get_tables().await
    }

    async fn get_table_schema(&self, table: &str) -> DbResult<JsonSchemaObject> {
        let rows = self.cfg.plugin.load_file(table).await?;
        Ok(JsonSchemaObject::infer_from_rows(table, &rows))
    }

    async fn get_by_ids(
        &self,
        table: &str,
        ids: &[String],
        _opt: &ReadOptions,
    ) -> DbResult<Vec<Row>> {
        let started = self.started("get_by_ids", table);
        let mut by_id = self.load_by_id(table).await?;
        let rows: Vec<Row> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        self.finished("get_by_ids", table, rows.len(), started);
        Ok(rows)
    }

    async fn run_query(&self, q: &DBQuery, _opt: &ReadOptions) -> DbResult<RunQueryResult> {
        let started = self.started("run_query", &q.table);
        let rows = self.cfg.plugin.load_file(&q.table).await?;
        let rows = query_in_memory(q, rows);
        self.finished("run_query", &q.table, rows.len(), started);
        Ok(RunQueryResult::from_rows(rows))
    }

    async fn run_query_count(&self, q: &DBQuery, _opt: &ReadOptions) -> DbResult<u64> {
        let rows = self.cfg.plugin.load_file(&q.table).await?;
        Ok(count_in_memory(q, &rows) as u64)
    }

    async fn save_batch(&self, table: &str, rows: Vec<Row>, opt: &SaveOptions) -> DbResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let started = self.started("save_batch", table);
        let mut by_id = self.load_by_id(table).await?;
        let count = rows.len();

        let mut changed = false;
        let mut batch_ids = HashSet::with_capacity(count);
        for mut row in rows {
            let id = match row.row_id() {
                Some(id) => id.to_string(),
                None if opt.assign_generated_ids => {
                    let id = generate_id();
                    if by_id.contains_key(&id) || batch_ids.contains(&id) {
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
            let existing = by_id.get(&id);
            match opt.save_method {
                SaveMethod::Insert if existing.is_some() || batch_ids.contains(&id) => {
                    return Err(DbError::already_exists(table, id));
                }
                SaveMethod::Update if existing.is_none() => {
                    return Err(DbError::missing_on_update(table, id));
                }
                _ => {}
            }
            if existing != Some(&row) {
                changed = true;
                by_id.insert(id.clone(), row);
            }
            batch_ids.insert(id);
        }

        if changed {
            self.save_table(table, by_id.into_values()).await?;
        } else {
            debug!(table, "save_batch changed nothing, skipping write");
        }
        self.finished("save_batch", table, count, started);
        Ok(())
    }

    async fn delete_by_ids(&self, table: &str, ids: &[String]) -> DbResult<u64> {
        let mut by_id = self.load_by_id(table).await?;
        let deleted = ids.iter().filter(|id| by_id.remove(id.as_str()).is_some()).count();
        if deleted > 0 {
            self.save_table(table, by_id.into_values()).await?;
        }
        Ok(deleted as u64)
    }

    async fn delete_by_query(&self, q: &DBQuery) -> DbResult<u64> {
        let rows = self.cfg.plugin.load_file(&q.table).await?;
        let before = rows.len();
        let kept: Vec<Row> = if q.limit_value == 0 && q.offset_value == 0 {
            rows.into_iter().filter(|r| !polydb_query::row_matches(q, r)).collect()
        } else {
            let doomed: Vec<String> = query_in_memory(q, rows.iter().cloned())
                .iter()
                .filter_map(|r| r.row_id().map(str::to_string))
                .collect();
            rows.into_iter()
                .filter(|r| r.row_id().map_or(true, |id| !doomed.iter().any(|d| d == id)))
                .collect()
        };
        let deleted = before - kept.len();
        if deleted > 0 {
            self.save_table(&q.table, kept).await?;
        }
        Ok(deleted as u64)
    }

    async fn patch_by_query(&self, q: &DBQuery, patch: &Row) -> DbResult<u64> {
        let mut by_id = self.load_by_id(&q.table).await?;
        let mut ids_query = q.clone();
        ids_query.selected_fields = Some(vec!["id".to_string()]);
        let ids: Vec<String> = query_in_memory(&ids_query, by_id.values().cloned())
            .iter()
            .filter_map(|r| r.row_id().map(str::to_string))
            .collect();

        let mut changed = false;
        for id in &ids {
            if let Some(row) = by_id.get_mut(id) {
                for (k, v) in patch {
                    if row.get(k) != Some(v) {
                        row.insert(k.clone(), v.clone());
                        changed = true;
                    }
                }
            }
        }
        if changed {
            self.save_table(&q.table, by_id.into_values()).await?;
        }
        Ok(ids.len() as u64)
    }
}
