//! Persistence plugins for [`super::FileDB`].

use async_trait::async_trait;
use parking_lot::RwLock;
use polydb_core::ndjson::{
    find_table_file, list_tables, read_ndjson_file, table_file_path, write_ndjson_file,
};
use polydb_core::{DbResult, Row};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// One table file to replace.
#[derive(Debug, Clone, PartialEq)]
pub struct DBSaveBatchOperation {
    /// Table name.
    pub table: String,
    /// Complete new content of the table.
    pub rows: Vec<Row>,
}

/// A backing store whose unit of writing is a whole table file.
#[async_trait]
pub trait FileDBPersistencePlugin: Send + Sync {
    /// Checks connectivity.
    async fn ping(&self) -> DbResult<()>;

    /// Lists tables with a file.
    async fn get_tables(&self) -> DbResult<Vec<String>>;

    /// Loads every row of `table`. A missing table is empty.
    async fn load_file(&self, table: &str) -> DbResult<Vec<Row>>;

    /// Replaces the files named by `ops`.
    async fn save_files(&self, ops: Vec<DBSaveBatchOperation>) -> DbResult<()>;
}

/// Keeps table files in memory. Useful for tests.
#[derive(Debug, Default)]
pub struct InMemoryPersistencePlugin {
    files: RwLock<BTreeMap<String, Vec<Row>>>,
    saves: AtomicU64,
}

impl InMemoryPersistencePlugin {
    /// Creates an empty plugin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of table files written so far.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Returns the stored content of `table`.
    #[must_use]
    pub fn file(&self, table: &str) -> Option<Vec<Row>> {
        self.files.read().get(table).cloned()
    }
}

#[async_trait]
impl FileDBPersistencePlugin for InMemoryPersistencePlugin {
    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn get_tables(&self) -> DbResult<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    async fn load_file(&self, table: &str) -> DbResult<Vec<Row>> {
        Ok(self.files.read().get(table).cloned().unwrap_or_default())
    }

    async fn save_files(&self, ops: Vec<DBSaveBatchOperation>) -> DbResult<()> {
        let mut files = self.files.write();
        for op in ops {
            self.saves.fetch_add(1, Ordering::Relaxed);
            files.insert(op.table, op.rows);
        }
        Ok(())
    }
}

/// Stores each table as `${storage_path}/${table}.ndjson[.gz]`.
#[derive(Debug, Clone)]
pub struct LocalFilePersistencePlugin {
    storage_path: PathBuf,
    gzip: bool,
}

impl LocalFilePersistencePlugin {
    /// Creates a plugin writing plain `.ndjson` files into `storage_path`.
    #[must_use]
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            gzip: false,
        }
    }

    /// Sets whether files are gzipped.
    #[must_use]
    pub fn gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    /// Returns the storage directory.
    #[must_use]
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }
}

#[async_trait]
impl FileDBPersistencePlugin for LocalFilePersistencePlugin {
    async fn ping(&self) -> DbResult<()> {
        fs::create_dir_all(&self.storage_path)?;
        Ok(())
    }

    async fn get_tables(&self) -> DbResult<Vec<String>> {
        list_tables(&self.storage_path)
    }

    async fn load_file(&self, table: &str) -> DbResult<Vec<Row>> {
        match find_table_file(&self.storage_path, table) {
            Some(path) => read_ndjson_file(path),
            None => Ok(Vec::new()),
        }
    }

    async fn save_files(&self, ops: Vec<DBSaveBatchOperation>) -> DbResult<()> {
        for op in ops {
            let path = table_file_path(&self.storage_path, &op.table, self.gzip);
            let stats = write_ndjson_file(&path, &op.rows)?;
            // the other encoding would shadow or duplicate this table
            let stale = table_file_path(&self.storage_path, &op.table, !self.gzip);
            if stale.exists() {
                fs::remove_file(&stale)?;
            }
            debug!(table = %op.table, path = %path.display(), %stats, "saved table file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polydb_core::row_from_value;
    use serde_json::json;
    use tempfile::tempdir;

    fn op(table: &str, n: usize) -> DBSaveBatchOperation {
        DBSaveBatchOperation {
            table: table.to_string(),
            rows: (0..n)
                .map(|i| row_from_value(json!({"id": format!("{i}")})).unwrap())
                .collect(),
        }
    }

    #[tokio::test]
    async fn in_memory_plugin_counts_saves() {
        let plugin = InMemoryPersistencePlugin::new();
        assert!(plugin.load_file("t").await.unwrap().is_empty());

        plugin.save_files(vec![op("t", 2), op("u", 1)]).await.unwrap();
        assert_eq!(plugin.save_count(), 2);
        assert_eq!(plugin.load_file("t").await.unwrap().len(), 2);
        assert_eq!(plugin.get_tables().await.unwrap(), vec!["t", "u"]);
    }

    #[tokio::test]
    async fn local_file_plugin_switches_encoding() {
        let dir = tempdir().unwrap();
        let plain = LocalFilePersistencePlugin::new(dir.path());
        plain.save_files(vec![op("t", 3)]).await.unwrap();
        assert!(dir.path().join("t.ndjson").exists());

        let zipped = plain.clone().gzip(true);
        zipped.save_files(vec![op("t", 1)]).await.unwrap();
        assert!(dir.path().join("t.ndjson.gz").exists());
        assert!(!dir.path().join("t.ndjson").exists());

        assert_eq!(plain.load_file("t").await.unwrap().len(), 1);
        assert_eq!(plain.get_tables().await.unwrap(), vec!["t"]);
        assert!(plain.load_file("missing").await.unwrap().is_empty());
    }
}
