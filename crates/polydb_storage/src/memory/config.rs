//! In-memory store configuration.

use std::path::PathBuf;

/// Configuration of an [`super::InMemoryDB`].
#[derive(Debug, Clone)]
pub struct InMemoryDBCfg {
    /// Prefix prepended to every table name.
    pub table_prefix: String,

    /// Fail reads made inside a transaction after a write.
    pub forbid_transaction_read_after_write: bool,

    /// Flush to disk after every successful write.
    pub persistence_enabled: bool,

    /// Directory used by `flush_to_disk` / `restore_from_disk`.
    pub persistent_storage_path: Option<PathBuf>,

    /// Write `.ndjson.gz` instead of `.ndjson`.
    pub persist_zip: bool,

    /// Log each persisted table.
    pub log_persistence: bool,
}

impl Default for InMemoryDBCfg {
    fn default() -> Self {
        Self {
            table_prefix: String::new(),
            forbid_transaction_read_after_write: true,
            persistence_enabled: false,
            persistent_storage_path: None,
            persist_zip: true,
            log_persistence: true,
        }
    }
}

impl InMemoryDBCfg {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table prefix.
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Sets whether reads after a write fail inside a transaction.
    #[must_use]
    pub fn forbid_transaction_read_after_write(mut self, value: bool) -> Self {
        self.forbid_transaction_read_after_write = value;
        self
    }

    /// Enables flushing to `path` after every write.
    #[must_use]
    pub fn persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence_enabled = true;
        self.persistent_storage_path = Some(path.into());
        self
    }

    /// Sets the directory used for manual flush/restore.
    #[must_use]
    pub fn persistent_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistent_storage_path = Some(path.into());
        self
    }

    /// Sets whether persisted files are gzipped.
    #[must_use]
    pub fn persist_zip(mut self, value: bool) -> Self {
        self.persist_zip = value;
        self
    }

    /// Sets whether persistence is logged.
    #[must_use]
    pub fn log_persistence(mut self, value: bool) -> Self {
        self.log_persistence = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = InMemoryDBCfg::default();
        assert!(cfg.forbid_transaction_read_after_write);
        assert!(!cfg.persistence_enabled);
        assert!(cfg.persistent_storage_path.is_none());
        assert!(cfg.table_prefix.is_empty());
    }

    #[test]
    fn builder_pattern() {
        let cfg = InMemoryDBCfg::new()
            .table_prefix("test_")
            .forbid_transaction_read_after_write(false)
            .persistence("/tmp/db")
            .persist_zip(false);

        assert_eq!(cfg.table_prefix, "test_");
        assert!(!cfg.forbid_transaction_read_after_write);
        assert!(cfg.persistence_enabled);
        assert_eq!(cfg.persistent_storage_path, Some(PathBuf::from("/tmp/db")));
        assert!(!cfg.persist_zip);
    }
}
