//! CLI command implementations.

pub mod backup;
pub mod copy;
pub mod inspect;

use polydb_core::CommonDB;
use polydb_storage::{FileDB, FileDBCfg, LocalFilePersistencePlugin};
use std::path::Path;
use std::sync::Arc;

/// Opens the store directory at `path`, writing gzipped table files.
pub fn open_store(path: &Path) -> Arc<dyn CommonDB> {
    let plugin = LocalFilePersistencePlugin::new(path).gzip(true);
    Arc::new(FileDB::new(FileDBCfg::new(Arc::new(plugin))))
}
