//! # PolyDB Pipeline
//!
//! Bulk table pipelines between PolyDB stores and NDJSON files.
//!
//! This crate provides:
//! - [`db_pipeline_backup`] - store to `${table}.ndjson[.gz]` files
//! - [`db_pipeline_restore`] - files back into a store
//! - [`db_pipeline_copy`] - store to store without touching disk
//!
//! Each pipeline runs up to `concurrency` tables at once. Within a table,
//! rows flow serially through the optional `since_updated` filter, the
//! table's [`RowMapper`] and a chunked sink. Every run returns per-table
//! [`polydb_core::NDJsonStats`] and their total.
//!
//! ## Example
//!
//! ```rust
//! use polydb_core::CommonDB;
//! use polydb_pipeline::{db_pipeline_backup, db_pipeline_restore, BackupOptions, RestoreOptions};
//! use polydb_storage::InMemoryDB;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let dir = tempfile::tempdir().unwrap();
//! let source: Arc<dyn CommonDB> = Arc::new(InMemoryDB::new());
//! let stats = db_pipeline_backup(&BackupOptions::new(source, dir.path())).await.unwrap();
//! assert_eq!(stats.total.rows, 0);
//!
//! let target: Arc<dyn CommonDB> = Arc::new(InMemoryDB::new());
//! db_pipeline_restore(&RestoreOptions::new(target, dir.path())).await.unwrap();
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod copy;
mod options;
mod restore;
mod tables;

pub use backup::db_pipeline_backup;
pub use copy::db_pipeline_copy;
pub use options::{sync_mapper, BackupOptions, CopyOptions, RestoreOptions, RowMapper};
pub use restore::db_pipeline_restore;
pub use tables::PipelineStats;
