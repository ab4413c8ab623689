//! # PolyDB Storage
//!
//! Store adapters implementing [`polydb_core::CommonDB`].
//!
//! ## Available Adapters
//!
//! - [`InMemoryDB`] - reference store with optimistic transactions and
//!   optional NDJSON persistence
//! - [`FileDB`] - whole-file store over a [`FileDBPersistencePlugin`]
//! - [`CacheDB`] - read-through / write-through cache over two adapters
//!
//! ## Example
//!
//! ```rust
//! use polydb_core::{row_from_value, CommonDB, ReadOptions, SaveOptions};
//! use polydb_storage::InMemoryDB;
//! use serde_json::json;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let db = InMemoryDB::new();
//! let row = row_from_value(json!({"id": "a", "k": 1})).unwrap();
//! db.save_batch("t", vec![row], &SaveOptions::default()).await.unwrap();
//!
//! let rows = db
//!     .get_by_ids("t", &["a".to_string()], &ReadOptions::default())
//!     .await
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod file;
mod memory;

pub use cache::{CacheDB, CacheDBCfg, CacheDBOptions};
pub use file::{
    DBSaveBatchOperation, FileDB, FileDBCfg, FileDBPersistencePlugin, InMemoryPersistencePlugin,
    LocalFilePersistencePlugin,
};
pub use memory::{InMemoryDB, InMemoryDBCfg, InMemoryDBTransaction, TableData, TableRows};
