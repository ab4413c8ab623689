//! # PolyDB Dao
//!
//! Typed access to one table of a [`polydb_core::CommonDB`].
//!
//! This crate provides:
//! - [`CommonDao`] - reads, saves, patches, deletes and streams with
//!   business-model / stored-model conversion
//! - [`CommonDaoHooks`] - lifecycle hooks with defaults
//! - [`CommonDaoCfg`] - table configuration (validation, immutability,
//!   timestamps, redaction)
//! - [`RunnableDBQuery`] - a query bound to its dao
//! - [`DaoTransaction`] - dao pipelines inside an adapter transaction
//!
//! ## Example
//!
//! ```rust
//! use polydb_core::Row;
//! use polydb_dao::{CommonDao, CommonDaoCfg, DaoReadOptions, DaoSaveOptions};
//! use polydb_storage::InMemoryDB;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let dao = CommonDao::new(CommonDaoCfg::<Row>::new(Arc::new(InMemoryDB::new()), "users"));
//!
//! let mut user: Row = serde_json::from_value(json!({"name": "ada"})).unwrap();
//! let saved = dao.save(&mut user, &DaoSaveOptions::default()).await.unwrap();
//! let id = saved["id"].as_str().unwrap();
//!
//! let loaded = dao.require_by_id(id, &DaoReadOptions::default()).await.unwrap();
//! assert_eq!(loaded["name"], json!("ada"));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dao;
mod entity;
mod hooks;
mod query;
mod transaction;

pub use config::{
    CommonDaoCfg, DaoDeleteOptions, DaoPatchOptions, DaoReadOptions, DaoSaveOptions,
    DaoStreamOptions,
};
pub use dao::{CommonDao, DaoQueryResult};
pub use entity::{convert, from_row, to_row, BaseDBEntity, DaoModel};
pub use hooks::{CommonDaoHooks, DefaultHooks, HookOutcome};
pub use query::RunnableDBQuery;
pub use transaction::DaoTransaction;
