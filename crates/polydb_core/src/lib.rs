//! # PolyDB Core
//!
//! The `CommonDB` contract and the primitives shared by every PolyDB crate.
//!
//! This crate provides:
//! - [`CommonDB`] - the interface every store adapter implements
//! - [`DBTransaction`] - buffered transactions with commit/rollback
//! - [`CommonDBSupport`] - the capability manifest adapters publish
//! - [`DbError`] - the error taxonomy (not-found, validation, integrity,
//!   transaction, I/O, aggregate)
//! - [`ErrorMode`] and [`run_pipeline`] - bounded-concurrency stream
//!   processing with three error propagation policies
//! - NDJSON file layout helpers and JSON table schemas
//!
//! ## Design Principles
//!
//! - Adapters are addressed only through `Arc<dyn CommonDB>`
//! - Capability-gated operations are checked against
//!   [`CommonDB::support`] at the call site
//! - Rows are schema-free JSON maps with a mandatory string `id`
//! - Not-found is `None`/empty, never an error, except in `require*` calls

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod db;
mod error;
mod error_mode;
pub mod ndjson;
mod options;
mod row;
mod schema;
mod stats;
mod stream;
mod support;
mod transaction;
mod validation;

pub use db::{run_in_transaction, stream_from_future, CommonDB, RowStream};
pub use error::{DbError, DbResult};
pub use error_mode::ErrorMode;
pub use options::{
    CreateTableOptions, ReadOptions, RunQueryResult, SaveMethod, SaveOptions, TransactionOptions,
};
pub use row::{
    deep_copy_row, generate_id, now_unix, order_by_ids, row_from_value, sort_object_keys_deep,
    strip_undefined, RowExt,
};
pub use schema::{schema_id_for, JsonSchemaObject};
pub use stats::NDJsonStats;
pub use stream::{run_pipeline, Flow, PipelineOptions, PipelineReport};
pub use support::{Capability, CommonDBSupport};
pub use transaction::{DBOperation, DBTransaction, PendingOps, TransactionState};
pub use validation::{FnSchema, ValidationError, ValidationErrorDetail, ValidationSchema};

pub use polydb_query::{DBQuery, DBQueryFilter, DBQueryFilterOperator, DBQueryOrder, Row};

/// PolyDB version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
