//! # PolyDB Query
//!
//! Declarative query model and in-memory evaluator for PolyDB.
//!
//! This crate is the leaf of the workspace. It provides:
//! - [`DBQuery`] - a fluent, serializable descriptor of filters, orders,
//!   limit/offset, field selection and cursors
//! - [`query_in_memory`] - a brute-force evaluator over a set of rows
//! - A total ordering over JSON values used for sorting
//!
//! A query is pure data: it carries no connection or adapter reference.
//!
//! ## Usage
//!
//! ```
//! use polydb_query::{query_in_memory, DBQuery, DBQueryFilterOperator, Row};
//! use serde_json::json;
//!
//! let rows: Vec<Row> = vec![
//!     json!({"id": "a", "k": 1}).as_object().unwrap().clone(),
//!     json!({"id": "b", "k": 3}).as_object().unwrap().clone(),
//! ];
//!
//! let q = DBQuery::create("items")
//!     .filter("k", DBQueryFilterOperator::Gt, json!(2))
//!     .order("k", true);
//!
//! let result = query_in_memory(&q, rows);
//! assert_eq!(result.len(), 1);
//! assert_eq!(q.pretty(), "items, k>2, order by k desc");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compare;
mod error;
mod evaluator;
mod query;

pub use compare::{cmp_field_values, loose_eq, partial_cmp_values};
pub use error::{QueryError, QueryResult};
pub use evaluator::{count_in_memory, filter_matches, query_in_memory, row_matches};
pub use query::{DBQuery, DBQueryFilter, DBQueryFilterOperator, DBQueryOrder};

/// A schema-free record: field name to JSON value.
///
/// Every stored row carries a string `id`. `null` is a real value; a key that
/// is absent from the map is "undefined" and never round-trips.
pub type Row = serde_json::Map<String, serde_json::Value>;
