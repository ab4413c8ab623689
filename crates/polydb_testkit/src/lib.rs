//! # PolyDB Testkit
//!
//! Shared test utilities for PolyDB adapters and daos.
//!
//! This crate provides:
//! - Fixture items and rows ([`fixtures`])
//! - The adapter conformance suite ([`conformance`])
//! - A call-counting adapter wrapper ([`counting`])

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conformance;
pub mod counting;
pub mod fixtures;

pub use conformance::{run_common_db_test, run_common_db_transaction_test};
pub use counting::CountingDB;
pub use fixtures::{
    create_test_item_bm, create_test_item_dbm, create_test_items_bm, create_test_items_dbm,
    create_test_rows, ids, row, TestItemBM, TestItemDBM, TEST_TABLE, TEST_TIMESTAMP,
};
