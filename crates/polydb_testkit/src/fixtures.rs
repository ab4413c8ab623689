//! Test items shared by adapter and dao tests.

use polydb_core::{row_from_value, Row};
use serde::{Deserialize, Serialize};

/// Table used by the conformance suite.
pub const TEST_TABLE: &str = "TEST_TABLE";

/// Timestamp stamped on fixture items.
pub const TEST_TIMESTAMP: i64 = 1_529_539_200;

/// Business model of a test item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestItemBM {
    /// Row id.
    #[serde(default)]
    pub id: String,
    /// Always set.
    pub k1: String,
    /// Null for every third item.
    pub k2: Option<String>,
    /// Item number.
    pub k3: Option<i64>,
    /// Whether the item number is even.
    pub even: bool,
    /// Creation time.
    #[serde(default)]
    pub created: i64,
    /// Last update time.
    #[serde(default)]
    pub updated: i64,
}

/// Database model of a test item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestItemDBM {
    /// Row id.
    #[serde(default)]
    pub id: String,
    /// Always set.
    pub k1: String,
    /// Null for every third item.
    pub k2: Option<String>,
    /// Item number.
    pub k3: Option<i64>,
    /// Whether the item number is even.
    pub even: bool,
    /// Creation time.
    #[serde(default)]
    pub created: i64,
    /// Last update time.
    #[serde(default)]
    pub updated: i64,
}

/// Creates test item number `num` (1-based ids: `id1`, `id2`, ...).
#[must_use]
pub fn create_test_item_bm(num: usize) -> TestItemBM {
    TestItemBM {
        id: format!("id{num}"),
        k1: format!("v{num}"),
        k2: (num % 3 != 0).then(|| format!("v{}", num * 2)),
        k3: Some(num as i64),
        even: num % 2 == 0,
        created: TEST_TIMESTAMP,
        updated: TEST_TIMESTAMP,
    }
}

/// Creates the database model of test item number `num`.
#[must_use]
pub fn create_test_item_dbm(num: usize) -> TestItemDBM {
    let bm = create_test_item_bm(num);
    TestItemDBM {
        id: bm.id,
        k1: bm.k1,
        k2: bm.k2,
        k3: bm.k3,
        even: bm.even,
        created: bm.created,
        updated: bm.updated,
    }
}

/// Creates test items `1..=n`.
#[must_use]
pub fn create_test_items_bm(n: usize) -> Vec<TestItemBM> {
    (1..=n).map(create_test_item_bm).collect()
}

/// Creates database models of test items `1..=n`.
#[must_use]
pub fn create_test_items_dbm(n: usize) -> Vec<TestItemDBM> {
    (1..=n).map(create_test_item_dbm).collect()
}

/// Creates test items `1..=n` as rows.
///
/// # Panics
///
/// Never in practice: fixture items always serialize to objects.
#[must_use]
pub fn create_test_rows(n: usize) -> Vec<Row> {
    create_test_items_dbm(n)
        .into_iter()
        .map(|dbm| {
            let value = serde_json::to_value(dbm).expect("fixture serializes");
            row_from_value(value).expect("fixture is an object")
        })
        .collect()
}

/// Makes a row from a JSON literal.
///
/// # Panics
///
/// Panics if `value` is not an object.
#[must_use]
pub fn row(value: serde_json::Value) -> Row {
    row_from_value(value).expect("row literal must be an object")
}

/// Turns string literals into owned ids.
#[must_use]
pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| (*s).to_string()).collect()
}
