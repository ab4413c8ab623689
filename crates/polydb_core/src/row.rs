//! Row helpers.

use crate::error::{DbError, DbResult};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

pub use polydb_query::Row;

/// Accessors for the well-known row fields.
pub trait RowExt {
    /// The `id` field, if present and a string.
    fn row_id(&self) -> Option<&str>;
    /// Sets the `id` field.
    fn set_row_id(&mut self, id: impl Into<String>);
    /// The `created` field, if present and an integer.
    fn row_created(&self) -> Option<i64>;
    /// The `updated` field, if present and an integer.
    fn row_updated(&self) -> Option<i64>;
}

impl RowExt for Row {
    fn row_id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    fn set_row_id(&mut self, id: impl Into<String>) {
        self.insert("id".to_string(), Value::String(id.into()));
    }

    fn row_created(&self) -> Option<i64> {
        self.get("created").and_then(Value::as_i64)
    }

    fn row_updated(&self) -> Option<i64> {
        self.get("updated").and_then(Value::as_i64)
    }
}

/// Current time as unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Generates a random row id.
#[must_use]
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Converts a JSON value into a row.
///
/// # Errors
///
/// Returns an error if the value is not an object.
pub fn row_from_value(value: Value) -> DbResult<Row> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DbError::invalid_format(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Returns an independent copy of `row`.
///
/// Stores call this on every write so stored values never alias caller
/// data.
#[must_use]
pub fn deep_copy_row(row: &Row) -> Row {
    row.clone()
}

/// Drops fields without a value before persisting.
///
/// A JSON row cannot hold an absent value, so this returns the row as is;
/// `null` is a real value and is kept.
#[must_use]
pub fn strip_undefined(row: Row) -> Row {
    row
}

/// Reorders `rows` to follow `ids`, dropping rows whose id is not listed.
///
/// Ids without a row are skipped; duplicates in `ids` yield the row once.
#[must_use]
pub fn order_by_ids(rows: Vec<Row>, ids: &[String]) -> Vec<Row> {
    let mut by_id: std::collections::HashMap<String, Row> = rows
        .into_iter()
        .filter_map(|r| r.row_id().map(str::to_string).map(|id| (id, r)))
        .collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Returns `value` with the keys of every nested object sorted.
#[must_use]
pub fn sort_object_keys_deep(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_object_keys_deep(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_object_keys_deep).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_accessors() {
        let mut row = row_from_value(json!({"created": 10, "updated": 20})).unwrap();
        assert_eq!(row.row_id(), None);
        row.set_row_id("a");
        assert_eq!(row.row_id(), Some("a"));
        assert_eq!(row.row_created(), Some(10));
        assert_eq!(row.row_updated(), Some(20));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(row_from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn deep_key_sort() {
        let v = json!({"b": 1, "a": {"d": [ {"z": 1, "y": 2} ], "c": 0}});
        let sorted = sort_object_keys_deep(v);
        assert_eq!(
            serde_json::to_string(&sorted).unwrap(),
            r#"{"a":{"c":0,"d":[{"y":2,"z":1}]},"b":1}"#
        );
    }

    #[test]
    fn order_by_ids_follows_request() {
        let rows = vec![
            row_from_value(json!({"id": "a"})).unwrap(),
            row_from_value(json!({"id": "b"})).unwrap(),
        ];
        let ids: Vec<String> = ["b", "x", "a", "b"].iter().map(|s| s.to_string()).collect();
        let ordered = order_by_ids(rows, &ids);
        let got: Vec<_> = ordered.iter().map(|r| r.row_id().unwrap()).collect();
        assert_eq!(got, vec!["b", "a"]);
    }

    #[test]
    fn deep_copy_does_not_alias() {
        let original = row_from_value(json!({"id": "a", "nested": {"k": 1}})).unwrap();
        let mut copy = deep_copy_row(&original);
        copy["nested"]["k"] = json!(2);
        assert_eq!(original["nested"]["k"], json!(1));
        assert_eq!(strip_undefined(original.clone()), original);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }
}
