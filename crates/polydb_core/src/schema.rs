//! JSON-Schema-shaped table schemas.
//!
//! A table schema is persisted next to a table file as
//! `${table}.schema.json`; its `$id` must equal that file name.

use crate::error::{DbError, DbResult};
use crate::row::Row;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Returns the schema `$id` for `table`.
#[must_use]
pub fn schema_id_for(table: &str) -> String {
    format!("{table}.schema.json")
}

/// An object schema describing the rows of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaObject {
    /// Schema id, `${table}.schema.json`.
    #[serde(rename = "$id")]
    pub id: String,
    /// Always `"object"`.
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    /// Property schemas by field name.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Fields present in every row.
    #[serde(default)]
    pub required: Vec<String>,
    /// Whether unknown fields are allowed.
    #[serde(rename = "additionalProperties", default = "default_true")]
    pub additional_properties: bool,
}

fn object_type() -> String {
    "object".to_string()
}

const fn default_true() -> bool {
    true
}

impl JsonSchemaObject {
    /// Creates an empty schema for `table` that accepts any object.
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self {
            id: schema_id_for(table),
            schema_type: object_type(),
            properties: Map::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }

    /// Returns the table name encoded in `$id`.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        self.id.strip_suffix(".schema.json")
    }

    /// Checks that `$id` matches `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id does not equal `${table}.schema.json`.
    pub fn check_id(&self, table: &str) -> DbResult<()> {
        let expected = schema_id_for(table);
        if self.id == expected {
            Ok(())
        } else {
            Err(DbError::invalid_format(format!(
                "schema $id {} does not match {expected}",
                self.id
            )))
        }
    }

    /// Infers a schema from the shapes of `rows`.
    ///
    /// Each property lists every JSON type observed for it; a property is
    /// required if it appears in every row.
    #[must_use]
    pub fn infer_from_rows<'a>(table: &str, rows: impl IntoIterator<Item = &'a Row>) -> Self {
        let mut types: BTreeMap<String, BTreeSet<&'static str>> = BTreeMap::new();
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        let mut row_count = 0usize;

        for row in rows {
            row_count += 1;
            for (field, value) in row {
                types
                    .entry(field.clone())
                    .or_default()
                    .insert(json_type_name(value));
                *seen.entry(field.clone()).or_default() += 1;
            }
        }

        let mut schema = Self::new(table);
        for (field, kinds) in types {
            let kinds: Vec<Value> = kinds.into_iter().map(|k| Value::String(k.into())).collect();
            let type_value = if kinds.len() == 1 {
                kinds.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(kinds)
            };
            let mut prop = Map::new();
            prop.insert("type".into(), type_value);
            schema.properties.insert(field, Value::Object(prop));
        }

        if row_count > 0 {
            schema.required = seen
                .into_iter()
                .filter(|(_, n)| *n == row_count)
                .map(|(field, _)| field)
                .collect();
        }

        schema
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
