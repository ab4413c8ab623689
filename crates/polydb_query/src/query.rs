//! The `DBQuery` model.

use crate::error::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Filter operator of a [`DBQueryFilter`].
///
/// Serialized to exactly the operator strings used on the wire
/// (`"<"`, `"=="`, `"not-in"`, `"array-contains"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DBQueryFilterOperator {
    /// Less than.
    #[serde(rename = "<")]
    Lt,
    /// Less than or equal.
    #[serde(rename = "<=")]
    Lte,
    /// Equal.
    #[serde(rename = "==")]
    Eq,
    /// Not equal.
    #[serde(rename = "!=")]
    NotEq,
    /// Greater than or equal.
    #[serde(rename = ">=")]
    Gte,
    /// Greater than.
    #[serde(rename = ">")]
    Gt,
    /// Field value is one of the values of the filter array.
    #[serde(rename = "in")]
    In,
    /// Field value is none of the values of the filter array.
    #[serde(rename = "not-in")]
    NotIn,
    /// Field is an array containing the filter value.
    #[serde(rename = "array-contains")]
    ArrayContains,
    /// Field is an array containing at least one of the filter values.
    #[serde(rename = "array-contains-any")]
    ArrayContainsAny,
}

impl DBQueryFilterOperator {
    /// All operators, in declaration order.
    pub const ALL: [DBQueryFilterOperator; 10] = [
        Self::Lt,
        Self::Lte,
        Self::Eq,
        Self::NotEq,
        Self::Gte,
        Self::Gt,
        Self::In,
        Self::NotIn,
        Self::ArrayContains,
        Self::ArrayContainsAny,
    ];

    /// Returns the wire representation of the operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Gte => ">=",
            Self::Gt => ">",
            Self::In => "in",
            Self::NotIn => "not-in",
            Self::ArrayContains => "array-contains",
            Self::ArrayContainsAny => "array-contains-any",
        }
    }

    /// Returns true for operators written as words (`in`, `not-in`, ...).
    #[must_use]
    pub const fn is_word(self) -> bool {
        matches!(
            self,
            Self::In | Self::NotIn | Self::ArrayContains | Self::ArrayContainsAny
        )
    }
}

impl fmt::Display for DBQueryFilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DBQueryFilterOperator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| QueryError::UnknownOperator(s.to_string()))
    }
}

/// A single `(field, operator, value)` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DBQueryFilter {
    /// Field name.
    pub name: String,
    /// Operator.
    pub op: DBQueryFilterOperator,
    /// Value to compare against.
    pub val: Value,
}

/// A single sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DBQueryOrder {
    /// Field name.
    pub name: String,
    /// Whether to sort descending.
    #[serde(default)]
    pub descending: bool,
}

/// A declarative query against one table.
///
/// All building methods consume and return the query, so they chain:
///
/// ```
/// use polydb_query::{DBQuery, DBQueryFilterOperator};
/// use serde_json::json;
///
/// let q = DBQuery::create("users")
///     .filter_eq("status", json!("active"))
///     .filter("age", DBQueryFilterOperator::Gte, json!(18))
///     .order("created", true)
///     .limit(10);
///
/// assert_eq!(q.filters.len(), 2);
/// assert_eq!(q.limit_value, 10);
/// ```
///
/// `distinct`, `group_by_fields` and the cursors are descriptive metadata
/// for adapters with native support; the in-memory evaluator ignores them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DBQuery {
    /// Table the query runs against.
    pub table: String,
    /// Filters, combined with AND.
    #[serde(default)]
    pub filters: Vec<DBQueryFilter>,
    /// Sort keys, most significant first.
    #[serde(default)]
    pub orders: Vec<DBQueryOrder>,
    /// Maximum number of rows (0 = unlimited).
    #[serde(default)]
    pub limit_value: usize,
    /// Number of rows to skip.
    #[serde(default)]
    pub offset_value: usize,
    /// Fields to project to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_fields: Option<Vec<String>>,
    /// Fields to group by, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by_fields: Option<Vec<String>>,
    /// Whether rows should be distinct.
    #[serde(default)]
    pub distinct: bool,
    /// Opaque cursor to start from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,
    /// Opaque cursor to end at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_cursor: Option<String>,
}

impl DBQuery {
    /// Creates an empty query over `table`.
    #[must_use]
    pub fn create(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Parses a query from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a query.
    pub fn from_json(value: Value) -> QueryResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the JSON form of the query.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter value cannot be serialized.
    pub fn to_json(&self) -> QueryResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(
        mut self,
        name: impl Into<String>,
        op: DBQueryFilterOperator,
        val: Value,
    ) -> Self {
        self.filters.push(DBQueryFilter {
            name: name.into(),
            op,
            val,
        });
        self
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn filter_eq(self, name: impl Into<String>, val: Value) -> Self {
        self.filter(name, DBQueryFilterOperator::Eq, val)
    }

    /// Adds an `in` filter.
    #[must_use]
    pub fn filter_in(self, name: impl Into<String>, vals: Vec<Value>) -> Self {
        self.filter(name, DBQueryFilterOperator::In, Value::Array(vals))
    }

    /// Adds a sort key.
    #[must_use]
    pub fn order(mut self, name: impl Into<String>, descending: bool) -> Self {
        self.orders.push(DBQueryOrder {
            name: name.into(),
            descending,
        });
        self
    }

    /// Sets the limit (0 = unlimited).
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit_value = limit;
        self
    }

    /// Sets the offset.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset_value = offset;
        self
    }

    /// Restricts the returned rows to the given fields.
    #[must_use]
    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.selected_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets group-by fields.
    #[must_use]
    pub fn group_by<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.group_by_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the distinct flag.
    #[must_use]
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Sets the start cursor.
    #[must_use]
    pub fn start_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.start_cursor = Some(cursor.into());
        self
    }

    /// Sets the end cursor.
    #[must_use]
    pub fn end_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.end_cursor = Some(cursor.into());
        self
    }

    /// Returns the same query pointed at another table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Returns true if the query projects rows to a subset of fields.
    ///
    /// Results of such queries are partial rows.
    #[must_use]
    pub fn is_select_query(&self) -> bool {
        self.selected_fields.is_some()
    }

    /// Returns the human-readable tokens of the query.
    #[must_use]
    pub fn pretty_conditions(&self) -> Vec<String> {
        let mut tokens = vec![self.table.clone()];

        if let Some(fields) = &self.selected_fields {
            tokens.push(format!("select({})", fields.join(",")));
        }

        tokens.extend(self.filters.iter().map(|f| {
            let val = pretty_value(&f.val);
            if f.op.is_word() {
                format!("{} {} {}", f.name, f.op, val)
            } else {
                format!("{}{}{}", f.name, f.op, val)
            }
        }));

        tokens.extend(self.orders.iter().map(|o| {
            if o.descending {
                format!("order by {} desc", o.name)
            } else {
                format!("order by {}", o.name)
            }
        }));

        if let Some(fields) = &self.group_by_fields {
            tokens.push(format!("groupBy({})", fields.join(",")));
        }
        if self.distinct {
            tokens.push("distinct".to_string());
        }
        if self.offset_value > 0 {
            tokens.push(format!("offset {}", self.offset_value));
        }
        if self.limit_value > 0 {
            tokens.push(format!("limit {}", self.limit_value));
        }
        if let Some(cursor) = &self.start_cursor {
            tokens.push(format!("startCursor {cursor}"));
        }
        if let Some(cursor) = &self.end_cursor {
            tokens.push(format!("endCursor {cursor}"));
        }

        tokens
    }

    /// Renders the query as a deterministic one-line string for logging.
    #[must_use]
    pub fn pretty(&self) -> String {
        self.pretty_conditions().join(", ")
    }
}

impl fmt::Display for DBQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty())
    }
}

fn pretty_value(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_accumulates() {
        let q = DBQuery::create("t")
            .filter_eq("a", json!(1))
            .filter_in("b", vec![json!("x"), json!("y")])
            .order("c", false)
            .order("d", true)
            .limit(5)
            .offset(2)
            .select(["a", "b"]);

        assert_eq!(q.table, "t");
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.orders.len(), 2);
        assert_eq!(q.limit_value, 5);
        assert_eq!(q.offset_value, 2);
        assert!(q.is_select_query());
    }

    #[test]
    fn clone_is_independent() {
        let q1 = DBQuery::create("t").filter_eq("a", json!(1));
        let q2 = q1.clone().limit(3);

        assert_eq!(q1.limit_value, 0);
        assert_eq!(q2.limit_value, 3);
        assert_eq!(q1.filters, q2.filters);
    }

    #[test]
    fn pretty_is_deterministic() {
        let q = DBQuery::create("items")
            .select(["id", "k"])
            .filter("k", DBQueryFilterOperator::Gte, json!(2))
            .filter_in("tag", vec![json!("a"), json!("b")])
            .filter_eq("name", json!("x"))
            .order("k", true)
            .order("id", false)
            .offset(10)
            .limit(5);

        assert_eq!(
            q.pretty(),
            "items, select(id,k), k>=2, tag in [\"a\",\"b\"], name==x, \
             order by k desc, order by id, offset 10, limit 5"
        );
        assert_eq!(q.to_string(), q.pretty());
    }

    #[test]
    fn pretty_empty_query_is_table_only() {
        assert_eq!(DBQuery::create("t").pretty(), "t");
    }

    #[test]
    fn operator_wire_names() {
        for op in DBQueryFilterOperator::ALL {
            let json = serde_json::to_value(op).unwrap();
            assert_eq!(json, json!(op.as_str()));
            assert_eq!(op.as_str().parse::<DBQueryFilterOperator>().unwrap(), op);
        }
        assert!("~=".parse::<DBQueryFilterOperator>().is_err());
    }

    #[test]
    fn json_form_survives_reparse() {
        let q = DBQuery::create("t")
            .filter("n", DBQueryFilterOperator::NotIn, json!([1, 2]))
            .order("n", true)
            .distinct(true)
            .group_by(["g"])
            .start_cursor("abc");

        let json = q.to_json().unwrap();
        assert_eq!(json["filters"][0]["op"], json!("not-in"));
        assert_eq!(json["limitValue"], json!(0));

        let parsed = DBQuery::from_json(json).unwrap();
        assert_eq!(parsed, q);
    }

    #[test]
    fn from_json_fills_defaults() {
        let q = DBQuery::from_json(json!({"table": "t"})).unwrap();
        assert_eq!(q, DBQuery::create("t"));
    }
}
