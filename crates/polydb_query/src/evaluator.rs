//! Brute-force in-memory query evaluation.
//!
//! Evaluation order:
//!
//! 1. every filter, AND-combined
//! 2. stable multi-key sort (ties fall through to the next key, then to
//!    input order)
//! 3. `offset`, then `limit` (0 = unlimited)
//! 4. projection to `selected_fields`, if set
//!
//! `distinct`, `group_by_fields` and cursors are not evaluated here.
//! Adapters that rely on this evaluator must not advertise support for them.

use crate::compare::{cmp_field_values, loose_eq, partial_cmp_values};
use crate::query::{DBQuery, DBQueryFilter, DBQueryFilterOperator};
use crate::Row;
use serde_json::Value;
use std::cmp::Ordering;

/// Returns true if `row` satisfies a single filter.
#[must_use]
pub fn filter_matches(filter: &DBQueryFilter, row: &Row) -> bool {
    let field = row.get(&filter.name);
    let val = &filter.val;

    match filter.op {
        DBQueryFilterOperator::Eq => field.is_some_and(|v| loose_eq(v, val)),
        DBQueryFilterOperator::NotEq => !field.is_some_and(|v| loose_eq(v, val)),
        DBQueryFilterOperator::Lt => relational(field, val, |o| o == Ordering::Less),
        DBQueryFilterOperator::Lte => relational(field, val, |o| o != Ordering::Greater),
        DBQueryFilterOperator::Gt => relational(field, val, |o| o == Ordering::Greater),
        DBQueryFilterOperator::Gte => relational(field, val, |o| o != Ordering::Less),
        DBQueryFilterOperator::In => match (field, val) {
            (Some(v), Value::Array(candidates)) => candidates.iter().any(|c| loose_eq(v, c)),
            _ => false,
        },
        DBQueryFilterOperator::NotIn => match (field, val) {
            (Some(v), Value::Array(candidates)) => !candidates.iter().any(|c| loose_eq(v, c)),
            (None, Value::Array(_)) => true,
            _ => false,
        },
        DBQueryFilterOperator::ArrayContains => match field {
            Some(Value::Array(items)) => items.iter().any(|item| loose_eq(item, val)),
            _ => false,
        },
        DBQueryFilterOperator::ArrayContainsAny => match (field, val) {
            (Some(Value::Array(items)), Value::Array(candidates)) => items
                .iter()
                .any(|item| candidates.iter().any(|c| loose_eq(item, c))),
            _ => false,
        },
    }
}

fn relational(field: Option<&Value>, val: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    field
        .and_then(|v| partial_cmp_values(v, val))
        .is_some_and(pred)
}

/// Returns true if `row` satisfies every filter of `q`.
#[must_use]
pub fn row_matches(q: &DBQuery, row: &Row) -> bool {
    q.filters.iter().all(|f| filter_matches(f, row))
}

/// Counts rows matching the filters of `q`.
///
/// Offset, limit and selection do not affect the count.
pub fn count_in_memory<'a>(q: &DBQuery, rows: impl IntoIterator<Item = &'a Row>) -> usize {
    rows.into_iter().filter(|row| row_matches(q, row)).count()
}

/// Evaluates `q` against `rows`.
///
/// The table name of the query is not checked; callers pass the rows of the
/// right table.
pub fn query_in_memory(q: &DBQuery, rows: impl IntoIterator<Item = Row>) -> Vec<Row> {
    let mut matched: Vec<Row> = rows.into_iter().filter(|row| row_matches(q, row)).collect();

    if !q.orders.is_empty() {
        // `sort_by` is stable, so equal rows keep input order
        matched.sort_by(|a, b| {
            for order in &q.orders {
                let ord = cmp_field_values(a.get(&order.name), b.get(&order.name));
                let ord = if order.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let iter = matched.into_iter().skip(q.offset_value);
    let window: Vec<Row> = if q.limit_value > 0 {
        iter.take(q.limit_value).collect()
    } else {
        iter.collect()
    };

    match &q.selected_fields {
        Some(fields) => window
            .into_iter()
            .map(|row| project(row, fields))
            .collect(),
        None => window,
    }
}

fn project(mut row: Row, fields: &[String]) -> Row {
    let mut projected = Row::new();
    for field in fields {
        if let Some(v) = row.remove(field) {
            projected.insert(field.clone(), v);
        }
    }
    projected
}
