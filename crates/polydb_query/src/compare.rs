//! Value comparison.
//!
//! Two flavours of comparison are needed:
//!
//! - **Filtering** uses [`partial_cmp_values`]: only values of the same kind
//!   are comparable (numbers with numbers, strings with strings, ...).
//!   Comparing a string to a number yields `None`, so relational filters
//!   never match across kinds.
//! - **Sorting** uses [`cmp_field_values`], a total order over possibly
//!   absent values:
//!
//! ```text
//! absent < null < bool < number < string < array < object
//! ```

use serde_json::Value;
use std::cmp::Ordering;

/// Rank of a value kind in the total sort order.
fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Compares two JSON numbers numerically.
///
/// Integers and floats compare by value, so `1` equals `1.0`.
fn cmp_numbers(a: &serde_json::Number, b: &serde_json::Number) -> Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
    }
}

/// Compares two values of the same kind.
///
/// Returns `None` when the values are of different kinds, or when either is
/// `null` (null is only ever equal to null, never less or greater).
#[must_use]
pub fn partial_cmp_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => Some(cmp_numbers(x, y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Equality used by `==`, `!=`, `in` and the array operators.
///
/// Numbers compare by value; arrays and objects compare structurally.
#[must_use]
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => cmp_numbers(x, y) == Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| loose_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        _ => a == b,
    }
}

/// Total order over possibly-absent field values, used for sorting.
#[must_use]
pub fn cmp_field_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (ra, rb) = (kind_rank(a), kind_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = cmp_field_values(Some(l), Some(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Some(Value::Object(x)), Some(Value::Object(y))) => match x.len().cmp(&y.len()) {
            Ordering::Equal => {
                for ((ak, av), (bk, bv)) in x.iter().zip(y.iter()) {
                    let key_ord = ak.cmp(bk);
                    if key_ord != Ordering::Equal {
                        return key_ord;
                    }
                    let val_ord = cmp_field_values(Some(av), Some(bv));
                    if val_ord != Ordering::Equal {
                        return val_ord;
                    }
                }
                Ordering::Equal
            }
            ord => ord,
        },
        (Some(x), Some(y)) => partial_cmp_values(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(
            partial_cmp_values(&json!(1), &json!(1.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            partial_cmp_values(&json!(-3), &json!(2.5)),
            Some(Ordering::Less)
        );
        assert!(loose_eq(&json!(2), &json!(2.0)));
    }

    #[test]
    fn mixed_kinds_are_incomparable() {
        assert_eq!(partial_cmp_values(&json!("5"), &json!(5)), None);
        assert_eq!(partial_cmp_values(&json!(null), &json!(null)), None);
        assert!(!loose_eq(&json!("5"), &json!(5)));
    }

    #[test]
    fn total_order_ranks_kinds() {
        let ordered = [
            None,
            Some(json!(null)),
            Some(json!(false)),
            Some(json!(-10)),
            Some(json!("a")),
            Some(json!([1])),
            Some(json!({"a": 1})),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(
                cmp_field_values(pair[0].as_ref(), pair[1].as_ref()),
                Ordering::Less,
                "{:?} should sort before {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn arrays_compare_elementwise_then_by_length() {
        let a = json!([1, 2]);
        let b = json!([1, 3]);
        let c = json!([1, 2, 0]);
        assert_eq!(cmp_field_values(Some(&a), Some(&b)), Ordering::Less);
        assert_eq!(cmp_field_values(Some(&a), Some(&c)), Ordering::Less);
    }

    #[test]
    fn nested_structural_equality() {
        assert!(loose_eq(
            &json!({"a": [1, {"b": 2}]}),
            &json!({"a": [1.0, {"b": 2}]})
        ));
        assert!(!loose_eq(&json!({"a": 1}), &json!({"a": 1, "b": null})));
    }
}
