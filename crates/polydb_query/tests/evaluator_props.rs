//! Property tests for the in-memory evaluator.

use polydb_query::{
    count_in_memory, query_in_memory, row_matches, DBQuery, DBQueryFilterOperator, Row,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn arb_row() -> impl Strategy<Value = (i64, Option<String>)> {
    (-50i64..50, proptest::option::of("[a-d]{1,2}"))
}

fn build_rows(specs: Vec<(i64, Option<String>)>) -> Vec<Row> {
    specs
        .into_iter()
        .enumerate()
        .map(|(i, (k, s))| {
            let mut row = Row::new();
            row.insert("id".into(), json!(format!("id{i:03}")));
            row.insert("k".into(), json!(k));
            if let Some(s) = s {
                row.insert("s".into(), Value::String(s));
            }
            row
        })
        .collect()
}

proptest! {
    #[test]
    fn window_never_exceeds_limit(
        specs in proptest::collection::vec(arb_row(), 0..40),
        limit in 0usize..10,
        offset in 0usize..10,
    ) {
        let rows = build_rows(specs);
        let total = rows.len();
        let q = DBQuery::create("t").limit(limit).offset(offset);
        let result = query_in_memory(&q, rows);

        let expected = total.saturating_sub(offset);
        let expected = if limit > 0 { expected.min(limit) } else { expected };
        prop_assert_eq!(result.len(), expected);
    }

    #[test]
    fn filter_agrees_with_count(
        specs in proptest::collection::vec(arb_row(), 0..40),
        pivot in -50i64..50,
    ) {
        let rows = build_rows(specs);
        let q = DBQuery::create("t").filter("k", DBQueryFilterOperator::Lte, json!(pivot));
        let count = count_in_memory(&q, &rows);
        let result = query_in_memory(&q, rows.clone());

        prop_assert_eq!(result.len(), count);
        prop_assert!(result.iter().all(|r| r["k"].as_i64().unwrap() <= pivot));
        prop_assert!(rows
            .iter()
            .filter(|r| !row_matches(&q, r))
            .all(|r| r["k"].as_i64().unwrap() > pivot));
    }

    #[test]
    fn sort_is_ordered_and_stable(specs in proptest::collection::vec(arb_row(), 0..40)) {
        let rows = build_rows(specs);
        let q = DBQuery::create("t").order("k", true);
        let result = query_in_memory(&q, rows);

        for pair in result.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let (ka, kb) = (a["k"].as_i64().unwrap(), b["k"].as_i64().unwrap());
            prop_assert!(ka >= kb);
            if ka == kb {
                // ids were assigned in input order
                prop_assert!(a["id"].as_str().unwrap() < b["id"].as_str().unwrap());
            }
        }
    }

    #[test]
    fn in_and_not_in_partition_rows(
        specs in proptest::collection::vec(arb_row(), 0..40),
        picks in proptest::collection::vec(-50i64..50, 0..5),
    ) {
        let rows = build_rows(specs);
        let vals: Vec<Value> = picks.iter().map(|p| json!(p)).collect();
        let q_in = DBQuery::create("t").filter_in("k", vals.clone());
        let q_not_in =
            DBQuery::create("t").filter("k", DBQueryFilterOperator::NotIn, Value::Array(vals));

        let n_in = count_in_memory(&q_in, &rows);
        let n_not_in = count_in_memory(&q_not_in, &rows);
        prop_assert_eq!(n_in + n_not_in, rows.len());
    }
}
