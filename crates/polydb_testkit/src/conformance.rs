//! Behavioral suite every `CommonDB` adapter must pass.
//!
//! The suite drives an adapter through [`TEST_TABLE`] and checks each answer
//! against the in-memory evaluator. Steps whose capability the adapter does
//! not publish are skipped.

use crate::fixtures::{create_test_rows, ids, row, TEST_TABLE};
use futures::TryStreamExt;
use polydb_core::{
    run_in_transaction, CommonDB, CreateTableOptions, DBQuery, DBQueryFilterOperator, DbError,
    JsonSchemaObject, ReadOptions, Row, RowExt, SaveMethod, SaveOptions, TransactionOptions,
};
use polydb_query::query_in_memory;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Number of items the suite saves.
pub const ITEM_COUNT: usize = 20;

fn by_id(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by(|a, b| a.row_id().cmp(&b.row_id()));
    rows
}

async fn query(db: &dyn CommonDB, q: &DBQuery) -> Vec<Row> {
    db.run_query(q, &ReadOptions::default())
        .await
        .unwrap_or_else(|e| panic!("{}: run_query({q}) failed: {e}", db.name()))
        .rows
}

async fn assert_query(db: &dyn CommonDB, q: &DBQuery, items: &[Row], ordered: bool) {
    let expected = query_in_memory(q, items.iter().cloned());
    let actual = query(db, q).await;
    if ordered {
        assert_eq!(actual, expected, "{}: {q}", db.name());
    } else {
        assert_eq!(by_id(actual), by_id(expected), "{}: {q}", db.name());
    }
}

async fn clean(db: &dyn CommonDB) {
    let deleted = db
        .delete_by_query(&DBQuery::create(TEST_TABLE))
        .await
        .expect("delete_by_query on an empty or populated table");
    let left = query(db, &DBQuery::create(TEST_TABLE)).await;
    assert!(left.is_empty(), "{}: {deleted} deleted but rows remain", db.name());
}

/// Runs the full suite against `db`, gated by `db.support()`.
///
/// # Panics
///
/// Panics on the first behavior that differs from the contract.
pub async fn run_common_db_test(db: &dyn CommonDB) {
    let support = *db.support();
    db.ping().await.expect("ping");

    if support.create_table {
        db.create_table(
            TEST_TABLE,
            &JsonSchemaObject::new(TEST_TABLE),
            &CreateTableOptions { drop_if_exists: true },
        )
        .await
        .expect("create_table");
    }
    clean(db).await;

    // empty reads
    let none = db
        .get_by_ids(TEST_TABLE, &ids(&["id1", "idX"]), &ReadOptions::default())
        .await
        .expect("get_by_ids on empty table");
    assert!(none.is_empty());
    db.save_batch(TEST_TABLE, Vec::new(), &SaveOptions::default())
        .await
        .expect("empty save_batch is a no-op");

    let items = create_test_rows(ITEM_COUNT);
    db.save_batch(TEST_TABLE, items.clone(), &SaveOptions::default())
        .await
        .expect("save_batch");

    // upserting the same rows again changes nothing
    db.save_batch(TEST_TABLE, items.clone(), &SaveOptions::default())
        .await
        .expect("idempotent save_batch");

    let got = db
        .get_by_ids(TEST_TABLE, &ids(&["id3", "idX", "id1"]), &ReadOptions::default())
        .await
        .expect("get_by_ids");
    assert_eq!(by_id(got), vec![items[0].clone(), items[2].clone()]);

    if support.null_values {
        let third = &items[2];
        assert_eq!(third.get("k2"), Some(&Value::Null), "fixture carries a null");
        let got = db
            .get_by_ids(TEST_TABLE, &ids(&["id3"]), &ReadOptions::default())
            .await
            .expect("get_by_ids null row");
        assert_eq!(got[0].get("k2"), Some(&Value::Null), "{}: null round-trip", db.name());
    }

    assert!(db.get_tables().await.expect("get_tables").iter().any(|t| t == TEST_TABLE));
    if support.table_schemas {
        let schema = db.get_table_schema(TEST_TABLE).await.expect("get_table_schema");
        schema.check_id(TEST_TABLE).expect("schema $id");
    }

    if support.queries {
        run_query_checks(db, &items).await;
    }

    if support.streaming {
        let q = DBQuery::create(TEST_TABLE);
        let streamed: Vec<Row> = db
            .stream_query(&q, &ReadOptions::default())
            .try_collect()
            .await
            .expect("stream_query");
        assert_eq!(by_id(streamed), by_id(items.clone()));
    }

    if support.insert_save_method {
        let err = db
            .save_batch(
                TEST_TABLE,
                vec![items[0].clone()],
                &SaveOptions::with_method(SaveMethod::Insert),
            )
            .await
            .expect_err("insert of an existing id");
        assert!(matches!(err, DbError::AlreadyExists { .. }), "{}: {err}", db.name());
    }
    if support.update_save_method {
        let err = db
            .save_batch(
                TEST_TABLE,
                vec![row(json!({"id": "idX", "k1": "vX"}))],
                &SaveOptions::with_method(SaveMethod::Update),
            )
            .await
            .expect_err("update of a missing id");
        assert!(matches!(err, DbError::MissingOnUpdate { .. }), "{}: {err}", db.name());
    }

    let mut items = items;
    if support.patch_by_query {
        let q = DBQuery::create(TEST_TABLE).filter_eq("even", json!(true));
        let patch = row(json!({"k1": "patched"}));
        let patched = db.patch_by_query(&q, &patch).await.expect("patch_by_query");
        assert_eq!(patched, (ITEM_COUNT / 2) as u64);
        for item in items.iter_mut().filter(|r| r["even"] == json!(true)) {
            item.insert("k1".to_string(), json!("patched"));
        }
        assert_query(db, &DBQuery::create(TEST_TABLE), &items, false).await;
    }

    if support.increment {
        let inc = HashMap::from([("id1".to_string(), 5), ("id2".to_string(), -2)]);
        let out = db
            .increment_batch(TEST_TABLE, "k3", &inc)
            .await
            .expect("increment_batch");
        assert_eq!(out, HashMap::from([("id1".to_string(), 6), ("id2".to_string(), 0)]));
        items[0].insert("k3".to_string(), json!(6));
        items[1].insert("k3".to_string(), json!(0));

        let missing = HashMap::from([("idX".to_string(), 1)]);
        let err = db
            .increment_batch(TEST_TABLE, "k3", &missing)
            .await
            .expect_err("increment of a missing row");
        assert!(matches!(err, DbError::NotFound { .. }), "{}: {err}", db.name());
        assert_query(db, &DBQuery::create(TEST_TABLE), &items, false).await;
    }

    let deleted = db
        .delete_by_ids(TEST_TABLE, &ids(&["id1", "id2", "idX"]))
        .await
        .expect("delete_by_ids");
    assert_eq!(deleted, 2);
    items.retain(|r| !matches!(r.row_id(), Some("id1" | "id2")));
    assert_query(db, &DBQuery::create(TEST_TABLE), &items, false).await;

    if support.db_query_filter {
        let q = DBQuery::create(TEST_TABLE).filter("k3", DBQueryFilterOperator::Gt, json!(15));
        let deleted = db.delete_by_query(&q).await.expect("delete_by_query");
        assert_eq!(deleted, 5);
        items.retain(|r| r["k3"].as_i64().is_some_and(|k| k <= 15));
        assert_query(db, &DBQuery::create(TEST_TABLE), &items, false).await;
    }

    clean(db).await;
}

async fn run_query_checks(db: &dyn CommonDB, items: &[Row]) {
    let support = *db.support();
    let all = DBQuery::create(TEST_TABLE);
    assert_query(db, &all, items, false).await;

    let count = db
        .run_query_count(&all, &ReadOptions::default())
        .await
        .expect("run_query_count");
    assert_eq!(count, items.len() as u64);

    if support.db_query_filter {
        let q = DBQuery::create(TEST_TABLE).filter_eq("even", json!(true));
        assert_query(db, &q, items, false).await;
        let count = db
            .run_query_count(&q, &ReadOptions::default())
            .await
            .expect("run_query_count filtered");
        assert_eq!(count, (ITEM_COUNT / 2) as u64);

        let q = DBQuery::create(TEST_TABLE)
            .filter("k3", DBQueryFilterOperator::Gte, json!(5))
            .filter("k3", DBQueryFilterOperator::Lt, json!(9));
        assert_query(db, &q, items, false).await;

        let q = DBQuery::create(TEST_TABLE).filter_eq("k2", Value::Null);
        assert_query(db, &q, items, false).await;
    }

    if support.db_query_filter_in {
        let q = DBQuery::create(TEST_TABLE).filter_in("k1", vec![json!("v1"), json!("v4")]);
        assert_query(db, &q, items, false).await;
    }

    if support.db_query_order {
        let q = DBQuery::create(TEST_TABLE).order("k3", true);
        assert_query(db, &q, items, true).await;

        let q = DBQuery::create(TEST_TABLE).order("k3", false).offset(3).limit(4);
        assert_query(db, &q, items, true).await;
        assert_eq!(query(db, &q).await.len(), 4);
    }

    if support.db_query_select_fields {
        let q = DBQuery::create(TEST_TABLE).select(["k1"]);
        let rows = by_id(query(db, &q).await);
        assert_eq!(rows.len(), items.len());
        assert!(rows.iter().all(|r| r.contains_key("id") && r.contains_key("k1")));
        assert!(rows.iter().all(|r| !r.contains_key("k3")));
    }
}

/// Checks commit and rollback behavior of `db`'s transactions.
///
/// # Panics
///
/// Panics on the first behavior that differs from the contract.
pub async fn run_common_db_transaction_test(db: &dyn CommonDB) {
    assert!(db.support().transactions, "{} does not support transactions", db.name());
    clean(db).await;

    let items = create_test_rows(4);
    let to_save = items.clone();
    run_in_transaction(db, &TransactionOptions::default(), move |tx| {
        Box::pin(async move {
            tx.save_batch(TEST_TABLE, to_save, &SaveOptions::default()).await?;
            tx.delete_by_ids(TEST_TABLE, &ids(&["id4"])).await
        })
    })
    .await
    .expect("transaction commits");
    assert_query(db, &DBQuery::create(TEST_TABLE), &items[..3], false).await;

    // a failing operation rolls back everything before it
    let err = run_in_transaction(db, &TransactionOptions::default(), |tx| {
        Box::pin(async move {
            tx.delete_by_ids(TEST_TABLE, &ids(&["id1"])).await?;
            tx.save_batch(
                TEST_TABLE,
                vec![row(json!({"id": "id2", "k1": "dup"}))],
                &SaveOptions::with_method(SaveMethod::Insert),
            )
            .await
        })
    })
    .await
    .expect_err("insert of an existing id fails the commit");
    assert!(matches!(err, DbError::AlreadyExists { .. }), "{}: {err}", db.name());
    assert_query(db, &DBQuery::create(TEST_TABLE), &items[..3], false).await;

    // an error from the body rolls back without committing
    let err = run_in_transaction(db, &TransactionOptions::default(), |tx| {
        Box::pin(async move {
            tx.delete_by_ids(TEST_TABLE, &ids(&["id1", "id2", "id3"])).await?;
            Err::<(), _>(DbError::adapter("abort"))
        })
    })
    .await
    .expect_err("body error");
    assert_eq!(err.to_string(), "adapter error: abort");
    assert_query(db, &DBQuery::create(TEST_TABLE), &items[..3], false).await;

    clean(db).await;
}
