use crate::{
    BaseDBEntity, CommonDao, CommonDaoCfg, CommonDaoHooks, DaoDeleteOptions, DaoPatchOptions,
    DaoReadOptions, DaoSaveOptions, DaoStreamOptions, HookOutcome,
};
use futures::{stream, StreamExt};
use polydb_core::{
    CommonDB, DBQuery, DBQueryFilterOperator, DbError, ErrorMode, FnSchema, Row, SaveOptions,
    TransactionOptions, ValidationError, ValidationErrorDetail, ValidationSchema,
};
use polydb_storage::InMemoryDB;
use polydb_testkit::{ids, row, CountingDB};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TABLE: &str = "items";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    k1: String,
    #[serde(default)]
    k3: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated: Option<i64>,
}

impl BaseDBEntity for Item {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
    fn created(&self) -> Option<i64> {
        self.created
    }
    fn set_created(&mut self, ts: i64) {
        self.created = Some(ts);
    }
    fn updated(&self) -> Option<i64> {
        self.updated
    }
    fn set_updated(&mut self, ts: i64) {
        self.updated = Some(ts);
    }
}

fn item(id: &str, k1: &str) -> Item {
    Item {
        id: Some(id.to_string()),
        k1: k1.to_string(),
        ..Item::default()
    }
}

fn items(n: usize) -> Vec<Item> {
    (1..=n)
        .map(|i| Item {
            k3: Some(i as i64),
            ..item(&format!("id{i}"), &format!("v{i}"))
        })
        .collect()
}

fn memory_db() -> Arc<dyn CommonDB> {
    Arc::new(InMemoryDB::new())
}

fn item_dao(db: Arc<dyn CommonDB>) -> CommonDao<Item> {
    CommonDao::new(CommonDaoCfg::new(db, TABLE))
}

fn row_dao(db: Arc<dyn CommonDB>) -> CommonDao<Row> {
    CommonDao::new(CommonDaoCfg::new(db, TABLE))
}

/// Hides rows whose `k1` is "hidden", skips saving rows whose `k1` is
/// "skip", and swallows validation errors of ids starting with "lenient".
struct TestHooks;

impl CommonDaoHooks<Item, Item> for TestHooks {
    fn after_load(&self, dbm: Item) -> HookOutcome<Item> {
        if dbm.k1 == "hidden" {
            HookOutcome::Drop
        } else {
            HookOutcome::Keep(dbm)
        }
    }

    fn anonymize(&self, mut dbm: Item) -> Item {
        dbm.k1 = "anon".to_string();
        dbm
    }

    fn before_save(&self, dbm: Item) -> HookOutcome<Item> {
        if dbm.k1 == "skip" {
            HookOutcome::Drop
        } else {
            HookOutcome::Keep(dbm)
        }
    }

    fn on_validation_error(&self, err: ValidationError) -> Option<ValidationError> {
        let lenient = err
            .object_id
            .as_deref()
            .is_some_and(|id| id.starts_with("lenient"));
        (!lenient).then_some(err)
    }
}

fn no_bang_schema() -> Arc<dyn ValidationSchema<Item>> {
    Arc::new(FnSchema::new("no-bang", |item: Item| {
        if item.k1.contains('!') {
            let detail = ValidationErrorDetail::new("k1", "must not contain '!'")
                .with_value(json!(item.k1));
            Err(ValidationError::new(vec![detail]))
        } else {
            Ok(item)
        }
    }))
}

#[tokio::test]
async fn get_by_ids_omits_missing_rows() {
    let dao = row_dao(memory_db());
    let mut rows = vec![row(json!({"id": "a", "k": 1}))];
    dao.save_batch(&mut rows, &DaoSaveOptions::default()).await.unwrap();

    let found = dao
        .get_by_ids(&ids(&["a", "b"]), &DaoReadOptions::default())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["id"], json!("a"));
    assert_eq!(found[0]["k"], json!(1));
}

#[tokio::test]
async fn get_by_ids_keeps_request_order() {
    let dao = item_dao(memory_db());
    dao.save_batch(&mut items(5), &DaoSaveOptions::default()).await.unwrap();

    let found = dao
        .get_by_ids(&ids(&["id4", "id1", "nope", "id2"]), &DaoReadOptions::default())
        .await
        .unwrap();
    let found_ids: Vec<_> = found.iter().filter_map(|i| i.id.as_deref()).collect();
    assert_eq!(found_ids, vec!["id4", "id1", "id2"]);
}

#[tokio::test]
async fn empty_id_is_never_found() {
    let dao = item_dao(memory_db());
    assert!(dao.get_by_id("", &DaoReadOptions::default()).await.unwrap().is_none());
    assert_eq!(dao.delete_by_id("", &DaoDeleteOptions::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn require_by_id_fails_for_missing_row() {
    let dao = item_dao(memory_db());
    let err = dao
        .require_by_id("ghost", &DaoReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
    assert!(err.to_string().contains("required, but not found"));
}

#[tokio::test]
async fn patch_by_id_on_missing_row() {
    let dao = row_dao(memory_db());
    let patch = row(json!({"k": 2}));

    let err = dao
        .patch_by_id("x", patch.clone(), &DaoPatchOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("required, but not found"));

    let opt = DaoPatchOptions {
        create_if_missing: true,
        ..DaoPatchOptions::default()
    };
    let created = dao.patch_by_id("x", patch, &opt).await.unwrap();
    assert_eq!(created["id"], json!("x"));
    assert_eq!(created["k"], json!(2));
    assert!(created.contains_key("created"));
    assert!(created.contains_key("updated"));

    let stored = dao.require_by_id("x", &DaoReadOptions::default()).await.unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn patch_rebases_on_external_edit() {
    let db = memory_db();
    let dao = item_dao(db.clone());
    let mut bm = item("a", "mine");
    dao.save(&mut bm, &DaoSaveOptions::default()).await.unwrap();
    dao.save(&mut bm, &DaoSaveOptions::default()).await.unwrap();

    // someone else edits k1
    let mut external = dao.require_by_id("a", &DaoReadOptions::default()).await.unwrap();
    external.k1 = "theirs".to_string();
    dao.save(&mut external, &DaoSaveOptions::default()).await.unwrap();

    dao.patch(&mut bm, row(json!({"k3": 5})), &DaoPatchOptions::default())
        .await
        .unwrap();

    let stored = dao.require_by_id("a", &DaoReadOptions::default()).await.unwrap();
    assert_eq!(stored.k1, "theirs");
    assert_eq!(stored.k3, Some(5));
    assert_eq!(bm.k1, "theirs");
    assert_eq!(bm.k3, Some(5));
}

#[tokio::test]
async fn patch_drops_fields_removed_by_external_edit() {
    let db = memory_db();
    let dao = row_dao(db.clone());
    let mut bm = row(json!({"id": "a", "k1": 1, "extra": 1}));
    dao.save(&mut bm, &DaoSaveOptions::default()).await.unwrap();

    // someone else rewrites the row without `extra`
    let replaced = row(json!({"id": "a", "k1": 2}));
    db.save_batch(TABLE, vec![replaced], &SaveOptions::default())
        .await
        .unwrap();

    dao.patch(&mut bm, row(json!({"k3": 5})), &DaoPatchOptions::default())
        .await
        .unwrap();

    let stored = dao.require_by_id("a", &DaoReadOptions::default()).await.unwrap();
    assert!(stored.get("extra").is_none());
    assert_eq!(stored["k1"], json!(2));
    assert_eq!(stored["k3"], json!(5));
    assert!(bm.get("extra").is_none());
    assert_eq!(bm["k1"], json!(2));
}

#[tokio::test]
async fn patch_with_skip_db_read_uses_caller_model() {
    let dao = item_dao(memory_db());
    let mut bm = item("a", "mine");
    dao.save(&mut bm, &DaoSaveOptions::default()).await.unwrap();

    let mut stale = item("a", "stale");
    let opt = DaoPatchOptions {
        skip_db_read: true,
        ..DaoPatchOptions::default()
    };
    dao.patch(&mut stale, row(json!({"k3": 7})), &opt).await.unwrap();

    let stored = dao.require_by_id("a", &DaoReadOptions::default()).await.unwrap();
    assert_eq!(stored.k1, "stale");
    assert_eq!(stored.k3, Some(7));
}

#[tokio::test]
async fn noop_patch_does_not_write() {
    let counting = Arc::new(CountingDB::new(memory_db()));
    let dao = item_dao(counting.clone());
    let mut bm = item("a", "v");
    dao.save(&mut bm, &DaoSaveOptions::default()).await.unwrap();
    counting.reset();

    let unchanged = dao
        .patch_by_id("a", row(json!({"k1": "v"})), &DaoPatchOptions::default())
        .await
        .unwrap();
    assert_eq!(unchanged.k1, "v");
    assert_eq!(counting.calls("save_batch"), 0);

    dao.patch(&mut bm, Row::new(), &DaoPatchOptions::default()).await.unwrap();
    assert_eq!(counting.calls("save_batch"), 0);

    dao.patch_by_id("a", row(json!({"k1": "w"})), &DaoPatchOptions::default())
        .await
        .unwrap();
    assert_eq!(counting.calls("save_batch"), 1);
}

#[tokio::test]
async fn patch_by_id_in_transaction() {
    let db = memory_db();
    let dao = CommonDao::<Item>::new(CommonDaoCfg::new(db, TABLE).patch_in_transaction(true));
    dao.save(&mut item("a", "v"), &DaoSaveOptions::default()).await.unwrap();

    let patched = dao
        .patch_by_id("a", row(json!({"k3": 3})), &DaoPatchOptions::default())
        .await
        .unwrap();
    assert_eq!(patched.k3, Some(3));

    let stored = dao.require_by_id("a", &DaoReadOptions::default()).await.unwrap();
    assert_eq!(stored.k3, Some(3));
    assert_eq!(stored.k1, "v");
}

#[tokio::test]
async fn save_assigns_id_and_timestamps() {
    let dao = item_dao(memory_db());
    let mut bm = Item {
        k1: "v".to_string(),
        ..Item::default()
    };
    let saved = dao.save(&mut bm, &DaoSaveOptions::default()).await.unwrap();

    let id = bm.id.clone().unwrap();
    assert!(!id.is_empty());
    assert!(bm.created.is_some());
    assert_eq!(bm.created, bm.updated);
    assert_eq!(saved, bm);

    let created = bm.created;
    bm.updated = Some(1);
    let opt = DaoSaveOptions {
        preserve_updated: true,
        ..DaoSaveOptions::default()
    };
    dao.save(&mut bm, &opt).await.unwrap();
    assert_eq!(bm.updated, Some(1));
    assert_eq!(bm.created, created);
}

#[tokio::test]
async fn immutable_table_rejects_mutation() {
    let dao = CommonDao::<Item>::new(CommonDaoCfg::new(memory_db(), TABLE).immutable(true));
    dao.save(&mut item("a", "v"), &DaoSaveOptions::default()).await.unwrap();

    let err = dao
        .save(&mut item("a", "w"), &DaoSaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::AlreadyExists { .. }));

    let err = dao
        .delete_by_id("a", &DaoDeleteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ImmutableViolation { .. }));

    let err = dao
        .patch_by_id("a", row(json!({"k1": "w"})), &DaoPatchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ImmutableViolation { .. }));

    let opt = DaoSaveOptions {
        allow_mutability: true,
        ..DaoSaveOptions::default()
    };
    dao.save(&mut item("a", "w"), &opt).await.unwrap();
    let opt = DaoDeleteOptions {
        allow_mutability: true,
        ..DaoDeleteOptions::default()
    };
    assert_eq!(dao.delete_by_id("a", &opt).await.unwrap(), 1);
}

#[tokio::test]
async fn read_only_table_rejects_writes() {
    let dao = CommonDao::<Item>::new(CommonDaoCfg::new(memory_db(), TABLE).read_only(true));
    let err = dao
        .save(&mut item("a", "v"), &DaoSaveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidOperation { .. }));
    assert!(dao.get_all(&DaoReadOptions::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn validation_errors_are_redacted() {
    let cfg = CommonDaoCfg::<Item>::new(memory_db(), TABLE)
        .validation(no_bang_schema())
        .redacted_fields(["k1"]);
    let dao = CommonDao::new(cfg);

    let err = dao
        .save(&mut item("a", "secret!"), &DaoSaveOptions::default())
        .await
        .unwrap_err();
    let DbError::Validation(err) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(err.object_name.as_deref(), Some(TABLE));
    assert_eq!(err.object_id.as_deref(), Some("a"));
    assert!(!err.message.contains("secret!"));
    assert!(err.message.contains("REDACTED"));
    assert!(dao.get_by_id("a", &DaoReadOptions::default()).await.unwrap().is_none());
}

#[tokio::test]
async fn validation_error_hook_can_suppress() {
    let cfg = CommonDaoCfg::<Item>::new(memory_db(), TABLE)
        .validation(no_bang_schema())
        .hooks(Arc::new(TestHooks));
    let dao = CommonDao::new(cfg);

    dao.save(&mut item("lenient1", "ok!"), &DaoSaveOptions::default())
        .await
        .unwrap();
    assert!(dao
        .save(&mut item("strict1", "bad!"), &DaoSaveOptions::default())
        .await
        .is_err());

    let opt = DaoSaveOptions {
        skip_validation: true,
        ..DaoSaveOptions::default()
    };
    dao.save(&mut item("strict2", "bad!"), &opt).await.unwrap();

    // loaded rows are validated too
    let err = dao
        .get_by_id("strict2", &DaoReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
    let loaded = dao
        .get_by_id("strict2", &DaoReadOptions::unvalidated())
        .await
        .unwrap();
    assert_eq!(loaded.unwrap().k1, "bad!");
}

#[tokio::test]
async fn hooks_veto_loads_and_saves() {
    let db = memory_db();
    let cfg = CommonDaoCfg::new(db.clone(), TABLE).hooks(Arc::new(TestHooks));
    let dao = CommonDao::<Item>::new(cfg);

    let mut batch = vec![item("a", "visible"), item("b", "hidden"), item("c", "skip")];
    let saved = dao.save_batch(&mut batch, &DaoSaveOptions::default()).await.unwrap();
    assert_eq!(saved.len(), 3);

    let raw = db
        .get_by_ids(TABLE, &ids(&["a", "b", "c"]), &Default::default())
        .await
        .unwrap();
    assert_eq!(raw.len(), 2);

    let all = dao.get_all(&DaoReadOptions::default()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].k1, "visible");

    let dbms = dao
        .get_by_ids_as_dbm(&ids(&["a", "b"]), &DaoReadOptions::default())
        .await
        .unwrap();
    assert_eq!(dbms.len(), 1);

    let anonymized = dao
        .require_by_id(
            "a",
            &DaoReadOptions {
                anonymize: true,
                ..DaoReadOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(anonymized.k1, "anon");
}

#[tokio::test]
async fn create_and_get_by_id_or_empty() {
    let dao = item_dao(memory_db());
    let created = dao.create(row(json!({"k1": "new"})), false).unwrap();
    assert!(created.id.is_some());
    assert!(dao.get_all(&DaoReadOptions::default()).await.unwrap().is_empty());

    let empty = dao
        .get_by_id_or_empty("z", row(json!({"k1": "blank"})), &DaoReadOptions::default())
        .await
        .unwrap();
    assert_eq!(empty.id.as_deref(), Some("z"));
    assert_eq!(empty.k1, "blank");
}

#[tokio::test]
async fn queries_through_the_dao() {
    let dao = item_dao(memory_db());
    dao.save_batch(&mut items(10), &DaoSaveOptions::default()).await.unwrap();

    let found = dao
        .query()
        .filter("k3", DBQueryFilterOperator::Gt, json!(7))
        .order("k3", true)
        .run_query(&DaoReadOptions::default())
        .await
        .unwrap();
    let k3s: Vec<_> = found.iter().filter_map(|i| i.k3).collect();
    assert_eq!(k3s, vec![10, 9, 8]);

    let count = dao
        .query()
        .filter("k3", DBQueryFilterOperator::Lte, json!(4))
        .run_query_count(&DaoReadOptions::default())
        .await
        .unwrap();
    assert_eq!(count, 4);

    let q = DBQuery::create(TABLE).filter_in("k3", vec![json!(1), json!(2)]);
    let mut id_list = dao.query_ids(&q, &DaoReadOptions::default()).await.unwrap();
    id_list.sort();
    assert_eq!(id_list, ids(&["id1", "id2"]));

    let one = dao
        .get_one_by("k1", json!("v5"), &DaoReadOptions::default())
        .await
        .unwrap();
    assert_eq!(one.and_then(|i| i.id), Some("id5".to_string()));
}

#[tokio::test]
async fn patch_by_query_and_increment() {
    let dao = item_dao(memory_db());
    dao.save_batch(&mut items(6), &DaoSaveOptions::default()).await.unwrap();

    let matched = dao
        .query()
        .filter("k3", DBQueryFilterOperator::Gte, json!(4))
        .patch_by_query(&row(json!({"k1": "big"})), &DaoPatchOptions::default())
        .await
        .unwrap();
    assert_eq!(matched, 3);
    let big = dao
        .get_all_by("k1", json!("big"), &DaoReadOptions::default())
        .await
        .unwrap();
    assert_eq!(big.len(), 3);

    assert_eq!(dao.increment("k3", "id1", 10).await.unwrap(), 11);
    assert!(matches!(
        dao.increment("k3", "ghost", 1).await.unwrap_err(),
        DbError::NotFound { .. }
    ));
}

#[tokio::test]
async fn chunked_delete_by_query() {
    let counting = Arc::new(CountingDB::new(memory_db()));
    let dao = item_dao(counting.clone());
    dao.save_batch(&mut items(25), &DaoSaveOptions::default()).await.unwrap();

    let opt = DaoDeleteOptions {
        chunk_size: 10,
        chunk_concurrency: 2,
        ..DaoDeleteOptions::default()
    };
    let deleted = dao.delete_by_query(&DBQuery::create(TABLE), &opt).await.unwrap();
    assert_eq!(deleted, 25);
    assert_eq!(counting.calls("delete_by_ids"), 3);
    assert_eq!(counting.rows("delete_by_ids"), 25);
    assert_eq!(
        dao.run_query_count(&DBQuery::create(TABLE), &DaoReadOptions::default())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn stream_save_then_for_each() {
    let dao = item_dao(memory_db());
    let input = stream::iter(items(10).into_iter().map(Ok)).boxed();
    let opt = DaoStreamOptions {
        chunk_size: 4,
        ..DaoStreamOptions::default()
    };
    dao.stream_save(input, &opt, &DaoSaveOptions::default()).await.unwrap();
    assert_eq!(dao.get_all(&DaoReadOptions::default()).await.unwrap().len(), 10);

    let seen = AtomicUsize::new(0);
    let seen_ref = &seen;
    dao.stream_query_for_each(&DBQuery::create(TABLE), &opt, move |_, _| async move {
        seen_ref.fetch_add(1, Ordering::SeqCst);
        Ok::<_, DbError>(())
    })
    .await
    .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 10);

    let streamed: Vec<Item> = dao
        .stream_query(&DBQuery::create(TABLE), &DaoStreamOptions { limit: 3, ..opt })
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(streamed.len(), 3);
}

#[tokio::test]
async fn stream_for_each_aggregates_errors() {
    let dao = item_dao(memory_db());
    dao.save_batch(&mut items(10), &DaoSaveOptions::default()).await.unwrap();

    let opt = DaoStreamOptions {
        error_mode: ErrorMode::ThrowAggregated,
        ..DaoStreamOptions::default()
    };
    let err = dao
        .stream_query_ids_for_each(&DBQuery::create(TABLE), &opt, |id, _| async move {
            if id == "id3" || id == "id7" {
                Err(DbError::adapter(format!("bad {id}")))
            } else {
                Ok(())
            }
        })
        .await
        .unwrap_err();
    let DbError::Aggregate { errors } = err else {
        panic!("expected an aggregate, got {err:?}");
    };
    assert_eq!(errors.len(), 2);

    let opt = DaoStreamOptions {
        error_mode: ErrorMode::Suppress,
        ..DaoStreamOptions::default()
    };
    let report = dao
        .stream_query_as_dbm_for_each(&DBQuery::create(TABLE), &opt, |dbm, _| async move {
            match dbm.k3 {
                Some(1) => Err(DbError::adapter("bad")),
                _ => Ok(()),
            }
        })
        .await
        .unwrap();
    assert_eq!(report.suppressed, 1);
}

#[tokio::test]
async fn transaction_commits_and_rolls_back() {
    let dao = item_dao(memory_db());
    dao.save_batch(&mut items(3), &DaoSaveOptions::default()).await.unwrap();

    dao.run_in_transaction(&TransactionOptions::default(), |tx| {
        Box::pin(async move {
            tx.save(&mut item("new", "v"), &DaoSaveOptions::default()).await?;
            tx.delete_by_id("id1", &DaoDeleteOptions::default()).await?;
            Ok(())
        })
    })
    .await
    .unwrap();
    let present = dao
        .get_by_ids(&ids(&["new", "id1"]), &DaoReadOptions::default())
        .await
        .unwrap();
    assert_eq!(present.len(), 1);
    assert_eq!(present[0].id.as_deref(), Some("new"));

    let err = dao
        .run_in_transaction(&TransactionOptions::default(), |tx| {
            Box::pin(async move {
                tx.delete_by_id("id2", &DaoDeleteOptions::default()).await?;
                Err::<(), _>(DbError::adapter("abort"))
            })
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "adapter error: abort");
    assert!(dao.get_by_id("id2", &DaoReadOptions::default()).await.unwrap().is_some());
}

#[tokio::test]
async fn transaction_patch_reads_inside_the_transaction() {
    let dao = item_dao(memory_db());
    dao.save(&mut item("a", "v"), &DaoSaveOptions::default()).await.unwrap();

    let mut tx = dao.create_transaction(&TransactionOptions::default()).await.unwrap();
    let loaded = tx.get_by_id("a", &DaoReadOptions::default()).await.unwrap();
    assert_eq!(loaded.map(|i| i.k1), Some("v".to_string()));
    let patched = tx
        .patch_by_id("a", row(json!({"k1": "w"})), &DaoPatchOptions::default())
        .await
        .unwrap();
    assert_eq!(patched.k1, "w");

    // not visible before commit
    let outside = dao.require_by_id("a", &DaoReadOptions::default()).await.unwrap();
    assert_eq!(outside.k1, "v");

    tx.commit().await.unwrap();
    let outside = dao.require_by_id("a", &DaoReadOptions::default()).await.unwrap();
    assert_eq!(outside.k1, "w");
}
