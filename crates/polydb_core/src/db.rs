//! The `CommonDB` contract.

use crate::error::{DbError, DbResult};
use crate::options::{
    CreateTableOptions, ReadOptions, RunQueryResult, SaveOptions, TransactionOptions,
};
use crate::row::Row;
use crate::schema::JsonSchemaObject;
use crate::support::CommonDBSupport;
use crate::transaction::DBTransaction;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{Future, FutureExt, StreamExt};
use polydb_query::DBQuery;
use std::collections::HashMap;
use tracing::debug;

/// A stream of rows produced by [`CommonDB::stream_query`].
pub type RowStream<'a> = BoxStream<'a, DbResult<Row>>;

/// The interface every store adapter implements.
///
/// Lookups never treat a missing row as an error: `get_by_ids` omits ids it
/// cannot find, and its result order is not guaranteed to follow `ids`.
///
/// Operations gated by a [`CommonDBSupport`] flag have default bodies that
/// fail with [`DbError::Unsupported`]. Callers check [`CommonDB::support`]
/// before invoking them.
#[async_trait]
pub trait CommonDB: Send + Sync {
    /// Adapter name used in logs and errors.
    fn name(&self) -> &str;

    /// Capability manifest.
    fn support(&self) -> &CommonDBSupport;

    /// Checks connectivity.
    async fn ping(&self) -> DbResult<()>;

    /// Lists the tables the store knows about.
    async fn get_tables(&self) -> DbResult<Vec<String>>;

    /// Returns the schema of `table`.
    async fn get_table_schema(&self, table: &str) -> DbResult<JsonSchemaObject>;

    /// Creates `table` from `schema`.
    async fn create_table(
        &self,
        table: &str,
        schema: &JsonSchemaObject,
        opt: &CreateTableOptions,
    ) -> DbResult<()> {
        let _ = (table, schema, opt);
        Err(DbError::unsupported(self.name(), "create_table"))
    }

    /// Reads rows by id. Missing ids are omitted.
    async fn get_by_ids(&self, table: &str, ids: &[String], opt: &ReadOptions)
        -> DbResult<Vec<Row>>;

    /// Runs a query.
    async fn run_query(&self, q: &DBQuery, opt: &ReadOptions) -> DbResult<RunQueryResult>;

    /// Counts rows matching the query filters.
    async fn run_query_count(&self, q: &DBQuery, opt: &ReadOptions) -> DbResult<u64>;

    /// Streams the rows of a query.
    ///
    /// The default runs [`CommonDB::run_query`] and yields its rows.
    fn stream_query<'a>(&'a self, q: &DBQuery, opt: &ReadOptions) -> RowStream<'a> {
        let q = q.clone();
        let opt = opt.clone();
        stream_from_future(async move { self.run_query(&q, &opt).await.map(|r| r.rows) })
    }

    /// Saves rows, upserting by id unless `opt.save_method` says otherwise.
    async fn save_batch(&self, table: &str, rows: Vec<Row>, opt: &SaveOptions) -> DbResult<()>;

    /// Deletes rows by id, returning how many existed.
    async fn delete_by_ids(&self, table: &str, ids: &[String]) -> DbResult<u64>;

    /// Deletes every row matching the query filters.
    async fn delete_by_query(&self, q: &DBQuery) -> DbResult<u64>;

    /// Shallow-merges `patch` into every row matching the query.
    async fn patch_by_query(&self, q: &DBQuery, patch: &Row) -> DbResult<u64> {
        let _ = (q, patch);
        Err(DbError::unsupported(self.name(), "patch_by_query"))
    }

    /// Adds a delta to the integer field `prop` of each id, returning the
    /// new values by id. A missing field counts as 0.
    async fn increment_batch(
        &self,
        table: &str,
        prop: &str,
        increments: &HashMap<String, i64>,
    ) -> DbResult<HashMap<String, i64>> {
        let _ = (table, prop, increments);
        Err(DbError::unsupported(self.name(), "increment_batch"))
    }

    /// Opens a transaction.
    async fn create_transaction(
        &self,
        opt: &TransactionOptions,
    ) -> DbResult<Box<dyn DBTransaction>> {
        let _ = opt;
        Err(DbError::unsupported(self.name(), "create_transaction"))
    }
}

/// Turns a future resolving to rows into a [`RowStream`].
///
/// An error from the future becomes the single item of the stream.
pub fn stream_from_future<'a, F>(fut: F) -> RowStream<'a>
where
    F: Future<Output = DbResult<Vec<Row>>> + Send + 'a,
{
    fut.map(|res| match res {
        Ok(rows) => stream::iter(rows.into_iter().map(Ok)).left_stream(),
        Err(e) => stream::once(futures::future::ready(Err(e))).right_stream(),
    })
    .flatten_stream()
    .boxed()
}

/// Runs `f` inside a transaction of `db`.
///
/// Commits when `f` succeeds; rolls back and returns the error when `f`
/// fails. A failing commit returns the commit error.
///
/// # Errors
///
/// Returns the error of `f`, of opening the transaction, or of the commit.
pub async fn run_in_transaction<T, F>(
    db: &dyn CommonDB,
    opt: &TransactionOptions,
    f: F,
) -> DbResult<T>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn DBTransaction) -> BoxFuture<'t, DbResult<T>> + Send,
{
    let mut tx = db.create_transaction(opt).await?;
    match f(tx.as_mut()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            debug!(db = db.name(), error = %e, "rolling back transaction");
            tx.rollback().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::row_from_value;
    use futures::TryStreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn stream_from_future_yields_rows() {
        let rows = vec![
            row_from_value(json!({"id": "a"})).unwrap(),
            row_from_value(json!({"id": "b"})).unwrap(),
        ];
        let out: Vec<Row> = stream_from_future(async move { Ok(rows) })
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn stream_from_future_yields_error() {
        let mut s = stream_from_future(async { Err(DbError::adapter("down")) });
        assert!(s.next().await.unwrap().is_err());
        assert!(s.next().await.is_none());
    }
}
