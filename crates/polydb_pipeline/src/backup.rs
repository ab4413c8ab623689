//! Store to NDJSON files.

use crate::options::BackupOptions;
use crate::tables::{map_row, run_tables, PipelineStats, TableOutcome};
use futures::future;
use polydb_core::ndjson::{table_file_path, write_schema_file, NdjsonWriter};
use polydb_core::{
    run_pipeline, DBQuery, DBQueryFilterOperator, DbError, DbResult, PipelineOptions, ReadOptions,
    Row,
};
use serde_json::Value;
use tracing::debug;

/// Streams every selected table of `opt.db` into
/// `${output_dir}/${table}.ndjson[.gz]`.
///
/// Tables run concurrently up to `opt.concurrency`; rows of one table are
/// written in stream order. A table's failure does not stop the others.
///
/// # Errors
///
/// Follows `opt.error_mode` once every table has finished. Files already
/// written are kept.
pub async fn db_pipeline_backup(opt: &BackupOptions) -> DbResult<PipelineStats> {
    let tables = match &opt.tables {
        Some(tables) => tables.clone(),
        None => opt.db.get_tables().await?,
    };
    run_tables("backup", tables, opt.concurrency, opt.error_mode, |table| {
        backup_table(opt, table)
    })
    .await
}

async fn backup_table(opt: &BackupOptions, table: String) -> DbResult<TableOutcome> {
    let path = table_file_path(&opt.output_dir, &table, opt.gzip);
    if opt.protect_from_overwrite && path.exists() {
        return Err(DbError::invalid_operation(format!(
            "{} already exists",
            path.display()
        )));
    }

    if opt.emit_schema_from_db {
        let schema = opt.db.get_table_schema(&table).await?;
        let schema_path = write_schema_file(&opt.output_dir, &schema)?;
        debug!(table = %table, path = %schema_path.display(), "schema written");
    }

    let mut q = DBQuery::create(&table);
    if let Some(since) = opt.since_updated {
        q = q.filter("updated", DBQueryFilterOperator::Gte, Value::from(since));
    }
    let popt = PipelineOptions::named(format!("backup.{table}"))
        .concurrency(1)
        .limit(opt.limit)
        .log_every(opt.log_every_per_table.get(&table).copied().unwrap_or(0))
        .error_mode(opt.error_mode);
    let mapper = opt.mapper_per_table.get(&table);

    let mut writer = NdjsonWriter::create(&path)?;
    let res = run_pipeline(
        opt.db.stream_query(&q, &ReadOptions::default()),
        &popt,
        |row, index| map_row(mapper, None, row, index),
        |rows: Vec<Row>| future::ready(rows.iter().try_for_each(|row| writer.write_row(row))),
    )
    .await;
    // flush whatever was written, even on failure
    let stats = writer.finish()?;
    let mut report = res?;
    Ok(TableOutcome {
        stats,
        errors: report.take_errors(),
    })
}
