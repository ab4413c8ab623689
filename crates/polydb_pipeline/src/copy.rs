//! Store to store.

use crate::options::CopyOptions;
use crate::tables::{map_row, run_tables, PipelineStats, TableOutcome};
use polydb_core::{
    run_pipeline, DBQuery, DBQueryFilterOperator, DbResult, NDJsonStats, PipelineOptions,
    ReadOptions, Row, SaveOptions,
};
use serde_json::Value;
use std::time::Instant;

/// Streams every selected table of `opt.db_input` into `opt.db_output`
/// with chunked `save_batch` calls. Nothing touches disk.
///
/// # Errors
///
/// Follows `opt.error_mode` once every table has finished.
pub async fn db_pipeline_copy(opt: &CopyOptions) -> DbResult<PipelineStats> {
    let tables = match &opt.tables {
        Some(tables) => tables.clone(),
        None => opt.db_input.get_tables().await?,
    };
    run_tables("copy", tables, opt.concurrency, opt.error_mode, |table| {
        copy_table(opt, table)
    })
    .await
}

async fn copy_table(opt: &CopyOptions, table: String) -> DbResult<TableOutcome> {
    let started = Instant::now();
    let mut q = DBQuery::create(&table);
    if let Some(since) = opt.since_updated {
        q = q.filter("updated", DBQueryFilterOperator::Gte, Value::from(since));
    }
    let popt = PipelineOptions::named(format!("copy.{table}"))
        .concurrency(1)
        .chunk_size(opt.chunk_size)
        .limit(opt.limit)
        .error_mode(opt.error_mode);
    let mapper = opt.mapper_per_table.get(&table);
    let save_options = opt
        .save_options_per_table
        .get(&table)
        .cloned()
        .unwrap_or_else(SaveOptions::default);
    let (target, table_name, save_options) = (&opt.db_output, table.as_str(), &save_options);

    let mut report = run_pipeline(
        opt.db_input.stream_query(&q, &ReadOptions::default()),
        &popt,
        |row, index| map_row(mapper, None, row, index),
        |rows: Vec<Row>| target.save_batch(table_name, rows, save_options),
    )
    .await?;

    Ok(TableOutcome {
        stats: NDJsonStats::new(report.rows_out, started.elapsed()),
        errors: report.take_errors(),
    })
}
