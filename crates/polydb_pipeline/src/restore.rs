//! NDJSON files to store.

use crate::options::RestoreOptions;
use crate::tables::{map_row, run_tables, PipelineStats, TableOutcome};
use futures::{stream, StreamExt};
use polydb_core::ndjson::{find_table_file, list_tables, read_schema_file, NdjsonReader};
use polydb_core::{
    run_pipeline, CreateTableOptions, DbError, DbResult, NDJsonStats, PipelineOptions, Row,
    SaveOptions,
};
use std::time::Instant;
use tracing::{info, warn};

/// Loads `${input_dir}/${table}.ndjson[.gz]` files into `opt.db` with
/// chunked `save_batch` calls.
///
/// Without `opt.tables`, every table file in `input_dir` is restored. With
/// `recreate_tables`, each table is dropped and recreated from its
/// `${table}.schema.json` sidecar before rows are loaded.
///
/// # Errors
///
/// Follows `opt.error_mode` once every table has finished. Chunks already
/// saved stay saved.
pub async fn db_pipeline_restore(opt: &RestoreOptions) -> DbResult<PipelineStats> {
    let tables = match &opt.tables {
        Some(tables) => tables.clone(),
        None => list_tables(&opt.input_dir)?,
    };
    run_tables("restore", tables, opt.concurrency, opt.error_mode, |table| {
        restore_table(opt, table)
    })
    .await
}

async fn restore_table(opt: &RestoreOptions, table: String) -> DbResult<TableOutcome> {
    let started = Instant::now();
    let path = find_table_file(&opt.input_dir, &table).ok_or_else(|| {
        DbError::invalid_operation(format!(
            "no file for table {table} in {}",
            opt.input_dir.display()
        ))
    })?;

    if opt.recreate_tables {
        if opt.db.support().create_table {
            let schema = read_schema_file(&opt.input_dir, &table)?;
            let create = CreateTableOptions {
                drop_if_exists: true,
            };
            opt.db.create_table(&table, &schema, &create).await?;
            info!(table = %table, "table recreated");
        } else {
            let adapter = opt.db.name();
            warn!(table = %table, adapter, "adapter cannot recreate tables, restoring into it");
        }
    }

    let popt = PipelineOptions::named(format!("restore.{table}"))
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
    let (db, table_name, save_options) = (&opt.db, table.as_str(), &save_options);

    let mut report = run_pipeline(
        stream::iter(NdjsonReader::open(&path)?).boxed(),
        &popt,
        |row, index| map_row(mapper, opt.since_updated, row, index),
        |rows: Vec<Row>| db.save_batch(table_name, rows, save_options),
    )
    .await?;

    Ok(TableOutcome {
        stats: NDJsonStats::new(report.rows_out, started.elapsed()),
        errors: report.take_errors(),
    })
}
