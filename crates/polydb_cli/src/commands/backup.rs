//! Backup and restore commands.
//!
//! Both run the bulk pipelines between the store directory and a backup
//! directory of `${table}.ndjson[.gz]` files.

use super::open_store;
use polydb_core::ErrorMode;
use polydb_pipeline::{
    db_pipeline_backup, db_pipeline_restore, BackupOptions, PipelineStats, RestoreOptions,
};
use std::path::{Path, PathBuf};
use tracing::info;

/// Arguments of `backup`.
#[derive(Debug, Clone)]
pub struct BackupArgs {
    /// Backup directory.
    pub output: PathBuf,
    /// Tables to back up, all if `None`.
    pub tables: Option<Vec<String>>,
    /// Incremental threshold.
    pub since_updated: Option<i64>,
    /// Gzip output files.
    pub gzip: bool,
    /// Tables processed at once.
    pub concurrency: usize,
    /// Write schema sidecars.
    pub emit_schema: bool,
    /// Refuse to overwrite files.
    pub protect: bool,
    /// Error mode.
    pub error_mode: ErrorMode,
}

/// Arguments of `restore`.
#[derive(Debug, Clone)]
pub struct RestoreArgs {
    /// Backup directory.
    pub input: PathBuf,
    /// Tables to restore, all files found if `None`.
    pub tables: Option<Vec<String>>,
    /// Drop and recreate tables from schema sidecars.
    pub recreate_tables: bool,
    /// Rows per save.
    pub chunk_size: usize,
    /// Error mode.
    pub error_mode: ErrorMode,
}

/// Backs up the store at `db_path`.
pub async fn create(db_path: &Path, args: BackupArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!("Backing up {:?} to {:?}", db_path, args.output);

    let mut opt = BackupOptions::new(open_store(db_path), &args.output)
        .gzip(args.gzip)
        .concurrency(args.concurrency)
        .emit_schema_from_db(args.emit_schema)
        .protect_from_overwrite(args.protect)
        .error_mode(args.error_mode);
    if let Some(tables) = args.tables {
        opt = opt.tables(tables);
    }
    if let Some(since) = args.since_updated {
        opt = opt.since_updated(since);
    }

    let stats = db_pipeline_backup(&opt).await?;
    print_stats("Backup created", &args.output, &stats);
    Ok(())
}

/// Restores a backup into the store at `db_path`.
pub async fn restore(db_path: &Path, args: RestoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.input.is_dir() {
        return Err(format!("No backup found at {:?}", args.input).into());
    }
    info!("Restoring {:?} into {:?}", args.input, db_path);

    let mut opt = RestoreOptions::new(open_store(db_path), &args.input)
        .chunk_size(args.chunk_size)
        .recreate_tables(args.recreate_tables)
        .error_mode(args.error_mode);
    if let Some(tables) = args.tables {
        opt = opt.tables(tables);
    }

    let stats = db_pipeline_restore(&opt).await?;
    print_stats("Backup restored", db_path, &stats);
    Ok(())
}

pub(super) fn print_stats(title: &str, path: &Path, stats: &PipelineStats) {
    println!("✓ {title}");
    println!("  Path: {:?}", path);
    println!("  Tables: {}", stats.tables.len());
    for (table, table_stats) in &stats.tables {
        println!("    {table}: {table_stats}");
    }
    println!("  Total: {}", stats.total);
}
