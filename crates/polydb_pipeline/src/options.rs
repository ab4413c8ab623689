//! Options of the bulk pipelines.

use futures::future::BoxFuture;
use polydb_core::{CommonDB, DbResult, ErrorMode, Flow, Row, SaveOptions};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Transforms one row of a table. Receives the row and its zero-based
/// index in the table stream.
pub type RowMapper = Arc<dyn Fn(Row, u64) -> BoxFuture<'static, DbResult<Flow<Row>>> + Send + Sync>;

/// Wraps a synchronous function as a [`RowMapper`].
///
/// ```rust
/// use polydb_core::{DbError, Flow};
/// use polydb_pipeline::sync_mapper;
///
/// let drop_secrets = sync_mapper(|mut row, _| {
///     row.remove("secret");
///     Ok::<_, DbError>(Flow::Emit(row))
/// });
/// # let _ = drop_secrets;
/// ```
pub fn sync_mapper<F>(f: F) -> RowMapper
where
    F: Fn(Row, u64) -> DbResult<Flow<Row>> + Send + Sync + 'static,
{
    Arc::new(move |row, index| {
        let out = f(row, index);
        Box::pin(async move { out })
    })
}

const DEFAULT_CONCURRENCY: usize = 16;
const DEFAULT_CHUNK_SIZE: usize = 100;

/// Options of [`crate::db_pipeline_backup`].
#[derive(Clone)]
pub struct BackupOptions {
    /// Source store.
    pub db: Arc<dyn CommonDB>,
    /// Directory the table files are written to.
    pub output_dir: PathBuf,
    /// Tables to back up. `None` backs up every table the store reports.
    pub tables: Option<Vec<String>>,
    /// Tables processed at once.
    pub concurrency: usize,
    /// Rows per table (0 is unlimited).
    pub limit: u64,
    /// Only rows with `updated >= since_updated`.
    pub since_updated: Option<i64>,
    /// Write `.ndjson.gz` instead of `.ndjson`.
    pub gzip: bool,
    /// Fail a table whose output file already exists.
    pub protect_from_overwrite: bool,
    /// Write a `${table}.schema.json` sidecar from the store's schema.
    pub emit_schema_from_db: bool,
    /// Row mappers by table.
    pub mapper_per_table: HashMap<String, RowMapper>,
    /// Progress log interval by table.
    pub log_every_per_table: HashMap<String, u64>,
    /// Error policy.
    pub error_mode: ErrorMode,
}

impl BackupOptions {
    /// Backs up every table of `db` into `output_dir`, gzipped.
    #[must_use]
    pub fn new(db: Arc<dyn CommonDB>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            output_dir: output_dir.into(),
            tables: None,
            concurrency: DEFAULT_CONCURRENCY,
            limit: 0,
            since_updated: None,
            gzip: true,
            protect_from_overwrite: false,
            emit_schema_from_db: false,
            mapper_per_table: HashMap::new(),
            log_every_per_table: HashMap::new(),
            error_mode: ErrorMode::Suppress,
        }
    }

    /// Sets the tables.
    #[must_use]
    pub fn tables<S: Into<String>>(mut self, tables: impl IntoIterator<Item = S>) -> Self {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the table concurrency.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the row limit per table.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the incremental backup threshold.
    #[must_use]
    pub fn since_updated(mut self, ts: i64) -> Self {
        self.since_updated = Some(ts);
        self
    }

    /// Sets compression.
    #[must_use]
    pub fn gzip(mut self, value: bool) -> Self {
        self.gzip = value;
        self
    }

    /// Sets overwrite protection.
    #[must_use]
    pub fn protect_from_overwrite(mut self, value: bool) -> Self {
        self.protect_from_overwrite = value;
        self
    }

    /// Sets schema emission.
    #[must_use]
    pub fn emit_schema_from_db(mut self, value: bool) -> Self {
        self.emit_schema_from_db = value;
        self
    }

    /// Adds a mapper for `table`.
    #[must_use]
    pub fn mapper(mut self, table: impl Into<String>, mapper: RowMapper) -> Self {
        self.mapper_per_table.insert(table.into(), mapper);
        self
    }

    /// Sets the progress log interval for `table`.
    #[must_use]
    pub fn log_every(mut self, table: impl Into<String>, every: u64) -> Self {
        self.log_every_per_table.insert(table.into(), every);
        self
    }

    /// Sets the error policy.
    #[must_use]
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }
}

/// Options of [`crate::db_pipeline_restore`].
#[derive(Clone)]
pub struct RestoreOptions {
    /// Target store.
    pub db: Arc<dyn CommonDB>,
    /// Directory holding the table files.
    pub input_dir: PathBuf,
    /// Tables to restore. `None` restores every table file found.
    pub tables: Option<Vec<String>>,
    /// Tables processed at once.
    pub concurrency: usize,
    /// Rows per `save_batch`.
    pub chunk_size: usize,
    /// Rows per table (0 is unlimited).
    pub limit: u64,
    /// Only rows with `updated >= since_updated`.
    pub since_updated: Option<i64>,
    /// Row mappers by table.
    pub mapper_per_table: HashMap<String, RowMapper>,
    /// Save options by table.
    pub save_options_per_table: HashMap<String, SaveOptions>,
    /// Drop and recreate each table from its schema sidecar first.
    pub recreate_tables: bool,
    /// Error policy.
    pub error_mode: ErrorMode,
}

impl RestoreOptions {
    /// Restores every table file of `input_dir` into `db`.
    #[must_use]
    pub fn new(db: Arc<dyn CommonDB>, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            input_dir: input_dir.into(),
            tables: None,
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            limit: 0,
            since_updated: None,
            mapper_per_table: HashMap::new(),
            save_options_per_table: HashMap::new(),
            recreate_tables: false,
            error_mode: ErrorMode::Suppress,
        }
    }

    /// Sets the tables.
    #[must_use]
    pub fn tables<S: Into<String>>(mut self, tables: impl IntoIterator<Item = S>) -> Self {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the table concurrency.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the row limit per table.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the incremental restore threshold.
    #[must_use]
    pub fn since_updated(mut self, ts: i64) -> Self {
        self.since_updated = Some(ts);
        self
    }

    /// Adds a mapper for `table`.
    #[must_use]
    pub fn mapper(mut self, table: impl Into<String>, mapper: RowMapper) -> Self {
        self.mapper_per_table.insert(table.into(), mapper);
        self
    }

    /// Sets the save options for `table`.
    #[must_use]
    pub fn save_options(mut self, table: impl Into<String>, opt: SaveOptions) -> Self {
        self.save_options_per_table.insert(table.into(), opt);
        self
    }

    /// Sets table recreation.
    #[must_use]
    pub fn recreate_tables(mut self, value: bool) -> Self {
        self.recreate_tables = value;
        self
    }

    /// Sets the error policy.
    #[must_use]
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }
}

/// Options of [`crate::db_pipeline_copy`].
#[derive(Clone)]
pub struct CopyOptions {
    /// Source store.
    pub db_input: Arc<dyn CommonDB>,
    /// Target store.
    pub db_output: Arc<dyn CommonDB>,
    /// Tables to copy. `None` copies every table the source reports.
    pub tables: Option<Vec<String>>,
    /// Tables processed at once.
    pub concurrency: usize,
    /// Rows per `save_batch`.
    pub chunk_size: usize,
    /// Rows per table (0 is unlimited).
    pub limit: u64,
    /// Only rows with `updated >= since_updated`.
    pub since_updated: Option<i64>,
    /// Row mappers by table.
    pub mapper_per_table: HashMap<String, RowMapper>,
    /// Save options by table.
    pub save_options_per_table: HashMap<String, SaveOptions>,
    /// Error policy.
    pub error_mode: ErrorMode,
}

impl CopyOptions {
    /// Copies every table of `db_input` into `db_output`.
    #[must_use]
    pub fn new(db_input: Arc<dyn CommonDB>, db_output: Arc<dyn CommonDB>) -> Self {
        Self {
            db_input,
            db_output,
            tables: None,
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            limit: 0,
            since_updated: None,
            mapper_per_table: HashMap::new(),
            save_options_per_table: HashMap::new(),
            error_mode: ErrorMode::Suppress,
        }
    }

    /// Sets the tables.
    #[must_use]
    pub fn tables<S: Into<String>>(mut self, tables: impl IntoIterator<Item = S>) -> Self {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the table concurrency.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the row limit per table.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the incremental copy threshold.
    #[must_use]
    pub fn since_updated(mut self, ts: i64) -> Self {
        self.since_updated = Some(ts);
        self
    }

    /// Adds a mapper for `table`.
    #[must_use]
    pub fn mapper(mut self, table: impl Into<String>, mapper: RowMapper) -> Self {
        self.mapper_per_table.insert(table.into(), mapper);
        self
    }

    /// Sets the save options for `table`.
    #[must_use]
    pub fn save_options(mut self, table: impl Into<String>, opt: SaveOptions) -> Self {
        self.save_options_per_table.insert(table.into(), opt);
        self
    }

    /// Sets the error policy.
    #[must_use]
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }
}
