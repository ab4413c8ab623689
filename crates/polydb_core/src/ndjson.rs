//! Newline-delimited JSON table files.
//!
//! One file per table, `${table}.ndjson` or `${table}.ndjson.gz`, one JSON
//! row per line. An optional sibling `${table}.schema.json` carries the
//! table schema.
//!
//! Compression is decided by the file extension: paths ending in `.gz` are
//! gzip streams.

use crate::error::{DbError, DbResult};
use crate::row::Row;
use crate::schema::{schema_id_for, JsonSchemaObject};
use crate::stats::NDJsonStats;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

const NDJSON_EXT: &str = ".ndjson";
const NDJSON_GZ_EXT: &str = ".ndjson.gz";

/// File name of a table file.
#[must_use]
pub fn table_file_name(table: &str, gzip: bool) -> String {
    if gzip {
        format!("{table}{NDJSON_GZ_EXT}")
    } else {
        format!("{table}{NDJSON_EXT}")
    }
}

/// Path of a table file inside `dir`.
#[must_use]
pub fn table_file_path(dir: &Path, table: &str, gzip: bool) -> PathBuf {
    dir.join(table_file_name(table, gzip))
}

/// Path of a table schema sidecar inside `dir`.
#[must_use]
pub fn schema_file_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(schema_id_for(table))
}

/// Parses a table file name into the table name and whether it is gzipped.
#[must_use]
pub fn table_from_file_name(file_name: &str) -> Option<(String, bool)> {
    if let Some(table) = file_name.strip_suffix(NDJSON_GZ_EXT) {
        return (!table.is_empty()).then(|| (table.to_string(), true));
    }
    file_name
        .strip_suffix(NDJSON_EXT)
        .filter(|t| !t.is_empty())
        .map(|t| (t.to_string(), false))
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Lists the tables with a file in `dir`, sorted by name.
///
/// A missing directory has no tables.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_tables(dir: &Path) -> DbResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut tables = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some((table, _)) = entry.file_name().to_str().and_then(table_from_file_name) {
            tables.push(table);
        }
    }
    tables.sort();
    tables.dedup();
    Ok(tables)
}

/// Finds the file of `table` in `dir`, preferring the uncompressed one.
#[must_use]
pub fn find_table_file(dir: &Path, table: &str) -> Option<PathBuf> {
    [false, true]
        .into_iter()
        .map(|gzip| table_file_path(dir, table, gzip))
        .find(|p| p.is_file())
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Plain(w) => w,
            Self::Gzip(w) => w,
        }
    }
}

/// Streaming writer of one table file.
pub struct NdjsonWriter {
    path: PathBuf,
    sink: Sink,
    rows: u64,
    size_bytes: u64,
    started: Instant,
}

impl NdjsonWriter {
    /// Creates (or truncates) the file at `path`, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(path)?);
        let sink = if is_gzip(path) {
            Sink::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            Sink::Plain(file)
        };
        Ok(Self {
            path: path.to_path_buf(),
            sink,
            rows: 0,
            size_bytes: 0,
            started: Instant::now(),
        })
    }

    /// Path being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Appends one row.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write_row(&mut self, row: &Row) -> DbResult<()> {
        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');
        self.sink.writer().write_all(&line)?;
        self.rows += 1;
        self.size_bytes += line.len() as u64;
        Ok(())
    }

    /// Flushes and closes the file.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(self) -> DbResult<NDJsonStats> {
        let size_bytes_zipped = match self.sink {
            Sink::Plain(mut w) => {
                w.flush()?;
                None
            }
            Sink::Gzip(w) => {
                let mut inner = w.finish()?;
                inner.flush()?;
                Some(fs::metadata(&self.path)?.len())
            }
        };
        Ok(NDJsonStats {
            rows: self.rows,
            size_bytes: self.size_bytes,
            size_bytes_zipped,
            elapsed: self.started.elapsed(),
        })
    }
}

/// Line-by-line reader of one table file. Blank lines are skipped.
pub struct NdjsonReader {
    path: PathBuf,
    lines: Lines<Box<dyn BufRead + Send>>,
    line_no: usize,
}

impl NdjsonReader {
    /// Opens the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader: Box<dyn BufRead + Send> = if is_gzip(path) {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(Self {
            path: path.to_path_buf(),
            lines: reader.lines(),
            line_no: 0,
        })
    }
}

impl Iterator for NdjsonReader {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(serde_json::from_str::<Row>(trimmed).map_err(|e| {
                DbError::invalid_format(format!(
                    "{}:{}: {e}",
                    self.path.display(),
                    self.line_no
                ))
            }));
        }
    }
}

/// Reads every row of the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line is not a JSON
/// object.
pub fn read_ndjson_file(path: impl AsRef<Path>) -> DbResult<Vec<Row>> {
    NdjsonReader::open(path)?.collect()
}

/// Writes `rows` to the file at `path`, replacing it.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_ndjson_file<'a>(
    path: impl AsRef<Path>,
    rows: impl IntoIterator<Item = &'a Row>,
) -> DbResult<NDJsonStats> {
    let mut writer = NdjsonWriter::create(path)?;
    for row in rows {
        writer.write_row(row)?;
    }
    writer.finish()
}

/// Writes `schema` as `${table}.schema.json` into `dir`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_schema_file(dir: &Path, schema: &JsonSchemaObject) -> DbResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(&schema.id);
    fs::write(&path, serde_json::to_vec_pretty(schema)?)?;
    Ok(path)
}

/// Reads the schema sidecar of `table` from `dir`, checking its `$id`.
///
/// # Errors
///
/// Returns an error if the file is missing, malformed, or its `$id` does
/// not match.
pub fn read_schema_file(dir: &Path, table: &str) -> DbResult<JsonSchemaObject> {
    let bytes = fs::read(schema_file_path(dir, table))?;
    let schema: JsonSchemaObject = serde_json::from_slice(&bytes)?;
    schema.check_id(table)?;
    Ok(schema)
}
