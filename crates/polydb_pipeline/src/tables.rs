//! Per-table scheduling shared by the pipelines.

use crate::options::RowMapper;
use futures::{stream, Future, StreamExt};
use polydb_core::{DbError, DbResult, ErrorMode, Flow, NDJsonStats, Row, RowExt};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Statistics of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Per-table statistics of the tables that finished.
    pub tables: BTreeMap<String, NDJsonStats>,
    /// Sum over all tables.
    pub total: NDJsonStats,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (table, stats) in &self.tables {
            writeln!(f, "{table}: {stats}")?;
        }
        write!(f, "total ({} tables): {}", self.tables.len(), self.total)
    }
}

/// What one table produced: its stats and the row errors collected under
/// [`ErrorMode::ThrowAggregated`].
pub(crate) struct TableOutcome {
    pub(crate) stats: NDJsonStats,
    pub(crate) errors: Vec<DbError>,
}

/// Runs `job` for every table, up to `concurrency` tables at once.
///
/// A failing table never stops the others. Once all tables are done the
/// collected errors are resolved by `error_mode`.
pub(crate) async fn run_tables<F, Fut>(
    name: &str,
    tables: Vec<String>,
    concurrency: usize,
    error_mode: ErrorMode,
    job: F,
) -> DbResult<PipelineStats>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = DbResult<TableOutcome>>,
{
    info!(pipeline = name, tables = tables.len(), "started");
    let job = &job;
    let mut results = stream::iter(tables)
        .map(|table| async move {
            let res = job(table.clone()).await;
            (table, res)
        })
        .buffer_unordered(concurrency.max(1));

    let mut out = PipelineStats::default();
    let mut errors = Vec::new();
    while let Some((table, res)) = results.next().await {
        match res {
            Ok(outcome) => {
                info!(pipeline = name, table = %table, stats = %outcome.stats, "table finished");
                errors.extend(outcome.errors);
                out.tables.insert(table, outcome.stats);
            }
            Err(e) => {
                warn!(pipeline = name, table = %table, error = %e, "table failed");
                errors.push(e);
            }
        }
    }

    out.total = NDJsonStats::total(out.tables.values());
    info!(pipeline = name, total = %out.total, errors = errors.len(), "finished");
    error_mode.finish(errors)?;
    Ok(out)
}

/// Applies the optional `since_updated` filter and the table's mapper.
pub(crate) async fn map_row(
    mapper: Option<&RowMapper>,
    since_updated: Option<i64>,
    row: Row,
    index: u64,
) -> DbResult<Flow<Row>> {
    if let Some(since) = since_updated {
        if row.row_updated().map_or(true, |updated| updated < since) {
            return Ok(Flow::Skip);
        }
    }
    match mapper {
        Some(mapper) => mapper(row, index).await,
        None => Ok(Flow::Emit(row)),
    }
}
