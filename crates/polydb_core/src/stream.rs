//! Bounded-concurrency stream pipeline driver.
//!
//! A pipeline reads items from a source stream, maps each one with up to
//! `concurrency` mapper futures in flight, groups the outputs into chunks
//! and hands every chunk to a sink, one chunk at a time. The sink is never
//! called concurrently, so a slow sink holds back the source.
//!
//! Output order across concurrently mapped items is not guaranteed.

use crate::error::{DbError, DbResult};
use crate::error_mode::ErrorMode;
use futures::stream::BoxStream;
use futures::{Future, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of mapping one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<T> {
    /// Pass the value on to the sink.
    Emit(T),
    /// Drop the item.
    Skip,
    /// Stop the pipeline. The source is closed and in-flight results are
    /// discarded.
    End,
}

/// Options of [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Name used in log lines.
    pub name: String,
    /// Maximum mapper futures in flight.
    pub concurrency: usize,
    /// Items per sink call.
    pub chunk_size: usize,
    /// Error propagation policy.
    pub error_mode: ErrorMode,
    /// Log progress every N items (0 disables).
    pub log_every: u64,
    /// Read at most N items from the source (0 is unlimited).
    pub limit: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            concurrency: 16,
            chunk_size: 100,
            error_mode: ErrorMode::default(),
            log_every: 0,
            limit: 0,
        }
    }
}

impl PipelineOptions {
    /// Creates default options with a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the mapper concurrency.
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

    /// Sets the error mode.
    #[must_use]
    pub fn error_mode(mut self, error_mode: ErrorMode) -> Self {
        self.error_mode = error_mode;
        self
    }

    /// Sets the progress log interval.
    #[must_use]
    pub fn log_every(mut self, log_every: u64) -> Self {
        self.log_every = log_every;
        self
    }

    /// Sets the input limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }
}

/// What a pipeline did.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Items read from the source, including failed ones.
    pub rows_in: u64,
    /// Items accepted by the sink.
    pub rows_out: u64,
    /// Errors collected under [`ErrorMode::ThrowAggregated`].
    pub errors: Vec<DbError>,
    /// Errors logged and dropped under [`ErrorMode::Suppress`].
    pub suppressed: u64,
    /// Whether a mapper returned [`Flow::End`].
    pub ended: bool,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Fails with [`DbError::Aggregate`] if errors were collected.
    ///
    /// # Errors
    ///
    /// Returns the aggregate of collected errors.
    pub fn into_result(mut self) -> DbResult<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(DbError::Aggregate {
                errors: self.take_errors(),
            })
        }
    }

    /// Takes the collected errors out of the report.
    pub fn take_errors(&mut self) -> Vec<DbError> {
        std::mem::take(&mut self.errors)
    }

    fn record(&mut self, error: DbError, opt: &PipelineOptions) -> DbResult<()> {
        match opt.error_mode {
            ErrorMode::ThrowImmediately => Err(error),
            ErrorMode::ThrowAggregated => {
                debug!(pipeline = %opt.name, error = %error, "collected error");
                self.errors.push(error);
                Ok(())
            }
            ErrorMode::Suppress => {
                warn!(pipeline = %opt.name, error = %error, "suppressed error");
                self.suppressed += 1;
                Ok(())
            }
        }
    }
}

/// Runs `input` through `mapper` into `sink`.
///
/// `mapper` receives each item with its zero-based index. Errors from the
/// source, the mapper or the sink are handled by `opt.error_mode`:
/// `ThrowImmediately` returns the first error, the other modes keep going
/// and report what happened in the returned [`PipelineReport`].
///
/// # Errors
///
/// Returns the first error under [`ErrorMode::ThrowImmediately`].
pub async fn run_pipeline<'a, I, O, M, Fut, S, SFut>(
    input: BoxStream<'a, DbResult<I>>,
    opt: &PipelineOptions,
    mapper: M,
    mut sink: S,
) -> DbResult<PipelineReport>
where
    I: Send + 'a,
    M: Fn(I, u64) -> Fut,
    Fut: Future<Output = DbResult<Flow<O>>>,
    S: FnMut(Vec<O>) -> SFut,
    SFut: Future<Output = DbResult<()>>,
{
    let started = Instant::now();
    let chunk_size = opt.chunk_size.max(1);
    let mut report = PipelineReport::default();

    let input = if opt.limit > 0 {
        input.take(opt.limit as usize).boxed()
    } else {
        input
    };

    let mapper = &mapper;
    let mut mapped = input
        .enumerate()
        .map(|(index, item)| async move {
            match item {
                Ok(value) => mapper(value, index as u64).await,
                Err(e) => Err(e),
            }
        })
        .buffer_unordered(opt.concurrency.max(1));

    let mut chunk = Vec::with_capacity(chunk_size);
    while let Some(result) = mapped.next().await {
        report.rows_in += 1;
        if opt.log_every > 0 && report.rows_in % opt.log_every == 0 {
            info!(
                pipeline = %opt.name,
                rows_in = report.rows_in,
                rows_out = report.rows_out,
                "progress"
            );
        }

        match result {
            Ok(Flow::Emit(value)) => {
                chunk.push(value);
                if chunk.len() >= chunk_size {
                    let batch = std::mem::replace(&mut chunk, Vec::with_capacity(chunk_size));
                    let n = batch.len() as u64;
                    match sink(batch).await {
                        Ok(()) => report.rows_out += n,
                        Err(e) => report.record(e, opt)?,
                    }
                }
            }
            Ok(Flow::Skip) => {}
            Ok(Flow::End) => {
                report.ended = true;
                break;
            }
            Err(e) => report.record(e, opt)?,
        }
    }
    drop(mapped);

    if !chunk.is_empty() {
        let n = chunk.len() as u64;
        match sink(chunk).await {
            Ok(()) => report.rows_out += n,
            Err(e) => report.record(e, opt)?,
        }
    }

    report.elapsed = started.elapsed();
    debug!(
        pipeline = %opt.name,
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        errors = report.errors.len(),
        suppressed = report.suppressed,
        ended = report.ended,
        "pipeline finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn numbers(n: u64) -> BoxStream<'static, DbResult<u64>> {
        stream::iter((0..n).map(Ok)).boxed()
    }

    async fn collect(
        input: BoxStream<'static, DbResult<u64>>,
        opt: PipelineOptions,
        fail_on: Option<u64>,
        end_on: Option<u64>,
    ) -> (DbResult<PipelineReport>, Vec<u64>, usize) {
        let mut out = Vec::new();
        let mut calls = 0usize;
        let report = run_pipeline(
            input,
            &opt,
            |v, _| async move {
                if Some(v) == fail_on {
                    Err(DbError::adapter(format!("bad {v}")))
                } else if Some(v) == end_on {
                    Ok(Flow::End)
                } else if v % 10 == 9 {
                    Ok(Flow::Skip)
                } else {
                    Ok(Flow::Emit(v))
                }
            },
            |batch| {
                calls += 1;
                out.extend(batch);
                async { Ok(()) }
            },
        )
        .await;
        out.sort_unstable();
        (report, out, calls)
    }

    #[tokio::test]
    async fn chunks_and_skips() {
        let opt = PipelineOptions::named("t").chunk_size(4);
        let (report, out, calls) = collect(numbers(10), opt, None, None).await;
        let report = report.unwrap();

        assert_eq!(out, (0..9).collect::<Vec<_>>());
        assert_eq!(calls, 3);
        assert_eq!(report.rows_in, 10);
        assert_eq!(report.rows_out, 9);
        assert!(!report.ended);
    }

    #[tokio::test]
    async fn throw_immediately_returns_first_error() {
        let opt = PipelineOptions::named("t").concurrency(1);
        let (report, _, _) = collect(numbers(10), opt, Some(3), None).await;
        assert_eq!(report.unwrap_err().to_string(), "adapter error: bad 3");
    }

    #[tokio::test]
    async fn throw_aggregated_continues() {
        let opt = PipelineOptions::named("t").error_mode(ErrorMode::ThrowAggregated);
        let (report, out, _) = collect(numbers(10), opt, Some(3), None).await;
        let report = report.unwrap();

        assert_eq!(out.len(), 8);
        assert_eq!(report.errors.len(), 1);
        let err = report.into_result().unwrap_err();
        assert_eq!(err.error_count(), 1);
    }

    #[tokio::test]
    async fn suppress_counts_errors() {
        let opt = PipelineOptions::named("t").error_mode(ErrorMode::Suppress);
        let (report, out, _) = collect(numbers(10), opt, Some(3), None).await;
        let report = report.unwrap();

        assert_eq!(out.len(), 8);
        assert_eq!(report.suppressed, 1);
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn end_stops_reading() {
        let opt = PipelineOptions::named("t").concurrency(1);
        let (report, out, _) = collect(numbers(1000), opt, None, Some(5)).await;
        let report = report.unwrap();

        assert!(report.ended);
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
        assert_eq!(report.rows_in, 6);
    }

    #[tokio::test]
    async fn limit_caps_input() {
        let opt = PipelineOptions::named("t").limit(5);
        let (report, out, _) = collect(numbers(100), opt, None, None).await;
        assert_eq!(report.unwrap().rows_in, 5);
        assert_eq!(out.len(), 5);
    }

    #[tokio::test]
    async fn source_errors_follow_error_mode() {
        let input = stream::iter(vec![Ok(1), Err(DbError::adapter("read")), Ok(2)]).boxed();
        let opt = PipelineOptions::named("t").error_mode(ErrorMode::ThrowAggregated);
        let (report, out, _) = collect(input, opt, None, None).await;
        assert_eq!(out, vec![1, 2]);
        assert_eq!(report.unwrap().errors.len(), 1);
    }
}
