use std::fmt;
use std::time::{Duration, Instant};

use mysql::prelude::Queryable;
use tracing::{debug, info};

use crate::batch::{BatchSink, BatchStats, Batcher, PreparedSink, RewriteSink};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::opts::ConnOpts;
use crate::params::BenchParams;
use crate::reset::{DATABASE, TABLE};

/// Result of one worker's timed insert loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub rows_requested: u32,
    pub rows_inserted: u64,
    pub batch_size: usize,
    pub flushes: u64,
    /// From just before the first queued row to just after the final flush
    pub elapsed: Duration,
    /// Stopped early by the orchestrator
    pub cancelled: bool,
}

impl WorkerReport {
    /// Rows per second rounded to the nearest integer.
    ///
    /// `None` when nothing was inserted or no time was measured.
    pub fn inserts_per_second(&self) -> Option<u64> {
        rate(self.rows_inserted, self.elapsed)
    }
}

pub(crate) fn rate(rows: u64, elapsed: Duration) -> Option<u64> {
    let secs = elapsed.as_secs_f64();
    if rows == 0 || secs <= 0.0 {
        return None;
    }
    Some((rows as f64 / secs).round() as u64)
}

impl fmt::Display for WorkerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Thread {} : Inserting {} rows w/ batch size {} : Result - ",
            self.worker, self.rows_requested, self.batch_size
        )?;
        match self.inserts_per_second() {
            Some(rate) => write!(f, "{} inserts per second", rate)?,
            None => write!(f, "n/a inserts per second")?,
        }
        if self.cancelled {
            write!(f, " (cancelled after {} rows)", self.rows_inserted)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimedRun {
    pub stats: BatchStats,
    pub elapsed: Duration,
    pub cancelled: bool,
}

/// Queues `1..=rows` into `batcher` and times it through the final flush.
///
/// `cancel` is checked before the first row and after every flush.
pub fn timed_inserts<S: BatchSink>(
    mut batcher: Batcher<S>,
    rows: u32,
    cancel: &CancelToken,
) -> Result<TimedRun> {
    let start = Instant::now();
    let mut cancelled = cancel.is_cancelled();
    if !cancelled {
        for value in 1..=rows {
            if batcher.push(value)? && cancel.is_cancelled() {
                cancelled = true;
                break;
            }
        }
    }
    let stats = batcher.finish()?;
    Ok(TimedRun {
        stats,
        elapsed: start.elapsed(),
        cancelled,
    })
}

pub fn warmup_sql() -> String {
    format!("INSERT INTO {TABLE} (id, val) VALUES (NULL, 1)")
}

/// Inserts `params.rows` rows on a dedicated connection.
///
/// The connection selects the benchmark database and performs one untimed
/// warmup insert before the timed loop starts.
#[tracing::instrument(skip_all, fields(worker = id))]
pub fn run_worker(
    id: usize,
    opts: &ConnOpts,
    params: &BenchParams,
    cancel: &CancelToken,
) -> Result<WorkerReport> {
    let mut conn = mysql::Conn::new(opts.to_mysql_opts())?;
    debug!(connection_id = conn.connection_id(), "connected");
    conn.query_drop(format!("USE {DATABASE}"))?;
    conn.query_drop(warmup_sql())?;

    info!("Inserting {} rows into table", params.rows);
    let run = if opts.rewrite_batched_statements {
        let sink = RewriteSink::prepare(&mut conn, params.batch_size)?;
        timed_inserts(Batcher::new(sink, params.batch_size), params.rows, cancel)?
    } else {
        let sink = PreparedSink::prepare(&mut conn)?;
        timed_inserts(Batcher::new(sink, params.batch_size), params.rows, cancel)?
    };

    let report = WorkerReport {
        worker: id,
        rows_requested: params.rows,
        rows_inserted: run.stats.rows,
        batch_size: params.batch_size.get(),
        flushes: run.stats.flushes,
        elapsed: run.elapsed,
        cancelled: run.cancelled,
    };
    info!(
        rows = report.rows_inserted,
        flushes = report.flushes,
        elapsed = ?report.elapsed,
        cancelled = report.cancelled,
        "finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use pretty_assertions::assert_eq;

    use super::*;

    fn report(rows_inserted: u64, elapsed: Duration) -> WorkerReport {
        WorkerReport {
            worker: 3,
            rows_requested: 1000,
            rows_inserted,
            batch_size: 100,
            flushes: 11,
            elapsed,
            cancelled: false,
        }
    }

    /// Cancels `token` once it has seen `after` flushes.
    struct CancellingSink {
        token: CancelToken,
        after: u64,
        flushes: u64,
    }

    impl BatchSink for CancellingSink {
        fn flush(&mut self, _values: &[u32]) -> Result<()> {
            self.flushes += 1;
            if self.flushes == self.after {
                self.token.cancel();
            }
            Ok(())
        }
    }

    struct NullSink;

    impl BatchSink for NullSink {
        fn flush(&mut self, _values: &[u32]) -> Result<()> {
            Ok(())
        }
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn rate_rounds_to_nearest() {
        assert_eq!(report(1000, Duration::from_secs(2)).inserts_per_second(), Some(500));
        assert_eq!(report(1000, Duration::from_secs(3)).inserts_per_second(), Some(333));
        assert_eq!(report(2, Duration::from_secs(3)).inserts_per_second(), Some(1));
    }

    #[test]
    fn rate_is_undefined_without_rows_or_time() {
        assert_eq!(report(0, Duration::from_secs(1)).inserts_per_second(), None);
        assert_eq!(report(10, Duration::ZERO).inserts_per_second(), None);
    }

    #[test]
    fn display_matches_result_line() {
        assert_eq!(
            report(1000, Duration::from_millis(500)).to_string(),
            "Thread 3 : Inserting 1000 rows w/ batch size 100 : Result - 2000 inserts per second"
        );
        assert_eq!(
            report(0, Duration::from_millis(500)).to_string(),
            "Thread 3 : Inserting 1000 rows w/ batch size 100 : Result - n/a inserts per second"
        );
    }

    #[test]
    fn display_marks_cancelled() {
        let mut report = report(300, Duration::from_secs(1));
        report.cancelled = true;
        assert!(report.to_string().ends_with("(cancelled after 300 rows)"));
    }

    #[test]
    fn timed_run_covers_all_rows() {
        let token = CancelToken::new();
        let run = timed_inserts(Batcher::new(NullSink, size(7)), 50, &token).unwrap();
        assert_eq!(run.stats, BatchStats { flushes: 8, rows: 50 });
        assert!(!run.cancelled);
    }

    #[test]
    fn cancel_stops_after_current_flush() {
        let token = CancelToken::new();
        let sink = CancellingSink {
            token: token.clone(),
            after: 2,
            flushes: 0,
        };
        let run = timed_inserts(Batcher::new(sink, size(10)), 1000, &token).unwrap();
        assert!(run.cancelled);
        // two full batches, then the empty final flush
        assert_eq!(run.stats, BatchStats { flushes: 3, rows: 20 });
    }

    #[test]
    fn cancelled_before_start_inserts_nothing() {
        let token = CancelToken::new();
        token.cancel();
        let run = timed_inserts(Batcher::new(NullSink, size(10)), 1000, &token).unwrap();
        assert!(run.cancelled);
        assert_eq!(run.stats, BatchStats { flushes: 1, rows: 0 });
    }

    #[test]
    fn warmup_targets_benchmark_table() {
        assert_eq!(warmup_sql(), "INSERT INTO tbl (id, val) VALUES (NULL, 1)");
    }
}
