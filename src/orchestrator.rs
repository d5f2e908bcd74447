use std::fmt;
use std::num::NonZeroUsize;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::opts::ConnOpts;
use crate::params::BenchParams;
use crate::reset::reset_environment;
use crate::worker::{WorkerReport, rate, run_worker};

#[derive(Debug)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub result: Result<WorkerReport>,
}

#[derive(Debug)]
pub struct RunSummary {
    /// One entry per worker, ordered by worker id
    pub outcomes: Vec<WorkerOutcome>,
    /// Wall clock time from the first spawn to the last join
    pub elapsed: Duration,
    /// The deadline expired and workers were asked to stop
    pub deadline_hit: bool,
}

impl RunSummary {
    pub fn reports(&self) -> impl Iterator<Item = &WorkerReport> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn total_rows(&self) -> u64 {
        self.reports().map(|r| r.rows_inserted).sum()
    }

    /// Aggregate rows per second over the whole run
    pub fn total_rate(&self) -> Option<u64> {
        rate(self.total_rows(), self.elapsed)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(report) => writeln!(f, "{}", report)?,
                Err(e) => writeln!(f, "Thread {} : Failed - {}", outcome.worker, e)?,
            }
        }
        write!(
            f,
            "Total : {} rows from {} threads ({} failed) in {:.3}s : Result - ",
            self.total_rows(),
            self.outcomes.len(),
            self.failures(),
            self.elapsed.as_secs_f64()
        )?;
        match self.total_rate() {
            Some(rate) => write!(f, "{} inserts per second", rate),
            None => write!(f, "n/a inserts per second"),
        }
    }
}

/// Resets the schema, then runs one worker per requested thread.
pub fn run(opts: &ConnOpts, params: &BenchParams) -> Result<RunSummary> {
    reset_environment(opts)?;
    info!(
        rewrite = opts.rewrite_batched_statements,
        deadline = ?params.deadline,
        "Executing {} threads",
        params.threads
    );
    let cancel = CancelToken::new();
    Ok(run_workers(
        params.threads,
        params.deadline,
        &cancel,
        |id, cancel| run_worker(id, opts, params, cancel),
    ))
}

/// Spawns `threads` scoped workers and joins all of them.
///
/// When `deadline` elapses first, `cancel` is triggered and the call still
/// waits for every worker to observe it. A worker that fails or panics is
/// recorded in its outcome; the others keep running.
pub fn run_workers<F>(
    threads: NonZeroUsize,
    deadline: Option<Duration>,
    cancel: &CancelToken,
    work: F,
) -> RunSummary
where
    F: Fn(usize, &CancelToken) -> Result<WorkerReport> + Sync,
{
    let threads = threads.get();
    let outcomes = ArrayQueue::new(threads);
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let start = Instant::now();

    let deadline_hit = thread::scope(|s| {
        let watchdog = deadline.map(|deadline| s.spawn(move || watch(&done_rx, deadline, cancel)));

        let work = &work;
        let outcomes = &outcomes;
        let mut handles = Vec::with_capacity(threads);
        for id in 0..threads {
            let spawned = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn_scoped(s, move || {
                    let result = work(id, cancel);
                    if let Err(e) = &result {
                        error!(worker = id, error = %e, "worker stopped");
                    }
                    // capacity is one slot per worker
                    let _ = outcomes.push(WorkerOutcome { worker: id, result });
                });
            match spawned {
                Ok(handle) => handles.push((id, handle)),
                Err(e) => {
                    error!(worker = id, error = %e, "failed to spawn worker");
                    let _ = outcomes.push(WorkerOutcome {
                        worker: id,
                        result: Err(Error::IoError(e)),
                    });
                }
            }
        }

        for (id, handle) in handles {
            if handle.join().is_err() {
                error!(worker = id, "worker panicked");
                let _ = outcomes.push(WorkerOutcome {
                    worker: id,
                    result: Err(Error::WorkerPanicked(id)),
                });
            }
        }

        drop(done_tx);
        watchdog.is_some_and(|w| w.join().unwrap_or(false))
    });

    let mut outcomes: Vec<_> = std::iter::from_fn(|| outcomes.pop()).collect();
    outcomes.sort_by_key(|o| o.worker);

    RunSummary {
        outcomes,
        elapsed: start.elapsed(),
        deadline_hit,
    }
}

/// Waits until every worker is joined or `deadline` passes. Returns `true`
/// if it had to cancel.
fn watch(done: &mpsc::Receiver<()>, deadline: Duration, cancel: &CancelToken) -> bool {
    match done.recv_timeout(deadline) {
        Err(RecvTimeoutError::Timeout) => {
            warn!(?deadline, "deadline reached, cancelling workers");
            cancel.cancel();
            true
        }
        Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod orchestrator_test;
