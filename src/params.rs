use std::num::NonZeroUsize;
use std::time::Duration;

use crate::error::{Error, Result};

/// `tbl.val` is a signed `INT`, so the loop counter must fit in it.
pub const MAX_ROWS: u32 = i32::MAX as u32;

/// Time the orchestrator lets workers run before asking them to stop.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(20);

/// Workload shape shared by every worker of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchParams {
    /// Rows each worker inserts, excluding the warmup insert
    pub rows: u32,

    /// Queued rows per flush
    pub batch_size: NonZeroUsize,

    /// Number of concurrent workers, one connection each
    pub threads: NonZeroUsize,

    /// Workers are cancelled once this elapses. `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl BenchParams {
    pub fn new(rows: u32, batch_size: usize, threads: usize) -> Result<Self> {
        if rows > MAX_ROWS {
            return Err(Error::BadConfigError(format!(
                "number of rows must be at most {}, got {}",
                MAX_ROWS, rows
            )));
        }
        let batch_size = NonZeroUsize::new(batch_size).ok_or_else(|| {
            Error::BadConfigError("batch size must be greater than 0".to_string())
        })?;
        let threads = NonZeroUsize::new(threads).ok_or_else(|| {
            Error::BadConfigError("number of threads must be greater than 0".to_string())
        })?;
        Ok(Self {
            rows,
            batch_size,
            threads,
            deadline: Some(DEFAULT_DEADLINE),
        })
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Flush calls one worker makes for a full run: one per complete batch
    /// plus the final unconditional flush.
    pub fn expected_flushes(&self) -> u64 {
        u64::from(self.rows) / self.batch_size.get() as u64 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_batch_size() {
        let err = BenchParams::new(100, 0, 1).unwrap_err();
        assert!(matches!(err, Error::BadConfigError(msg) if msg.contains("batch size")));
    }

    #[test]
    fn rejects_zero_threads() {
        let err = BenchParams::new(100, 10, 0).unwrap_err();
        assert!(matches!(err, Error::BadConfigError(msg) if msg.contains("threads")));
    }

    #[test]
    fn rejects_rows_beyond_int_range() {
        assert!(BenchParams::new(MAX_ROWS, 1, 1).is_ok());
        assert!(BenchParams::new(MAX_ROWS + 1, 1, 1).is_err());
    }

    #[test]
    fn zero_rows_is_allowed() {
        let params = BenchParams::new(0, 10, 2).unwrap();
        assert_eq!(params.rows, 0);
        assert_eq!(params.expected_flushes(), 1);
    }

    #[test]
    fn default_deadline() {
        let params = BenchParams::new(10, 1, 1).unwrap();
        assert_eq!(params.deadline, Some(DEFAULT_DEADLINE));
        assert_eq!(params.with_deadline(None).deadline, None);
    }

    #[test]
    fn expected_flushes() {
        let cases = [(10, 3, 4), (9, 3, 4), (2, 3, 1), (1000, 100, 11), (1, 1, 2)];
        for (rows, batch, flushes) in cases {
            let params = BenchParams::new(rows, batch, 1).unwrap();
            assert_eq!(params.expected_flushes(), flushes, "rows={rows} batch={batch}");
        }
    }
}
