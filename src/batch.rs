use std::num::NonZeroUsize;

use mysql::prelude::Queryable;
use mysql::{Params, Statement, Value};

use crate::error::{Error, Result};
use crate::reset::TABLE;

/// The binary protocol counts placeholders in a u16.
pub const MAX_PLACEHOLDERS: usize = u16::MAX as usize;

const MAX_PREALLOC: usize = 4096;

/// Destination for a batch of queued `val` values
pub trait BatchSink {
    /// Submits every queued value. The final flush of a run may pass an
    /// empty slice.
    fn flush(&mut self, values: &[u32]) -> Result<()>;
}

impl<S: BatchSink + ?Sized> BatchSink for &mut S {
    fn flush(&mut self, values: &[u32]) -> Result<()> {
        (**self).flush(values)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Number of flush calls, including the final one
    pub flushes: u64,
    /// Rows handed to the sink
    pub rows: u64,
}

/// Queues values and hands them to a [`BatchSink`] every `batch_size` rows.
pub struct Batcher<S> {
    sink: S,
    batch_size: usize,
    pending: Vec<u32>,
    stats: BatchStats,
}

impl<S: BatchSink> Batcher<S> {
    pub fn new(sink: S, batch_size: NonZeroUsize) -> Self {
        let batch_size = batch_size.get();
        Self {
            sink,
            batch_size,
            pending: Vec::with_capacity(batch_size.min(MAX_PREALLOC)),
            stats: BatchStats::default(),
        }
    }

    /// Queues `value` and flushes if the batch is now full.
    ///
    /// Returns `true` when this call flushed.
    pub fn push(&mut self, value: u32) -> Result<bool> {
        self.pending.push(value);
        if self.pending.len() < self.batch_size {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Flushes whatever is pending, even nothing, and returns the totals.
    pub fn finish(mut self) -> Result<BatchStats> {
        self.flush()?;
        Ok(self.stats)
    }

    fn flush(&mut self) -> Result<()> {
        self.sink.flush(&self.pending)?;
        self.stats.flushes += 1;
        self.stats.rows += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }
}

pub fn single_row_insert_sql() -> String {
    format!("INSERT INTO {TABLE} (val) VALUES (?)")
}

/// `INSERT INTO tbl (val) VALUES (?),(?),...` with one group per row.
pub fn multi_row_insert_sql(rows: usize) -> String {
    let prefix = format!("INSERT INTO {TABLE} (val) VALUES ");
    let mut sql = String::with_capacity(prefix.len() + rows * 4);
    sql.push_str(&prefix);
    for i in 0..rows {
        if i > 0 {
            sql.push(',');
        }
        sql.push_str("(?)");
    }
    sql
}

/// Rejects batch sizes a single rewritten INSERT cannot bind.
pub fn check_rewrite_batch_size(batch_size: NonZeroUsize) -> Result<()> {
    if batch_size.get() > MAX_PLACEHOLDERS {
        return Err(Error::BadConfigError(format!(
            "batch size {} exceeds the {} placeholders a rewritten statement can hold",
            batch_size, MAX_PLACEHOLDERS
        )));
    }
    Ok(())
}

/// Which statement a rewritten flush of `rows` values goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPlan {
    /// Nothing queued, no round trip
    Skip,
    /// The statement prepared up front for a whole batch
    Full,
    /// A one-off statement with this many placeholder groups, closed after use
    Partial(usize),
}

impl FlushPlan {
    pub fn for_batch(rows: usize, batch_size: usize) -> Self {
        match rows {
            0 => Self::Skip,
            rows if rows == batch_size => Self::Full,
            rows => Self::Partial(rows),
        }
    }
}

/// Executes the single-row statement once per queued value.
pub struct PreparedSink<'c, C: Queryable> {
    conn: &'c mut C,
    stmt: Statement,
}

impl<'c, C: Queryable> PreparedSink<'c, C> {
    pub fn prepare(conn: &'c mut C) -> Result<Self> {
        let stmt = conn.prep(single_row_insert_sql())?;
        Ok(Self { conn, stmt })
    }
}

impl<C: Queryable> BatchSink for PreparedSink<'_, C> {
    fn flush(&mut self, values: &[u32]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.conn.exec_batch(&self.stmt, values.iter().map(|&v| (v,)))?;
        Ok(())
    }
}

/// Sends each batch as one multi-row INSERT.
///
/// Full batches reuse a statement prepared up front. The trailing partial
/// batch gets a statement of its own, closed right after use.
pub struct RewriteSink<'c, C: Queryable> {
    conn: &'c mut C,
    full: Statement,
    batch_size: usize,
}

impl<'c, C: Queryable> RewriteSink<'c, C> {
    pub fn prepare(conn: &'c mut C, batch_size: NonZeroUsize) -> Result<Self> {
        check_rewrite_batch_size(batch_size)?;
        let batch_size = batch_size.get();
        let full = conn.prep(multi_row_insert_sql(batch_size))?;
        Ok(Self {
            conn,
            full,
            batch_size,
        })
    }
}

impl<C: Queryable> BatchSink for RewriteSink<'_, C> {
    fn flush(&mut self, values: &[u32]) -> Result<()> {
        let params = || Params::Positional(values.iter().map(|&v| Value::from(v)).collect());
        match FlushPlan::for_batch(values.len(), self.batch_size) {
            FlushPlan::Skip => {}
            FlushPlan::Full => self.conn.exec_drop(&self.full, params())?,
            FlushPlan::Partial(rows) => {
                let stmt = self.conn.prep(multi_row_insert_sql(rows))?;
                self.conn.exec_drop(&stmt, params())?;
                self.conn.close(stmt)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
