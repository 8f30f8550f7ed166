//! Log reader leases.
//!
//! A [`TransactionFileReader`] is a stateful cursor over the log. Readers are
//! expensive to open, so the [`ReaderPool`] keeps idle ones around and hands
//! them out as [`ReaderLease`]s that go back to the pool when dropped,
//! including on early `?` returns.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use evlog_error::{EvlogError, Result};
use evlog_types::LogRecord;
use parking_lot::Mutex;

/// A record returned by a sequential read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqReadResult {
    pub record: LogRecord,
    /// Position the record starts at.
    pub record_pre_position: i64,
    /// Position just past the record.
    pub record_post_position: i64,
}

/// Cursor over the transaction log.
pub trait TransactionFileReader: Send {
    /// Move the cursor to `position`.
    fn reposition(&mut self, position: i64) -> Result<()>;

    /// Read the record at the cursor and advance past it. `None` at the end
    /// of the readable log.
    fn try_read_next(&mut self) -> Result<Option<SeqReadResult>>;

    /// Read the record before the cursor and move the cursor onto it. `None`
    /// at the start of the log.
    fn try_read_prev(&mut self) -> Result<Option<SeqReadResult>>;

    /// Read the record starting exactly at `position`, leaving the cursor
    /// unchanged.
    fn try_read_at(&mut self, position: i64) -> Result<Option<LogRecord>>;
}

type ReaderFactory = Box<dyn Fn() -> Result<Box<dyn TransactionFileReader>> + Send + Sync>;

/// Pool of log readers.
pub struct ReaderPool {
    factory: ReaderFactory,
    idle: Mutex<Vec<Box<dyn TransactionFileReader>>>,
    max_idle: usize,
    created: AtomicU64,
    borrowed: AtomicU64,
}

impl ReaderPool {
    /// Create a pool that opens readers with `factory` and keeps at most
    /// `max_idle` of them between leases.
    pub fn new<F>(max_idle: usize, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TransactionFileReader>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            idle: Mutex::new(Vec::new()),
            max_idle,
            created: AtomicU64::new(0),
            borrowed: AtomicU64::new(0),
        }
    }

    /// Borrow a reader, opening a new one when none is idle.
    pub fn borrow_reader(&self) -> Result<ReaderLease<'_>> {
        let pooled = self.idle.lock().pop();
        let reader = match pooled {
            Some(reader) => reader,
            None => {
                let reader = (self.factory)()?;
                self.created.fetch_add(1, Ordering::Relaxed);
                reader
            }
        };
        self.borrowed.fetch_add(1, Ordering::Relaxed);
        Ok(ReaderLease {
            pool: self,
            reader: Some(reader),
        })
    }

    /// Readers opened by the factory so far.
    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Leases currently outstanding.
    #[must_use]
    pub fn outstanding_count(&self) -> u64 {
        self.borrowed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn give_back(&self, reader: Box<dyn TransactionFileReader>) {
        self.borrowed.fetch_sub(1, Ordering::Relaxed);
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(reader);
        }
    }
}

impl fmt::Debug for ReaderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderPool")
            .field("max_idle", &self.max_idle)
            .field("idle", &self.idle_count())
            .field("created", &self.created_count())
            .field("outstanding", &self.outstanding_count())
            .finish_non_exhaustive()
    }
}

/// A reader borrowed from a [`ReaderPool`].
pub struct ReaderLease<'a> {
    pool: &'a ReaderPool,
    reader: Option<Box<dyn TransactionFileReader>>,
}

impl ReaderLease<'_> {
    fn reader_mut(&mut self) -> Result<&mut Box<dyn TransactionFileReader>> {
        self.reader
            .as_mut()
            .ok_or_else(|| EvlogError::internal("reader lease already released"))
    }
}

impl TransactionFileReader for ReaderLease<'_> {
    fn reposition(&mut self, position: i64) -> Result<()> {
        self.reader_mut()?.reposition(position)
    }

    fn try_read_next(&mut self) -> Result<Option<SeqReadResult>> {
        self.reader_mut()?.try_read_next()
    }

    fn try_read_prev(&mut self) -> Result<Option<SeqReadResult>> {
        self.reader_mut()?.try_read_prev()
    }

    fn try_read_at(&mut self, position: i64) -> Result<Option<LogRecord>> {
        self.reader_mut()?.try_read_at(position)
    }
}

impl Drop for ReaderLease<'_> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.pool.give_back(reader);
        }
    }
}

impl fmt::Debug for ReaderLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderLease").finish_non_exhaustive()
    }
}
