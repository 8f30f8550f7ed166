//! Ordered collection of chunks forming one logical log.
//!
//! Slot `n` of the table holds the chunk covering chunk number `n`; a merged
//! or scavenged chunk occupies every slot of its `[start, end]` range. All
//! structural changes (add, switch, replace) happen under the table's write
//! lock.
//!
//! Memory caching runs on a dedicated worker thread. Requests bump a pending
//! counter and wake the worker; it collapses all pending requests into one
//! pass and loops until none are left, so bursts of requests never queue more
//! than one extra pass.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use evlog_error::{EvlogError, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{Span, debug, error, info, info_span, warn};

use crate::chunk::Chunk;
use crate::config::{ChunkDbConfig, full_chunk_footprint};
use crate::format::ChunkHeader;
use crate::metrics::{ChunkManagerMetrics, ChunkManagerMetricsSnapshot};

/// Upper bound on chunk numbers.
pub const MAX_CHUNKS_COUNT: usize = 100_000;

#[derive(Debug, Default)]
struct ChunkTable {
    chunks: Vec<Option<Arc<Chunk>>>,
    count: usize,
}

impl ChunkTable {
    fn slot(&self, number: usize) -> Option<&Arc<Chunk>> {
        self.chunks.get(number).and_then(Option::as_ref)
    }

    fn ensure_len(&mut self, len: usize) {
        if self.chunks.len() < len {
            self.chunks.resize(len, None);
        }
    }

    /// Distinct chunks in `[0, count)`, oldest first.
    fn distinct(&self) -> Vec<Arc<Chunk>> {
        let mut out = Vec::new();
        let mut number = 0;
        while number < self.count {
            let Some(chunk) = self.slot(number) else {
                break;
            };
            out.push(Arc::clone(chunk));
            number = (chunk.header().end_number() + 1).max(number + 1);
        }
        out
    }
}

#[derive(Debug, Default)]
struct CachingSignal {
    pending: u64,
    running: bool,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared {
    config: ChunkDbConfig,
    table: RwLock<ChunkTable>,
    caching_enabled: AtomicBool,
    signal: Mutex<CachingSignal>,
    signal_changed: Condvar,
    metrics: ChunkManagerMetrics,
    span: Span,
}

/// Owner of every chunk of the database.
#[derive(Debug)]
pub struct ChunkManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChunkManager {
    /// Create a manager logging under a `chunk_manager` span.
    pub fn new(config: ChunkDbConfig) -> Result<Self> {
        let span = info_span!("chunk_manager", path = %config.path().display());
        Self::with_span(config, span)
    }

    /// Create a manager whose operations and caching worker run inside `span`.
    pub fn with_span(config: ChunkDbConfig, span: Span) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(config.path())?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                table: RwLock::new(ChunkTable::default()),
                caching_enabled: AtomicBool::new(false),
                signal: Mutex::new(CachingSignal::default()),
                signal_changed: Condvar::new(),
                metrics: ChunkManagerMetrics::default(),
                span,
            }),
            worker: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ChunkDbConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn chunks_count(&self) -> usize {
        self.shared.table.read().count
    }

    #[must_use]
    pub fn is_caching_enabled(&self) -> bool {
        self.shared.caching_enabled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn metrics(&self) -> ChunkManagerMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Turn on the memory caching policy and start the caching worker.
    ///
    /// A zero cache budget leaves caching disabled.
    pub fn enable_caching(&self) -> Result<()> {
        let _entered = self.shared.span.enter();
        let table = self.shared.table.write();
        if table.count == 0 {
            return Err(EvlogError::InvalidArgument(
                "no chunks in database".to_owned(),
            ));
        }

        let enabled = self.shared.config.max_chunks_cache_size() > 0;
        if enabled {
            self.ensure_worker()?;
        }
        self.shared.caching_enabled.store(enabled, Ordering::Release);
        info!(
            enabled,
            budget = self.shared.config.max_chunks_cache_size(),
            "chunk caching configured"
        );

        if let Some(last) = table.slot(table.count - 1) {
            self.shared.try_cache_chunk(last);
        }
        Ok(())
    }

    fn ensure_worker(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("evlog-chunk-cacher".to_owned())
            .spawn(move || shared.run_caching_worker())?;
        *worker = Some(handle);
        self.shared.metrics.record_worker_started();
        Ok(())
    }

    /// Create a chunk file for a scavenge or replication result. The chunk is
    /// not registered until it is switched in.
    pub fn create_temp_chunk(&self, header: ChunkHeader, file_size: u64) -> Result<Arc<Chunk>> {
        let path = self.shared.config.file_naming_strategy().temp_filename();
        Chunk::create_with_header(&path, header, file_size)
    }

    /// Create and register the next ongoing chunk.
    pub fn add_new_chunk(&self) -> Result<Arc<Chunk>> {
        let _entered = self.shared.span.enter();
        let mut table = self.shared.table.write();
        let number = table.count;
        if number >= MAX_CHUNKS_COUNT {
            return Err(EvlogError::out_of_range("chunk number", number));
        }
        let chunk_number = u32::try_from(number)
            .map_err(|_| EvlogError::out_of_range("chunk number", number))?;

        let path = self
            .shared
            .config
            .file_naming_strategy()
            .filename_for(number, 0);
        let chunk = Chunk::create_new(
            &path,
            self.shared.config.chunk_size(),
            chunk_number,
            chunk_number,
            false,
        )?;
        self.shared.add_chunk_locked(&mut table, &chunk)?;
        Ok(chunk)
    }

    /// Create and register an ongoing chunk with an explicit header, as
    /// received from a replication source.
    pub fn add_new_chunk_with_header(
        &self,
        header: ChunkHeader,
        file_size: u64,
    ) -> Result<Arc<Chunk>> {
        let _entered = self.shared.span.enter();
        if file_size == 0 {
            return Err(EvlogError::InvalidArgument(
                "chunk file size must be positive".to_owned(),
            ));
        }
        let mut table = self.shared.table.write();
        Shared::check_next_range(&table, &header)?;

        let path = self
            .shared
            .config
            .file_naming_strategy()
            .filename_for(header.start_number(), 0);
        let chunk = Chunk::create_with_header(&path, header, file_size)?;
        self.shared.add_chunk_locked(&mut table, &chunk)?;
        Ok(chunk)
    }

    /// Register an existing chunk at the end of the table.
    pub fn add_chunk(&self, chunk: &Arc<Chunk>) -> Result<()> {
        let _entered = self.shared.span.enter();
        let mut table = self.shared.table.write();
        self.shared.add_chunk_locked(&mut table, chunk)
    }

    /// Replace the chunks covered by `chunk`'s range with a completed chunk.
    ///
    /// `chunk` is disposed and, once its readers are gone (bounded by the
    /// configured switch wait), its file is renamed to the next free version
    /// of its start number and reopened. Every chunk it replaces is marked
    /// for deletion. With `replace_greater_numbers`, chunks numbered above
    /// its range are dropped and the count is cut to its end.
    pub fn switch_chunk(
        &self,
        chunk: &Arc<Chunk>,
        verify_hash: bool,
        replace_greater_numbers: bool,
    ) -> Result<Arc<Chunk>> {
        let _entered = self.shared.span.enter();
        if !chunk.is_read_only() {
            return Err(EvlogError::ChunkNotCompleted {
                path: chunk.path().to_path_buf(),
            });
        }

        let header = *chunk.header();
        let start = header.start_number();
        let end = header.end_number();
        let old_path = chunk.path().to_path_buf();
        Self::check_switch_range(&self.shared.table.read(), start, end)?;
        info!(
            chunk_start = start,
            chunk_end = end,
            path = %old_path.display(),
            "switching chunk"
        );

        chunk.dispose();
        let waited = self.shared.config.switch_wait_timeout();
        if !chunk.wait_for_destroy(waited) {
            error!(
                chunk_start = start,
                chunk_end = end,
                path = %old_path.display(),
                waited_ms = waited.as_millis() as u64,
                "chunk being switched is still used by readers"
            );
            return Err(EvlogError::ChunkSwitchTimeout {
                start,
                end,
                path: old_path,
                waited,
            });
        }

        let new_path = self
            .shared
            .config
            .file_naming_strategy()
            .determine_best_version_filename_for(start)?;
        info!(
            from = %old_path.display(),
            to = %new_path.display(),
            "moving chunk file"
        );
        fs::rename(&old_path, &new_path)?;
        let new_chunk = Chunk::from_completed_file(&new_path, verify_hash)?;

        let mut table = self.shared.table.write();
        let new_end = new_chunk.header().end_number();
        Shared::replace_chunks_with(&mut table, start, end, Some(&new_chunk), "old");

        if replace_greater_numbers {
            let old_count = table.count;
            table.count = new_end + 1;
            if old_count > end + 1 {
                Shared::replace_chunks_with(&mut table, end + 1, old_count - 1, None, "excessive");
            }
            if table.slot(table.count).is_some() {
                error!(
                    chunk_number = table.count,
                    "excessive chunk found after raw replication switch"
                );
                return Err(EvlogError::corrupt(format!(
                    "excessive chunk #{} found after raw replication switch",
                    table.count
                )));
            }
        }

        self.shared.metrics.record_switched();
        self.shared.try_cache_chunk(&new_chunk);
        Ok(new_chunk)
    }

    /// A replacement must cover whole registered chunks: it starts where a
    /// chunk starts and ends where a chunk ends or past the last one.
    fn check_switch_range(table: &ChunkTable, start: usize, end: usize) -> Result<()> {
        let mismatch = || EvlogError::ChunkRangeMismatch {
            start,
            end,
            chunks_count: table.count,
        };
        if start > table.count {
            return Err(mismatch());
        }
        if start < table.count
            && table
                .slot(start)
                .is_none_or(|chunk| chunk.header().start_number() != start)
        {
            return Err(mismatch());
        }
        if end < table.count
            && table
                .slot(end)
                .is_none_or(|chunk| chunk.header().end_number() != end)
        {
            return Err(mismatch());
        }
        Ok(())
    }

    /// Chunk containing `log_position`.
    pub fn get_chunk_for(&self, log_position: i64) -> Result<Arc<Chunk>> {
        let position = u64::try_from(log_position)
            .map_err(|_| EvlogError::out_of_range("log position", log_position))?;
        let number = position / u64::from(self.shared.config.chunk_size());
        let number = usize::try_from(number)
            .map_err(|_| EvlogError::out_of_range("log position", log_position))?;
        self.get_chunk(number)
            .map_err(|err| match err {
                EvlogError::OutOfRange { .. } => {
                    EvlogError::out_of_range("log position", log_position)
                }
                other => other,
            })
    }

    /// Chunk covering chunk number `chunk_number`.
    pub fn get_chunk(&self, chunk_number: usize) -> Result<Arc<Chunk>> {
        let table = self.shared.table.read();
        if chunk_number >= table.count {
            return Err(EvlogError::out_of_range("chunk number", chunk_number));
        }
        table.slot(chunk_number).cloned().ok_or_else(|| {
            EvlogError::corrupt(format!(
                "requested chunk #{chunk_number}, which is not present in the chunk table"
            ))
        })
    }

    /// Registered chunk backed by the file at `path`, if any.
    #[must_use]
    pub fn chunk_for_path(&self, path: &Path) -> Option<Arc<Chunk>> {
        let table = self.shared.table.read();
        table
            .chunks
            .iter()
            .flatten()
            .find(|chunk| chunk.path() == path)
            .cloned()
    }

    /// Block until no caching pass is pending or running.
    ///
    /// Returns `false` on timeout.
    pub fn wait_for_caching_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signal = self.shared.signal.lock();
        while signal.pending > 0 || signal.running {
            if self
                .shared
                .signal_changed
                .wait_until(&mut signal, deadline)
                .timed_out()
            {
                return signal.pending == 0 && !signal.running;
            }
        }
        true
    }

    /// Stop the caching worker and dispose every chunk.
    pub fn dispose(&self) {
        let _entered = self.shared.span.enter();
        self.stop_worker();
        let table = self.shared.table.read();
        for chunk in table.distinct() {
            chunk.dispose();
        }
        debug!(chunks = table.count, "chunk manager disposed");
    }

    fn stop_worker(&self) {
        {
            let mut signal = self.shared.signal.lock();
            signal.shutdown = true;
            self.shared.signal_changed.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!("chunk caching worker panicked");
            }
        }
    }
}

impl Drop for ChunkManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Shared {
    fn check_next_range(table: &ChunkTable, header: &ChunkHeader) -> Result<()> {
        if header.start_number() != table.count {
            return Err(EvlogError::ChunkRangeMismatch {
                start: header.start_number(),
                end: header.end_number(),
                chunks_count: table.count,
            });
        }
        if header.end_number() >= MAX_CHUNKS_COUNT {
            return Err(EvlogError::out_of_range("chunk number", header.end_number()));
        }
        Ok(())
    }

    fn add_chunk_locked(&self, table: &mut ChunkTable, chunk: &Arc<Chunk>) -> Result<()> {
        let header = *chunk.header();
        Self::check_next_range(table, &header)?;

        let start = header.start_number();
        let end = header.end_number();
        table.ensure_len(end + 1);
        for slot in &mut table.chunks[start..=end] {
            *slot = Some(Arc::clone(chunk));
        }
        table.count = end + 1;

        self.metrics.record_added();
        info!(
            chunk_start = start,
            chunk_end = end,
            path = %chunk.path().display(),
            "added chunk"
        );
        self.try_cache_chunk(chunk);
        Ok(())
    }

    /// Point every slot in `[start, end]` (and the full range of every chunk
    /// found there) at `replacement`, marking the displaced chunks for
    /// deletion.
    fn replace_chunks_with(
        table: &mut ChunkTable,
        start: usize,
        end: usize,
        replacement: Option<&Arc<Chunk>>,
        explanation: &str,
    ) {
        table.ensure_len(end + 1);
        let mut number = start;
        while number <= end {
            let old = std::mem::replace(&mut table.chunks[number], replacement.cloned());
            let Some(old) = old else {
                number += 1;
                continue;
            };

            let old_start = old.header().start_number();
            let old_end = old.header().end_number();
            table.ensure_len(old_end + 1);
            for slot in &mut table.chunks[old_start + 1..=old_end] {
                if slot.as_ref().is_some_and(|chunk| Arc::ptr_eq(chunk, &old)) {
                    *slot = replacement.cloned();
                }
            }

            old.mark_for_deletion();
            info!(
                chunk_start = old_start,
                chunk_end = old_end,
                path = %old.path().display(),
                "{explanation} chunk is marked for deletion"
            );
            number = (old_end + 1).max(number + 1);
        }
    }

    fn try_cache_chunk(&self, chunk: &Arc<Chunk>) {
        if !self.caching_enabled.load(Ordering::Acquire) {
            return;
        }

        {
            let mut signal = self.signal.lock();
            signal.pending += 1;
            self.signal_changed.notify_all();
        }
        self.metrics.record_caching_request();

        let budget = self.config.max_chunks_cache_size();
        if !chunk.is_read_only() && full_chunk_footprint(chunk.header().chunk_size) <= budget {
            match chunk.cache_in_memory() {
                Ok(true) => self.metrics.record_cached(),
                Ok(false) => {}
                Err(err) => warn!(
                    path = %chunk.path().display(),
                    error = %err,
                    "failed to cache ongoing chunk"
                ),
            }
        }
    }

    fn run_caching_worker(&self) {
        let _entered = self.span.enter();
        debug!("chunk caching worker started");
        loop {
            {
                let mut signal = self.signal.lock();
                while signal.pending == 0 && !signal.shutdown {
                    self.signal_changed.wait(&mut signal);
                }
                if signal.shutdown {
                    signal.running = false;
                    self.signal_changed.notify_all();
                    break;
                }
                signal.pending = 0;
                signal.running = true;
            }

            self.cache_uncache_read_only_chunks();

            let mut signal = self.signal.lock();
            signal.running = false;
            self.signal_changed.notify_all();
        }
        debug!("chunk caching worker stopped");
    }

    /// One caching pass: keep the newest chunks that fit the budget in
    /// memory and drop the rest.
    fn cache_uncache_read_only_chunks(&self) {
        let budget = self.config.max_chunks_cache_size();
        let (boundary, chunks) = {
            let table = self.table.read();
            let mut total: u64 = 0;
            let mut boundary = table.count;
            let mut number = table.count;
            while number > 0 {
                let Some(chunk) = table.slot(number - 1) else {
                    break;
                };
                let footprint = chunk.cache_footprint();
                if total + footprint > budget {
                    break;
                }
                total += footprint;
                boundary = chunk.header().start_number().min(number - 1);
                number = boundary;
            }
            (boundary, table.distinct())
        };

        for chunk in chunks {
            if !chunk.is_read_only() {
                continue;
            }
            if chunk.header().start_number() >= boundary {
                match chunk.cache_in_memory() {
                    Ok(true) => self.metrics.record_cached(),
                    Ok(false) => {}
                    Err(err) => warn!(
                        path = %chunk.path().display(),
                        error = %err,
                        "failed to cache chunk"
                    ),
                }
            } else if chunk.uncache_from_memory() {
                self.metrics.record_uncached();
            }
        }

        self.metrics.record_caching_pass();
        debug!(boundary, budget, "caching pass finished");
    }
}
