//! Commit validation and the pre-flush caches behind it.
//!
//! The durable index lags the log: a transaction is pre-committed here as
//! soon as its commit record is written, and only flushed into the index
//! later. Until then the writer answers from three caches:
//!
//! - stream versions, pinned once per pending commit on the stream;
//! - raw stream metadata, pinned the same way and holding nothing else;
//! - committed-event dedup entries, bounded by estimated bytes.
//!
//! Pins are released by draining the not-processed queues once the durable
//! index checkpoint passes the commit's log position.

use std::collections::VecDeque;
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use evlog_cache::{BoundedCache, StickyLruCache};
use evlog_error::{EvlogError, Result};
use evlog_types::{
    CommitCheckResult, CommitDecision, CommitLogRecord, EventId, EventNumber, ExpectedVersion,
    LogRecord, PrepareFlags, PrepareLogRecord, StreamMetadata, TransactionInfo, is_metastream,
    metastream_of, original_stream_of, rewrite_truncate_before,
};
use tracing::{Span, debug, error, info_span, trace, warn};

use crate::config::IndexWriterConfig;
use crate::durable::IndexReader;
use crate::metrics::IndexWriterMetrics;
use crate::reader::{ReaderPool, TransactionFileReader};

/// Callback invoked with every fatal error before it is returned.
pub type FatalHook = Arc<dyn Fn(&EvlogError) + Send + Sync>;

#[derive(Debug, Clone)]
struct CommittedEvent {
    stream_id: String,
    event_number: i64,
}

impl CommittedEvent {
    /// Event id, event number and the stream id `String` with its bytes.
    fn estimated_size(&self) -> usize {
        16 + 8 + 3 * size_of::<usize>() + self.stream_id.len()
    }
}

#[derive(Debug)]
struct PendingTransaction {
    transaction_position: i64,
    log_position: i64,
}

#[derive(Debug)]
struct PendingCommit {
    stream_id: String,
    log_position: i64,
}

/// Validates commits and tracks not-yet-indexed writes.
///
/// Single writer: every operation takes `&mut self`. Counters are shared
/// through [`IndexWriter::metrics`].
pub struct IndexWriter<R: IndexReader> {
    backend: Arc<ReaderPool>,
    index: Arc<R>,

    transaction_infos: StickyLruCache<i64, TransactionInfo>,
    pending_transactions: VecDeque<PendingTransaction>,

    committed_events: BoundedCache<EventId, CommittedEvent>,
    stream_versions: StickyLruCache<String, i64>,
    stream_raw_metas: StickyLruCache<String, Vec<u8>>,
    pending_commits: VecDeque<PendingCommit>,

    metrics: Arc<IndexWriterMetrics>,
    fatal_hook: FatalHook,
    span: Span,
}

impl<R: IndexReader> IndexWriter<R> {
    pub fn new(config: IndexWriterConfig, backend: Arc<ReaderPool>, index: Arc<R>) -> Result<Self> {
        Self::with_span(config, backend, index, info_span!("index_writer"))
    }

    /// Like [`IndexWriter::new`], logging under `span`.
    pub fn with_span(
        config: IndexWriterConfig,
        backend: Arc<ReaderPool>,
        index: Arc<R>,
        span: Span,
    ) -> Result<Self> {
        config.validate()?;
        let committed_events = BoundedCache::new(
            config.committed_events_max_count,
            config.committed_events_mem_limit,
            CommittedEvent::estimated_size,
        )?;
        Ok(Self {
            backend,
            index,
            transaction_infos: StickyLruCache::new(config.transaction_info_cache_capacity),
            pending_transactions: VecDeque::new(),
            committed_events,
            stream_versions: StickyLruCache::new(config.stream_info_cache_capacity),
            stream_raw_metas: StickyLruCache::new(0),
            pending_commits: VecDeque::new(),
            metrics: Arc::new(IndexWriterMetrics::new()),
            fatal_hook: Arc::new(|_: &EvlogError| {}),
            span,
        })
    }

    /// Install the callback run on fatal errors.
    #[must_use]
    pub fn with_fatal_hook(mut self, hook: FatalHook) -> Self {
        self.fatal_hook = hook;
        self
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<IndexWriterMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Commits whose stream-version pin is still held.
    #[must_use]
    pub fn pending_commits(&self) -> usize {
        self.pending_commits.len()
    }

    /// Transactions whose info pin is still held.
    #[must_use]
    pub fn pending_transactions(&self) -> usize {
        self.pending_transactions.len()
    }

    /// Pin count of the cached version of `stream_id`; `None` when not cached.
    #[must_use]
    pub fn stream_version_stickiness(&self, stream_id: &str) -> Option<u32> {
        self.stream_versions.stickiness(stream_id)
    }

    /// Pin count of the cached raw metadata of `stream_id`.
    #[must_use]
    pub fn stream_metadata_stickiness(&self, stream_id: &str) -> Option<u32> {
        self.stream_raw_metas.stickiness(stream_id)
    }

    /// Validate the transaction starting at `transaction_position` and
    /// committed at `commit_position`.
    pub fn check_commit_starting_at(
        &mut self,
        transaction_position: i64,
        commit_position: i64,
    ) -> Result<CommitCheckResult> {
        let span = self.span.clone();
        let _guard = span.enter();

        let first = {
            let mut reader = self.backend.borrow_reader()?;
            reader.try_read_at(transaction_position)?
        };
        let first = match first {
            Some(LogRecord::Prepare(prepare)) => prepare,
            Some(other) => {
                error!(
                    transaction_position,
                    commit_position,
                    record_type = ?other.record_type(),
                    "transaction does not start with a prepare"
                );
                return Ok(CommitCheckResult::invalid_transaction());
            }
            None => {
                error!(
                    transaction_position,
                    commit_position, "could not read first prepare of transaction"
                );
                return Ok(CommitCheckResult::invalid_transaction());
            }
        };

        let event_ids: Vec<EventId> = self
            .transaction_prepares(transaction_position, commit_position)?
            .iter()
            .filter(|prepare| prepare.is_relevant())
            .map(|prepare| prepare.event_id)
            .collect();
        self.check_commit(&first.event_stream_id, first.expected_version, &event_ids)
    }

    /// Optimistic-concurrency and idempotency check of `event_ids` written to
    /// `stream_id` at `expected_version`.
    pub fn check_commit(
        &mut self,
        stream_id: &str,
        expected_version: i64,
        event_ids: &[EventId],
    ) -> Result<CommitCheckResult> {
        self.metrics.record_commit_check();

        let current_version = self.stream_last_event_number(stream_id)?;
        if current_version == EventNumber::DELETED_STREAM {
            return Ok(CommitCheckResult::new(
                CommitDecision::Deleted,
                stream_id,
                current_version,
                false,
            ));
        }
        let is_soft_deleted = self.stream_metadata(stream_id)?.is_soft_deleted();

        let result = if expected_version == ExpectedVersion::ANY {
            self.check_any_version(stream_id, current_version, event_ids, is_soft_deleted)
        } else if expected_version < current_version {
            self.check_replay(
                stream_id,
                expected_version,
                current_version,
                event_ids,
                is_soft_deleted,
            )?
        } else if expected_version > current_version {
            CommitCheckResult::new(
                CommitDecision::WrongExpectedVersion,
                stream_id,
                current_version,
                is_soft_deleted,
            )
        } else {
            CommitCheckResult::new(CommitDecision::Ok, stream_id, current_version, is_soft_deleted)
        };

        debug!(
            stream_id,
            expected_version,
            current_version,
            decision = ?result.decision,
            "commit checked"
        );
        Ok(result)
    }

    fn check_any_version(
        &self,
        stream_id: &str,
        current_version: i64,
        event_ids: &[EventId],
        is_soft_deleted: bool,
    ) -> CommitCheckResult {
        let mut range: Option<(i64, i64)> = None;
        for event_id in event_ids {
            match self.committed_events.try_get_record(event_id) {
                Some(committed) if committed.stream_id == stream_id => {
                    let start = range.map_or(committed.event_number, |(start, _)| start);
                    range = Some((start, committed.event_number));
                }
                _ => {
                    // A transaction is a duplicate as a whole or not at all.
                    let decision = if range.is_none() {
                        CommitDecision::Ok
                    } else {
                        CommitDecision::CorruptedIdempotency
                    };
                    return CommitCheckResult::new(
                        decision,
                        stream_id,
                        current_version,
                        is_soft_deleted,
                    );
                }
            }
        }

        match range {
            Some((start, end)) => CommitCheckResult::idempotent(
                stream_id,
                current_version,
                start,
                end,
                is_soft_deleted,
            ),
            None => CommitCheckResult::new(
                CommitDecision::Ok,
                stream_id,
                current_version,
                is_soft_deleted,
            ),
        }
    }

    fn check_replay(
        &self,
        stream_id: &str,
        expected_version: i64,
        current_version: i64,
        event_ids: &[EventId],
        is_soft_deleted: bool,
    ) -> Result<CommitCheckResult> {
        let mut event_number = expected_version;
        for event_id in event_ids {
            event_number += 1;
            if self.is_committed_as(event_id, stream_id, event_number)? {
                continue;
            }

            let decision = if event_number != expected_version + 1 {
                CommitDecision::CorruptedIdempotency
            } else if is_soft_deleted && expected_version == ExpectedVersion::NO_STREAM {
                // Recreating a soft-deleted stream.
                CommitDecision::Ok
            } else {
                CommitDecision::WrongExpectedVersion
            };
            return Ok(CommitCheckResult::new(
                decision,
                stream_id,
                current_version,
                is_soft_deleted,
            ));
        }

        if event_number == expected_version {
            return Ok(CommitCheckResult::new(
                CommitDecision::WrongExpectedVersion,
                stream_id,
                current_version,
                is_soft_deleted,
            ));
        }
        Ok(CommitCheckResult::idempotent(
            stream_id,
            current_version,
            expected_version + 1,
            event_number,
            is_soft_deleted,
        ))
    }

    fn is_committed_as(&self, event_id: &EventId, stream_id: &str, event_number: i64) -> Result<bool> {
        if let Some(committed) = self.committed_events.try_get_record(event_id) {
            if committed.stream_id == stream_id && committed.event_number == event_number {
                return Ok(true);
            }
        }
        Ok(self
            .index
            .read_prepare(stream_id, event_number)?
            .is_some_and(|prepare| prepare.event_id == *event_id))
    }

    /// Record the effects of `commit` before the durable index sees it.
    pub fn pre_commit(&mut self, commit: &CommitLogRecord) -> Result<()> {
        let span = self.span.clone();
        let _guard = span.enter();

        let prepares = self.transaction_prepares(commit.transaction_position, commit.log_position)?;
        let Some(last_prepare) = prepares.last() else {
            return Ok(());
        };
        let numbered: Vec<(&PrepareLogRecord, i64)> = prepares
            .iter()
            .filter(|prepare| prepare.is_relevant())
            .map(|prepare| {
                let event_number = if prepare.flags.contains(PrepareFlags::STREAM_DELETE) {
                    EventNumber::DELETED_STREAM
                } else {
                    commit.first_event_number + i64::from(prepare.transaction_offset)
                };
                (prepare, event_number)
            })
            .collect();
        self.register_committed(&numbered, last_prepare)
    }

    /// Record the effects of already-committed prepares whose expected
    /// versions are their final event numbers minus one.
    pub fn pre_commit_prepares(&mut self, committed_prepares: &[PrepareLogRecord]) -> Result<()> {
        let span = self.span.clone();
        let _guard = span.enter();

        let Some(last_prepare) = committed_prepares.last() else {
            return Ok(());
        };
        let numbered: Vec<(&PrepareLogRecord, i64)> = committed_prepares
            .iter()
            .filter(|prepare| prepare.is_relevant())
            .map(|prepare| {
                let event_number = if prepare.flags.contains(PrepareFlags::STREAM_DELETE) {
                    EventNumber::DELETED_STREAM
                } else {
                    prepare.expected_version + 1
                };
                (prepare, event_number)
            })
            .collect();
        self.register_committed(&numbered, last_prepare)
    }

    /// `last_prepare` is the transaction's final prepare, relevant or not: the
    /// commit stays pending until the checkpoint passes it, and a metastream
    /// write takes its data.
    fn register_committed(
        &mut self,
        events: &[(&PrepareLogRecord, i64)],
        last_prepare: &PrepareLogRecord,
    ) -> Result<()> {
        let (Some(&(first, _)), Some(&(_, last_event_number))) = (events.first(), events.last())
        else {
            return Ok(());
        };
        let stream_id = first.event_stream_id.as_str();
        if let Some((stray, _)) = events
            .iter()
            .find(|(prepare, _)| prepare.event_stream_id != stream_id)
        {
            return Err(self.fatal(EvlogError::invariant(format!(
                "transaction at {} writes to both '{stream_id}' and '{}'",
                first.transaction_position, stray.event_stream_id
            ))));
        }

        for &(prepare, event_number) in events {
            self.committed_events.put_record(
                prepare.event_id,
                CommittedEvent {
                    stream_id: stream_id.to_owned(),
                    event_number,
                },
                false,
            )?;
        }

        self.stream_versions
            .put(stream_id.to_owned(), last_event_number, 1);
        if is_metastream(stream_id) {
            self.stream_raw_metas.put(
                original_stream_of(stream_id).to_owned(),
                last_prepare.data.clone(),
                1,
            );
        }
        self.pending_commits.push_back(PendingCommit {
            stream_id: stream_id.to_owned(),
            log_position: last_prepare.log_position,
        });
        self.metrics.record_pre_commit();
        trace!(
            stream_id,
            last_event_number,
            log_position = last_prepare.log_position,
            "pre-committed"
        );
        Ok(())
    }

    /// Cache `info` for `transaction_id` until the checkpoint passes
    /// `log_position`.
    pub fn update_transaction_info(
        &mut self,
        transaction_id: i64,
        log_position: i64,
        info: TransactionInfo,
    ) {
        self.pending_transactions.push_back(PendingTransaction {
            transaction_position: transaction_id,
            log_position,
        });
        self.transaction_infos.put(transaction_id, info, 1);
    }

    /// Offset and stream of the transaction starting at `transaction_id`,
    /// scanning back from `writer_checkpoint` on a cache miss.
    pub fn get_transaction_info(
        &mut self,
        writer_checkpoint: i64,
        transaction_id: i64,
    ) -> Result<TransactionInfo> {
        if let Some(info) = self.transaction_infos.try_get(&transaction_id) {
            self.metrics.record_trans_info_hit();
            return Ok(info.clone());
        }

        let found = self.find_transaction_info(writer_checkpoint, transaction_id)?;
        self.metrics.record_trans_info_miss();
        Ok(match found {
            Some(info) => {
                self.transaction_infos.put(transaction_id, info.clone(), 0);
                info
            }
            None => TransactionInfo::absent(),
        })
    }

    fn find_transaction_info(
        &self,
        writer_checkpoint: i64,
        transaction_id: i64,
    ) -> Result<Option<TransactionInfo>> {
        let mut reader = self.backend.borrow_reader()?;
        reader.reposition(writer_checkpoint)?;
        while let Some(result) = reader.try_read_prev()? {
            if result.record.log_position() < transaction_id {
                break;
            }
            if let LogRecord::Prepare(prepare) = result.record {
                if prepare.transaction_position == transaction_id {
                    return Ok(Some(TransactionInfo::new(
                        prepare.transaction_offset,
                        prepare.event_stream_id,
                    )));
                }
            }
        }
        Ok(None)
    }

    /// Release the pins of every pending commit logged before `checkpoint`.
    pub fn purge_not_processed_commits_till(&mut self, checkpoint: i64) -> Result<()> {
        while let Some(head) = self.pending_commits.front() {
            if head.log_position >= checkpoint {
                break;
            }
            let Some(commit) = self.pending_commits.pop_front() else {
                break;
            };

            if let Err(err) = self.stream_versions.unstick(commit.stream_id.as_str()) {
                return Err(self.fatal(EvlogError::invariant(format!(
                    "stream version of '{}' committed at {} was never pre-committed: {err}",
                    commit.stream_id, commit.log_position
                ))));
            }
            if is_metastream(&commit.stream_id) {
                let original = original_stream_of(&commit.stream_id);
                if let Err(err) = self.stream_raw_metas.unstick(original) {
                    return Err(self.fatal(EvlogError::invariant(format!(
                        "raw metadata of '{original}' committed at {} was never pre-committed: {err}",
                        commit.log_position
                    ))));
                }
            }
        }
        Ok(())
    }

    /// Release the pins of every transaction logged before `checkpoint`.
    pub fn purge_not_processed_transactions(&mut self, checkpoint: i64) -> Result<()> {
        while let Some(head) = self.pending_transactions.front() {
            if head.log_position >= checkpoint {
                break;
            }
            let Some(transaction) = self.pending_transactions.pop_front() else {
                break;
            };
            if let Err(err) = self
                .transaction_infos
                .unstick(&transaction.transaction_position)
            {
                return Err(self.fatal(EvlogError::invariant(format!(
                    "transaction info of {} logged at {} was never registered: {err}",
                    transaction.transaction_position, transaction.log_position
                ))));
            }
        }
        Ok(())
    }

    /// Last event number of `stream_id` including pre-committed writes.
    pub fn stream_last_event_number(&mut self, stream_id: &str) -> Result<i64> {
        if let Some(&version) = self.stream_versions.try_get(stream_id) {
            return Ok(version);
        }
        self.index.last_event_number(stream_id)
    }

    fn stream_metadata(&mut self, stream_id: &str) -> Result<StreamMetadata> {
        if let Some(raw) = self.stream_raw_metas.try_get(stream_id) {
            return Ok(StreamMetadata::from_json_bytes(raw).unwrap_or_else(|err| {
                warn!(stream_id, error = %err, "unparsable pending stream metadata");
                StreamMetadata::EMPTY
            }));
        }
        self.index.stream_metadata(stream_id)
    }

    /// Current metadata of `stream_id` with truncate-before set to
    /// `recreate_from_event_number`, along with the metadata event number it
    /// replaces.
    pub fn get_soft_undeleted_stream_meta(
        &mut self,
        stream_id: &str,
        recreate_from_event_number: i64,
    ) -> Result<(i64, Vec<u8>)> {
        let metastream = metastream_of(stream_id);
        let meta_event_number = self.stream_last_event_number(&metastream)?;

        let raw = if let Some(raw) = self.stream_raw_metas.try_get(stream_id) {
            raw.clone()
        } else if let Some(prepare) = self.index.read_prepare(&metastream, meta_event_number)? {
            prepare.data
        } else {
            return Err(self.fatal(EvlogError::MetadataCorrupt {
                stream: stream_id.to_owned(),
                detail: format!("metadata event {meta_event_number} not found"),
            }));
        };

        match rewrite_truncate_before(&raw, recreate_from_event_number) {
            Ok(rewritten) => Ok((meta_event_number, rewritten)),
            Err(err) => Err(self.fatal(EvlogError::MetadataCorrupt {
                stream: stream_id.to_owned(),
                detail: err.to_string(),
            })),
        }
    }

    /// Drop every cache entry and pending queue item.
    pub fn reset(&mut self) {
        self.transaction_infos.clear();
        self.pending_transactions.clear();
        self.committed_events.clear();
        self.stream_versions.clear();
        self.stream_raw_metas.clear();
        self.pending_commits.clear();
        debug!(parent: &self.span, "index writer caches reset");
    }

    /// Prepares of the transaction at `transaction_position`, stopping at
    /// the end-of-transaction prepare or past `commit_position`.
    fn transaction_prepares(
        &self,
        transaction_position: i64,
        commit_position: i64,
    ) -> Result<Vec<PrepareLogRecord>> {
        let mut reader = self.backend.borrow_reader()?;
        reader.reposition(transaction_position)?;

        let mut prepares = Vec::new();
        while let Some(result) = reader.try_read_next()? {
            if result.record_pre_position > commit_position {
                break;
            }
            let LogRecord::Prepare(prepare) = result.record else {
                continue;
            };
            if prepare.transaction_position != transaction_position {
                continue;
            }
            let is_end = prepare.flags.contains(PrepareFlags::TRANSACTION_END);
            prepares.push(prepare);
            if is_end {
                break;
            }
        }
        Ok(prepares)
    }

    fn fatal(&self, err: EvlogError) -> EvlogError {
        error!(parent: &self.span, error = %err, "fatal index writer error");
        self.metrics.record_fatal();
        (self.fatal_hook)(&err);
        err
    }
}

impl<R: IndexReader> fmt::Debug for IndexWriter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexWriter")
            .field("backend", &self.backend)
            .field("transaction_infos", &self.transaction_infos.len())
            .field("pending_transactions", &self.pending_transactions.len())
            .field("committed_events", &self.committed_events.len())
            .field("stream_versions", &self.stream_versions.len())
            .field("stream_raw_metas", &self.stream_raw_metas.len())
            .field("pending_commits", &self.pending_commits.len())
            .finish_non_exhaustive()
    }
}
