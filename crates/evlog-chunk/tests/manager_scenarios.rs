use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use evlog_chunk::{
    AppendOutcome, Chunk, ChunkDbConfig, ChunkHeader, ChunkManager, full_chunk_footprint,
};
use evlog_error::EvlogError;

const CHUNK_SIZE: u32 = 4_096;
const RECORD: &[u8] = &[0xAB; 1_000];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn config(dir: &Path) -> ChunkDbConfig {
    ChunkDbConfig::new(dir).with_chunk_size(CHUNK_SIZE)
}

fn add_sealed_chunk(manager: &ChunkManager) -> Arc<Chunk> {
    let chunk = manager.add_new_chunk().expect("add chunk");
    assert!(matches!(
        chunk.append(RECORD).expect("append"),
        AppendOutcome::Written { .. }
    ));
    chunk.complete().expect("complete");
    chunk
}

#[test]
fn caching_pass_keeps_only_newest_chunks_within_budget() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    // Sealed chunk footprint: 1000 data bytes + header + footer.
    let sealed_footprint = RECORD.len() as u64 + 256;
    let manager = ChunkManager::new(
        config(dir.path()).with_max_chunks_cache_size(2 * sealed_footprint),
    )
    .expect("manager");

    let chunks: Vec<_> = (0..5).map(|_| add_sealed_chunk(&manager)).collect();
    for chunk in &chunks {
        chunk.cache_in_memory().expect("pre-cache");
    }

    manager.enable_caching().expect("enable caching");
    assert!(
        manager.wait_for_caching_idle(Duration::from_secs(10)),
        "caching pass did not finish"
    );

    let cached: Vec<bool> = chunks.iter().map(|chunk| chunk.is_cached()).collect();
    assert_eq!(cached, vec![false, false, false, true, true]);

    let metrics = manager.metrics();
    assert!(metrics.caching_passes_total >= 1, "{metrics:?}");
    assert_eq!(metrics.chunks_uncached_total, 3, "{metrics:?}");
}

#[test]
fn ongoing_chunk_counts_full_size_against_budget() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let budget = full_chunk_footprint(CHUNK_SIZE) + 2 * (RECORD.len() as u64 + 256);
    let manager = ChunkManager::new(config(dir.path()).with_max_chunks_cache_size(budget))
        .expect("manager");

    let sealed: Vec<_> = (0..3).map(|_| add_sealed_chunk(&manager)).collect();
    let active = manager.add_new_chunk().expect("active chunk");
    manager.enable_caching().expect("enable caching");
    assert!(manager.wait_for_caching_idle(Duration::from_secs(10)));

    assert!(active.is_cached(), "active chunk fits the budget and is cached inline");
    assert!(!sealed[0].is_cached());
    assert!(sealed[1].is_cached());
    assert!(sealed[2].is_cached());

    // A new active chunk pushes one more sealed chunk out of the budget.
    active.append(RECORD).expect("append");
    active.complete().expect("complete");
    let next = manager.add_new_chunk().expect("next active chunk");
    assert!(manager.wait_for_caching_idle(Duration::from_secs(10)));
    assert!(next.is_cached());
    assert!(!sealed[1].is_cached());
    assert!(sealed[2].is_cached());
    assert!(active.is_cached());
}

#[test]
fn zero_budget_leaves_caching_disabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = ChunkManager::new(config(dir.path()).with_max_chunks_cache_size(0))
        .expect("manager");
    let chunk = add_sealed_chunk(&manager);
    manager.enable_caching().expect("enable caching");
    assert!(!manager.is_caching_enabled());
    assert!(manager.wait_for_caching_idle(Duration::ZERO));
    assert!(!chunk.is_cached());
}

#[test]
fn scavenge_switch_replaces_range_and_defers_deletion() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = ChunkManager::new(config(dir.path())).expect("manager");
    let old0 = add_sealed_chunk(&manager);
    let old1 = add_sealed_chunk(&manager);
    let _ongoing = manager.add_new_chunk().expect("ongoing");

    let lease = old0.acquire_reader().expect("lease on old chunk");

    let merged = manager
        .create_temp_chunk(ChunkHeader::new(CHUNK_SIZE, 0, 1, true), 8_192)
        .expect("temp chunk");
    merged.append(b"survivors").expect("append");
    merged
        .complete_scavenged(b"map", 2 * u64::from(CHUNK_SIZE))
        .expect("complete");

    let switched = manager.switch_chunk(&merged, true, false).expect("switch");
    assert_eq!(switched.path(), dir.path().join("chunk-000000.000001"));
    assert_eq!(manager.chunks_count(), 3);
    for number in 0..2 {
        let slot = manager.get_chunk(number).expect("slot");
        assert!(Arc::ptr_eq(&slot, &switched), "slot {number}");
    }
    for position in [0_i64, i64::from(CHUNK_SIZE) + 17] {
        assert!(Arc::ptr_eq(
            &manager.get_chunk_for(position).expect("by position"),
            &switched
        ));
    }

    assert!(old1.is_destroyed());
    assert!(!old1.path().exists(), "unread old chunk deleted right away");

    assert!(!old0.is_destroyed(), "old chunk kept while a lease is open");
    assert!(old0.path().exists());
    assert_eq!(lease.read(0, 4).expect("old lease reads"), vec![0xAB; 4]);
    drop(lease);
    assert!(old0.is_destroyed());
    assert!(!old0.path().exists());
}

#[test]
fn switch_times_out_while_switched_chunk_is_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = ChunkManager::new(
        config(dir.path()).with_switch_wait_timeout(Duration::from_millis(20)),
    )
    .expect("manager");
    let chunk = add_sealed_chunk(&manager);
    let lease = chunk.acquire_reader().expect("lease");

    let err = manager
        .switch_chunk(&chunk, false, false)
        .expect_err("reader still open");
    assert!(
        matches!(err, EvlogError::ChunkSwitchTimeout { start: 0, end: 0, .. }),
        "{err}"
    );
    assert!(err.is_transient());
    drop(lease);
}

#[test]
fn raw_replication_switch_drops_greater_chunks() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = ChunkManager::new(config(dir.path())).expect("manager");
    let _c0 = add_sealed_chunk(&manager);
    let _c1 = add_sealed_chunk(&manager);
    let c2 = add_sealed_chunk(&manager);
    let c3 = manager.add_new_chunk().expect("ongoing");
    assert_eq!(manager.chunks_count(), 4);

    let raw = manager
        .create_temp_chunk(ChunkHeader::new(CHUNK_SIZE, 1, 1, false), 8_192)
        .expect("temp chunk");
    raw.append(b"replicated").expect("append");
    raw.complete().expect("complete");

    let switched = manager.switch_chunk(&raw, false, true).expect("switch");
    assert_eq!(manager.chunks_count(), 2);
    assert!(Arc::ptr_eq(&manager.get_chunk(1).expect("slot 1"), &switched));
    assert!(manager.get_chunk(2).is_err());
    assert!(c2.is_destroyed());
    assert!(c3.is_destroyed());
    assert!(!c2.path().exists());
}

#[test]
fn add_chunk_registers_reopened_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("chunk-000000.000000");
    {
        let chunk = Chunk::create_new(&path, CHUNK_SIZE, 0, 0, false).expect("create");
        chunk.append(RECORD).expect("append");
        chunk.complete().expect("complete");
        chunk.dispose();
    }

    let manager = ChunkManager::new(config(dir.path())).expect("manager");
    let reopened = Chunk::from_completed_file(&path, true).expect("reopen");
    manager.add_chunk(&reopened).expect("register");
    assert_eq!(manager.chunks_count(), 1);
    assert!(manager.chunk_for_path(&path).is_some());

    let again = Chunk::from_completed_file(&path, false).expect("reopen again");
    let err = manager.add_chunk(&again).expect_err("slot 0 taken");
    assert!(
        matches!(err, EvlogError::ChunkRangeMismatch { start: 0, chunks_count: 1, .. }),
        "{err}"
    );
}

#[test]
fn switch_rejects_range_that_splits_a_registered_chunk() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = ChunkManager::new(config(dir.path())).expect("manager");
    let wide = manager
        .add_new_chunk_with_header(ChunkHeader::new(CHUNK_SIZE, 0, 2, false), 8_192)
        .expect("wide chunk");
    wide.append(RECORD).expect("append");
    wide.complete().expect("complete");
    assert_eq!(manager.chunks_count(), 3);

    for (start, end) in [(0, 0), (1, 2)] {
        let narrow = manager
            .create_temp_chunk(ChunkHeader::new(CHUNK_SIZE, start, end, false), 8_192)
            .expect("temp chunk");
        narrow.append(b"narrow").expect("append");
        narrow.complete().expect("complete");

        let err = manager
            .switch_chunk(&narrow, false, false)
            .expect_err("range splits the wide chunk");
        assert!(
            matches!(
                err,
                EvlogError::ChunkRangeMismatch { start: s, end: e, chunks_count: 3 }
                    if s == start as usize && e == end as usize
            ),
            "{err}"
        );
        assert!(!narrow.is_disposed(), "rejected chunk left untouched");
        assert!(narrow.path().exists());
        narrow.dispose();
    }

    for number in 0..3 {
        assert!(Arc::ptr_eq(&manager.get_chunk(number).expect("slot"), &wide));
    }
    assert_eq!(manager.metrics().chunks_switched_total, 0);
    manager.dispose();
    assert!(wide.is_disposed());
}

#[test]
fn burst_of_additions_shares_caching_passes_on_one_worker() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let sealed_footprint = RECORD.len() as u64 + 256;
    let budget = full_chunk_footprint(CHUNK_SIZE) + 2 * sealed_footprint;
    let manager = ChunkManager::new(config(dir.path()).with_max_chunks_cache_size(budget))
        .expect("manager");

    let mut chunks = vec![manager.add_new_chunk().expect("first chunk")];
    manager.enable_caching().expect("enable caching");
    for _ in 0..20 {
        let active = chunks.last().expect("active chunk");
        active.append(RECORD).expect("append");
        active.complete().expect("complete");
        chunks.push(manager.add_new_chunk().expect("next chunk"));
    }
    manager.enable_caching().expect("enable caching again");
    assert!(manager.wait_for_caching_idle(Duration::from_secs(10)));

    let metrics = manager.metrics();
    assert_eq!(metrics.caching_workers_started_total, 1, "{metrics:?}");
    assert_eq!(metrics.caching_requests_total, 22, "{metrics:?}");
    assert!(metrics.caching_passes_total >= 1, "{metrics:?}");
    assert!(
        metrics.caching_passes_total <= metrics.caching_requests_total,
        "{metrics:?}"
    );

    // The active chunk plus the two newest sealed chunks fill the budget.
    let cached: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| chunk.is_cached())
        .map(|(number, _)| number)
        .collect();
    assert_eq!(cached, vec![18, 19, 20]);
}
