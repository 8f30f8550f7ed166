//! A single chunk file.
//!
//! A chunk starts mutable ("ongoing"): the writer appends to its data region.
//! Completing it writes the optional map and the footer and makes it
//! read-only. Either kind may hold an in-memory copy of its data region
//! ("cached"); reads are then served from memory instead of the file.
//!
//! Lifetime is governed by reader leases. Once disposed, a chunk refuses new
//! leases and is destroyed (handle closed, memory dropped, file deleted if it
//! was marked for deletion) when the last outstanding lease is released.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use evlog_error::{EvlogError, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::config::full_chunk_footprint;
use crate::format::{CHUNK_FOOTER_SIZE, CHUNK_HEADER_SIZE, ChunkFooter, ChunkHeader};

const HEADER_BYTES: u64 = CHUNK_HEADER_SIZE as u64;
const FOOTER_BYTES: u64 = CHUNK_FOOTER_SIZE as u64;
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Result of [`Chunk::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The bytes were written at `offset`; the data size is now `next_offset`.
    Written { offset: u64, next_offset: u64 },
    /// Not enough room left; nothing was written.
    ChunkFull,
}

#[derive(Debug, Default)]
struct Lifecycle {
    readers: usize,
    disposed: bool,
    delete_on_destroy: bool,
    destroyed: bool,
}

/// One log segment file.
pub struct Chunk {
    path: PathBuf,
    header: ChunkHeader,
    data_capacity: u64,
    file: Mutex<Option<File>>,
    data_size: AtomicU64,
    footer: RwLock<Option<ChunkFooter>>,
    memory: RwLock<Option<Vec<u8>>>,
    lifecycle: Mutex<Lifecycle>,
    destroyed: Condvar,
}

impl Chunk {
    /// Create an ongoing chunk file sized for `chunk_size` data bytes.
    pub fn create_new(
        path: &Path,
        chunk_size: u32,
        chunk_start_number: u32,
        chunk_end_number: u32,
        is_scavenged: bool,
    ) -> Result<Arc<Self>> {
        let header = ChunkHeader::new(chunk_size, chunk_start_number, chunk_end_number, is_scavenged);
        Self::create_with_header(path, header, full_chunk_footprint(chunk_size))
    }

    /// Create a chunk file with an explicit header and total file size.
    ///
    /// Fails if the file already exists.
    pub fn create_with_header(path: &Path, header: ChunkHeader, file_size: u64) -> Result<Arc<Self>> {
        if file_size < HEADER_BYTES + FOOTER_BYTES {
            return Err(EvlogError::InvalidArgument(format!(
                "chunk file size {file_size} is smaller than header and footer"
            )));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(&header.encode())?;
        file.set_len(file_size)?;
        file.sync_all()?;

        debug!(
            path = %path.display(),
            chunk_start = header.chunk_start_number,
            chunk_end = header.chunk_end_number,
            file_size,
            "created chunk file"
        );

        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            header,
            data_capacity: file_size - HEADER_BYTES - FOOTER_BYTES,
            file: Mutex::new(Some(file)),
            data_size: AtomicU64::new(0),
            footer: RwLock::new(None),
            memory: RwLock::new(None),
            lifecycle: Mutex::new(Lifecycle::default()),
            destroyed: Condvar::new(),
        }))
    }

    /// Open a completed chunk file read-only.
    ///
    /// With `verify_hash`, the content hash stored in the footer is checked
    /// against the header, data and map actually on disk.
    pub fn from_completed_file(path: &Path, verify_hash: bool) -> Result<Arc<Self>> {
        let mut file = OpenOptions::new().read(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_BYTES + FOOTER_BYTES {
            return Err(EvlogError::corrupt(format!(
                "chunk file {} is shorter than header and footer: {file_len} bytes",
                path.display()
            )));
        }

        let mut header_bytes = [0_u8; CHUNK_HEADER_SIZE];
        file.read_exact(&mut header_bytes)?;
        let header = ChunkHeader::decode(&header_bytes)?;

        let mut footer_bytes = [0_u8; CHUNK_FOOTER_SIZE];
        file.seek(SeekFrom::Start(file_len - FOOTER_BYTES))?;
        if file.read_exact(&mut footer_bytes).is_err() {
            return Err(EvlogError::ChunkNotCompleted {
                path: path.to_path_buf(),
            });
        }
        let footer = match ChunkFooter::decode(&footer_bytes) {
            Ok(footer) if footer.is_completed => footer,
            _ => {
                return Err(EvlogError::ChunkNotCompleted {
                    path: path.to_path_buf(),
                });
            }
        };

        let content_len = HEADER_BYTES + footer.physical_data_size + u64::from(footer.map_size);
        if content_len + FOOTER_BYTES > file_len {
            return Err(EvlogError::corrupt(format!(
                "chunk file {} is truncated: footer describes {} content bytes, file has {file_len}",
                path.display(),
                content_len
            )));
        }

        if verify_hash {
            let computed = hash_prefix(&mut file, content_len)?;
            if computed != footer.content_hash {
                return Err(EvlogError::corrupt(format!(
                    "chunk file {} hash mismatch: stored {:#018X}, computed {computed:#018X}",
                    path.display(),
                    footer.content_hash
                )));
            }
        }

        debug!(
            path = %path.display(),
            chunk_start = header.chunk_start_number,
            chunk_end = header.chunk_end_number,
            verify_hash,
            "opened completed chunk"
        );

        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            header,
            data_capacity: footer.physical_data_size,
            file: Mutex::new(Some(file)),
            data_size: AtomicU64::new(footer.physical_data_size),
            footer: RwLock::new(Some(footer)),
            memory: RwLock::new(None),
            lifecycle: Mutex::new(Lifecycle::default()),
            destroyed: Condvar::new(),
        }))
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    #[must_use]
    pub const fn header(&self) -> &ChunkHeader {
        &self.header
    }

    #[must_use]
    pub fn footer(&self) -> Option<ChunkFooter> {
        *self.footer.read()
    }

    /// Whether the chunk is completed and no longer accepts appends.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.footer.read().is_some()
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.memory.read().is_some()
    }

    /// Bytes written to the data region.
    #[must_use]
    pub fn data_size(&self) -> u64 {
        self.data_size.load(Ordering::Acquire)
    }

    /// Data bytes that can still be appended.
    #[must_use]
    pub fn remaining_capacity(&self) -> u64 {
        self.data_capacity.saturating_sub(self.data_size())
    }

    /// Bytes this chunk costs when resident in memory.
    ///
    /// Completed chunks count their data, map, header and footer; an ongoing
    /// chunk counts its full allocated size.
    #[must_use]
    pub fn cache_footprint(&self) -> u64 {
        match *self.footer.read() {
            Some(footer) => {
                footer.physical_data_size + u64::from(footer.map_size) + HEADER_BYTES + FOOTER_BYTES
            }
            None => full_chunk_footprint(self.header.chunk_size),
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lifecycle.lock().disposed
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.lifecycle.lock().destroyed
    }

    /// Number of outstanding reader leases.
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.lifecycle.lock().readers
    }

    /// Append `data` to the data region.
    pub fn append(&self, data: &[u8]) -> Result<AppendOutcome> {
        self.ensure_not_disposed()?;

        let mut file_guard = self.file.lock();
        let file = file_guard.as_mut().ok_or_else(|| self.disposed_error())?;
        if self.is_read_only() {
            return Err(EvlogError::ChunkReadOnly {
                path: self.path.clone(),
            });
        }

        let offset = self.data_size.load(Ordering::Acquire);
        let len = data.len() as u64;
        if offset + len > self.data_capacity {
            return Ok(AppendOutcome::ChunkFull);
        }

        file.seek(SeekFrom::Start(HEADER_BYTES + offset))?;
        file.write_all(data)?;
        if let Some(memory) = self.memory.write().as_mut() {
            memory.extend_from_slice(data);
        }
        let next_offset = offset + len;
        self.data_size.store(next_offset, Ordering::Release);

        Ok(AppendOutcome::Written {
            offset,
            next_offset,
        })
    }

    /// Flush written data to stable storage.
    pub fn flush(&self) -> Result<()> {
        let mut file_guard = self.file.lock();
        let file = file_guard.as_mut().ok_or_else(|| self.disposed_error())?;
        file.sync_data()?;
        Ok(())
    }

    /// Seal an ongoing chunk.
    pub fn complete(&self) -> Result<ChunkFooter> {
        let logical = self.data_size();
        self.complete_with_map(&[], logical)
    }

    /// Seal a scavenged chunk with its position map and the logical size of
    /// the range it replaces.
    pub fn complete_scavenged(&self, map: &[u8], logical_data_size: u64) -> Result<ChunkFooter> {
        if !self.header.is_scavenged {
            return Err(EvlogError::InvalidArgument(format!(
                "chunk {} is not a scavenged chunk",
                self.path.display()
            )));
        }
        self.complete_with_map(map, logical_data_size)
    }

    fn complete_with_map(&self, map: &[u8], logical_data_size: u64) -> Result<ChunkFooter> {
        let map_size = u32::try_from(map.len()).map_err(|_| {
            EvlogError::InvalidArgument(format!("chunk map too large: {} bytes", map.len()))
        })?;
        self.ensure_not_disposed()?;

        // Lock order: file, then footer, then memory.
        let mut file_guard = self.file.lock();
        let file = file_guard.as_mut().ok_or_else(|| self.disposed_error())?;
        let mut footer_guard = self.footer.write();
        if footer_guard.is_some() {
            return Err(EvlogError::ChunkReadOnly {
                path: self.path.clone(),
            });
        }

        let physical_data_size = self.data_size.load(Ordering::Acquire);
        let content_len = HEADER_BYTES + physical_data_size + u64::from(map_size);
        file.seek(SeekFrom::Start(HEADER_BYTES + physical_data_size))?;
        file.write_all(map)?;
        let content_hash = hash_prefix(file, content_len)?;

        let footer = ChunkFooter {
            is_completed: true,
            physical_data_size,
            logical_data_size,
            map_size,
            content_hash,
        };
        file.seek(SeekFrom::Start(content_len))?;
        file.write_all(&footer.encode())?;
        file.set_len(content_len + FOOTER_BYTES)?;
        file.sync_all()?;

        if let Some(memory) = self.memory.write().as_mut() {
            memory.extend_from_slice(map);
        }
        *footer_guard = Some(footer);

        debug!(
            path = %self.path.display(),
            chunk_start = self.header.chunk_start_number,
            chunk_end = self.header.chunk_end_number,
            physical_data_size,
            map_size,
            "completed chunk"
        );
        Ok(footer)
    }

    /// Borrow a reader lease. Fails once the chunk is disposed.
    pub fn acquire_reader(self: &Arc<Self>) -> Result<ChunkReader> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.disposed {
            return Err(self.disposed_error());
        }
        lifecycle.readers += 1;
        Ok(ChunkReader {
            chunk: Arc::clone(self),
        })
    }

    fn release_reader(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.readers -= 1;
        if lifecycle.readers == 0 && lifecycle.disposed && !lifecycle.destroyed {
            self.destroy(&mut lifecycle);
        }
    }

    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| EvlogError::out_of_range("chunk read offset", offset))?;
        if end > self.data_size() {
            return Err(EvlogError::OutOfRange {
                what: "chunk read range".to_owned(),
                value: format!("{offset}..{end} (data size {})", self.data_size()),
            });
        }

        if let Some(memory) = self.memory.read().as_ref() {
            if let Some(bytes) = memory.get(offset as usize..end as usize) {
                return Ok(bytes.to_vec());
            }
        }

        let mut file_guard = self.file.lock();
        let file = file_guard.as_mut().ok_or_else(|| self.disposed_error())?;
        let mut buf = vec![0_u8; len];
        file.seek(SeekFrom::Start(HEADER_BYTES + offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Load the data region (and map, once completed) into memory.
    ///
    /// Returns whether the chunk transitioned to cached.
    pub fn cache_in_memory(&self) -> Result<bool> {
        if self.is_disposed() || self.is_cached() {
            return Ok(false);
        }

        let mut file_guard = self.file.lock();
        let Some(file) = file_guard.as_mut() else {
            return Ok(false);
        };
        let len = match *self.footer.read() {
            Some(footer) => footer.physical_data_size + u64::from(footer.map_size),
            None => self.data_size.load(Ordering::Acquire),
        };
        let len = usize::try_from(len)
            .map_err(|_| EvlogError::out_of_range("chunk cache size", len))?;

        let mut memory = vec![0_u8; len];
        file.seek(SeekFrom::Start(HEADER_BYTES))?;
        file.read_exact(&mut memory)?;

        let mut slot = self.memory.write();
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(memory);
        debug!(path = %self.path.display(), bytes = len, "cached chunk in memory");
        Ok(true)
    }

    /// Drop the in-memory copy. Returns whether the chunk was cached.
    pub fn uncache_from_memory(&self) -> bool {
        let was_cached = self.memory.write().take().is_some();
        if was_cached {
            debug!(path = %self.path.display(), "uncached chunk from memory");
        }
        was_cached
    }

    /// Refuse new readers; destroy once the current ones are released.
    pub fn dispose(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.disposed = true;
        if lifecycle.readers == 0 && !lifecycle.destroyed {
            self.destroy(&mut lifecycle);
        }
    }

    /// Dispose and delete the file once the last reader is gone.
    pub fn mark_for_deletion(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.disposed = true;
        lifecycle.delete_on_destroy = true;
        if lifecycle.readers > 0 {
            return;
        }
        if lifecycle.destroyed {
            self.delete_file();
        } else {
            self.destroy(&mut lifecycle);
        }
    }

    /// Block until the chunk is destroyed or `timeout` elapses.
    ///
    /// Returns whether the chunk was destroyed.
    pub fn wait_for_destroy(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut lifecycle = self.lifecycle.lock();
        while !lifecycle.destroyed {
            if self
                .destroyed
                .wait_until(&mut lifecycle, deadline)
                .timed_out()
            {
                return lifecycle.destroyed;
            }
        }
        true
    }

    fn destroy(&self, lifecycle: &mut Lifecycle) {
        drop(self.file.lock().take());
        drop(self.memory.write().take());
        if lifecycle.delete_on_destroy {
            self.delete_file();
        }
        lifecycle.destroyed = true;
        self.destroyed.notify_all();
        debug!(
            path = %self.path.display(),
            deleted = lifecycle.delete_on_destroy,
            "destroyed chunk"
        );
    }

    fn delete_file(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            // Switched chunks are renamed away before the old slot is released.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "failed to delete chunk file"
            ),
        }
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(self.disposed_error());
        }
        Ok(())
    }

    fn disposed_error(&self) -> EvlogError {
        EvlogError::ChunkDisposed {
            path: self.path.clone(),
        }
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("path", &self.path)
            .field("chunk_start", &self.header.chunk_start_number)
            .field("chunk_end", &self.header.chunk_end_number)
            .field("data_size", &self.data_size())
            .field("read_only", &self.is_read_only())
            .field("cached", &self.is_cached())
            .finish_non_exhaustive()
    }
}

/// Scoped read access to a chunk. Releasing the last lease of a disposed
/// chunk destroys it.
pub struct ChunkReader {
    chunk: Arc<Chunk>,
}

impl ChunkReader {
    /// Read `len` bytes at `offset` within the data region.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.chunk.read(offset, len)
    }

    #[must_use]
    pub fn chunk(&self) -> &Arc<Chunk> {
        &self.chunk
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        self.chunk.release_reader();
    }
}

impl fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkReader")
            .field("path", &self.chunk.path)
            .finish()
    }
}

fn hash_prefix(file: &mut File, len: u64) -> Result<u64> {
    file.seek(SeekFrom::Start(0))?;
    let mut hasher = Xxh3::new();
    let mut buf = vec![0_u8; HASH_BUFFER_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(HASH_BUFFER_SIZE as u64) as usize;
        file.read_exact(&mut buf[..want])?;
        hasher.update(&buf[..want]);
        remaining -= want as u64;
    }
    Ok(hasher.digest())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_chunk(dir: &Path, chunk_size: u32) -> Arc<Chunk> {
        Chunk::create_new(&dir.join("chunk-000000.000000"), chunk_size, 0, 0, false)
            .expect("create chunk")
    }

    #[test]
    fn append_read_and_fill() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunk = new_chunk(dir.path(), 16);

        assert_eq!(
            chunk.append(b"hello").expect("append"),
            AppendOutcome::Written {
                offset: 0,
                next_offset: 5
            }
        );
        assert_eq!(
            chunk.append(b"world!").expect("append"),
            AppendOutcome::Written {
                offset: 5,
                next_offset: 11
            }
        );
        assert_eq!(
            chunk.append(b"too-long").expect("append"),
            AppendOutcome::ChunkFull
        );
        assert_eq!(chunk.remaining_capacity(), 5);

        let reader = chunk.acquire_reader().expect("reader");
        assert_eq!(reader.read(5, 6).expect("read"), b"world!");
        assert!(reader.read(8, 8).is_err(), "reads past data size fail");
    }

    #[test]
    fn complete_then_reopen_with_hash_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunk = new_chunk(dir.path(), 1_024);
        chunk.append(b"prepare-and-commit").expect("append");
        let footer = chunk.complete().expect("complete");
        assert!(chunk.is_read_only());
        assert_eq!(footer.physical_data_size, 18);
        assert_eq!(chunk.cache_footprint(), 18 + 256);

        let err = chunk.append(b"more").expect_err("sealed");
        assert!(matches!(err, EvlogError::ChunkReadOnly { .. }), "{err}");

        let path = chunk.path().to_path_buf();
        chunk.dispose();
        let reopened = Chunk::from_completed_file(&path, true).expect("reopen");
        assert_eq!(reopened.header(), chunk.header());
        assert_eq!(reopened.footer(), Some(footer));
        let reader = reopened.acquire_reader().expect("reader");
        assert_eq!(reader.read(0, 7).expect("read"), b"prepare");
    }

    #[test]
    fn ongoing_file_is_not_completed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunk = new_chunk(dir.path(), 64);
        chunk.append(b"abc").expect("append");
        let err = Chunk::from_completed_file(chunk.path(), false).expect_err("not sealed");
        assert!(matches!(err, EvlogError::ChunkNotCompleted { .. }), "{err}");
    }

    #[test]
    fn hash_mismatch_is_corruption() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunk = new_chunk(dir.path(), 64);
        chunk.append(b"abcdef").expect("append");
        chunk.complete().expect("complete");
        let path = chunk.path().to_path_buf();
        chunk.dispose();

        let mut bytes = fs::read(&path).expect("read file");
        bytes[CHUNK_HEADER_SIZE + 2] ^= 0xFF;
        fs::write(&path, &bytes).expect("write file");

        Chunk::from_completed_file(&path, false).expect("no verification requested");
        let err = Chunk::from_completed_file(&path, true).expect_err("hash mismatch");
        assert!(err.is_fatal(), "{err}");
    }

    #[test]
    fn scavenged_completion_records_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        let header = ChunkHeader::new(64, 0, 1, true);
        let chunk = Chunk::create_with_header(&dir.path().join("x.tmp"), header, 512)
            .expect("create");
        chunk.append(b"survivor").expect("append");
        let footer = chunk.complete_scavenged(b"posmap!!", 128).expect("complete");
        assert_eq!(footer.map_size, 8);
        assert_eq!(footer.logical_data_size, 128);
        assert_eq!(chunk.cache_footprint(), 8 + 8 + 256);

        let plain = new_chunk(dir.path(), 64);
        assert!(plain.complete_scavenged(b"", 0).is_err());
    }

    #[test]
    fn cache_tracks_appends_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunk = new_chunk(dir.path(), 64);
        chunk.append(b"abc").expect("append");
        assert!(chunk.cache_in_memory().expect("cache"));
        assert!(!chunk.cache_in_memory().expect("cache again"));
        chunk.append(b"def").expect("append");

        let reader = chunk.acquire_reader().expect("reader");
        assert_eq!(reader.read(0, 6).expect("read"), b"abcdef");
        assert!(chunk.uncache_from_memory());
        assert!(!chunk.uncache_from_memory());
        assert_eq!(reader.read(2, 3).expect("read from file"), b"cde");
    }

    #[test]
    fn destroy_waits_for_last_reader() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunk = new_chunk(dir.path(), 64);
        chunk.append(b"abc").expect("append");
        chunk.complete().expect("complete");

        let reader = chunk.acquire_reader().expect("reader");
        chunk.mark_for_deletion();
        assert!(chunk.acquire_reader().is_err(), "no new leases once disposed");
        assert!(!chunk.wait_for_destroy(Duration::from_millis(10)));
        assert!(chunk.path().exists(), "file kept while a lease is open");
        assert_eq!(reader.read(0, 3).expect("old lease still reads"), b"abc");

        drop(reader);
        assert!(chunk.wait_for_destroy(Duration::ZERO));
        assert!(!chunk.path().exists(), "file deleted after last lease");
    }

    #[test]
    fn wait_for_destroy_wakes_on_release_from_other_thread() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunk = new_chunk(dir.path(), 64);
        let reader = chunk.acquire_reader().expect("reader");
        chunk.dispose();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(reader);
        });
        assert!(chunk.wait_for_destroy(Duration::from_secs(5)));
        handle.join().expect("join");
        assert!(chunk.path().exists(), "dispose alone keeps the file");
    }
}
