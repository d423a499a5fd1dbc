//! Chunked heap storage for one file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

/// Chunk size for newly written RAM files.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Default)]
struct Blocks {
    buffers: Vec<Box<[u8]>>,
    /// Byte counter of the owning directory; `None` once detached.
    directory: Option<Arc<AtomicU64>>,
}

/// A file's bytes held as an ordered list of fixed-size chunks.
///
/// The chunk size is fixed when the file is created; cursors derive the
/// chunk index and offset of a file pointer from it. Buffer mutation is
/// serialised per file, so any number of readers may share a file while a
/// single writer appends to it.
#[derive(Debug)]
pub struct RamFile {
    chunk_size: usize,
    blocks: RwLock<Blocks>,
    length: AtomicU64,
    size_in_bytes: AtomicU64,
    last_modified: Mutex<SystemTime>,
}

impl RamFile {
    /// Creates a file that belongs to no directory.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            chunk_size,
            blocks: RwLock::new(Blocks::default()),
            length: AtomicU64::new(0),
            size_in_bytes: AtomicU64::new(0),
            last_modified: Mutex::new(SystemTime::now()),
        }
    }

    /// Creates a file whose allocations are charged to `directory_bytes`.
    pub(crate) fn attached(chunk_size: usize, directory_bytes: Arc<AtomicU64>) -> Self {
        let file = Self::new(chunk_size);
        file.write_blocks().directory = Some(directory_bytes);
        file
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Committed length in bytes.
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    pub(crate) fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Release);
        *self
            .last_modified
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = SystemTime::now();
    }

    pub fn last_modified(&self) -> SystemTime {
        *self
            .last_modified
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes allocated for this file's chunks.
    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes.load(Ordering::Relaxed)
    }

    pub fn num_buffers(&self) -> usize {
        self.read_blocks().buffers.len()
    }

    /// Appends a zeroed chunk of `size` bytes and returns its index.
    ///
    /// `size` is added to this file's byte total and, while attached, to the
    /// owning directory's.
    pub(crate) fn add_buffer(&self, size: usize) -> usize {
        let mut blocks = self.write_blocks();
        blocks.buffers.push(vec![0u8; size].into_boxed_slice());
        self.size_in_bytes.fetch_add(size as u64, Ordering::Relaxed);
        if let Some(directory) = &blocks.directory {
            directory.fetch_add(size as u64, Ordering::Relaxed);
        }
        blocks.buffers.len() - 1
    }

    /// Copies `src` into chunk `index` starting at `offset`.
    pub(crate) fn write_block(&self, index: usize, offset: usize, src: &[u8]) {
        let mut blocks = self.write_blocks();
        blocks.buffers[index][offset..offset + src.len()].copy_from_slice(src);
    }

    /// Fills `dst` from chunk `index` starting at `offset`.
    pub(crate) fn read_block(&self, index: usize, offset: usize, dst: &mut [u8]) {
        let blocks = self.read_blocks();
        dst.copy_from_slice(&blocks.buffers[index][offset..offset + dst.len()]);
    }

    /// Stops charging this file to its directory and gives back everything
    /// it was charged. Returns the bytes released.
    pub(crate) fn detach(&self) -> u64 {
        let mut blocks = self.write_blocks();
        let size = self.size_in_bytes();
        if let Some(directory) = blocks.directory.take() {
            directory.fetch_sub(size, Ordering::Relaxed);
        }
        size
    }

    fn read_blocks(&self) -> std::sync::RwLockReadGuard<'_, Blocks> {
        self.blocks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_blocks(&self) -> std::sync::RwLockWriteGuard<'_, Blocks> {
        self.blocks.write().unwrap_or_else(PoisonError::into_inner)
    }
}
