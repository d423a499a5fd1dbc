//! Heap-resident directory.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::lock::{LockFactory, SingleInstanceLockFactory};
use crate::ram::{DEFAULT_CHUNK_SIZE, RamFile, RamInput, RamOutput};
use crate::{Directory, DirectoryError, IndexInput, IndexOutput, IoContext, Result};

static NEXT_DIRECTORY_ID: AtomicU64 = AtomicU64::new(1);

/// A directory whose files live entirely on the heap.
///
/// Tracks the bytes allocated across all of its files in an atomic counter
/// ([`size_in_bytes`](Self::size_in_bytes)). The counter is advisory: it is
/// what a caching layer budgets against, and nothing here relies on it for
/// correctness.
///
/// Replacing or deleting a file detaches the old [`RamFile`] from the map
/// and from the counter without touching its bytes, so inputs opened on it
/// keep reading what they were opened on.
pub struct RamDirectory {
    id: u64,
    files: RwLock<HashMap<String, Arc<RamFile>>>,
    size_in_bytes: Arc<AtomicU64>,
    chunk_size: usize,
    lock_factory: Box<dyn LockFactory>,
    closed: AtomicBool,
}

impl RamDirectory {
    /// Creates an empty directory with 1 KiB chunks and in-process locks.
    pub fn new() -> Self {
        Self {
            id: NEXT_DIRECTORY_ID.fetch_add(1, Ordering::Relaxed),
            files: RwLock::new(HashMap::new()),
            size_in_bytes: Arc::new(AtomicU64::new(0)),
            chunk_size: DEFAULT_CHUNK_SIZE,
            lock_factory: Box::new(SingleInstanceLockFactory::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Sets the chunk size used for files created from now on.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_lock_factory(mut self, lock_factory: impl LockFactory + 'static) -> Self {
        self.lock_factory = Box::new(lock_factory);
        self
    }

    /// Creates a directory holding a copy of every file in `dir`.
    pub fn from_directory(dir: &dyn Directory, ctx: &IoContext) -> Result<Self> {
        let ram = Self::new();
        for name in dir.list_all()? {
            dir.copy_to(&ram, &name, &name, ctx)?;
        }
        tracing::debug!(
            files = ram.file_count(),
            bytes = ram.size_in_bytes(),
            "loaded directory into memory"
        );
        Ok(ram)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes currently allocated across all files.
    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes.load(Ordering::Relaxed)
    }

    fn file_count(&self) -> usize {
        self.read_files().len()
    }

    fn read_files(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<RamFile>>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_files(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<RamFile>>> {
        self.files.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn file(&self, name: &str) -> Result<Arc<RamFile>> {
        self.read_files()
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::not_found(name))
    }
}

impl Default for RamDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RamDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamDirectory")
            .field("id", &self.id)
            .field("files", &self.file_count())
            .field("size_in_bytes", &self.size_in_bytes())
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl Directory for RamDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.read_files().keys().cloned().collect())
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.read_files().contains_key(name))
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.file(name)?.length())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let removed = self.write_files().remove(name);
        match removed {
            Some(file) => {
                file.detach();
                Ok(())
            }
            None => Err(DirectoryError::not_found(name)),
        }
    }

    fn create_output(&self, name: &str, _ctx: &IoContext) -> Result<Box<dyn IndexOutput>> {
        self.ensure_open()?;
        let file = Arc::new(RamFile::attached(
            self.chunk_size,
            Arc::clone(&self.size_in_bytes),
        ));
        let previous = self
            .write_files()
            .insert(name.to_string(), Arc::clone(&file));
        if let Some(previous) = previous {
            previous.detach();
        }
        Ok(Box::new(RamOutput::new(name, file)))
    }

    fn open_input(&self, name: &str, _ctx: &IoContext) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        Ok(Box::new(RamInput::new(name, self.file(name)?)))
    }

    fn sync(&self, _names: &[&str]) -> Result<()> {
        // Nothing in RAM can be made durable.
        self.ensure_open()
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DirectoryError::closed(format!("RamDirectory({})", self.id)));
        }
        for (_, file) in self.write_files().drain() {
            file.detach();
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DirectoryError::closed(format!("RamDirectory({})", self.id)));
        }
        Ok(())
    }

    fn lock_factory(&self) -> &dyn LockFactory {
        self.lock_factory.as_ref()
    }

    fn lock_id(&self) -> String {
        format!("ram-{:x}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &RamDirectory, name: &str, data: &[u8]) {
        let mut out = dir.create_output(name, &IoContext::Default).unwrap();
        out.write_bytes(data).unwrap();
        out.close().unwrap();
    }

    #[test]
    fn create_read_delete() {
        let dir = RamDirectory::new();
        write(&dir, "a", b"hello");

        assert!(dir.file_exists("a").unwrap());
        assert_eq!(dir.file_length("a").unwrap(), 5);
        assert_eq!(dir.list_all().unwrap(), vec!["a".to_string()]);

        dir.delete_file("a").unwrap();
        assert!(!dir.file_exists("a").unwrap());
        assert!(dir.file_length("a").unwrap_err().is_not_found());
        assert!(dir.delete_file("a").unwrap_err().is_not_found());
        assert!(dir.open_input("a", &IoContext::Default).unwrap_err().is_not_found());
    }

    #[test]
    fn accounting_follows_allocation_and_delete() {
        let dir = RamDirectory::new().with_chunk_size(10);
        write(&dir, "a", &[0u8; 25]);
        assert_eq!(dir.size_in_bytes(), 30);

        write(&dir, "b", &[0u8; 10]);
        assert_eq!(dir.size_in_bytes(), 40);

        dir.delete_file("a").unwrap();
        assert_eq!(dir.size_in_bytes(), 10);
    }

    #[test]
    fn recreate_releases_old_bytes_and_keeps_orphan_readable() {
        let dir = RamDirectory::new().with_chunk_size(4);
        write(&dir, "seg", b"old contents");
        let mut old = dir.open_input("seg", &IoContext::Default).unwrap();

        write(&dir, "seg", b"new");
        assert_eq!(dir.size_in_bytes(), 4);
        assert_eq!(dir.file_length("seg").unwrap(), 3);

        let mut buf = vec![0u8; 12];
        old.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"old contents");
    }

    #[test]
    fn closed_directory_rejects_everything() {
        let dir = RamDirectory::new();
        write(&dir, "a", b"x");
        dir.close().unwrap();

        assert_eq!(dir.size_in_bytes(), 0);
        assert!(matches!(
            dir.list_all(),
            Err(DirectoryError::AlreadyClosed { .. })
        ));
        assert!(dir.create_output("b", &IoContext::Default).is_err());
        assert!(dir.close().is_err());
    }

    #[test]
    fn from_directory_copies_files() {
        let src = RamDirectory::new();
        write(&src, "a", b"alpha");
        write(&src, "b", b"beta");

        let copy = RamDirectory::from_directory(&src, &IoContext::Default).unwrap();
        let mut names = copy.list_all().unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(copy.file_length("b").unwrap(), 4);
    }
}
