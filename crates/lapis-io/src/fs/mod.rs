//! Directories backed by a folder on the local filesystem.
//!
//! All backends share file creation, deletion, listing and sync; they
//! differ only in how inputs read:
//!
//! - [`FsKind::Mmap`]: read-only memory mappings.
//! - [`FsKind::Positional`]: explicit-offset reads on one shared descriptor,
//!   so clones read concurrently without locking.
//! - [`FsKind::Simple`]: seek + read on one shared descriptor under a mutex.
//!
//! [`FsDirectory::open`] picks a backend for the current platform.

mod input;
mod mmap;
mod output;

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub use input::FsInput;
pub use mmap::{MMAP_UNMAP_SUPPORTED, MmapInput};
pub use output::{FsOutput, WRITE_CHUNK_SIZE};

use crate::lock::{LockFactory, NativeFsLockFactory};
use crate::{Directory, DirectoryError, IndexInput, IndexOutput, IoContext, Result};
use input::ReadMode;

/// Largest single read issued to the OS. Larger reads are split.
pub const DEFAULT_READ_CHUNK_SIZE: usize = if cfg!(target_pointer_width = "64") {
    i32::MAX as usize
} else {
    100 * 1024 * 1024
};

/// Input buffer size for ordinary reads.
pub const BUFFER_SIZE: usize = 1024;

/// Input buffer size for merge reads.
pub const MERGE_BUFFER_SIZE: usize = 4096;

/// How inputs of an [`FsDirectory`] read their file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsKind {
    Mmap,
    Positional,
    Simple,
}

impl FsKind {
    /// The backend best suited to this platform: memory mapping on 64-bit
    /// non-Windows targets, simple I/O on Windows, positional reads
    /// otherwise.
    pub fn for_platform() -> Self {
        if cfg!(windows) {
            Self::Simple
        } else if cfg!(target_pointer_width = "64") && MMAP_UNMAP_SUPPORTED {
            Self::Mmap
        } else {
            Self::Positional
        }
    }
}

impl fmt::Display for FsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mmap => write!(f, "mmap"),
            Self::Positional => write!(f, "positional"),
            Self::Simple => write!(f, "simple"),
        }
    }
}

/// State shared between a directory and the outputs it created.
#[derive(Debug)]
pub(crate) struct FsShared {
    path: PathBuf,
    /// Files written since they were last synced.
    stale: Mutex<HashSet<String>>,
}

impl FsShared {
    pub(crate) fn mark_stale(&self, name: &str) {
        self.stale_files().insert(name.to_string());
    }

    fn stale_files(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.stale.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A directory of files in one folder on the local filesystem.
///
/// The folder is created lazily by the first `create_output`; until then
/// `list_all` fails with [`DirectoryError::NoSuchDirectory`].
pub struct FsDirectory {
    shared: Arc<FsShared>,
    kind: FsKind,
    read_chunk_size: usize,
    lock_factory: Box<dyn LockFactory>,
    closed: AtomicBool,
}

impl FsDirectory {
    /// Opens `path` with the backend chosen by [`FsKind::for_platform`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_kind(path, FsKind::for_platform())
    }

    /// Opens `path` with an explicit backend and native OS locks.
    pub fn with_kind(path: impl Into<PathBuf>, kind: FsKind) -> Result<Self> {
        let path = path.into();
        if path.exists() && !path.is_dir() {
            return Err(DirectoryError::io(
                path.display().to_string(),
                0,
                io::Error::other("exists but is not a directory"),
            ));
        }
        tracing::info!(path = %path.display(), kind = %kind, "opened filesystem directory");
        Ok(Self {
            lock_factory: Box::new(NativeFsLockFactory::new(&path)),
            shared: Arc::new(FsShared {
                path,
                stale: Mutex::new(HashSet::new()),
            }),
            kind,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            closed: AtomicBool::new(false),
        })
    }

    pub fn with_lock_factory(mut self, lock_factory: impl LockFactory + 'static) -> Self {
        self.lock_factory = Box::new(lock_factory);
        self
    }

    /// Caps the size of a single OS read.
    pub fn with_read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        assert!(read_chunk_size > 0, "read chunk size must be positive");
        self.read_chunk_size = read_chunk_size;
        self
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn kind(&self) -> FsKind {
        self.kind
    }

    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.shared.path.join(name)
    }

    fn metadata(&self, name: &str) -> Result<fs::Metadata> {
        fs::metadata(self.file_path(name)).map_err(|e| map_not_found(name, e))
    }

    fn fsync(&self, name: &str) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.file_path(name))
            .map_err(|e| map_not_found(name, e))?;
        file.sync_all().map_err(|e| DirectoryError::io(name, 0, e))
    }

    #[cfg(unix)]
    fn fsync_dir(&self) -> Result<()> {
        let dir = fs::File::open(&self.shared.path)
            .map_err(|e| DirectoryError::io(self.shared.path.display().to_string(), 0, e))?;
        dir.sync_all()
            .map_err(|e| DirectoryError::io(self.shared.path.display().to_string(), 0, e))
    }

    #[cfg(not(unix))]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn fsync_dir(&self) -> Result<()> {
        Ok(())
    }
}

fn map_not_found(name: &str, e: io::Error) -> DirectoryError {
    if e.kind() == io::ErrorKind::NotFound {
        DirectoryError::not_found(name)
    } else {
        DirectoryError::io(name, 0, e)
    }
}

impl fmt::Debug for FsDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsDirectory")
            .field("path", &self.shared.path)
            .field("kind", &self.kind)
            .field("lock_factory", &self.lock_factory)
            .finish_non_exhaustive()
    }
}

impl Directory for FsDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let entries = match fs::read_dir(&self.shared.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DirectoryError::NoSuchDirectory {
                    path: self.shared.path.clone(),
                });
            }
            Err(e) => {
                return Err(DirectoryError::io(
                    self.shared.path.display().to_string(),
                    0,
                    e,
                ));
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| DirectoryError::io(self.shared.path.display().to_string(), 0, e))?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        match fs::metadata(self.file_path(name)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DirectoryError::io(name, 0, e)),
        }
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.metadata(name)?.len())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        fs::remove_file(self.file_path(name)).map_err(|e| map_not_found(name, e))?;
        self.shared.stale_files().remove(name);
        Ok(())
    }

    fn create_output(&self, name: &str, _ctx: &IoContext) -> Result<Box<dyn IndexOutput>> {
        self.ensure_open()?;
        fs::create_dir_all(&self.shared.path)
            .map_err(|e| DirectoryError::io(self.shared.path.display().to_string(), 0, e))?;

        let path = self.file_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(DirectoryError::io(name, 0, e)),
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| DirectoryError::io(name, 0, e))?;
        Ok(Box::new(FsOutput::new(name, file, Arc::clone(&self.shared))))
    }

    fn open_input(&self, name: &str, ctx: &IoContext) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        let path = self.file_path(name);
        let description = format!("{}(path=\"{}\")", name, path.display());
        let buffer_size = if ctx.is_merge() {
            MERGE_BUFFER_SIZE
        } else {
            BUFFER_SIZE
        };
        let input: Box<dyn IndexInput> = match self.kind {
            FsKind::Mmap => Box::new(MmapInput::open(&path, description)?),
            FsKind::Positional => Box::new(FsInput::open(
                &path,
                description,
                ReadMode::Positional,
                buffer_size,
                self.read_chunk_size,
            )?),
            FsKind::Simple => Box::new(FsInput::open(
                &path,
                description,
                ReadMode::Seek,
                buffer_size,
                self.read_chunk_size,
            )?),
        };
        Ok(input)
    }

    fn sync(&self, names: &[&str]) -> Result<()> {
        self.ensure_open()?;
        let to_sync: Vec<String> = {
            let stale = self.shared.stale_files();
            names
                .iter()
                .filter(|n| stale.contains(**n))
                .map(|n| (*n).to_string())
                .collect()
        };
        if to_sync.is_empty() {
            return Ok(());
        }

        for name in &to_sync {
            self.fsync(name)?;
            self.shared.stale_files().remove(name);
        }
        self.fsync_dir()?;
        tracing::debug!(files = to_sync.len(), path = %self.shared.path.display(), "synced files");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DirectoryError::closed(format!(
                "FsDirectory({})",
                self.shared.path.display()
            )));
        }
        tracing::info!(path = %self.shared.path.display(), "closed filesystem directory");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DirectoryError::closed(format!(
                "FsDirectory({})",
                self.shared.path.display()
            )));
        }
        Ok(())
    }

    fn lock_factory(&self) -> &dyn LockFactory {
        self.lock_factory.as_ref()
    }

    fn lock_id(&self) -> String {
        format!("fs-{}", self.shared.path.display())
    }
}
