//! lapis-nrt: Near-real-time caching for Lapis directories
//!
//! [`NrtCachingDirectory`] wraps a persistent directory and keeps small,
//! freshly written files in a [`RamDirectory`] until they are synced. A
//! reopened reader can see a just-flushed segment without waiting for it
//! to reach disk.
//!
//! # Admission
//!
//! Each new file is placed independently. It goes to the RAM tier when:
//!
//! - its name is not the configured generation file,
//! - the size estimate in its [`IoContext`] is at most
//!   `max_merge_size_bytes`, and
//! - the estimate plus the bytes already cached is at most
//!   `max_cached_bytes`.
//!
//! Everything else is written straight to the delegate.
//!
//! # Promotion
//!
//! `sync` and `close` copy cached files to the delegate ("uncache") and
//! drop them from RAM. A name is never present in both tiers at once.
//!
//! # Example
//!
//! ```
//! use lapis_io::{Directory, IoContext, RamDirectory};
//! use lapis_nrt::{NrtCachingConfig, NrtCachingDirectory};
//!
//! let nrt = NrtCachingDirectory::new(
//!     RamDirectory::new(),
//!     NrtCachingConfig::from_megabytes(5.0, 60.0),
//! );
//!
//! let mut out = nrt.create_output("_0.cfs", &IoContext::flush(1024)).unwrap();
//! out.write_bytes(b"segment").unwrap();
//! out.close().unwrap();
//! assert_eq!(nrt.list_cached_files().unwrap(), vec!["_0.cfs"]);
//!
//! nrt.sync(&["_0.cfs"]).unwrap();
//! assert!(nrt.list_cached_files().unwrap().is_empty());
//! assert!(nrt.delegate().file_exists("_0.cfs").unwrap());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lapis_io::lock::LockFactory;
use lapis_io::{
    Directory, DirectoryError, IndexInput, IndexOutput, IoContext, RamDirectory, Result,
};

/// Name of the file recording the current commit generation. Never cached.
pub const DEFAULT_GENERATION_FILE: &str = "segments.gen";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Serialises promotions across every caching directory in the process,
/// bounding the extra memory a copy in flight can use.
static UNCACHE_LOCK: Mutex<()> = Mutex::new(());

// ============================================================================
// Configuration
// ============================================================================

/// Admission thresholds for an [`NrtCachingDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NrtCachingConfig {
    /// Files whose size estimate exceeds this go straight to the delegate.
    pub max_merge_size_bytes: u64,
    /// Upper bound on bytes held in the RAM tier.
    pub max_cached_bytes: u64,
    /// File that must always be written to the delegate.
    pub generation_file: String,
}

impl NrtCachingConfig {
    /// Builds a config from thresholds in megabytes.
    pub fn from_megabytes(max_merge_size_mb: f64, max_cached_mb: f64) -> Self {
        Self {
            max_merge_size_bytes: megabytes_to_bytes(max_merge_size_mb),
            max_cached_bytes: megabytes_to_bytes(max_cached_mb),
            generation_file: DEFAULT_GENERATION_FILE.to_string(),
        }
    }

    pub fn with_generation_file(mut self, generation_file: impl Into<String>) -> Self {
        self.generation_file = generation_file.into();
        self
    }
}

impl Default for NrtCachingConfig {
    fn default() -> Self {
        Self::from_megabytes(5.0, 60.0)
    }
}

fn megabytes_to_bytes(mb: f64) -> u64 {
    if mb.is_nan() || mb <= 0.0 {
        return 0;
    }
    // `as` saturates for values beyond u64::MAX.
    (mb * BYTES_PER_MB) as u64
}

// ============================================================================
// Caching Directory
// ============================================================================

/// A directory that keeps small new files in RAM until they are synced.
///
/// Reads check the RAM tier first and the delegate second. Locks are the
/// delegate's.
pub struct NrtCachingDirectory<D: Directory> {
    delegate: D,
    cache: RamDirectory,
    config: NrtCachingConfig,
    /// Guards the check-then-create and check-then-delete sequences that
    /// keep a name in at most one tier.
    state: Mutex<()>,
    closed: AtomicBool,
}

impl<D: Directory> NrtCachingDirectory<D> {
    pub fn new(delegate: D, config: NrtCachingConfig) -> Self {
        tracing::info!(
            delegate = ?delegate,
            max_merge_size_bytes = config.max_merge_size_bytes,
            max_cached_bytes = config.max_cached_bytes,
            "opened caching directory"
        );
        Self {
            delegate,
            cache: RamDirectory::new(),
            config,
            state: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn config(&self) -> &NrtCachingConfig {
        &self.config
    }

    /// Names of the files currently held only in RAM.
    pub fn list_cached_files(&self) -> Result<Vec<String>> {
        let mut names = self.cache.list_all()?;
        names.sort();
        Ok(names)
    }

    /// Bytes allocated by the RAM tier.
    pub fn cached_size_in_bytes(&self) -> u64 {
        self.cache.size_in_bytes()
    }

    /// Decides whether a new file named `name` should be written to RAM.
    ///
    /// A pure function of the name, the context's size estimate and the
    /// bytes cached right now.
    pub fn do_cache_write(&self, name: &str, ctx: &IoContext) -> bool {
        if name == self.config.generation_file {
            return false;
        }
        let estimated = ctx.estimated_size();
        estimated <= self.config.max_merge_size_bytes
            && estimated.saturating_add(self.cache.size_in_bytes())
                <= self.config.max_cached_bytes
    }

    fn lock_state(&self) -> MutexGuard<'_, ()> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies a cached file to the delegate and drops it from RAM.
    ///
    /// No-op if the file is no longer cached. Fails with
    /// [`DirectoryError::InvariantViolation`] if the delegate already holds
    /// a file of the same name.
    fn uncache(&self, name: &str) -> Result<()> {
        let _promotion = UNCACHE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.cache.file_exists(name)? {
            return Ok(());
        }
        if self.delegate.file_exists(name)? {
            return Err(DirectoryError::InvariantViolation(format!(
                "cannot uncache {name}: delegate already has a file of that name"
            )));
        }

        let bytes = self.cache.file_length(name)?;
        self.cache
            .copy_to(&self.delegate, name, name, &IoContext::merge(bytes))?;

        let _state = self.lock_state();
        self.cache.delete_file(name)?;
        tracing::info!(name = %name, bytes, "promoted cached file to delegate");
        Ok(())
    }
}

fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

impl<D: Directory> Directory for NrtCachingDirectory<D> {
    fn list_all(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let cached = self.cache.list_all()?;
        let mut names: BTreeSet<String> = cached.iter().cloned().collect();
        match self.delegate.list_all() {
            Ok(persisted) => names.extend(persisted),
            Err(DirectoryError::NoSuchDirectory { path }) if !cached.is_empty() => {
                // A new index whose only files are still in RAM.
                tracing::warn!(
                    path = %path.display(),
                    cached = cached.len(),
                    "delegate location does not exist yet, listing cached files only"
                );
            }
            Err(e) => return Err(e),
        }
        Ok(names.into_iter().collect())
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.cache.file_exists(name)? || self.delegate.file_exists(name)?)
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        match self.cache.file_length(name) {
            Err(e) if e.is_not_found() => self.delegate.file_length(name),
            other => other,
        }
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let _state = self.lock_state();
        if self.cache.file_exists(name)? {
            self.cache.delete_file(name)
        } else {
            self.delegate.delete_file(name)
        }
    }

    fn create_output(&self, name: &str, ctx: &IoContext) -> Result<Box<dyn IndexOutput>> {
        self.ensure_open()?;
        let cache_write = self.do_cache_write(name, ctx);
        tracing::debug!(
            name = %name,
            estimated = ctx.estimated_size(),
            cached_bytes = self.cache.size_in_bytes(),
            cache_write,
            "placing new file"
        );

        let _state = self.lock_state();
        if cache_write {
            ignore_not_found(self.delegate.delete_file(name))?;
            self.cache.create_output(name, ctx)
        } else {
            ignore_not_found(self.cache.delete_file(name))?;
            self.delegate.create_output(name, ctx)
        }
    }

    fn open_input(&self, name: &str, ctx: &IoContext) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        match self.cache.open_input(name, ctx) {
            Err(e) if e.is_not_found() => self.delegate.open_input(name, ctx),
            other => other,
        }
    }

    fn sync(&self, names: &[&str]) -> Result<()> {
        self.ensure_open()?;
        for name in names {
            self.uncache(name)?;
        }
        self.delegate.sync(names)
    }

    fn close(&self) -> Result<()> {
        self.ensure_open()?;
        for name in self.cache.list_all()? {
            self.uncache(&name)?;
        }
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DirectoryError::closed("NrtCachingDirectory"));
        }
        // Both tiers are closed even when the first one fails.
        let cache = self.cache.close();
        let delegate = self.delegate.close();
        if let Err(e) = &cache {
            tracing::warn!(error = %e, "failed to close cache tier");
        }
        tracing::info!(delegate = ?self.delegate, "closed caching directory");
        cache.and(delegate)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DirectoryError::closed("NrtCachingDirectory"));
        }
        Ok(())
    }

    fn lock_factory(&self) -> &dyn LockFactory {
        self.delegate.lock_factory()
    }

    fn lock_id(&self) -> String {
        self.delegate.lock_id()
    }
}

impl<D: Directory> fmt::Display for NrtCachingDirectory<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NrtCachingDirectory({:?}; max_cache_mb={:.1} max_merge_size_mb={:.1})",
            self.delegate,
            self.config.max_cached_bytes as f64 / BYTES_PER_MB,
            self.config.max_merge_size_bytes as f64 / BYTES_PER_MB,
        )
    }
}

impl<D: Directory> fmt::Debug for NrtCachingDirectory<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NrtCachingDirectory")
            .field("cache", &self.cache)
            .field("delegate", &self.delegate)
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
