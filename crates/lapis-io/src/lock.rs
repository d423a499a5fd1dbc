//! Named advisory locks scoped to a directory.
//!
//! A [`LockFactory`] hands out [`Lock`]s by name. Locks are released when
//! dropped, so holding one is scoped the same way any other guard is.
//!
//! - [`SingleInstanceLockFactory`]: in-process only; the default for RAM
//!   directories.
//! - [`NativeFsLockFactory`]: OS advisory lock on a lock file; the default
//!   for filesystem directories. Not usable across machines.
//! - [`NoLockFactory`]: every lock always succeeds.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::{DirectoryError, Result};

/// How long [`Lock::obtain_timeout`] sleeps between attempts.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// A named mutual-exclusion token.
pub trait Lock: Send + fmt::Debug {
    /// Attempts to obtain the lock without waiting. Returns `false` if
    /// someone else holds it.
    fn obtain(&mut self) -> Result<bool>;

    /// Releases the lock if this instance holds it.
    fn release(&mut self) -> Result<()>;

    /// True if anyone currently holds the lock.
    fn is_locked(&self) -> Result<bool>;

    /// Polls [`obtain`](Self::obtain) until it succeeds or `timeout` elapses.
    fn obtain_timeout(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.obtain()? {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DirectoryError::LockObtainFailed {
                    name: format!("{self:?}"),
                });
            }
            thread::sleep(LOCK_POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Creates locks for one directory.
pub trait LockFactory: Send + Sync + fmt::Debug {
    /// Returns a new, not yet obtained, lock.
    fn make_lock(&self, name: &str) -> Box<dyn Lock>;

    /// Forcibly removes a lock, whether or not anyone holds it.
    fn clear_lock(&self, name: &str) -> Result<()>;

    /// Prefix prepended to lock names, so directories sharing a lock
    /// location do not collide.
    fn lock_prefix(&self) -> Option<String>;

    fn set_lock_prefix(&self, prefix: Option<String>);
}

#[derive(Debug, Default)]
struct LockPrefix(RwLock<Option<String>>);

impl LockPrefix {
    fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, prefix: Option<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = prefix;
    }

    fn qualify(&self, name: &str) -> String {
        match self.get() {
            Some(prefix) => format!("{prefix}-{name}"),
            None => name.to_string(),
        }
    }
}

// ============================================================================
// Single instance
// ============================================================================

/// In-process locks backed by a shared set of held names.
#[derive(Debug, Default)]
pub struct SingleInstanceLockFactory {
    held: Arc<Mutex<HashSet<String>>>,
    prefix: LockPrefix,
}

impl SingleInstanceLockFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockFactory for SingleInstanceLockFactory {
    fn make_lock(&self, name: &str) -> Box<dyn Lock> {
        Box::new(SingleInstanceLock {
            name: self.prefix.qualify(name),
            held: Arc::clone(&self.held),
            obtained: false,
        })
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        let name = self.prefix.qualify(name);
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name);
        Ok(())
    }

    fn lock_prefix(&self) -> Option<String> {
        self.prefix.get()
    }

    fn set_lock_prefix(&self, prefix: Option<String>) {
        self.prefix.set(prefix);
    }
}

#[derive(Debug)]
struct SingleInstanceLock {
    name: String,
    held: Arc<Mutex<HashSet<String>>>,
    obtained: bool,
}

impl Lock for SingleInstanceLock {
    fn obtain(&mut self) -> Result<bool> {
        if self.obtained {
            return Ok(false);
        }
        let inserted = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.name.clone());
        self.obtained = inserted;
        Ok(inserted)
    }

    fn release(&mut self) -> Result<()> {
        if self.obtained {
            self.held
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.name);
            self.obtained = false;
        }
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&self.name))
    }
}

impl Drop for SingleInstanceLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// ============================================================================
// No-op
// ============================================================================

/// A factory whose locks always succeed. Only safe when the caller already
/// guarantees exclusive access by other means.
#[derive(Debug, Default)]
pub struct NoLockFactory;

impl LockFactory for NoLockFactory {
    fn make_lock(&self, _name: &str) -> Box<dyn Lock> {
        Box::new(NoLock)
    }

    fn clear_lock(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn lock_prefix(&self) -> Option<String> {
        None
    }

    fn set_lock_prefix(&self, _prefix: Option<String>) {}
}

#[derive(Debug)]
struct NoLock;

impl Lock for NoLock {
    fn obtain(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(false)
    }
}

// ============================================================================
// Native filesystem
// ============================================================================

/// Lock files held by this process. OS advisory locks are not reliably
/// exclusive between two handles in the same process on every platform.
static LOCK_HELD: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// OS advisory locks on files inside `lock_dir`.
///
/// The lock is tied to the open file handle, so a crashed process never
/// leaves a lock behind; a stale lock file on disk is harmless.
#[derive(Debug)]
pub struct NativeFsLockFactory {
    lock_dir: PathBuf,
    prefix: LockPrefix,
}

impl NativeFsLockFactory {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            prefix: LockPrefix::default(),
        }
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }
}

impl LockFactory for NativeFsLockFactory {
    fn make_lock(&self, name: &str) -> Box<dyn Lock> {
        Box::new(NativeFsLock {
            lock_dir: self.lock_dir.clone(),
            path: self.lock_dir.join(self.prefix.qualify(name)),
            file: None,
        })
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        let path = self.lock_dir.join(self.prefix.qualify(name));
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DirectoryError::io(path.display().to_string(), 0, e)),
        }
    }

    fn lock_prefix(&self) -> Option<String> {
        self.prefix.get()
    }

    fn set_lock_prefix(&self, prefix: Option<String>) {
        self.prefix.set(prefix);
    }
}

struct NativeFsLock {
    lock_dir: PathBuf,
    path: PathBuf,
    file: Option<File>,
}

impl fmt::Debug for NativeFsLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFsLock@{}", self.path.display())
    }
}

impl NativeFsLock {
    fn io_err(&self, e: std::io::Error) -> DirectoryError {
        DirectoryError::io(self.path.display().to_string(), 0, e)
    }

    fn held_set() -> std::sync::MutexGuard<'static, HashSet<PathBuf>> {
        LOCK_HELD.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Lock for NativeFsLock {
    fn obtain(&mut self) -> Result<bool> {
        if self.file.is_some() {
            return Ok(false);
        }

        fs::create_dir_all(&self.lock_dir).map_err(|e| self.io_err(e))?;

        if !Self::held_set().insert(self.path.clone()) {
            // Another lock instance in this process holds it.
            return Ok(false);
        }

        let file = match OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) => {
                Self::held_set().remove(&self.path);
                return Err(self.io_err(e));
            }
        };

        match file.try_lock() {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "obtained native lock");
                self.file = Some(file);
                Ok(true)
            }
            Err(TryLockError::WouldBlock) => {
                Self::held_set().remove(&self.path);
                Ok(false)
            }
            Err(TryLockError::Error(e)) => {
                Self::held_set().remove(&self.path);
                Err(self.io_err(e))
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let unlocked = file.unlock();
        drop(file);
        Self::held_set().remove(&self.path);

        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove released lock file"
            );
        }
        unlocked.map_err(|e| self.io_err(e))
    }

    fn is_locked(&self) -> Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        if !self.path.exists() {
            return Ok(false);
        }
        let mut probe = NativeFsLock {
            lock_dir: self.lock_dir.clone(),
            path: self.path.clone(),
            file: None,
        };
        let obtained = probe.obtain()?;
        // Probe releases on drop.
        Ok(!obtained)
    }
}

impl Drop for NativeFsLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_instance_lock_is_exclusive() {
        let factory = SingleInstanceLockFactory::new();
        let mut a = factory.make_lock("write.lock");
        let mut b = factory.make_lock("write.lock");

        assert!(a.obtain().unwrap());
        assert!(!b.obtain().unwrap());
        assert!(b.is_locked().unwrap());

        a.release().unwrap();
        assert!(b.obtain().unwrap());
    }

    #[test]
    fn single_instance_lock_released_on_drop() {
        let factory = SingleInstanceLockFactory::new();
        {
            let mut a = factory.make_lock("write.lock");
            assert!(a.obtain().unwrap());
        }
        let mut b = factory.make_lock("write.lock");
        assert!(b.obtain().unwrap());
    }

    #[test]
    fn lock_prefix_separates_names() {
        let factory = SingleInstanceLockFactory::new();
        let mut a = factory.make_lock("write.lock");
        assert!(a.obtain().unwrap());

        factory.set_lock_prefix(Some("other".to_string()));
        assert_eq!(factory.lock_prefix().as_deref(), Some("other"));
        let mut b = factory.make_lock("write.lock");
        assert!(b.obtain().unwrap());
    }

    #[test]
    fn obtain_timeout_fails_when_held() {
        let factory = SingleInstanceLockFactory::new();
        let mut a = factory.make_lock("write.lock");
        assert!(a.obtain().unwrap());

        let mut b = factory.make_lock("write.lock");
        let result = b.obtain_timeout(Duration::ZERO);
        assert!(matches!(result, Err(DirectoryError::LockObtainFailed { .. })));
    }

    #[test]
    fn native_lock_is_exclusive_within_process() {
        let dir = tempfile::tempdir().unwrap();
        let factory = NativeFsLockFactory::new(dir.path());

        let mut a = factory.make_lock("write.lock");
        let mut b = factory.make_lock("write.lock");
        assert!(a.obtain().unwrap());
        assert!(!b.obtain().unwrap());
        assert!(b.is_locked().unwrap());

        a.release().unwrap();
        assert!(!dir.path().join("write.lock").exists());
        assert!(!b.is_locked().unwrap());
        assert!(b.obtain().unwrap());
    }

    #[test]
    fn native_clear_lock_removes_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let factory = NativeFsLockFactory::new(dir.path());
        std::fs::write(dir.path().join("write.lock"), b"").unwrap();

        factory.clear_lock("write.lock").unwrap();
        assert!(!dir.path().join("write.lock").exists());
        // Clearing an absent lock is not an error.
        factory.clear_lock("write.lock").unwrap();
    }

    #[test]
    fn no_lock_always_obtains() {
        let factory = NoLockFactory;
        let mut a = factory.make_lock("x");
        let mut b = factory.make_lock("x");
        assert!(a.obtain().unwrap());
        assert!(b.obtain().unwrap());
        assert!(!a.is_locked().unwrap());
    }
}
