//! The directory contract: a flat namespace of named byte-blob files.

use std::fmt;
use std::sync::Arc;

use crate::lock::{Lock, LockFactory};
use crate::{DirectoryError, IndexInput, IndexOutput, IoContext, Result};

/// A flat namespace of named, write-once files.
///
/// A file is created with [`create_output`](Self::create_output), written
/// sequentially, closed, and from then on only read. Every operation is
/// independently thread-safe; a single file must only ever have one writer.
///
/// After [`close`](Self::close) every operation, including a second
/// `close`, fails with [`DirectoryError::AlreadyClosed`].
pub trait Directory: Send + Sync + fmt::Debug {
    /// Names of every file in the directory, in no particular order.
    fn list_all(&self) -> Result<Vec<String>>;

    fn file_exists(&self, name: &str) -> Result<bool>;

    /// Length of a file in bytes. Fails with `NotFound` if absent.
    fn file_length(&self, name: &str) -> Result<u64>;

    /// Removes a file. Fails with `NotFound` if absent.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Creates a new file, first releasing any previous file of that name.
    fn create_output(&self, name: &str, ctx: &IoContext) -> Result<Box<dyn IndexOutput>>;

    /// Opens a file for reading. Fails with `NotFound` if absent.
    fn open_input(&self, name: &str, ctx: &IoContext) -> Result<Box<dyn IndexInput>>;

    /// Makes all writes to `names` durable.
    fn sync(&self, names: &[&str]) -> Result<()>;

    /// Releases all resources held by the directory.
    fn close(&self) -> Result<()>;

    /// Fails with `AlreadyClosed` once the directory has been closed.
    fn ensure_open(&self) -> Result<()>;

    /// The factory that creates this directory's locks.
    fn lock_factory(&self) -> &dyn LockFactory;

    /// Identifies this directory instance; two directories with the same id
    /// share lock namespace.
    fn lock_id(&self) -> String;

    /// Creates (but does not obtain) a lock scoped to this directory.
    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        self.ensure_open()?;
        Ok(self.lock_factory().make_lock(name))
    }

    /// Forcibly removes a lock, whether or not anyone holds it.
    fn clear_lock(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.lock_factory().clear_lock(name)
    }

    /// Opens a file once and hands out bounded slices over it.
    fn create_slicer(&self, name: &str, ctx: &IoContext) -> Result<IndexInputSlicer> {
        self.ensure_open()?;
        Ok(IndexInputSlicer::new(self.open_input(name, ctx)?))
    }

    /// Copies `src` from this directory to `dest_name` in `dest`.
    ///
    /// On failure the partially written destination is deleted.
    fn copy_to(
        &self,
        dest: &dyn Directory,
        src: &str,
        dest_name: &str,
        ctx: &IoContext,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut input = self.open_input(src, ctx)?;
        let mut out = match dest.create_output(dest_name, ctx) {
            Ok(out) => out,
            Err(e) => {
                let _ = input.close();
                return Err(e);
            }
        };

        let length = input.length();
        let copied = input.copy_bytes(out.as_mut(), length);
        let closed_out = out.close();
        let closed_in = input.close();

        let result = copied.and(closed_out).and(closed_in);
        if result.is_err() {
            if let Err(e) = dest.delete_file(dest_name) {
                tracing::warn!(
                    name = %dest_name,
                    error = %e,
                    "failed to remove partial copy"
                );
            }
        }
        result
    }
}

/// Hands out bounded slices over a single opened file.
#[derive(Debug)]
pub struct IndexInputSlicer {
    base: Box<dyn IndexInput>,
    closed: bool,
}

impl IndexInputSlicer {
    pub fn new(base: Box<dyn IndexInput>) -> Self {
        Self {
            base,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DirectoryError::closed(format!("slicer({})", self.base.name())));
        }
        Ok(())
    }

    /// A cursor over `[offset, offset + length)` of the underlying file.
    pub fn open_slice(
        &self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        self.base.slice(description, offset, length)
    }

    /// A cursor over the whole underlying file, positioned at 0.
    pub fn open_full_slice(&self) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        let mut full = self.base.clone_input()?;
        full.seek(0)?;
        Ok(full)
    }

    /// Closes the underlying input. Slices already handed out keep working
    /// only if their backend lets clones outlive the root.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.base.close()
    }
}

macro_rules! forward_directory {
    ($ty:ty) => {
        impl<T: Directory + ?Sized> Directory for $ty {
            fn list_all(&self) -> Result<Vec<String>> {
                (**self).list_all()
            }
            fn file_exists(&self, name: &str) -> Result<bool> {
                (**self).file_exists(name)
            }
            fn file_length(&self, name: &str) -> Result<u64> {
                (**self).file_length(name)
            }
            fn delete_file(&self, name: &str) -> Result<()> {
                (**self).delete_file(name)
            }
            fn create_output(&self, name: &str, ctx: &IoContext) -> Result<Box<dyn IndexOutput>> {
                (**self).create_output(name, ctx)
            }
            fn open_input(&self, name: &str, ctx: &IoContext) -> Result<Box<dyn IndexInput>> {
                (**self).open_input(name, ctx)
            }
            fn sync(&self, names: &[&str]) -> Result<()> {
                (**self).sync(names)
            }
            fn close(&self) -> Result<()> {
                (**self).close()
            }
            fn ensure_open(&self) -> Result<()> {
                (**self).ensure_open()
            }
            fn lock_factory(&self) -> &dyn LockFactory {
                (**self).lock_factory()
            }
            fn lock_id(&self) -> String {
                (**self).lock_id()
            }
            fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
                (**self).make_lock(name)
            }
            fn clear_lock(&self, name: &str) -> Result<()> {
                (**self).clear_lock(name)
            }
            fn create_slicer(&self, name: &str, ctx: &IoContext) -> Result<IndexInputSlicer> {
                (**self).create_slicer(name, ctx)
            }
        }
    };
}

forward_directory!(Box<T>);
forward_directory!(Arc<T>);
