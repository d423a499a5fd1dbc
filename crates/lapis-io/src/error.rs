//! Directory error types.

use std::path::PathBuf;

/// Errors raised by directories, index inputs and index outputs.
///
/// Nothing in this crate retries on error. A failed write sequence leaves the
/// target file truncated; callers must delete it before retrying.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Operation on a file name that does not exist.
    #[error("file not found: {name}")]
    NotFound { name: String },

    /// The backing location of a filesystem directory does not exist.
    #[error("directory does not exist: {path}")]
    NoSuchDirectory { path: PathBuf },

    /// Operation on a directory, input or output after `close()`.
    #[error("{resource} is already closed")]
    AlreadyClosed { resource: String },

    /// Read past the logical end of a stream or slice.
    #[error("read past EOF: {resource} (position {position}, length {length})")]
    EndOfInput {
        resource: String,
        position: u64,
        length: u64,
    },

    /// A precondition the caller is responsible for was broken.
    ///
    /// Fatal: never retried, no recovery path.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Underlying OS or filesystem error.
    #[error("I/O error on {name} at offset {offset}: {source}")]
    Io {
        name: String,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// A lock could not be obtained before its timeout elapsed.
    #[error("lock obtain timed out: {name}")]
    LockObtainFailed { name: String },
}

impl DirectoryError {
    /// Wraps an OS error with the file name and offset it happened at.
    pub fn io(name: impl Into<String>, offset: u64, source: std::io::Error) -> Self {
        Self::Io {
            name: name.into(),
            offset,
            source,
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn closed(resource: impl Into<String>) -> Self {
        Self::AlreadyClosed {
            resource: resource.into(),
        }
    }

    pub fn eof(resource: impl Into<String>, position: u64, length: u64) -> Self {
        Self::EndOfInput {
            resource: resource.into(),
            position,
            length,
        }
    }

    /// Returns true for [`DirectoryError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`DirectoryError::EndOfInput`].
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, Self::EndOfInput { .. })
    }
}

/// Result alias used throughout the I/O layer.
pub type Result<T> = std::result::Result<T, DirectoryError>;
