//! # Lapis
//!
//! Pluggable storage directories for search indexes.
//!
//! An index engine writes its segment files through the [`Directory`]
//! contract and never touches the filesystem directly. This crate ties the
//! pieces together:
//!
//! - **Storage** ([`lapis_io`]) - RAM and local filesystem directories,
//!   cursors, slices and locks
//! - **Caching** ([`lapis_nrt`]) - keeps small new segments in RAM until
//!   they are synced
//! - **Configuration** ([`lapis_config`]) - layered TOML and environment
//!   settings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  lapis::open                    │
//! │  ┌─────────────────────┐   ┌─────────────────┐  │
//! │  │ NrtCachingDirectory │ → │   FsDirectory   │  │
//! │  │     (RAM tier)      │   │ mmap/pread/seek │  │
//! │  └─────────────────────┘   └─────────────────┘  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use lapis::{IoContext, LapisConfig};
//!
//! let config = LapisConfig::load()?;
//! let dir = lapis::open(&config)?;
//!
//! let mut out = dir.create_output("_0.cfs", &IoContext::flush(4096))?;
//! out.write_bytes(b"segment bytes")?;
//! out.close()?;
//! dir.sync(&["_0.cfs"])?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod open;

pub use error::{LapisError, Result};
pub use open::{open, open_project};

// Re-export the storage layer
pub use lapis_config::{
    CacheConfig, ConfigError, ConfigLoader, LapisConfig, LockKind, LockingConfig, StorageBackend,
    StorageConfig,
};
pub use lapis_io::{
    Directory, DirectoryError, FlushInfo, FsDirectory, FsKind, IndexInput, IndexInputSlicer,
    IndexOutput, IoContext, Lock, LockFactory, MergeInfo, RamDirectory, RamFile, RamInput,
    RamOutput,
};
pub use lapis_nrt::{NrtCachingConfig, NrtCachingDirectory};
