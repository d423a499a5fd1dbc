//! # lapis-io: Pluggable Storage for Lapis Indexes
//!
//! This crate defines the storage contract an index is written against and
//! the backends that implement it:
//!
//! - **[`Directory`]**: a flat namespace of named, write-once files
//! - **[`IndexInput`]** / **[`IndexOutput`]**: random-access reader and
//!   sequential writer over one file
//! - **[`RamDirectory`]**: files held in the heap as fixed-size chunks
//! - **[`FsDirectory`]**: files in a local folder, read by memory mapping,
//!   positional reads or seek + read
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │          lapis-nrt           │
//! │  (caches small new segments) │
//! └──────────────┬───────────────┘
//!                │ Directory trait
//! ┌──────────────┴───────────────┐
//! │           lapis-io           │
//! │  ┌───────┐  ┌──────────────┐ │
//! │  │  RAM  │  │  Filesystem  │ │
//! │  │ files │  │ mmap / pread │ │
//! │  └───────┘  │ / seek+read  │ │
//! │             └──────────────┘ │
//! └──────────────────────────────┘
//! ```
//!
//! Files are write-once: an output is written front to back and closed, and
//! from then on the file is only read. Inputs can be cloned and sliced
//! cheaply; clones of a filesystem input share one OS descriptor.

mod context;
mod directory;
mod error;
pub mod fs;
pub mod lock;
pub mod ram;
mod slice;
mod stream;

pub use context::{FlushInfo, IoContext, MergeInfo};
pub use directory::{Directory, IndexInputSlicer};
pub use error::{DirectoryError, Result};
pub use fs::{FsDirectory, FsKind};
pub use lock::{Lock, LockFactory, NativeFsLockFactory, NoLockFactory, SingleInstanceLockFactory};
pub use ram::{RamDirectory, RamFile, RamInput, RamOutput};
pub use slice::SlicedInput;
pub use stream::{COPY_BUFFER_SIZE, IndexInput, IndexOutput};
