//! Heap-resident storage: chunked files, their cursors and the directory
//! that owns them.

mod directory;
mod file;
mod input;
mod output;

pub use directory::RamDirectory;
pub use file::{DEFAULT_CHUNK_SIZE, RamFile};
pub use input::RamInput;
pub use output::RamOutput;
