//! Per-operation I/O context.
//!
//! The segment engine passes an [`IoContext`] to every `create_output` and
//! `open_input` call. Backends use it to size read buffers; the caching
//! directory uses the size estimate to decide which tier a new file lands in.

/// Details of a segment flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushInfo {
    /// Number of documents in the flushed segment.
    pub num_docs: u32,
    /// Estimated size of the flushed segment in bytes.
    pub estimated_segment_size: u64,
}

impl FlushInfo {
    pub fn new(num_docs: u32, estimated_segment_size: u64) -> Self {
        Self {
            num_docs,
            estimated_segment_size,
        }
    }
}

/// Details of a segment merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeInfo {
    /// Total number of documents across the merged segments.
    pub total_docs: u32,
    /// Estimated size of the merged segment in bytes.
    pub estimated_merge_bytes: u64,
    /// True if the merge pulls in segments from another index.
    pub is_external: bool,
    /// Set for forced merges down to a segment count.
    pub merge_max_num_segments: Option<u32>,
}

impl MergeInfo {
    pub fn new(total_docs: u32, estimated_merge_bytes: u64) -> Self {
        Self {
            total_docs,
            estimated_merge_bytes,
            is_external: false,
            merge_max_num_segments: None,
        }
    }
}

/// What an I/O operation is being performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoContext {
    /// No particular purpose.
    #[default]
    Default,
    /// The file is read once, front to back.
    ReadOnce,
    /// Writing a freshly flushed segment.
    Flush(FlushInfo),
    /// Writing or reading for a merge.
    Merge(MergeInfo),
}

impl IoContext {
    /// Context for a flush with the given estimated segment size.
    pub fn flush(estimated_segment_size: u64) -> Self {
        Self::Flush(FlushInfo::new(0, estimated_segment_size))
    }

    /// Context for a merge with the given estimated result size.
    pub fn merge(estimated_merge_bytes: u64) -> Self {
        Self::Merge(MergeInfo::new(0, estimated_merge_bytes))
    }

    /// Estimated size in bytes of the file being written.
    ///
    /// The merge estimate wins over the flush estimate; contexts carrying
    /// neither report 0.
    pub fn estimated_size(&self) -> u64 {
        match self {
            Self::Merge(info) => info.estimated_merge_bytes,
            Self::Flush(info) => info.estimated_segment_size,
            Self::Default | Self::ReadOnce => 0,
        }
    }

    /// True for merge contexts.
    pub fn is_merge(&self) -> bool {
        matches!(self, Self::Merge(_))
    }
}
