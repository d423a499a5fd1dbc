//! Buffered output to a local file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use crate::fs::FsShared;
use crate::{DirectoryError, IndexOutput, Result};

/// Write buffer size for filesystem outputs.
pub const WRITE_CHUNK_SIZE: usize = 8192;

/// Appends to a newly created local file.
///
/// On close the file is recorded as stale so the next `sync` of its name
/// fsyncs it.
#[derive(Debug)]
pub struct FsOutput {
    name: String,
    writer: Option<BufWriter<File>>,
    position: u64,
    shared: Arc<FsShared>,
}

impl FsOutput {
    pub(crate) fn new(name: &str, file: File, shared: Arc<FsShared>) -> Self {
        Self {
            name: name.to_string(),
            writer: Some(BufWriter::with_capacity(WRITE_CHUNK_SIZE, file)),
            position: 0,
            shared,
        }
    }

    fn closed_error(&self) -> DirectoryError {
        DirectoryError::closed(format!("FsOutput({})", self.name))
    }
}

impl IndexOutput for FsOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(self.closed_error());
        };
        writer
            .write_all(buf)
            .map_err(|e| DirectoryError::io(&self.name, self.position, e))?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.position
    }

    fn flush(&mut self) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(self.closed_error());
        };
        writer
            .flush()
            .map_err(|e| DirectoryError::io(&self.name, self.position, e))
    }

    fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Err(self.closed_error());
        };
        self.shared.mark_stale(&self.name);
        writer
            .into_inner()
            .map_err(|e| DirectoryError::io(&self.name, self.position, e.into_error()))?;
        Ok(())
    }
}

impl Drop for FsOutput {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            self.shared.mark_stale(&self.name);
            if let Err(e) = writer.flush() {
                tracing::warn!(name = %self.name, error = %e, "failed to flush unclosed output");
            }
        }
    }
}
