//! Write cursor over a [`RamFile`].

use std::sync::Arc;

use crate::ram::RamFile;
use crate::{DirectoryError, IndexOutput, Result};

/// Appends to a [`RamFile`], allocating a chunk whenever the current one
/// fills up.
///
/// The file's committed length only ever grows: `flush` and `close` publish
/// the write position if it is past the committed length. Dropping an
/// unclosed output commits the same way.
#[derive(Debug)]
pub struct RamOutput {
    name: String,
    file: Arc<RamFile>,
    current: Option<usize>,
    buffer_position: usize,
    buffer_start: u64,
    buffer_length: usize,
    closed: bool,
}

impl RamOutput {
    pub fn new(name: impl Into<String>, file: Arc<RamFile>) -> Self {
        Self {
            name: name.into(),
            file,
            current: None,
            buffer_position: 0,
            buffer_start: 0,
            buffer_length: 0,
            closed: false,
        }
    }

    /// The file this output writes to.
    pub fn file(&self) -> &Arc<RamFile> {
        &self.file
    }

    /// Bytes allocated for the file so far.
    pub fn size_in_bytes(&self) -> u64 {
        self.file.num_buffers() as u64 * self.file.chunk_size() as u64
    }

    /// Moves the write position within the chunks already allocated.
    ///
    /// Commits the current position first. Never allocates: seeking past
    /// the allocated capacity fails with `EndOfInput`.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        self.set_file_length();

        let chunk = self.file.chunk_size();
        let buffers = self.file.num_buffers();
        let capacity = buffers as u64 * chunk as u64;
        if pos > capacity {
            return Err(DirectoryError::eof(&self.name, pos, capacity));
        }
        if buffers == 0 {
            self.current = None;
            self.buffer_position = 0;
            self.buffer_start = 0;
            self.buffer_length = 0;
            return Ok(());
        }

        let (index, offset) = if pos == capacity {
            (buffers - 1, chunk)
        } else {
            ((pos / chunk as u64) as usize, (pos % chunk as u64) as usize)
        };
        if self.current != Some(index) {
            self.switch_current_buffer(index);
        }
        self.buffer_position = offset;
        Ok(())
    }

    /// Truncates the file to zero length, keeping its chunks for reuse.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.current = None;
        self.buffer_position = 0;
        self.buffer_start = 0;
        self.buffer_length = 0;
        self.file.set_length(0);
        Ok(())
    }

    /// Copies the bytes written so far to another output.
    pub fn write_to(&mut self, out: &mut dyn IndexOutput) -> Result<()> {
        self.flush()?;
        let end = self.file.length();
        let chunk = self.file.chunk_size();
        let mut scratch = vec![0u8; chunk];
        let mut pos = 0u64;
        let mut index = 0;
        while pos < end {
            let len = chunk.min((end - pos) as usize);
            self.file.read_block(index, 0, &mut scratch[..len]);
            out.write_bytes(&scratch[..len])?;
            pos += len as u64;
            index += 1;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DirectoryError::closed(format!("RamOutput({})", self.name)));
        }
        Ok(())
    }

    fn switch_current_buffer(&mut self, index: usize) {
        let chunk = self.file.chunk_size();
        if index == self.file.num_buffers() {
            self.file.add_buffer(chunk);
        }
        self.current = Some(index);
        self.buffer_position = 0;
        self.buffer_start = index as u64 * chunk as u64;
        self.buffer_length = chunk;
    }

    fn next_buffer(&mut self) {
        let next = self.current.map_or(0, |i| i + 1);
        self.switch_current_buffer(next);
    }

    fn set_file_length(&self) {
        let pointer = self.position();
        if pointer > self.file.length() {
            self.file.set_length(pointer);
        }
    }

    fn position(&self) -> u64 {
        match self.current {
            Some(_) => self.buffer_start + self.buffer_position as u64,
            None => 0,
        }
    }
}

impl IndexOutput for RamOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut offset = 0;
        while offset < buf.len() {
            if self.current.is_none() || self.buffer_position == self.buffer_length {
                self.next_buffer();
            }
            let index = self.current.unwrap_or_default();
            let n = (buf.len() - offset).min(self.buffer_length - self.buffer_position);
            self.file
                .write_block(index, self.buffer_position, &buf[offset..offset + n]);
            self.buffer_position += n;
            offset += n;
        }
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.position()
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.set_file_length();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for RamOutput {
    fn drop(&mut self) {
        if !self.closed {
            self.set_file_length();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(chunk: usize) -> RamOutput {
        RamOutput::new("test", Arc::new(RamFile::new(chunk)))
    }

    #[test]
    fn allocates_on_demand() {
        let mut out = output(4);
        assert_eq!(out.size_in_bytes(), 0);

        out.write_bytes(&[1, 2, 3, 4]).unwrap();
        assert_eq!(out.size_in_bytes(), 4);

        out.write_byte(5).unwrap();
        assert_eq!(out.size_in_bytes(), 8);
        assert_eq!(out.file_pointer(), 5);
    }

    #[test]
    fn length_committed_on_flush_only() {
        let mut out = output(4);
        out.write_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(out.file().length(), 0);

        out.flush().unwrap();
        assert_eq!(out.file().length(), 3);
    }

    #[test]
    fn seek_back_never_shrinks_length() {
        let mut out = output(4);
        out.write_bytes(&[1, 2, 3, 4, 5, 6]).unwrap();
        out.seek(1).unwrap();
        out.write_byte(9).unwrap();
        out.close().unwrap();

        let file = out.file();
        assert_eq!(file.length(), 6);
        let mut first = [0u8; 4];
        file.read_block(0, 0, &mut first);
        assert_eq!(first, [1, 9, 3, 4]);
    }

    #[test]
    fn seek_past_capacity_fails_without_allocating() {
        let mut out = output(4);
        out.write_bytes(&[1, 2]).unwrap();
        assert!(out.seek(5).unwrap_err().is_end_of_input());
        assert_eq!(out.file().num_buffers(), 1);

        // Seeking to exactly the capacity is allowed; the next write allocates.
        out.seek(4).unwrap();
        assert_eq!(out.file_pointer(), 4);
        out.write_byte(7).unwrap();
        assert_eq!(out.file().num_buffers(), 2);
    }

    #[test]
    fn double_close_fails() {
        let mut out = output(4);
        out.close().unwrap();
        assert!(matches!(
            out.close(),
            Err(DirectoryError::AlreadyClosed { .. })
        ));
        assert!(out.write_byte(1).is_err());
    }

    #[test]
    fn drop_commits_length() {
        let file = Arc::new(RamFile::new(4));
        {
            let mut out = RamOutput::new("dropped", Arc::clone(&file));
            out.write_bytes(&[1, 2, 3, 4, 5]).unwrap();
        }
        assert_eq!(file.length(), 5);
    }

    #[test]
    fn reset_then_write_to() {
        let mut out = output(4);
        out.write_bytes(b"stale bytes").unwrap();
        out.reset().unwrap();
        out.write_bytes(b"fresh").unwrap();

        let mut copy = output(3);
        out.write_to(&mut copy).unwrap();
        copy.close().unwrap();
        assert_eq!(copy.file().length(), 5);
    }
}
