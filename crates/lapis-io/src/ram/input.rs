//! Read cursor over a [`RamFile`].

use std::sync::Arc;

use crate::ram::RamFile;
use crate::slice::SlicedInput;
use crate::{DirectoryError, IndexInput, IndexOutput, Result};

/// Reads a [`RamFile`] chunk by chunk.
///
/// The length is captured when the input is opened. The file object is
/// never mutated once replaced or deleted in its directory, so an input
/// keeps reading the bytes it was opened on.
#[derive(Debug, Clone)]
pub struct RamInput {
    name: String,
    file: Arc<RamFile>,
    length: u64,
    current: Option<usize>,
    buffer_position: usize,
    buffer_start: u64,
    buffer_length: usize,
    closed: bool,
}

impl RamInput {
    pub fn new(name: impl Into<String>, file: Arc<RamFile>) -> Self {
        let length = file.length();
        Self {
            name: name.into(),
            file,
            length,
            current: None,
            buffer_position: 0,
            buffer_start: 0,
            buffer_length: 0,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DirectoryError::closed(format!("RamInput({})", self.name)));
        }
        Ok(())
    }

    /// Makes chunk `index` current.
    ///
    /// Past the last chunk holding data this fails with `EndOfInput` when
    /// `enforce_eof` is set; otherwise the cursor parks on an empty window
    /// so the next read fails instead.
    fn switch_current_buffer(&mut self, index: usize, enforce_eof: bool) -> Result<()> {
        let chunk = self.file.chunk_size() as u64;
        let start = (index as u64).saturating_mul(chunk);
        if index >= self.file.num_buffers() || start >= self.length {
            if enforce_eof {
                return Err(DirectoryError::eof(&self.name, start, self.length));
            }
            self.current = Some(index);
            self.buffer_start = start;
            self.buffer_length = 0;
            self.buffer_position = 0;
            return Ok(());
        }
        self.current = Some(index);
        self.buffer_start = start;
        self.buffer_position = 0;
        self.buffer_length = (self.length - start).min(chunk) as usize;
        Ok(())
    }

    fn advance(&mut self) -> Result<usize> {
        let next = match self.current {
            None => 0,
            Some(i) => i.checked_add(1).ok_or_else(|| {
                DirectoryError::eof(&self.name, self.file_pointer(), self.length)
            })?,
        };
        self.switch_current_buffer(next, true)?;
        Ok(next)
    }

    /// Runs `f` over successive in-chunk runs covering `len` bytes.
    fn for_each_run(
        &mut self,
        len: usize,
        mut f: impl FnMut(&RamFile, usize, usize, usize) -> Result<()>,
    ) -> Result<()> {
        let mut done = 0;
        while done < len {
            if self.current.is_none() || self.buffer_position >= self.buffer_length {
                self.advance()?;
            }
            let index = self.current.unwrap_or_default();
            let n = (len - done).min(self.buffer_length - self.buffer_position);
            f(&self.file, index, self.buffer_position, n)?;
            self.buffer_position += n;
            done += n;
        }
        Ok(())
    }
}

impl IndexInput for RamInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_bytes(&mut b)?;
        Ok(b[0])
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let mut written = 0;
        self.for_each_run(buf.len(), |file, index, offset, n| {
            file.read_block(index, offset, &mut buf[written..written + n]);
            written += n;
            Ok(())
        })
    }

    fn file_pointer(&self) -> u64 {
        match self.current {
            Some(_) => self.buffer_start + self.buffer_position as u64,
            None => 0,
        }
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        let chunk = self.file.chunk_size() as u64;
        let index = (pos / chunk) as usize;
        if self.current != Some(index) {
            self.switch_current_buffer(index, false)?;
        }
        self.buffer_position = (pos % chunk) as usize;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        Ok(Box::new(self.clone()))
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        let mut base = Self::new(description, Arc::clone(&self.file));
        base.length = self.length;
        Ok(Box::new(SlicedInput::new(
            format!("{description} [slice={}]", self.name),
            Box::new(base),
            offset,
            length,
        )?))
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }

    fn copy_bytes(&mut self, out: &mut dyn IndexOutput, num_bytes: u64) -> Result<()> {
        self.ensure_open()?;
        let mut scratch = vec![0u8; self.file.chunk_size()];
        let mut left = num_bytes;
        while left > 0 {
            let step = left.min(scratch.len() as u64) as usize;
            let mut filled = 0;
            self.for_each_run(step, |file, index, offset, n| {
                file.read_block(index, offset, &mut scratch[filled..filled + n]);
                filled += n;
                Ok(())
            })?;
            out.write_bytes(&scratch[..step])?;
            left -= step as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::RamOutput;

    fn file_with(chunk: usize, data: &[u8]) -> Arc<RamFile> {
        let file = Arc::new(RamFile::new(chunk));
        let mut out = RamOutput::new("src", Arc::clone(&file));
        out.write_bytes(data).unwrap();
        out.close().unwrap();
        file
    }

    #[test]
    fn reads_across_chunk_boundaries() {
        let data: Vec<u8> = (0..10).collect();
        let mut input = RamInput::new("in", file_with(3, &data));

        let mut buf = [0u8; 10];
        input.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[..]);
        assert_eq!(input.file_pointer(), 10);
        assert!(input.read_byte().unwrap_err().is_end_of_input());
    }

    #[test]
    fn seek_then_read() {
        let data: Vec<u8> = (0..10).collect();
        let mut input = RamInput::new("in", file_with(4, &data));

        input.seek(6).unwrap();
        assert_eq!(input.file_pointer(), 6);
        assert_eq!(input.read_byte().unwrap(), 6);

        input.seek(1).unwrap();
        assert_eq!(input.read_byte().unwrap(), 1);
    }

    #[test]
    fn seek_past_end_fails_on_read_only() {
        let mut input = RamInput::new("in", file_with(4, &[1, 2, 3]));
        input.seek(100).unwrap();
        assert_eq!(input.file_pointer(), 100);
        assert!(input.read_byte().unwrap_err().is_end_of_input());

        input.seek(3).unwrap();
        assert!(input.read_byte().unwrap_err().is_end_of_input());
    }

    #[test]
    fn empty_file_reads_nothing() {
        let mut input = RamInput::new("in", file_with(4, &[]));
        assert_eq!(input.length(), 0);
        input.read_bytes(&mut []).unwrap();
        assert!(input.read_byte().is_err());
    }

    #[test]
    fn clone_is_independent() {
        let data: Vec<u8> = (0..8).collect();
        let mut input = RamInput::new("in", file_with(4, &data));
        input.seek(5).unwrap();

        let mut clone = input.clone_input().unwrap();
        assert_eq!(clone.file_pointer(), 5);
        assert_eq!(clone.read_byte().unwrap(), 5);
        clone.seek(0).unwrap();
        assert_eq!(input.read_byte().unwrap(), 5);
    }

    #[test]
    fn copy_bytes_streams_chunks() {
        let data: Vec<u8> = (0..=255).collect();
        let mut input = RamInput::new("in", file_with(7, &data));
        input.seek(10).unwrap();

        let target = Arc::new(RamFile::new(16));
        let mut out = RamOutput::new("out", Arc::clone(&target));
        input.copy_bytes(&mut out, 100).unwrap();
        out.close().unwrap();

        let mut check = RamInput::new("check", target);
        let mut buf = vec![0u8; 100];
        check.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[10..110]);
    }
}
