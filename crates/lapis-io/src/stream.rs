//! Sequential read and write cursors over directory files.

use std::fmt;

use crate::Result;

/// Buffer size used when streaming bytes between cursors.
pub const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// A random-access read cursor over one file (or a bounded slice of one).
///
/// Inputs never mutate the file they read. Every input carries its own file
/// pointer; [`clone_input`](Self::clone_input) and [`slice`](Self::slice)
/// return independent cursors over the same underlying bytes.
pub trait IndexInput: Send + fmt::Debug {
    /// Human readable description of the resource, used in errors.
    fn name(&self) -> &str;

    /// Reads a single byte.
    fn read_byte(&mut self) -> Result<u8>;

    /// Fills `buf` completely or fails with `EndOfInput`.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Current position relative to the start of this input.
    fn file_pointer(&self) -> u64;

    /// Moves the file pointer. Seeking past the end is allowed; the next read
    /// fails instead.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Logical length of this input.
    fn length(&self) -> u64;

    /// Returns an independent cursor over the same bytes, positioned where
    /// this one is.
    fn clone_input(&self) -> Result<Box<dyn IndexInput>>;

    /// Returns a cursor over `[offset, offset + length)` of this input whose
    /// end of input is the slice boundary, not the physical file end.
    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>>;

    /// Releases the cursor. A second call fails with `AlreadyClosed`.
    fn close(&mut self) -> Result<()>;

    /// Streams `num_bytes` from the current position into `out` without
    /// materialising the whole range.
    fn copy_bytes(&mut self, out: &mut dyn IndexOutput, num_bytes: u64) -> Result<()> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE.min(num_bytes as usize)];
        let mut left = num_bytes;
        while left > 0 {
            let n = left.min(buf.len() as u64) as usize;
            self.read_bytes(&mut buf[..n])?;
            out.write_bytes(&buf[..n])?;
            left -= n as u64;
        }
        Ok(())
    }

    /// Reads a big-endian `u32`.
    fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_bytes(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    /// Reads a big-endian `u64`.
    fn read_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_bytes(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }
}

/// A sequential write cursor over one file.
///
/// Closing an output commits everything written as the file's length.
pub trait IndexOutput: Send + fmt::Debug {
    /// Human readable description of the resource, used in errors.
    fn name(&self) -> &str;

    fn write_byte(&mut self, b: u8) -> Result<()>;

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Number of bytes written so far (the position of the next write).
    fn file_pointer(&self) -> u64;

    /// Pushes buffered bytes to the file. Does not imply durability.
    fn flush(&mut self) -> Result<()>;

    /// Flushes and releases the cursor. A second call fails with
    /// `AlreadyClosed`.
    fn close(&mut self) -> Result<()>;

    /// Writes a big-endian `u32`.
    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    /// Writes a big-endian `u64`.
    fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }
}

/// Checks that `[offset, offset + length)` lies within `[0, total)`.
pub(crate) fn check_slice_bounds(
    description: &str,
    offset: u64,
    length: u64,
    total: u64,
) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(()),
        _ => Err(crate::DirectoryError::InvariantViolation(format!(
            "slice {description} out of bounds: offset={offset}, length={length}, file length={total}"
        ))),
    }
}
