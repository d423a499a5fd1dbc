//! Bounded sub-range views over another input.

use crate::stream::check_slice_bounds;
use crate::{DirectoryError, IndexInput, Result};

/// A window `[offset, offset + length)` over a private clone of another
/// input.
///
/// End of input is computed against the window, so a slice can never read
/// bytes belonging to its neighbours in the same physical file.
#[derive(Debug)]
pub struct SlicedInput {
    description: String,
    base: Box<dyn IndexInput>,
    offset: u64,
    length: u64,
    pos: u64,
    closed: bool,
}

impl SlicedInput {
    /// Wraps `base`, which must be a cursor this slice owns exclusively.
    pub fn new(
        description: impl Into<String>,
        mut base: Box<dyn IndexInput>,
        offset: u64,
        length: u64,
    ) -> Result<Self> {
        let description = description.into();
        check_slice_bounds(&description, offset, length, base.length())?;
        base.seek(offset)?;
        Ok(Self {
            description,
            base,
            offset,
            length,
            pos: 0,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DirectoryError::closed(&self.description));
        }
        Ok(())
    }
}

impl IndexInput for SlicedInput {
    fn name(&self) -> &str {
        &self.description
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.ensure_open()?;
        if self.pos >= self.length {
            return Err(DirectoryError::eof(
                &self.description,
                self.pos,
                self.length,
            ));
        }
        let b = self.base.read_byte()?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let Some(end) = self
            .pos
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= self.length)
        else {
            return Err(DirectoryError::eof(
                &self.description,
                self.pos,
                self.length,
            ));
        };
        self.base.read_bytes(buf)?;
        self.pos = end;
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        // The base never moves outside the window.
        self.base.seek(self.offset + pos.min(self.length))?;
        self.pos = pos;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        let mut base = self.base.clone_input()?;
        base.seek(self.offset + self.pos.min(self.length))?;
        Ok(Box::new(Self {
            description: self.description.clone(),
            base,
            offset: self.offset,
            length: self.length,
            pos: self.pos,
            closed: false,
        }))
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        check_slice_bounds(description, offset, length, self.length)?;
        Ok(Box::new(Self::new(
            description,
            self.base.clone_input()?,
            self.offset + offset,
            length,
        )?))
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.base.close()
    }
}
