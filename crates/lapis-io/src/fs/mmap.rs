//! Memory-mapped inputs.

use std::fs::File;
use std::path::Path;

use bytes::Bytes;
use memmap2::Mmap;

use crate::stream::check_slice_bounds;
use crate::{DirectoryError, IndexInput, Result};

/// Whether mappings are released deterministically once no longer
/// referenced. `memmap2` unmaps on drop, so always true here.
pub const MMAP_UNMAP_SUPPORTED: bool = true;

/// Maps `path` read-only. Empty files are not mapped.
#[allow(unsafe_code)]
fn map_file(path: &Path, description: &str) -> Result<Bytes> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DirectoryError::not_found(description)
        } else {
            DirectoryError::io(description, 0, e)
        }
    })?;
    let len = file
        .metadata()
        .map_err(|e| DirectoryError::io(description, 0, e))?
        .len();
    if len == 0 {
        return Ok(Bytes::new());
    }
    // SAFETY: the mapping is read-only and index files are write-once: once
    // an output is closed nothing in this process modifies the file again.
    // Truncation by another process is outside the directory contract.
    let map = unsafe { Mmap::map(&file) }.map_err(|e| DirectoryError::io(description, 0, e))?;
    Ok(Bytes::from_owner(map))
}

/// A cursor over a read-only mapping of the whole file.
///
/// Clones and slices share the mapping; it is unmapped when the last of
/// them is closed or dropped.
#[derive(Debug, Clone)]
pub struct MmapInput {
    description: String,
    data: Bytes,
    pos: usize,
    closed: bool,
}

impl MmapInput {
    pub(crate) fn open(path: &Path, description: String) -> Result<Self> {
        let data = map_file(path, &description)?;
        Ok(Self {
            description,
            data,
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

impl IndexInput for MmapInput {
    fn name(&self) -> &str {
        &self.description
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.ensure_open()?;
        let Some(&b) = self.data.get(self.pos) else {
            return Err(DirectoryError::eof(
                &self.description,
                self.pos as u64,
                self.length(),
            ));
        };
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let Some(end) = self
            .pos
            .checked_add(buf.len())
            .filter(|&end| end <= self.data.len())
        else {
            return Err(DirectoryError::eof(
                &self.description,
                self.pos as u64,
                self.length(),
            ));
        };
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.pos as u64
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        self.pos = usize::try_from(pos).unwrap_or(usize::MAX);
        Ok(())
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        Ok(Box::new(self.clone()))
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        check_slice_bounds(description, offset, length, self.length())?;
        let start = offset as usize;
        Ok(Box::new(Self {
            description: format!("{description} [slice={}]", self.description),
            data: self.data.slice(start..start + length as usize),
            pos: 0,
            closed: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.data = Bytes::new();
        Ok(())
    }
}
