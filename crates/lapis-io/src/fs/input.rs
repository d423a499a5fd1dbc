//! Buffered inputs over a shared OS file descriptor.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::stream::check_slice_bounds;
use crate::{DirectoryError, IndexInput, Result};

/// How an input turns "read `n` bytes at offset `o`" into system calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadMode {
    /// Explicit-offset reads (`pread` / `seek_read`). Any number of cursors
    /// read the descriptor concurrently without coordination.
    Positional,
    /// Seek then read on the shared cursor, serialised by a mutex.
    Seek,
}

/// One open file shared by a root input and all of its clones and slices.
#[derive(Debug)]
struct Descriptor {
    path: PathBuf,
    mode: ReadMode,
    file: RwLock<Option<File>>,
    seek_lock: Mutex<()>,
}

impl Descriptor {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let guard = self.file.read().unwrap_or_else(PoisonError::into_inner);
        let Some(file) = guard.as_ref() else {
            return Err(io::Error::other(format!(
                "descriptor for {} is closed",
                self.path.display()
            )));
        };
        match self.mode {
            ReadMode::Positional => positional_read(file, buf, offset),
            ReadMode::Seek => {
                let _serial = self.seek_lock.lock().unwrap_or_else(PoisonError::into_inner);
                let mut cursor = file;
                cursor.seek(SeekFrom::Start(offset))?;
                cursor.read(buf)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn close(&self) {
        self.file
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(unix)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn positional_read(_file: &File, _buf: &mut [u8], _offset: u64) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "positional reads are not supported on this platform",
    ))
}

/// A buffered cursor over `[off, end)` of a shared descriptor.
///
/// The root input owns the descriptor: closing it closes the file for every
/// clone and slice. Closing a clone only detaches that clone.
///
/// Reads larger than `read_chunk_size` are issued as a loop of smaller
/// reads; some platforms misbehave on very large single reads.
#[derive(Debug)]
pub struct FsInput {
    description: String,
    descriptor: Arc<Descriptor>,
    is_clone: bool,
    off: u64,
    end: u64,
    read_chunk_size: usize,
    buffer: Vec<u8>,
    buffer_start: u64,
    buffer_length: usize,
    buffer_position: usize,
    closed: bool,
}

impl FsInput {
    pub(crate) fn open(
        path: &Path,
        description: String,
        mode: ReadMode,
        buffer_size: usize,
        read_chunk_size: usize,
    ) -> Result<Self> {
        let file = File::open(path).map_err(|e| open_error(&description, e))?;
        let length = file
            .metadata()
            .map_err(|e| DirectoryError::io(&description, 0, e))?
            .len();
        let descriptor = Arc::new(Descriptor {
            path: path.to_path_buf(),
            mode,
            file: RwLock::new(Some(file)),
            seek_lock: Mutex::new(()),
        });
        Ok(Self {
            description,
            descriptor,
            is_clone: false,
            off: 0,
            end: length,
            read_chunk_size,
            buffer: vec![0u8; buffer_size],
            buffer_start: 0,
            buffer_length: 0,
            buffer_position: 0,
            closed: false,
        })
    }

    /// A new cursor sharing this input's descriptor.
    fn derive(&self, description: String, off: u64, end: u64, pointer: u64) -> Self {
        Self {
            description,
            descriptor: Arc::clone(&self.descriptor),
            is_clone: true,
            off,
            end,
            read_chunk_size: self.read_chunk_size,
            buffer: vec![0u8; self.buffer.len()],
            buffer_start: pointer,
            buffer_length: 0,
            buffer_position: 0,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed || !self.descriptor.is_open() {
            return Err(DirectoryError::closed(&self.description));
        }
        Ok(())
    }

    /// Reads `dst.len()` bytes at `pos` (relative to this input) straight
    /// from the descriptor, in chunks of at most `read_chunk_size`.
    fn read_internal(&self, dst: &mut [u8], pos: u64) -> Result<()> {
        let start = self.off + pos;
        let mut done = 0;
        while done < dst.len() {
            let want = (dst.len() - done).min(self.read_chunk_size);
            let at = start + done as u64;
            match self.descriptor.read_at(&mut dst[done..done + want], at) {
                Ok(0) => {
                    return Err(DirectoryError::eof(&self.description, at - self.off, self.length()));
                }
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(DirectoryError::io(&self.description, at, e)),
            }
        }
        Ok(())
    }

    fn refill(&mut self) -> Result<()> {
        let pos = self.buffer_start + self.buffer_position as u64;
        let available = self.length().saturating_sub(pos);
        let n = (self.buffer.len() as u64).min(available) as usize;
        if n == 0 {
            return Err(DirectoryError::eof(&self.description, pos, self.length()));
        }
        let mut buffer = std::mem::take(&mut self.buffer);
        let read = self.read_internal(&mut buffer[..n], pos);
        self.buffer = buffer;
        read?;
        self.buffer_start = pos;
        self.buffer_length = n;
        self.buffer_position = 0;
        Ok(())
    }
}

fn open_error(description: &str, e: io::Error) -> DirectoryError {
    if e.kind() == io::ErrorKind::NotFound {
        DirectoryError::not_found(description)
    } else {
        DirectoryError::io(description, 0, e)
    }
}

impl IndexInput for FsInput {
    fn name(&self) -> &str {
        &self.description
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.ensure_open()?;
        if self.buffer_position >= self.buffer_length {
            self.refill()?;
        }
        let b = self.buffer[self.buffer_position];
        self.buffer_position += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let pos = self.file_pointer();
        let Some(end) = pos
            .checked_add(dst.len() as u64)
            .filter(|&end| end <= self.length())
        else {
            return Err(DirectoryError::eof(&self.description, pos, self.length()));
        };

        let buffered = self.buffer_length.saturating_sub(self.buffer_position);
        if dst.len() <= buffered {
            dst.copy_from_slice(&self.buffer[self.buffer_position..self.buffer_position + dst.len()]);
            self.buffer_position += dst.len();
            return Ok(());
        }

        let (head, tail) = dst.split_at_mut(buffered);
        head.copy_from_slice(&self.buffer[self.buffer_position..self.buffer_length]);
        self.buffer_position = self.buffer_length;

        if tail.len() < self.buffer.len() {
            self.refill()?;
            tail.copy_from_slice(&self.buffer[..tail.len()]);
            self.buffer_position = tail.len();
        } else {
            // Large reads bypass the buffer.
            let at = pos + buffered as u64;
            self.read_internal(tail, at)?;
            self.buffer_start = end;
            self.buffer_length = 0;
            self.buffer_position = 0;
        }
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.buffer_start + self.buffer_position as u64
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        if pos >= self.buffer_start && pos - self.buffer_start <= self.buffer_length as u64 {
            self.buffer_position = (pos - self.buffer_start) as usize;
        } else {
            self.buffer_start = pos;
            self.buffer_length = 0;
            self.buffer_position = 0;
        }
        Ok(())
    }

    fn length(&self) -> u64 {
        self.end - self.off
    }

    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        Ok(Box::new(self.derive(
            self.description.clone(),
            self.off,
            self.end,
            self.file_pointer(),
        )))
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        check_slice_bounds(description, offset, length, self.length())?;
        let off = self.off + offset;
        Ok(Box::new(self.derive(
            format!("{description} [slice={}]", self.description),
            off,
            off + length,
            0,
        )))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(DirectoryError::closed(&self.description));
        }
        self.closed = true;
        if !self.is_clone {
            self.descriptor.close();
        }
        Ok(())
    }
}
