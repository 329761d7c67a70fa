use std::{any::Any, fmt};

use io_error::{HandleError, Result};
use io_range::{Length, Offset};

use crate::handle::{Handle, OpenMode};

/// Handle over an owned in-memory buffer.
///
/// Growable buffers ([`MemoryHandle::new`]) extend as bytes are written;
/// fixed buffers ([`MemoryHandle::from_vec`]) clamp writes at their size,
/// exactly as a full device would. Reopening does not discard content,
/// it only rewinds the cursor.
pub struct MemoryHandle {
    data: Vec<u8>,
    cursor: usize,
    grow: bool,
    mode: Option<OpenMode>,
}

impl MemoryHandle {
    /// Empty growable buffer, the usual write destination.
    pub fn new() -> Self {
        MemoryHandle {
            data: Vec::new(),
            cursor: 0,
            grow: true,
            mode: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MemoryHandle {
            data: Vec::with_capacity(capacity),
            cursor: 0,
            grow: true,
            mode: None,
        }
    }

    /// Fixed-size buffer over existing bytes.
    pub fn from_vec(data: Vec<u8>) -> Self {
        MemoryHandle {
            data,
            cursor: 0,
            grow: false,
            mode: None,
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl Default for MemoryHandle {
    fn default() -> Self {
        MemoryHandle::new()
    }
}

impl From<Vec<u8>> for MemoryHandle {
    fn from(data: Vec<u8>) -> Self {
        MemoryHandle::from_vec(data)
    }
}

impl fmt::Display for MemoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory_handle({} bytes)", self.data.len())
    }
}

impl Handle for MemoryHandle {
    fn open_for_read(&mut self) -> Result<Length> {
        self.cursor = 0;
        self.mode = Some(OpenMode::Read);
        Ok(Length(self.data.len() as i64))
    }

    fn open_for_write(&mut self, _estimate: Length) -> Result<()> {
        self.cursor = 0;
        self.mode = Some(OpenMode::Write);
        Ok(())
    }

    fn open_for_append(&mut self, _estimate: Length) -> Result<()> {
        self.cursor = self.data.len();
        self.mode = Some(OpenMode::Append);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if !matches!(self.mode, Some(OpenMode::Read)) {
            return Err(HandleError::Contract(format!("read on {}", self)));
        }
        let n = buffer.len().min(self.data.len() - self.cursor);
        buffer[..n].copy_from_slice(&self.data[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        if matches!(self.mode, Some(OpenMode::Read) | None) {
            return Err(HandleError::Contract(format!("write on {}", self)));
        }
        let n = if self.grow {
            if self.cursor + buffer.len() > self.data.len() {
                self.data.resize(self.cursor + buffer.len(), 0);
            }
            buffer.len()
        } else {
            buffer.len().min(self.data.len() - self.cursor)
        };
        self.data[self.cursor..self.cursor + n].copy_from_slice(&buffer[..n]);
        self.cursor += n;
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        self.mode = None;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn position(&mut self) -> Result<Offset> {
        Ok(Offset(self.cursor as i64))
    }

    fn seek(&mut self, offset: Offset) -> Result<Offset> {
        if offset.0 < 0 || offset.0 as usize > self.data.len() {
            return Err(HandleError::Contract(format!(
                "seek to {} outside {}",
                offset, self
            )));
        }
        self.cursor = offset.0 as usize;
        Ok(offset)
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn estimate(&mut self) -> Length {
        Length(self.data.len() as i64)
    }

    fn restart_read_from(&mut self, offset: Offset) -> Result<()> {
        if !matches!(self.mode, Some(OpenMode::Read)) {
            return Err(HandleError::Contract(format!(
                "restart_read_from on {}",
                self
            )));
        }
        self.seek(offset)?;
        Ok(())
    }

    fn restart_write_from(&mut self, offset: Offset) -> Result<()> {
        if matches!(self.mode, Some(OpenMode::Read) | None) {
            return Err(HandleError::Contract(format!(
                "restart_write_from on {}",
                self
            )));
        }
        self.seek(offset)?;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
