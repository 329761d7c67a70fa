use std::{any::Any, collections::BTreeMap, fmt};

use io_error::{HandleError, Result};
use io_range::{Length, Offset};

use crate::{
    config,
    handle::{Handle, OpenMode},
    util,
};

/// Decorator batching small reads and writes through a fixed buffer.
///
/// Writes accumulate until the buffer fills, then go to the wrapped
/// handle in one piece; reads prefetch a buffer-full and are served from
/// it. `position` is the logical position the caller sees, not the
/// wrapped handle's (which runs ahead on reads and behind on writes).
/// Seeking discards the read-ahead and flushes the write-behind first, so
/// addressing semantics are unchanged.
pub struct BufferedHandle {
    inner: Box<dyn Handle>,
    buffer: Vec<u8>,
    capacity: usize,
    consumed: usize,
    mode: Option<OpenMode>,
    position: Offset,
}

impl BufferedHandle {
    /// Buffers with the configured copy buffer size.
    pub fn new(inner: Box<dyn Handle>) -> Self {
        Self::with_capacity(inner, config::copy_buffer_size())
    }

    pub fn with_capacity(inner: Box<dyn Handle>, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be positive");
        BufferedHandle {
            inner,
            buffer: Vec::with_capacity(capacity),
            capacity,
            consumed: 0,
            mode: None,
            position: Offset(0),
        }
    }

    pub fn into_inner(mut self) -> Box<dyn Handle> {
        std::mem::replace(
            &mut self.inner,
            Box::new(crate::MemoryHandle::new()),
        )
    }

    fn pending(&self) -> usize {
        self.buffer.len() - self.consumed
    }

    fn drop_read_ahead(&mut self) {
        self.buffer.clear();
        self.consumed = 0;
    }

    fn flush_writes(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            util::write_all(self.inner.as_mut(), &self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }
}

impl fmt::Display for BufferedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffered_handle({})", self.inner)
    }
}

impl Handle for BufferedHandle {
    fn open_for_read(&mut self) -> Result<Length> {
        let length = self.inner.open_for_read()?;
        self.drop_read_ahead();
        self.position = Offset(0);
        self.mode = Some(OpenMode::Read);
        Ok(length)
    }

    fn open_for_write(&mut self, estimate: Length) -> Result<()> {
        self.inner.open_for_write(estimate)?;
        self.buffer.clear();
        self.position = Offset(0);
        self.mode = Some(OpenMode::Write);
        Ok(())
    }

    fn open_for_append(&mut self, estimate: Length) -> Result<()> {
        self.inner.open_for_append(estimate)?;
        self.buffer.clear();
        self.position = self.inner.position().unwrap_or(Offset(0));
        self.mode = Some(OpenMode::Append);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if !matches!(self.mode, Some(OpenMode::Read)) {
            return Err(HandleError::Contract(format!("read on {}", self)));
        }
        if self.pending() == 0 {
            self.buffer.resize(self.capacity, 0);
            self.consumed = 0;
            let n = match self.inner.read(&mut self.buffer[..]) {
                Ok(n) => n,
                Err(error) => {
                    self.drop_read_ahead();
                    return Err(error);
                }
            };
            self.buffer.truncate(n);
            if n == 0 {
                return Ok(0);
            }
        }
        let n = buffer.len().min(self.pending());
        buffer[..n].copy_from_slice(&self.buffer[self.consumed..self.consumed + n]);
        self.consumed += n;
        self.position += Length(n as i64);
        Ok(n)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        if matches!(self.mode, Some(OpenMode::Read) | None) {
            return Err(HandleError::Contract(format!("write on {}", self)));
        }
        let mut remaining = buffer;
        while !remaining.is_empty() {
            let room = self.capacity - self.buffer.len();
            let n = remaining.len().min(room);
            self.buffer.extend_from_slice(&remaining[..n]);
            remaining = &remaining[n..];
            if self.buffer.len() == self.capacity {
                self.flush_writes()?;
            }
        }
        self.position += Length(buffer.len() as i64);
        Ok(buffer.len())
    }

    fn close(&mut self) -> Result<()> {
        let flushed = if matches!(self.mode, Some(OpenMode::Write) | Some(OpenMode::Append)) {
            self.flush_writes()
        } else {
            Ok(())
        };
        self.drop_read_ahead();
        self.mode = None;
        let closed = self.inner.close();
        flushed?;
        closed
    }

    fn flush(&mut self) -> Result<()> {
        if matches!(self.mode, Some(OpenMode::Write) | Some(OpenMode::Append)) {
            self.flush_writes()?;
        }
        self.inner.flush()
    }

    fn rewind(&mut self) -> Result<()> {
        self.seek(Offset(0))?;
        Ok(())
    }

    fn position(&mut self) -> Result<Offset> {
        Ok(self.position)
    }

    fn seek(&mut self, offset: Offset) -> Result<Offset> {
        match self.mode {
            Some(OpenMode::Read) => self.drop_read_ahead(),
            Some(_) => self.flush_writes()?,
            None => {}
        }
        let at = self.inner.seek(offset)?;
        self.position = at;
        Ok(at)
    }

    fn can_seek(&self) -> bool {
        self.inner.can_seek()
    }

    fn estimate(&mut self) -> Length {
        self.inner.estimate()
    }

    fn restart_read_from(&mut self, offset: Offset) -> Result<()> {
        self.drop_read_ahead();
        self.inner.restart_read_from(offset)?;
        self.position = offset;
        Ok(())
    }

    fn restart_write_from(&mut self, offset: Offset) -> Result<()> {
        // Unflushed bytes are past the checkpoint and will be re-sent.
        self.buffer.clear();
        self.inner.restart_write_from(offset)?;
        self.position = offset;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn moveable(&self) -> bool {
        self.inner.moveable()
    }

    fn double_buffer_ok(&self) -> bool {
        self.inner.double_buffer_ok()
    }

    fn cost(&self, costs: &mut BTreeMap<String, Length>, read: bool) {
        self.inner.cost(costs, read);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for BufferedHandle {
    fn drop(&mut self) {
        if self.mode.is_some() {
            log::warn!("{} dropped while open", self);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempdir::TempDir;

    use super::*;
    use crate::{FileHandle, MemoryHandle};

    #[test]
    fn batches_writes_until_the_buffer_fills() {
        let dir = TempDir::new("buffered").unwrap();
        let path = dir.path().join("out");

        let mut handle = BufferedHandle::with_capacity(Box::new(FileHandle::new(&path)), 8);
        handle.open_for_write(Length(0)).unwrap();
        handle.write(b"abc").unwrap();
        handle.write(b"de").unwrap();
        // Nothing reached the file yet.
        assert_eq!(fs::read(&path).unwrap(), b"");

        handle.write(b"fghij").unwrap();
        // First eight bytes crossed on the fill, the tail is pending.
        assert_eq!(fs::read(&path).unwrap(), b"abcdefgh");
        assert_eq!(handle.position().unwrap(), Offset(10));

        handle.close().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abcdefghij");
    }

    #[test]
    fn serves_reads_from_the_prefetch() {
        let mut handle =
            BufferedHandle::with_capacity(Box::new(MemoryHandle::from_slice(b"abcdefghij")), 4);
        handle.open_for_read().unwrap();

        let mut buffer = [0u8; 3];
        assert_eq!(handle.read(&mut buffer).unwrap(), 3);
        assert_eq!(&buffer, b"abc");
        assert_eq!(handle.position().unwrap(), Offset(3));

        // Only one byte left in the prefetch; short read, then refill.
        assert_eq!(handle.read(&mut buffer).unwrap(), 1);
        assert_eq!(&buffer[..1], b"d");
        assert_eq!(handle.read(&mut buffer).unwrap(), 3);
        assert_eq!(&buffer, b"efg");

        handle.close().unwrap();
    }

    #[test]
    fn seek_discards_the_read_ahead() {
        let mut handle =
            BufferedHandle::with_capacity(Box::new(MemoryHandle::from_slice(b"abcdefghij")), 4);
        handle.open_for_read().unwrap();

        let mut buffer = [0u8; 2];
        handle.read(&mut buffer).unwrap();
        handle.seek(Offset(8)).unwrap();
        assert_eq!(handle.position().unwrap(), Offset(8));
        assert_eq!(handle.read(&mut buffer).unwrap(), 2);
        assert_eq!(&buffer, b"ij");

        handle.close().unwrap();
    }

    #[test]
    fn flush_pushes_pending_writes_through() {
        let dir = TempDir::new("buffered").unwrap();
        let path = dir.path().join("out");

        let mut handle = BufferedHandle::with_capacity(Box::new(FileHandle::new(&path)), 64);
        handle.open_for_write(Length(0)).unwrap();
        handle.write(b"abc").unwrap();
        handle.flush().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abc");
        handle.close().unwrap();
    }
}
