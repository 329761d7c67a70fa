use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use io_error::Result;
use io_range::{Length, Offset};

use crate::{handle::Handle, util};

/// Non-owning alias over another handle.
///
/// Clones address the same underlying handle and cursor; every operation
/// is forwarded under an internal lock. `close` is deliberately a no-op
/// so that passing an alias to code following the open/close discipline
/// does not close the handle under its owner; the owner calls
/// [`close_underlying`](Self::close_underlying) when everyone is done.
#[derive(Clone)]
pub struct SharedHandle {
    inner: Arc<Mutex<Box<dyn Handle>>>,
}

impl SharedHandle {
    pub fn new(inner: Box<dyn Handle>) -> Self {
        SharedHandle {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Actually closes the wrapped handle; the owner's counterpart of the
    /// aliases' no-op `close`.
    pub fn close_underlying(&self) -> Result<()> {
        util::lock(&self.inner).close()
    }
}

impl fmt::Display for SharedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shared_handle({})", util::lock(&self.inner))
    }
}

impl Handle for SharedHandle {
    fn open_for_read(&mut self) -> Result<Length> {
        util::lock(&self.inner).open_for_read()
    }

    fn open_for_write(&mut self, estimate: Length) -> Result<()> {
        util::lock(&self.inner).open_for_write(estimate)
    }

    fn open_for_append(&mut self, estimate: Length) -> Result<()> {
        util::lock(&self.inner).open_for_append(estimate)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        util::lock(&self.inner).read(buffer)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        util::lock(&self.inner).write(buffer)
    }

    /// No-op: the owner closes, through `close_underlying`.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        util::lock(&self.inner).flush()
    }

    fn rewind(&mut self) -> Result<()> {
        util::lock(&self.inner).rewind()
    }

    fn position(&mut self) -> Result<Offset> {
        util::lock(&self.inner).position()
    }

    fn seek(&mut self, offset: Offset) -> Result<Offset> {
        util::lock(&self.inner).seek(offset)
    }

    fn can_seek(&self) -> bool {
        util::lock(&self.inner).can_seek()
    }

    fn skip(&mut self, length: Length) -> Result<()> {
        util::lock(&self.inner).skip(length)
    }

    fn estimate(&mut self) -> Length {
        util::lock(&self.inner).estimate()
    }

    fn restart_read_from(&mut self, offset: Offset) -> Result<()> {
        util::lock(&self.inner).restart_read_from(offset)
    }

    fn restart_write_from(&mut self, offset: Offset) -> Result<()> {
        util::lock(&self.inner).restart_write_from(offset)
    }

    fn is_empty(&self) -> bool {
        util::lock(&self.inner).is_empty()
    }

    fn moveable(&self) -> bool {
        util::lock(&self.inner).moveable()
    }

    fn double_buffer_ok(&self) -> bool {
        util::lock(&self.inner).double_buffer_ok()
    }

    fn cost(&self, costs: &mut BTreeMap<String, Length>, read: bool) {
        util::lock(&self.inner).cost(costs, read);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
