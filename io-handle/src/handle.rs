use std::{any::Any, collections::BTreeMap, fmt};

use io_error::{HandleError, Result};
use io_range::{Length, Offset};

/// How a handle was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

/// Uniform contract for moving bytes in and out of a resource.
///
/// A handle is created closed, must be opened in exactly one mode before
/// any data operation, and must be closed again when done. Dropping a
/// handle that is still open is a caller mistake; implementations log a
/// warning because `Drop` cannot report errors.
///
/// `read` may return fewer bytes than asked for; `Ok(0)` means end of
/// data, never a transient condition. Optional operations default to
/// [`HandleError::Unsupported`] or a neutral value, and the capability
/// probes (`can_seek`, `moveable`, `double_buffer_ok`) let generic code
/// branch without knowing the concrete type.
///
/// `Send` is required so a handle can cross into the double-buffered
/// copy's worker thread. `Display` names the handle kind and its resource
/// for logs and error messages.
pub trait Handle: Send + fmt::Display {
    /// Opens for reading and returns the expected length, 0 if unknown.
    fn open_for_read(&mut self) -> Result<Length>;

    /// Opens for writing; `estimate` is a size hint, 0 if unknown.
    fn open_for_write(&mut self, estimate: Length) -> Result<()>;

    fn open_for_append(&mut self, _estimate: Length) -> Result<()> {
        Err(HandleError::unsupported("open_for_append", self))
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buffer: &[u8]) -> Result<usize>;

    fn close(&mut self) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Err(HandleError::unsupported("flush", self))
    }

    fn rewind(&mut self) -> Result<()> {
        Err(HandleError::unsupported("rewind", self))
    }

    fn position(&mut self) -> Result<Offset> {
        Err(HandleError::unsupported("position", self))
    }

    fn seek(&mut self, _offset: Offset) -> Result<Offset> {
        Err(HandleError::unsupported("seek", self))
    }

    fn can_seek(&self) -> bool {
        false
    }

    /// Relative motion; negative lengths move backwards.
    fn skip(&mut self, length: Length) -> Result<()> {
        let here = self.position()?;
        self.seek(here + length)?;
        Ok(())
    }

    /// Best-effort size hint; 0 when unknown. Never fails.
    fn estimate(&mut self) -> Length {
        Length(0)
    }

    /// Repositions an open read handle at a transfer checkpoint.
    fn restart_read_from(&mut self, _offset: Offset) -> Result<()> {
        Err(HandleError::unsupported("restart_read_from", self))
    }

    /// Repositions an open write handle at a transfer checkpoint.
    fn restart_write_from(&mut self, _offset: Offset) -> Result<()> {
        Err(HandleError::unsupported("restart_write_from", self))
    }

    /// Fresh closed handle addressing the same resource.
    fn clone_handle(&self) -> Result<Box<dyn Handle>> {
        Err(HandleError::unsupported("clone_handle", self))
    }

    /// Tries to absorb `other` into this handle.
    ///
    /// On `true` the other handle has been drained and should be
    /// discarded; on `false` both handles are unchanged.
    fn merge(&mut self, _other: &mut dyn Handle) -> bool {
        false
    }

    /// Compacts internal structure (ranges, members); returns whether
    /// anything changed.
    fn compress(&mut self, _sort: bool) -> bool {
        false
    }

    /// Whether the handle addresses no bytes at all.
    fn is_empty(&self) -> bool {
        false
    }

    /// Whether the handle is a stateless description that a remote peer
    /// could reconstruct.
    fn moveable(&self) -> bool {
        false
    }

    /// Veto for the threaded double-buffered copy.
    fn double_buffer_ok(&self) -> bool {
        true
    }

    /// Accumulates the estimated bytes this handle touches, keyed by
    /// resource location. Write-side handles register their key with an
    /// empty cost so placement decisions can see them.
    fn cost(&self, _costs: &mut BTreeMap<String, Length>, _read: bool) {}

    /// Downcast seam used by `merge` implementations.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
