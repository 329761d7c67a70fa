use std::sync::{Mutex, MutexGuard};

use io_error::{HandleError, Result};
use io_range::{Length, Offset};

use crate::handle::Handle;

/// Locks recovering from poisoning: handle state stays usable because
/// every operation reports through `Result` rather than relying on
/// invariants a panicking thread could have broken.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Maps a logical position to (segment index, offset within segment)
/// when the segments are laid out back to back.
///
/// `None` when the position lies outside the addressed bytes; the total
/// length itself maps to the at-end cursor `(segments.len(), 0)`.
pub(crate) fn locate(lengths: &[Length], target: Offset) -> Option<(usize, Length)> {
    let mut begin = 0i64;
    for (index, length) in lengths.iter().enumerate() {
        let end = begin + length.0;
        if target.0 < end {
            if target.0 < begin {
                return None;
            }
            return Some((index, Length(target.0 - begin)));
        }
        begin = end;
    }
    if target.0 == begin {
        Some((lengths.len(), Length(0)))
    } else {
        None
    }
}

/// Pushes a whole chunk into a handle, looping over short writes.
pub(crate) fn write_all(to: &mut dyn Handle, mut chunk: &[u8]) -> Result<()> {
    while !chunk.is_empty() {
        let n = to.write(chunk)?;
        if n == 0 {
            return Err(HandleError::Write(
                to.to_string(),
                std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "handle accepted no bytes",
                ),
            ));
        }
        chunk = &chunk[n..];
    }
    Ok(())
}
