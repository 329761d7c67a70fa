//! Bulk copy between two handles, with progress watching, rate logging
//! and automatic recovery from restart faults.

use std::time::{Duration, Instant};

use io_error::{HandleError, Result};
use io_range::Length;

use crate::{
    bytes::Bytes,
    config,
    dbl_buffer::DblBuffer,
    handle::Handle,
    util,
    watcher::{NullWatcher, TransferWatcher},
};

/// Explicit transfer knobs; the default reads the environment-derived
/// configuration once.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Chunk size of the single-buffered copy loop.
    pub buffer_size: usize,
    /// `(count, size)` slot-ring geometry for the threaded copy; `None`
    /// keeps the copy on the calling thread.
    pub double_buffer: Option<(usize, usize)>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            buffer_size: config::copy_buffer_size(),
            double_buffer: config::double_buffer(),
        }
    }
}

/// Copies the whole of `from` into `to` with default options and no
/// watcher. Returns the number of bytes moved.
pub fn save_into(from: &mut dyn Handle, to: &mut dyn Handle) -> Result<Length> {
    save_into_with(from, to, TransferOptions::default(), &mut NullWatcher)
}

/// [`save_into`] with a caller-supplied progress watcher.
pub fn save_into_watched(
    from: &mut dyn Handle,
    to: &mut dyn Handle,
    watcher: &mut dyn TransferWatcher,
) -> Result<Length> {
    save_into_with(from, to, TransferOptions::default(), watcher)
}

/// The full transfer protocol.
///
/// Opens both ends, pumps `from` into `to`, and closes both ends on every
/// path. A [`HandleError::Restart`] surfaced by either end repositions
/// both at the carried checkpoint and re-enters the loop; recovery is
/// re-entrant, so a second fault during a resumed copy restarts again.
/// When the source announced a nonzero length, moving a different byte
/// count is a [`HandleError::SizeMismatch`].
pub fn save_into_with(
    from: &mut dyn Handle,
    to: &mut dyn Handle,
    options: TransferOptions,
    watcher: &mut dyn TransferWatcher,
) -> Result<Length> {
    from.compress(false);

    let estimate = from.open_for_read()?;
    watcher.from_handle_opened(&from.to_string(), estimate);

    if let Err(error) = to.open_for_write(estimate) {
        if let Err(close_error) = from.close() {
            log::warn!("closing {} after failed open: {}", from, close_error);
        }
        return Err(error);
    }
    watcher.to_handle_opened(&to.to_string(), estimate);

    let outcome = pump(from, to, options, watcher);
    let closed = close_both(from, to);

    let total = outcome?;
    closed?;

    if estimate != Length(0) && total != estimate {
        return Err(HandleError::SizeMismatch {
            expected: estimate,
            actual: total,
        });
    }
    Ok(total)
}

/// Quiet copy: same pump, no watcher, no restart recovery, no rate logs.
pub fn copy_to(from: &mut dyn Handle, to: &mut dyn Handle, buffer_size: usize) -> Result<Length> {
    let estimate = from.open_for_read()?;
    if let Err(error) = to.open_for_write(estimate) {
        if let Err(close_error) = from.close() {
            log::warn!("closing {} after failed open: {}", from, close_error);
        }
        return Err(error);
    }

    let mut buffer = vec![0u8; buffer_size];
    let outcome = run(
        from,
        to,
        &mut buffer,
        Length(0),
        &mut NullWatcher,
        &mut Times::default(),
    );
    let closed = close_both(from, to);

    let total = outcome?;
    closed?;
    Ok(total)
}

/// Whether two handles produce byte-identical streams.
pub fn compare(left: &mut dyn Handle, right: &mut dyn Handle) -> Result<bool> {
    const BUFFER: usize = 64 * 1024;

    left.open_for_read()?;
    if let Err(error) = right.open_for_read() {
        if let Err(close_error) = left.close() {
            log::warn!("closing {} after failed open: {}", left, close_error);
        }
        return Err(error);
    }

    let outcome: Result<bool> = (|| {
        let mut a = vec![0u8; BUFFER];
        let mut b = vec![0u8; BUFFER];
        loop {
            let n = read_full(left, &mut a)?;
            let m = read_full(right, &mut b)?;
            if n != m || a[..n] != b[..m] {
                return Ok(false);
            }
            if n == 0 {
                return Ok(true);
            }
        }
    })();
    let closed = close_both(left, right);

    let equal = outcome?;
    closed?;
    Ok(equal)
}

#[derive(Default)]
struct Times {
    read: Duration,
    write: Duration,
}

/// The copy loop with restart recovery wrapped around the inner pump.
fn pump(
    from: &mut dyn Handle,
    to: &mut dyn Handle,
    options: TransferOptions,
    watcher: &mut dyn TransferWatcher,
) -> Result<Length> {
    let threaded = options
        .double_buffer
        .filter(|_| from.double_buffer_ok() && to.double_buffer_ok());
    let mut buffer = match threaded {
        Some(_) => Vec::new(),
        None => vec![0u8; options.buffer_size],
    };

    let begin = Instant::now();
    let mut times = Times::default();
    let mut total = Length(0);
    loop {
        let attempt = match threaded {
            Some((count, size)) => DblBuffer::new(count, size).copy(from, to, total, watcher),
            None => run(from, to, &mut buffer, total, watcher, &mut times),
        };
        match attempt {
            Ok(moved) => {
                log_rates(moved, begin.elapsed(), &times, threaded.is_some());
                return Ok(moved);
            }
            Err(error) => match error.restart_offset() {
                Some(offset) => {
                    log::warn!("transfer interrupted, restarting from offset {}", offset);
                    from.restart_read_from(offset)?;
                    to.restart_write_from(offset)?;
                    watcher.restart_from(offset);
                    total = Length(offset.0);
                }
                None => return Err(error),
            },
        }
    }
}

/// Single-buffered pump; `start` is the byte total already moved.
fn run(
    from: &mut dyn Handle,
    to: &mut dyn Handle,
    buffer: &mut [u8],
    start: Length,
    watcher: &mut dyn TransferWatcher,
    times: &mut Times,
) -> Result<Length> {
    let mut total = start;
    loop {
        let begin = Instant::now();
        let n = from.read(buffer)?;
        times.read += begin.elapsed();
        if n == 0 {
            return Ok(total);
        }

        let begin = Instant::now();
        util::write_all(to, &buffer[..n])?;
        times.write += begin.elapsed();

        watcher.watch(&buffer[..n]);
        total += Length(n as i64);
    }
}

fn close_both(from: &mut dyn Handle, to: &mut dyn Handle) -> Result<()> {
    let to_closed = to.close();
    let from_closed = from.close();
    to_closed?;
    from_closed?;
    Ok(())
}

fn read_full(handle: &mut dyn Handle, buffer: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buffer.len() {
        let n = handle.read(&mut buffer[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn log_rates(total: Length, elapsed: Duration, times: &Times, threaded: bool) {
    let rate = |duration: Duration| {
        if duration.is_zero() {
            Bytes(0.0)
        } else {
            Bytes(total.0 as f64 / duration.as_secs_f64())
        }
    };
    if threaded {
        // Per-direction times are not meaningful when they overlap.
        log::info!(
            "transferred {} in {:.2?} ({}/s, double-buffered)",
            Bytes::from(total),
            elapsed,
            rate(elapsed)
        );
    } else {
        log::info!(
            "transferred {} in {:.2?} ({}/s read, {}/s write)",
            Bytes::from(total),
            elapsed,
            rate(times.read),
            rate(times.write)
        );
    }
}

#[cfg(test)]
mod tests {
    use std::{any::Any, collections::VecDeque, fmt, fs};

    use io_range::Offset;
    use tempdir::TempDir;

    use super::*;
    use crate::{FileHandle, MemoryHandle, MultiHandle, PartFileHandle};

    const CONTENT: &[u8] = b"abcdefghijklmnopqrstuvwxyz01234";

    fn options(buffer_size: usize) -> TransferOptions {
        TransferOptions {
            buffer_size,
            double_buffer: None,
        }
    }

    #[test]
    fn copies_byte_exact() {
        let mut from = MemoryHandle::from_slice(CONTENT);
        let mut to = MemoryHandle::new();

        let moved = save_into_with(&mut from, &mut to, options(7), &mut NullWatcher).unwrap();
        assert_eq!(moved, Length(31));
        assert_eq!(to.data(), CONTENT);
    }

    #[test]
    fn copies_composites_with_default_options() {
        let dir = TempDir::new("transfer").unwrap();
        let path = dir.path().join("source");
        fs::write(&path, CONTENT).unwrap();

        let mut from = MultiHandle::new();
        from.add(Box::new(PartFileHandle::new(
            &path,
            vec![Offset(0), Offset(2), Offset(6), Offset(13), Offset(23)],
            vec![Length(1), Length(2), Length(4), Length(6), Length(8)],
        )));
        from.add(Box::new(MemoryHandle::from_slice(b"-tail")));

        let mut to = MemoryHandle::new();
        let moved = save_into(&mut from, &mut to).unwrap();
        assert_eq!(moved, Length(26));
        assert_eq!(to.data(), b"acdghijnopqrsxyz01234-tail");
    }

    /// Destination raising restart faults at chosen byte totals.
    struct FaultyDestination {
        inner: MemoryHandle,
        faults: VecDeque<(i64, i64)>, // (fire when total reaches, resume offset)
        accepted: i64,
    }

    impl FaultyDestination {
        fn new(faults: &[(i64, i64)]) -> Self {
            FaultyDestination {
                inner: MemoryHandle::new(),
                faults: faults.iter().copied().collect(),
                accepted: 0,
            }
        }
    }

    impl fmt::Display for FaultyDestination {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "faulty_destination({})", self.inner)
        }
    }

    impl Handle for FaultyDestination {
        fn open_for_read(&mut self) -> Result<Length> {
            self.inner.open_for_read()
        }

        fn open_for_write(&mut self, estimate: Length) -> Result<()> {
            self.inner.open_for_write(estimate)
        }

        fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
            self.inner.read(buffer)
        }

        fn write(&mut self, buffer: &[u8]) -> Result<usize> {
            if let Some((fire_at, resume)) = self.faults.front().copied() {
                if self.accepted >= fire_at {
                    self.faults.pop_front();
                    return Err(HandleError::Restart(Offset(resume)));
                }
            }
            let n = self.inner.write(buffer)?;
            self.accepted += n as i64;
            Ok(n)
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }

        fn restart_write_from(&mut self, offset: Offset) -> Result<()> {
            self.accepted = offset.0;
            self.inner.restart_write_from(offset)
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    /// Tracks watcher notifications for the restart tests.
    #[derive(Default)]
    struct Recorder {
        chunks: usize,
        restarts: Vec<Offset>,
        opened: usize,
    }

    impl TransferWatcher for Recorder {
        fn watch(&mut self, _chunk: &[u8]) {
            self.chunks += 1;
        }

        fn restart_from(&mut self, offset: Offset) {
            self.restarts.push(offset);
        }

        fn from_handle_opened(&mut self, _name: &str, _estimate: Length) {
            self.opened += 1;
        }

        fn to_handle_opened(&mut self, _name: &str, _estimate: Length) {
            self.opened += 1;
        }
    }

    #[test]
    fn restart_faults_resume_without_corruption() {
        // Fault at the start, in the middle, and on the last chunk.
        for (fire_at, resume) in [(0, 0), (12, 4), (28, 20)] {
            let mut from = MemoryHandle::from_slice(CONTENT);
            let mut to = FaultyDestination::new(&[(fire_at, resume)]);
            let mut recorder = Recorder::default();

            let moved =
                save_into_with(&mut from, &mut to, options(4), &mut recorder).unwrap();
            assert_eq!(moved, Length(31));
            assert_eq!(to.inner.data(), CONTENT);
            assert_eq!(recorder.restarts, vec![Offset(resume)]);
        }
    }

    #[test]
    fn recovery_is_reentrant() {
        let mut from = MemoryHandle::from_slice(CONTENT);
        // The second fault fires while recovering from the first.
        let mut to = FaultyDestination::new(&[(16, 8), (12, 0)]);

        let moved = save_into_with(&mut from, &mut to, options(4), &mut NullWatcher).unwrap();
        assert_eq!(moved, Length(31));
        assert_eq!(to.inner.data(), CONTENT);
    }

    #[test]
    fn watcher_sees_opens_and_chunks() {
        let mut from = MemoryHandle::from_slice(CONTENT);
        let mut to = MemoryHandle::new();
        let mut recorder = Recorder::default();

        save_into_with(&mut from, &mut to, options(10), &mut recorder).unwrap();
        assert_eq!(recorder.opened, 2);
        assert_eq!(recorder.chunks, 4); // 10 + 10 + 10 + 1
        assert!(recorder.restarts.is_empty());
    }

    /// Source whose announced length disagrees with its content.
    struct LyingSource(MemoryHandle);

    impl fmt::Display for LyingSource {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "lying_source({})", self.0)
        }
    }

    impl Handle for LyingSource {
        fn open_for_read(&mut self) -> Result<Length> {
            Ok(self.0.open_for_read()? + Length(5))
        }

        fn open_for_write(&mut self, estimate: Length) -> Result<()> {
            self.0.open_for_write(estimate)
        }

        fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
            self.0.read(buffer)
        }

        fn write(&mut self, buffer: &[u8]) -> Result<usize> {
            self.0.write(buffer)
        }

        fn close(&mut self) -> Result<()> {
            self.0.close()
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn short_transfers_are_reported_not_swallowed() {
        let mut from = LyingSource(MemoryHandle::from_slice(CONTENT));
        let mut to = MemoryHandle::new();

        match save_into_with(&mut from, &mut to, options(8), &mut NullWatcher) {
            Err(HandleError::SizeMismatch { expected, actual }) => {
                assert_eq!(expected, Length(36));
                assert_eq!(actual, Length(31));
            }
            other => panic!("expected a size mismatch, got {:?}", other.map(|l| l.0)),
        }
        // Both ends were closed despite the failure.
        assert_eq!(to.data(), CONTENT);
    }

    #[test]
    fn failed_destination_open_closes_the_source() {
        let dir = TempDir::new("transfer").unwrap();
        let mut from = MemoryHandle::from_slice(CONTENT);
        let mut to = FileHandle::new(dir.path().join("no/such/dir/out"));

        assert!(matches!(
            save_into_with(&mut from, &mut to, options(8), &mut NullWatcher),
            Err(HandleError::Open(_, _))
        ));
    }

    #[test]
    fn double_buffered_transfers_match() {
        let data: Vec<u8> = (0..50_000).map(|i| (i % 239) as u8).collect();
        let mut from = MemoryHandle::from_vec(data.clone());
        let mut to = MemoryHandle::new();

        let transfer_options = TransferOptions {
            buffer_size: 4096,
            double_buffer: Some((3, 1024)),
        };
        let moved =
            save_into_with(&mut from, &mut to, transfer_options, &mut NullWatcher).unwrap();
        assert_eq!(moved, Length(50_000));
        assert_eq!(to.data(), &data[..]);
    }

    #[test]
    fn double_buffered_restart_recovers() {
        let mut from = MemoryHandle::from_slice(CONTENT);
        let mut to = FaultyDestination::new(&[(12, 4)]);

        let transfer_options = TransferOptions {
            buffer_size: 4,
            double_buffer: Some((2, 4)),
        };
        let moved =
            save_into_with(&mut from, &mut to, transfer_options, &mut NullWatcher).unwrap();
        assert_eq!(moved, Length(31));
        assert_eq!(to.inner.data(), CONTENT);
    }

    #[test]
    fn copy_to_moves_bytes_quietly() {
        let dir = TempDir::new("transfer").unwrap();
        let source = dir.path().join("source");
        let target = dir.path().join("target");
        fs::write(&source, CONTENT).unwrap();

        let mut from = FileHandle::new(&source);
        let mut to = FileHandle::new(&target);
        assert_eq!(copy_to(&mut from, &mut to, 8).unwrap(), Length(31));
        assert_eq!(fs::read(&target).unwrap(), CONTENT);
    }

    #[test]
    fn compare_detects_equality_and_divergence() {
        let mut a = MemoryHandle::from_slice(CONTENT);
        let mut b = MemoryHandle::from_slice(CONTENT);
        assert!(compare(&mut a, &mut b).unwrap());

        let mut c = MemoryHandle::from_slice(b"abcdefghijklmnopqrstuvwxyz0123X");
        assert!(!compare(&mut a, &mut c).unwrap());

        let mut shorter = MemoryHandle::from_slice(&CONTENT[..30]);
        assert!(!compare(&mut a, &mut shorter).unwrap());
    }
}
