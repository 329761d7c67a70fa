use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    time::{Duration, Instant},
};

use io_error::Result;
use io_range::{Length, Offset};

use crate::{bytes::Bytes, handle::Handle};

/// Decorator counting operations without changing them.
///
/// Call counts, byte totals and wall time per direction accumulate over
/// the wrapped handle's whole lifetime; a summary is logged when the
/// handle is dropped.
pub struct StatsHandle {
    inner: Box<dyn Handle>,
    nb_opens: usize,
    nb_reads: usize,
    nb_writes: usize,
    nb_seeks: usize,
    nb_closes: usize,
    bytes_read: Length,
    bytes_written: Length,
    read_time: Duration,
    write_time: Duration,
}

impl StatsHandle {
    pub fn new(inner: Box<dyn Handle>) -> Self {
        StatsHandle {
            inner,
            nb_opens: 0,
            nb_reads: 0,
            nb_writes: 0,
            nb_seeks: 0,
            nb_closes: 0,
            bytes_read: Length(0),
            bytes_written: Length(0),
            read_time: Duration::ZERO,
            write_time: Duration::ZERO,
        }
    }

    pub fn nb_opens(&self) -> usize {
        self.nb_opens
    }

    pub fn nb_reads(&self) -> usize {
        self.nb_reads
    }

    pub fn nb_writes(&self) -> usize {
        self.nb_writes
    }

    pub fn nb_seeks(&self) -> usize {
        self.nb_seeks
    }

    pub fn nb_closes(&self) -> usize {
        self.nb_closes
    }

    pub fn bytes_read(&self) -> Length {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> Length {
        self.bytes_written
    }

    pub fn read_time(&self) -> Duration {
        self.read_time
    }

    pub fn write_time(&self) -> Duration {
        self.write_time
    }
}

impl fmt::Display for StatsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stats_handle({}, {} read in {} reads, {} written in {} writes)",
            self.inner,
            Bytes::from(self.bytes_read),
            self.nb_reads,
            Bytes::from(self.bytes_written),
            self.nb_writes
        )
    }
}

impl Handle for StatsHandle {
    fn open_for_read(&mut self) -> Result<Length> {
        self.nb_opens += 1;
        self.inner.open_for_read()
    }

    fn open_for_write(&mut self, estimate: Length) -> Result<()> {
        self.nb_opens += 1;
        self.inner.open_for_write(estimate)
    }

    fn open_for_append(&mut self, estimate: Length) -> Result<()> {
        self.nb_opens += 1;
        self.inner.open_for_append(estimate)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let begin = Instant::now();
        let result = self.inner.read(buffer);
        self.read_time += begin.elapsed();
        self.nb_reads += 1;
        if let Ok(n) = &result {
            self.bytes_read += Length(*n as i64);
        }
        result
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        let begin = Instant::now();
        let result = self.inner.write(buffer);
        self.write_time += begin.elapsed();
        self.nb_writes += 1;
        if let Ok(n) = &result {
            self.bytes_written += Length(*n as i64);
        }
        result
    }

    fn close(&mut self) -> Result<()> {
        self.nb_closes += 1;
        self.inner.close()
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn rewind(&mut self) -> Result<()> {
        self.inner.rewind()
    }

    fn position(&mut self) -> Result<Offset> {
        self.inner.position()
    }

    fn seek(&mut self, offset: Offset) -> Result<Offset> {
        self.nb_seeks += 1;
        self.inner.seek(offset)
    }

    fn can_seek(&self) -> bool {
        self.inner.can_seek()
    }

    fn skip(&mut self, length: Length) -> Result<()> {
        self.nb_seeks += 1;
        self.inner.skip(length)
    }

    fn estimate(&mut self) -> Length {
        self.inner.estimate()
    }

    fn restart_read_from(&mut self, offset: Offset) -> Result<()> {
        self.inner.restart_read_from(offset)
    }

    fn restart_write_from(&mut self, offset: Offset) -> Result<()> {
        self.inner.restart_write_from(offset)
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

impl Drop for StatsHandle {
    fn drop(&mut self) {
        log::info!(
            "{}: {:?} reading, {:?} writing, {} opens, {} seeks, {} closes",
            self,
            self.read_time,
            self.write_time,
            self.nb_opens,
            self.nb_seeks,
            self.nb_closes
        );
    }
}
