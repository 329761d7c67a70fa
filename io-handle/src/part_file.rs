use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use io_error::{HandleError, Result};
use io_range::{Length, Offset};

use crate::{config, handle::Handle};

/// Read-only handle over a sparse subset of one file.
///
/// The ranges are presented as a single dense stream: reading walks them
/// in list order, positioning the file before every chunk, so the caller
/// never sees the gaps. The cursor is the pair (current range, bytes
/// consumed within it); zero-length ranges are skipped.
pub struct PartFileHandle {
    path: PathBuf,
    offsets: Vec<Offset>,
    lengths: Vec<Length>,
    file: Option<File>,
    index: usize,
    within: Length,
}

impl PartFileHandle {
    /// Builds the handle and immediately merges exactly-touching ranges.
    /// The list order is preserved; sorting is the caller's decision.
    ///
    /// Panics if the two lists have different sizes.
    pub fn new<P: AsRef<Path>>(path: P, offsets: Vec<Offset>, lengths: Vec<Length>) -> Self {
        assert_eq!(
            offsets.len(),
            lengths.len(),
            "range lists must be parallel"
        );
        let mut handle = PartFileHandle {
            path: path.as_ref().to_path_buf(),
            offsets,
            lengths,
            file: None,
            index: 0,
            within: Length(0),
        };
        io_range::compress(&mut handle.offsets, &mut handle.lengths);
        handle
    }

    /// Single-range convenience constructor.
    pub fn single<P: AsRef<Path>>(path: P, offset: Offset, length: Length) -> Self {
        Self::new(path, vec![offset], vec![length])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ranges(&self) -> (&[Offset], &[Length]) {
        (&self.offsets, &self.lengths)
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn total(&self) -> Length {
        self.lengths.iter().sum()
    }

    /// Maps a logical position to (range index, offset within range).
    /// `None` when the position lies beyond the addressed bytes; the
    /// total length itself maps to the at-end cursor.
    fn locate(&self, target: Offset) -> Option<(usize, Length)> {
        crate::util::locate(&self.lengths, target)
    }

    fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize> {
        while self.index < self.lengths.len() && self.within >= self.lengths[self.index] {
            self.index += 1;
            self.within = Length(0);
        }
        if self.index >= self.lengths.len() {
            return Ok(0);
        }

        let remaining = self.lengths[self.index] - self.within;
        let wanted = buffer.len().min(remaining.as_usize());
        if wanted == 0 {
            return Ok(0);
        }

        let at = self.offsets[self.index] + self.within;
        let file = self.file.as_mut().ok_or_else(|| {
            HandleError::Contract(format!("{} read while closed", self.path.display()))
        })?;
        file.seek(SeekFrom::Start(at.0 as u64))
            .map_err(|e| HandleError::Read(self.path.display().to_string(), e))?;
        let n = file
            .read(&mut buffer[..wanted])
            .map_err(|e| HandleError::Read(self.path.display().to_string(), e))?;
        if n != wanted {
            // A range the list promised is missing bytes: the resource
            // shrank or the list lied. Not end of data.
            return Err(HandleError::Read(
                self.path.display().to_string(),
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("short read: {} of {} at offset {}", n, wanted, at),
                ),
            ));
        }

        self.within += Length(n as i64);
        Ok(n)
    }
}

impl fmt::Display for PartFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "part_file_handle({}, {} ranges)",
            self.path.display(),
            self.offsets.len()
        )
    }
}

impl Handle for PartFileHandle {
    fn open_for_read(&mut self) -> Result<Length> {
        if self.file.is_none() {
            let file = File::open(&self.path).map_err(|e| HandleError::Open(self.name(), e))?;
            self.file = Some(file);
        }
        self.index = 0;
        self.within = Length(0);
        let total = self.total();
        log::debug!(
            "open_for_read {}: {} ranges, {} bytes",
            self.path.display(),
            self.offsets.len(),
            total
        );
        Ok(total)
    }

    fn open_for_write(&mut self, _estimate: Length) -> Result<()> {
        Err(HandleError::unsupported("open_for_write", self))
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buffer.len() {
            let n = self.read_chunk(&mut buffer[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    fn write(&mut self, _buffer: &[u8]) -> Result<usize> {
        Err(HandleError::unsupported("write", self))
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            log::debug!("close {}", self.path.display());
        }
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.index = 0;
        self.within = Length(0);
        Ok(())
    }

    fn position(&mut self) -> Result<Offset> {
        let consumed: Length = self.lengths[..self.index].iter().sum();
        Ok(Offset(consumed.0 + self.within.0))
    }

    fn seek(&mut self, offset: Offset) -> Result<Offset> {
        match self.locate(offset) {
            Some((index, within)) => {
                self.index = index;
                self.within = within;
                Ok(offset)
            }
            None => Err(HandleError::Contract(format!(
                "seek to {} outside the {} bytes of {}",
                offset,
                self.total(),
                self
            ))),
        }
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn estimate(&mut self) -> Length {
        self.total()
    }

    fn restart_read_from(&mut self, offset: Offset) -> Result<()> {
        log::warn!(
            "restarting read of {} from offset {}",
            self.path.display(),
            offset
        );
        self.seek(offset)?;
        Ok(())
    }

    fn clone_handle(&self) -> Result<Box<dyn Handle>> {
        Ok(Box::new(PartFileHandle::new(
            &self.path,
            self.offsets.clone(),
            self.lengths.clone(),
        )))
    }

    /// Absorbs another part of the same file; the combined list is
    /// compressed so back-to-back parts collapse.
    fn merge(&mut self, other: &mut dyn Handle) -> bool {
        let Some(other) = other.as_any_mut().downcast_mut::<PartFileHandle>() else {
            return false;
        };
        if other.path != self.path {
            return false;
        }
        if self.file.is_some() || other.file.is_some() {
            return false;
        }

        self.offsets.extend_from_slice(&other.offsets);
        self.lengths.extend_from_slice(&other.lengths);
        io_range::compress(&mut self.offsets, &mut self.lengths);
        log::debug!(
            "merged parts of {}: now {} ranges",
            self.path.display(),
            self.offsets.len()
        );
        true
    }

    fn compress(&mut self, sort: bool) -> bool {
        if sort {
            io_range::sort(&mut self.offsets, &mut self.lengths);
        }
        io_range::compress(&mut self.offsets, &mut self.lengths)
    }

    fn is_empty(&self) -> bool {
        self.lengths.iter().all(|length| length.0 == 0)
    }

    fn moveable(&self) -> bool {
        true
    }

    fn cost(&self, costs: &mut BTreeMap<String, Length>, read: bool) {
        if read {
            *costs.entry(config::node_name()).or_insert(Length(0)) += self.total();
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for PartFileHandle {
    fn drop(&mut self) {
        if self.file.is_some() {
            log::warn!(
                "part_file_handle({}) dropped while open",
                self.path.display()
            );
        }
    }
}
