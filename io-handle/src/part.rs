use std::{any::Any, collections::BTreeMap, fmt};

use io_error::{HandleError, Result};
use io_range::{Length, Offset};

use crate::{handle::Handle, util};

/// Range-restricted view over another handle.
///
/// Addressing works exactly as in [`PartFileHandle`], but the underlying
/// resource is any seekable handle rather than a file name, so the inner
/// handle may itself be pooled, buffered or in memory. The part owns the
/// inner handle, forwards open and close to it, and seeks it before every
/// chunk; unlike its file-named sibling it cannot merge or clone, since
/// two parts never prove they wrap the same resource.
///
/// [`PartFileHandle`]: crate::PartFileHandle
pub struct PartHandle {
    inner: Box<dyn Handle>,
    offsets: Vec<Offset>,
    lengths: Vec<Length>,
    index: usize,
    within: Length,
    open: bool,
}

impl PartHandle {
    /// Builds the part and immediately merges exactly-touching ranges.
    ///
    /// Panics if the two lists have different sizes.
    pub fn new(inner: Box<dyn Handle>, offsets: Vec<Offset>, lengths: Vec<Length>) -> Self {
        assert_eq!(
            offsets.len(),
            lengths.len(),
            "range lists must be parallel"
        );
        let mut handle = PartHandle {
            inner,
            offsets,
            lengths,
            index: 0,
            within: Length(0),
            open: false,
        };
        io_range::compress(&mut handle.offsets, &mut handle.lengths);
        handle
    }

    /// Single-range convenience constructor.
    pub fn single(inner: Box<dyn Handle>, offset: Offset, length: Length) -> Self {
        Self::new(inner, vec![offset], vec![length])
    }

    pub fn ranges(&self) -> (&[Offset], &[Length]) {
        (&self.offsets, &self.lengths)
    }

    fn total(&self) -> Length {
        self.lengths.iter().sum()
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
        self.inner.seek(at)?;
        let n = self.inner.read(&mut buffer[..wanted])?;
        if n != wanted {
            // A range the list promised is missing bytes: the resource
            // shrank or the list lied. Not end of data.
            return Err(HandleError::Read(
                self.inner.to_string(),
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

impl fmt::Display for PartHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "part_handle({}, {} ranges)",
            self.inner,
            self.offsets.len()
        )
    }
}

impl Handle for PartHandle {
    fn open_for_read(&mut self) -> Result<Length> {
        self.inner.open_for_read()?;
        self.open = true;
        self.index = 0;
        self.within = Length(0);
        Ok(self.total())
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
        self.open = false;
        self.inner.close()
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
        match util::locate(&self.lengths, offset) {
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
        log::warn!("restarting read of {} from offset {}", self, offset);
        self.seek(offset)?;
        Ok(())
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
        self.inner.moveable()
    }

    fn cost(&self, costs: &mut BTreeMap<String, Length>, read: bool) {
        self.inner.cost(costs, read);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for PartHandle {
    fn drop(&mut self) {
        if self.open {
            log::warn!("{} dropped while open", self);
        }
    }
}

#[cfg(test)]
mod tests {
    use quickcheck_macros::quickcheck;

    use super::*;
    use crate::MemoryHandle;

    const CONTENT: &[u8] = b"abcdefghijklmnopqrstuvwxyz01234";

    fn scattered() -> PartHandle {
        PartHandle::new(
            Box::new(MemoryHandle::from_slice(CONTENT)),
            vec![Offset(0), Offset(2), Offset(6), Offset(13), Offset(23)],
            vec![Length(1), Length(2), Length(4), Length(6), Length(8)],
        )
    }

    fn read_all(handle: &mut dyn Handle) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buffer = [0u8; 5];
        loop {
            let n = handle.read(&mut buffer).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buffer[..n]);
        }
        out
    }

    #[test]
    fn reads_ranges_of_the_inner_handle() {
        let mut handle = scattered();
        assert_eq!(handle.open_for_read().unwrap(), Length(21));
        assert_eq!(read_all(&mut handle), b"acdghijnopqrsxyz01234");
        assert_eq!(handle.position().unwrap(), Offset(21));
        handle.close().unwrap();
    }

    #[test]
    fn seeks_in_the_part_coordinate_space() {
        let mut handle = scattered();
        handle.open_for_read().unwrap();

        handle.seek(Offset(10)).unwrap();
        let mut buffer = [0u8; 13];
        let n = handle.read(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"qrsxyz01234");

        assert_eq!(handle.seek(Offset(21)).unwrap(), Offset(21));
        assert!(matches!(
            handle.seek(Offset(22)),
            Err(HandleError::Contract(_))
        ));

        handle.close().unwrap();
    }

    #[test]
    fn construction_compresses_touching_ranges() {
        let handle = PartHandle::new(
            Box::new(MemoryHandle::from_slice(CONTENT)),
            vec![Offset(0), Offset(3), Offset(10)],
            vec![Length(3), Length(4), Length(2)],
        );
        let (offsets, lengths) = handle.ranges();
        assert_eq!(offsets, &[Offset(0), Offset(10)]);
        assert_eq!(lengths, &[Length(7), Length(2)]);
    }

    #[quickcheck]
    fn reading_matches_manual_extraction(pairs: Vec<(u8, u8)>) -> bool {
        let data: Vec<u8> = (0u8..=255).collect();

        let mut offsets = Vec::new();
        let mut lengths = Vec::new();
        let mut expected = Vec::new();
        for (o, l) in pairs {
            let offset = (o as i64) % 200;
            let length = (l as i64) % 56;
            offsets.push(Offset(offset));
            lengths.push(Length(length));
            expected.extend_from_slice(&data[offset as usize..(offset + length) as usize]);
        }

        let mut handle = PartHandle::new(Box::new(MemoryHandle::from_vec(data)), offsets, lengths);
        handle.open_for_read().unwrap();
        let got = read_all(&mut handle);
        handle.close().unwrap();
        got == expected
    }

    #[test]
    fn write_side_is_unsupported() {
        let mut handle = scattered();
        assert!(matches!(
            handle.open_for_write(Length(0)),
            Err(HandleError::Unsupported(_, _))
        ));
        assert!(matches!(
            handle.write(b"abc"),
            Err(HandleError::Unsupported(_, _))
        ));
    }
}
