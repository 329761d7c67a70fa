use std::{any::Any, collections::BTreeMap, fmt};

use io_error::{HandleError, Result};
use io_range::{Length, Offset};

use crate::{
    handle::{Handle, OpenMode},
    util,
};

/// Handle presenting an ordered list of handles as one contiguous stream.
///
/// Each member covers one segment of the virtual address space; the
/// parallel length list is provisional (estimates or declared partition
/// quotas) until `open_for_read` replaces it with each member's real
/// opened length. Reading crosses member boundaries transparently;
/// writing splits the stream at the declared quotas instead, landing each
/// partition in its own member.
///
/// The concatenation exclusively owns its members and is their sole
/// destructor. Members stay open from open until `close`; bounding the
/// number of simultaneously open descriptors is the pool's job, not the
/// concatenation's.
pub struct MultiHandle {
    members: Vec<Box<dyn Handle>>,
    lengths: Vec<Length>,
    index: usize,
    within: Length,
    mode: Option<OpenMode>,
}

impl MultiHandle {
    pub fn new() -> Self {
        MultiHandle {
            members: Vec::new(),
            lengths: Vec::new(),
            index: 0,
            within: Length(0),
            mode: None,
        }
    }

    /// Builds the concatenation from an owned list of members.
    pub fn from_handles(handles: Vec<Box<dyn Handle>>) -> Self {
        let mut multi = MultiHandle::new();
        for handle in handles {
            multi.add(handle);
        }
        multi
    }

    /// Appends a member, absorbing it when possible: empty handles are
    /// dropped, another `MultiHandle` is drained member-by-member, and a
    /// handle the last member can `merge` disappears into it.
    pub fn add(&mut self, mut handle: Box<dyn Handle>) {
        let estimate = handle.estimate();
        self.absorb(handle, estimate);
    }

    /// Appends a member with a declared partition length, the write-side
    /// variant of [`add`](Self::add).
    pub fn add_with_length(&mut self, handle: Box<dyn Handle>, length: Length) {
        self.absorb(handle, length);
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn absorb(&mut self, mut handle: Box<dyn Handle>, length: Length) {
        if handle.is_empty() {
            return;
        }
        if let Some(multi) = handle.as_any_mut().downcast_mut::<MultiHandle>() {
            let members = std::mem::take(&mut multi.members);
            let lengths = std::mem::take(&mut multi.lengths);
            for (member, member_length) in members.into_iter().zip(lengths) {
                self.absorb(member, member_length);
            }
            return;
        }
        if let Some(last) = self.members.last_mut() {
            if last.merge(handle.as_mut()) {
                *self.lengths.last_mut().unwrap() = last.estimate();
                return;
            }
        }
        self.members.push(handle);
        self.lengths.push(length);
    }

    fn total(&self) -> Length {
        self.lengths.iter().sum()
    }
}

impl Default for MultiHandle {
    fn default() -> Self {
        MultiHandle::new()
    }
}

impl fmt::Display for MultiHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multi_handle({} members)", self.members.len())
    }
}

impl Handle for MultiHandle {
    /// Opens every member eagerly, in order, replacing each provisional
    /// length with the member's real one; returns the sum.
    fn open_for_read(&mut self) -> Result<Length> {
        for index in 0..self.members.len() {
            match self.members[index].open_for_read() {
                Ok(length) => self.lengths[index] = length,
                Err(error) => {
                    // Leave no member open behind a failed aggregate open.
                    for member in &mut self.members[..index] {
                        if let Err(close_error) = member.close() {
                            log::warn!("closing {} after failed open: {}", member, close_error);
                        }
                    }
                    return Err(error);
                }
            }
        }
        self.index = 0;
        self.within = Length(0);
        self.mode = Some(OpenMode::Read);
        let total = self.total();
        log::debug!("open_for_read {}: {} bytes", self, total);
        Ok(total)
    }

    /// Opens every member for write with its declared partition length;
    /// `estimate` must equal the sum of the declared lengths.
    fn open_for_write(&mut self, estimate: Length) -> Result<()> {
        let total = self.total();
        if estimate != total {
            return Err(HandleError::Contract(format!(
                "{} partitions declare {} bytes, write expects {}",
                self, total, estimate
            )));
        }
        for index in 0..self.members.len() {
            let length = self.lengths[index];
            if let Err(error) = self.members[index].open_for_write(length) {
                for member in &mut self.members[..index] {
                    if let Err(close_error) = member.close() {
                        log::warn!("closing {} after failed open: {}", member, close_error);
                    }
                }
                return Err(error);
            }
        }
        self.index = 0;
        self.within = Length(0);
        self.mode = Some(OpenMode::Write);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if !matches!(self.mode, Some(OpenMode::Read)) {
            return Err(HandleError::Contract(format!("read on {}", self)));
        }
        while self.index < self.members.len() {
            let n = self.members[self.index].read(buffer)?;
            if n > 0 {
                self.within += Length(n as i64);
                return Ok(n);
            }
            self.index += 1;
            self.within = Length(0);
        }
        Ok(0)
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        if !matches!(self.mode, Some(OpenMode::Write)) {
            return Err(HandleError::Contract(format!("write on {}", self)));
        }
        if buffer.is_empty() {
            return Ok(0);
        }
        while self.index < self.members.len() && self.within >= self.lengths[self.index] {
            self.index += 1;
            self.within = Length(0);
        }
        if self.index >= self.members.len() {
            return Err(HandleError::Contract(format!(
                "write beyond the declared partitions of {}",
                self
            )));
        }

        let quota = (self.lengths[self.index] - self.within).as_usize();
        let wanted = buffer.len().min(quota);
        let n = self.members[self.index].write(&buffer[..wanted])?;
        self.within += Length(n as i64);
        if n == wanted && wanted < buffer.len() {
            let more = self.write(&buffer[wanted..])?;
            return Ok(wanted + more);
        }
        Ok(n)
    }

    /// Closes every member; all are attempted and the first error wins.
    fn close(&mut self) -> Result<()> {
        let mut first = None;
        for member in &mut self.members {
            if let Err(error) = member.close() {
                log::warn!("close of {} failed: {}", member, error);
                first.get_or_insert(error);
            }
        }
        self.mode = None;
        match first {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn flush(&mut self) -> Result<()> {
        let mut first = None;
        for member in &mut self.members {
            if let Err(error) = member.flush() {
                first.get_or_insert(error);
            }
        }
        match first {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        if self.mode.is_none() {
            return Err(HandleError::Contract(format!("rewind on {}", self)));
        }
        for member in &mut self.members {
            member.rewind()?;
        }
        self.index = 0;
        self.within = Length(0);
        Ok(())
    }

    fn position(&mut self) -> Result<Offset> {
        let consumed: Length = self.lengths[..self.index].iter().sum();
        Ok(Offset(consumed.0 + self.within.0))
    }

    fn seek(&mut self, offset: Offset) -> Result<Offset> {
        let (index, within) = util::locate(&self.lengths, offset).ok_or_else(|| {
            HandleError::Contract(format!(
                "seek to {} outside the {} bytes of {}",
                offset,
                self.total(),
                self
            ))
        })?;
        if index < self.members.len() {
            self.members[index].seek(Offset::from(within))?;
            // Members after the target may have been consumed before a
            // backwards seek; reads must find them at their start again.
            for member in &mut self.members[index + 1..] {
                member.seek(Offset(0))?;
            }
        }
        self.index = index;
        self.within = within;
        Ok(offset)
    }

    fn can_seek(&self) -> bool {
        self.members.iter().all(|member| member.can_seek())
    }

    fn estimate(&mut self) -> Length {
        if self.mode.is_some() {
            self.total()
        } else {
            self.members
                .iter_mut()
                .map(|member| member.estimate())
                .sum()
        }
    }

    fn restart_read_from(&mut self, offset: Offset) -> Result<()> {
        log::warn!("restarting read of {} from offset {}", self, offset);
        self.seek(offset)?;
        Ok(())
    }

    /// Absorbs another concatenation by draining its members.
    fn merge(&mut self, other: &mut dyn Handle) -> bool {
        let Some(other) = other.as_any_mut().downcast_mut::<MultiHandle>() else {
            return false;
        };
        if self.mode.is_some() || other.mode.is_some() {
            return false;
        }
        let members = std::mem::take(&mut other.members);
        let lengths = std::mem::take(&mut other.lengths);
        for (member, length) in members.into_iter().zip(lengths) {
            self.absorb(member, length);
        }
        true
    }

    /// Folds consecutive members through their own `merge`, so adjacent
    /// parts of the same resource collapse into fewer open handles.
    fn compress(&mut self, sort: bool) -> bool {
        if self.mode.is_some() {
            return false;
        }
        let mut changed = false;
        for member in &mut self.members {
            changed |= member.compress(sort);
        }

        let members = std::mem::take(&mut self.members);
        let lengths = std::mem::take(&mut self.lengths);
        for (mut member, length) in members.into_iter().zip(lengths) {
            if let Some(last) = self.members.last_mut() {
                if last.merge(member.as_mut()) {
                    *self.lengths.last_mut().unwrap() = last.estimate();
                    changed = true;
                    continue;
                }
            }
            self.members.push(member);
            self.lengths.push(length);
        }
        changed
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn moveable(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|member| member.moveable())
    }

    fn double_buffer_ok(&self) -> bool {
        self.members.iter().all(|member| member.double_buffer_ok())
    }

    fn cost(&self, costs: &mut BTreeMap<String, Length>, read: bool) {
        for member in &self.members {
            member.cost(costs, read);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for MultiHandle {
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
    use crate::{FileHandle, MemoryHandle, PartFileHandle};

    const CONTENT: &[u8] = b"abcdefghijklmnopqrstuvwxyz01234";

    fn two_alphabets() -> MultiHandle {
        let mut multi = MultiHandle::new();
        multi.add(Box::new(MemoryHandle::from_slice(CONTENT)));
        multi.add(Box::new(MemoryHandle::from_slice(CONTENT)));
        multi
    }

    fn read_exact(handle: &mut dyn Handle, count: usize) -> Vec<u8> {
        let mut out = vec![0u8; count];
        let mut at = 0;
        while at < count {
            let n = handle.read(&mut out[at..]).unwrap();
            if n == 0 {
                break;
            }
            at += n;
        }
        out.truncate(at);
        out
    }

    #[test]
    fn concatenates_members_into_one_stream() {
        let mut multi = two_alphabets();
        assert_eq!(multi.open_for_read().unwrap(), Length(62));

        let all = read_exact(&mut multi, 100);
        assert_eq!(all.len(), 62);
        assert_eq!(&all[..31], CONTENT);
        assert_eq!(&all[31..], CONTENT);
        assert_eq!(multi.position().unwrap(), Offset(62));
        multi.close().unwrap();
    }

    #[test]
    fn position_tracks_bytes_read_across_members() {
        let mut multi = two_alphabets();
        multi.open_for_read().unwrap();

        for expected in [5, 30, 31, 32, 62] {
            multi.seek(Offset(0)).unwrap();
            read_exact(&mut multi, expected);
            assert_eq!(multi.position().unwrap(), Offset(expected as i64));
        }
        multi.close().unwrap();
    }

    #[test]
    fn reads_span_the_member_boundary() {
        let mut multi = two_alphabets();
        multi.open_for_read().unwrap();

        multi.seek(Offset(27)).unwrap();
        assert_eq!(read_exact(&mut multi, 10), b"1234abcdef");

        multi.seek(Offset(35)).unwrap();
        assert_eq!(read_exact(&mut multi, 10), b"efghijklmn");

        // Backwards across the boundary after consuming the second member.
        multi.seek(Offset(30)).unwrap();
        assert_eq!(read_exact(&mut multi, 3), b"4ab");

        multi.close().unwrap();
    }

    #[test]
    fn seek_to_the_total_is_legal_but_not_beyond() {
        let mut multi = two_alphabets();
        multi.open_for_read().unwrap();

        assert_eq!(multi.seek(Offset(62)).unwrap(), Offset(62));
        assert_eq!(read_exact(&mut multi, 4), b"");
        assert!(matches!(
            multi.seek(Offset(63)),
            Err(HandleError::Contract(_))
        ));
        multi.close().unwrap();
    }

    #[test]
    fn partitioned_write_lands_each_quota_in_its_member() {
        let dir = TempDir::new("multi").unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");

        let mut multi = MultiHandle::new();
        multi.add_with_length(Box::new(FileHandle::new(&first)), Length(3));
        multi.add_with_length(Box::new(FileHandle::new(&second)), Length(5));

        multi.open_for_write(Length(8)).unwrap();
        assert_eq!(multi.write(b"abcdefgh").unwrap(), 8);
        assert!(matches!(
            multi.write(b"overflow"),
            Err(HandleError::Contract(_))
        ));
        multi.close().unwrap();

        assert_eq!(fs::read(&first).unwrap(), b"abc");
        assert_eq!(fs::read(&second).unwrap(), b"defgh");
    }

    #[test]
    fn open_for_write_checks_the_declared_total() {
        let dir = TempDir::new("multi").unwrap();
        let mut multi = MultiHandle::new();
        multi.add_with_length(Box::new(FileHandle::new(dir.path().join("only"))), Length(4));

        assert!(matches!(
            multi.open_for_write(Length(9)),
            Err(HandleError::Contract(_))
        ));
    }

    #[test]
    fn add_absorbs_empty_and_mergeable_members() {
        let dir = TempDir::new("multi").unwrap();
        let path = dir.path().join("ranges.dat");
        fs::write(&path, CONTENT).unwrap();

        let mut multi = MultiHandle::new();
        multi.add(Box::new(MemoryHandle::new()));
        assert_eq!(multi.member_count(), 0);

        multi.add(Box::new(PartFileHandle::single(&path, Offset(0), Length(3))));
        multi.add(Box::new(PartFileHandle::single(&path, Offset(3), Length(4))));
        assert_eq!(multi.member_count(), 1);
        assert_eq!(multi.estimate(), Length(7));

        multi.add(Box::new(PartFileHandle::single(&path, Offset(10), Length(2))));
        assert_eq!(multi.member_count(), 2);
    }

    #[test]
    fn add_drains_a_nested_multi_handle() {
        let mut inner = MultiHandle::new();
        inner.add(Box::new(MemoryHandle::from_slice(b"abc")));
        inner.add(Box::new(MemoryHandle::from_slice(b"def")));

        let mut outer = MultiHandle::new();
        outer.add(Box::new(MemoryHandle::from_slice(b"xyz")));
        outer.add(Box::new(inner));
        assert_eq!(outer.member_count(), 3);

        outer.open_for_read().unwrap();
        assert_eq!(read_exact(&mut outer, 10), b"xyzabcdef");
        outer.close().unwrap();
    }

    #[test]
    fn compress_folds_adjacent_parts_of_one_file() {
        let dir = TempDir::new("multi").unwrap();
        let path = dir.path().join("ranges.dat");
        fs::write(&path, CONTENT).unwrap();

        let mut multi = MultiHandle::new();
        // A foreign member between the parts keeps add from absorbing them.
        multi.add(Box::new(PartFileHandle::single(&path, Offset(0), Length(3))));
        multi.add(Box::new(MemoryHandle::from_slice(b"--")));
        let mut tail = MultiHandle::new();
        tail.add(Box::new(PartFileHandle::single(&path, Offset(3), Length(2))));
        tail.add(Box::new(PartFileHandle::single(&path, Offset(5), Length(2))));
        assert_eq!(tail.member_count(), 1);

        assert!(multi.merge(&mut tail));
        assert_eq!(multi.member_count(), 3);
        assert!(!multi.compress(false));

        multi.open_for_read().unwrap();
        assert_eq!(read_exact(&mut multi, 10), b"abc--defg");
        multi.close().unwrap();
    }

    #[test]
    fn moveable_only_when_every_member_is() {
        let dir = TempDir::new("multi").unwrap();
        let path = dir.path().join("data");
        fs::write(&path, b"abc").unwrap();

        let mut multi = MultiHandle::new();
        assert!(!multi.moveable());

        multi.add(Box::new(FileHandle::new(&path)));
        assert!(multi.moveable());

        multi.add(Box::new(MemoryHandle::from_slice(b"xyz")));
        assert!(!multi.moveable());
    }
}
