use std::{any::Any, collections::BTreeMap, fmt};

use io_error::{HandleError, Result};
use io_range::Length;

use crate::handle::Handle;

/// Write-side fan-out: every write is broadcast to all owned members.
///
/// All members must accept the same byte count per write; divergence
/// means the copies would no longer be identical and is a contract
/// error. The read side is unsupported.
pub struct TeeHandle {
    members: Vec<Box<dyn Handle>>,
    open: bool,
}

impl TeeHandle {
    pub fn new() -> Self {
        TeeHandle {
            members: Vec::new(),
            open: false,
        }
    }

    pub fn from_handles(members: Vec<Box<dyn Handle>>) -> Self {
        TeeHandle {
            members,
            open: false,
        }
    }

    pub fn add(&mut self, handle: Box<dyn Handle>) {
        self.members.push(handle);
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

impl Default for TeeHandle {
    fn default() -> Self {
        TeeHandle::new()
    }
}

impl fmt::Display for TeeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tee_handle({} members)", self.members.len())
    }
}

impl Handle for TeeHandle {
    fn open_for_read(&mut self) -> Result<Length> {
        Err(HandleError::unsupported("open_for_read", self))
    }

    fn open_for_write(&mut self, estimate: Length) -> Result<()> {
        for index in 0..self.members.len() {
            if let Err(error) = self.members[index].open_for_write(estimate) {
                for member in &mut self.members[..index] {
                    if let Err(close_error) = member.close() {
                        log::warn!("closing {} after failed open: {}", member, close_error);
                    }
                }
                return Err(error);
            }
        }
        self.open = true;
        Ok(())
    }

    fn read(&mut self, _buffer: &mut [u8]) -> Result<usize> {
        Err(HandleError::unsupported("read", self))
    }

    fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(HandleError::Contract(format!("write on {}", self)));
        }
        let mut first: Option<usize> = None;
        for member in &mut self.members {
            let n = member.write(buffer)?;
            match first {
                None => first = Some(n),
                Some(expected) if n != expected => {
                    return Err(HandleError::Contract(format!(
                        "{} wrote {} bytes where {} were broadcast",
                        member, n, expected
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(first.unwrap_or(0))
    }

    /// Closes every member; all are attempted and the first error wins.
    fn close(&mut self) -> Result<()> {
        let mut result = None;
        for member in &mut self.members {
            if let Err(error) = member.close() {
                log::warn!("close of {} failed: {}", member, error);
                result.get_or_insert(error);
            }
        }
        self.open = false;
        match result {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn flush(&mut self) -> Result<()> {
        let mut result = None;
        for member in &mut self.members {
            if let Err(error) = member.flush() {
                result.get_or_insert(error);
            }
        }
        match result {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn moveable(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|member| member.moveable())
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

impl Drop for TeeHandle {
    fn drop(&mut self) {
        if self.open {
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
    fn broadcasts_writes_to_every_member() {
        let dir = TempDir::new("tee").unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");

        let mut tee = TeeHandle::new();
        tee.add(Box::new(FileHandle::new(&first)));
        tee.add(Box::new(FileHandle::new(&second)));

        tee.open_for_write(Length(6)).unwrap();
        assert_eq!(tee.write(b"abc").unwrap(), 3);
        assert_eq!(tee.write(b"def").unwrap(), 3);
        tee.close().unwrap();

        assert_eq!(fs::read(&first).unwrap(), b"abcdef");
        assert_eq!(fs::read(&second).unwrap(), b"abcdef");
    }

    #[test]
    fn diverging_write_counts_are_a_contract_error() {
        let mut tee = TeeHandle::new();
        tee.add(Box::new(MemoryHandle::new()));
        // Fixed four-byte member: clamps the second write short.
        tee.add(Box::new(MemoryHandle::from_vec(vec![0u8; 4])));

        tee.open_for_write(Length(0)).unwrap();
        assert_eq!(tee.write(b"abcd").unwrap(), 4);
        assert!(matches!(tee.write(b"ef"), Err(HandleError::Contract(_))));
        tee.close().unwrap();
    }

    #[test]
    fn read_side_is_unsupported() {
        let mut tee = TeeHandle::new();
        tee.add(Box::new(MemoryHandle::new()));

        assert!(matches!(
            tee.open_for_read(),
            Err(HandleError::Unsupported(_, _))
        ));
    }
}
