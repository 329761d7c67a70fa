use std::{
    any::Any,
    collections::BTreeMap,
    fmt, fs,
    io::{Read, Seek, SeekFrom},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use io_error::{HandleError, Result};
use io_handle::{config, Handle};
use io_range::{Length, Offset};

use crate::pool::{lock, ClientStatus, PoolEntry, PoolInner};

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(1);

/// One logical client of a pooled resource.
///
/// Many clients of the same resource share one physical descriptor; each
/// keeps its own position in the pool's status records, and every
/// operation re-seeks the shared descriptor there first, so interleaved
/// clients read exactly what they would reading alone. A client whose
/// descriptor was evicted reopens it transparently on the next
/// operation. Read-only; the write side is unsupported.
pub struct PooledHandle {
    pool: Arc<PoolInner>,
    entry: Arc<PoolEntry>,
    client: u64,
}

impl PooledHandle {
    pub(crate) fn attach(pool: Arc<PoolInner>, entry: Arc<PoolEntry>) -> Self {
        let client = NEXT_CLIENT.fetch_add(1, Ordering::Relaxed);
        lock(&entry.state).clients.insert(
            client,
            ClientStatus {
                position: Offset(0),
                open: false,
            },
        );
        PooledHandle {
            pool,
            entry,
            client,
        }
    }

    /// Physical opens of the shared resource, over its whole pool life.
    pub fn nb_opens(&self) -> usize {
        lock(&self.entry.state).nb_opens
    }

    /// Physical closes (eviction or last detach).
    pub fn nb_closes(&self) -> usize {
        lock(&self.entry.state).nb_closes
    }

    /// Reads through the shared descriptor, all clients included.
    pub fn nb_reads(&self) -> usize {
        lock(&self.entry.state).nb_reads
    }

    /// Explicit seeks; the per-read repositioning is not counted.
    pub fn nb_seeks(&self) -> usize {
        lock(&self.entry.state).nb_seeks
    }

    fn name(&self) -> String {
        self.entry.path.display().to_string()
    }
}

impl fmt::Display for PooledHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pooled_handle({})", self.entry.path.display())
    }
}

impl Handle for PooledHandle {
    fn open_for_read(&mut self) -> Result<Length> {
        let mut state = lock(&self.entry.state);
        self.pool.ensure_open(&self.entry, &mut state)?;
        let size = state.size;
        let status = state
            .clients
            .get_mut(&self.client)
            .expect("client registered at attach");
        status.open = true;
        status.position = Offset(0);
        Ok(size)
    }

    fn open_for_write(&mut self, _estimate: Length) -> Result<()> {
        Err(HandleError::unsupported("open_for_write", self))
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut state = lock(&self.entry.state);
        let status = *state
            .clients
            .get(&self.client)
            .expect("client registered at attach");
        if !status.open {
            return Err(HandleError::Contract(format!("read on {}", self)));
        }
        self.pool.ensure_open(&self.entry, &mut state)?;

        // Reposition the shared descriptor to this client before the
        // read; seek and read are one critical section under the entry
        // lock.
        let file = state.file.as_mut().expect("ensured open");
        file.seek(SeekFrom::Start(status.position.0 as u64))
            .map_err(|e| HandleError::Read(self.entry.path.display().to_string(), e))?;
        let n = file
            .read(buffer)
            .map_err(|e| HandleError::Read(self.entry.path.display().to_string(), e))?;

        state.nb_reads += 1;
        let status = state
            .clients
            .get_mut(&self.client)
            .expect("client registered at attach");
        status.position += Length(n as i64);
        Ok(n)
    }

    fn write(&mut self, _buffer: &[u8]) -> Result<usize> {
        Err(HandleError::unsupported("write", self))
    }

    /// Marks this client closed; the descriptor stays open for the
    /// entry's other clients.
    fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.entry.state);
        if let Some(status) = state.clients.get_mut(&self.client) {
            status.open = false;
        }
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.seek(Offset(0))?;
        Ok(())
    }

    fn position(&mut self) -> Result<Offset> {
        let state = lock(&self.entry.state);
        Ok(state
            .clients
            .get(&self.client)
            .expect("client registered at attach")
            .position)
    }

    fn seek(&mut self, offset: Offset) -> Result<Offset> {
        if offset.0 < 0 {
            return Err(HandleError::Contract(format!(
                "seek to negative offset {} on {}",
                offset, self
            )));
        }
        let mut state = lock(&self.entry.state);
        if !state
            .clients
            .get(&self.client)
            .expect("client registered at attach")
            .open
        {
            return Err(HandleError::Contract(format!("seek on {}", self)));
        }
        state.nb_seeks += 1;
        let status = state
            .clients
            .get_mut(&self.client)
            .expect("client registered at attach");
        status.position = offset;
        Ok(offset)
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn estimate(&mut self) -> Length {
        let state = lock(&self.entry.state);
        if state.file.is_some() || state.size.0 > 0 {
            state.size
        } else {
            fs::metadata(&self.entry.path)
                .map(|meta| Length(meta.len() as i64))
                .unwrap_or(Length(0))
        }
    }

    fn restart_read_from(&mut self, offset: Offset) -> Result<()> {
        log::warn!("restarting read of {} from offset {}", self, offset);
        self.seek(offset)?;
        Ok(())
    }

    /// Another independent client of the same entry.
    fn clone_handle(&self) -> Result<Box<dyn Handle>> {
        Ok(Box::new(PooledHandle::attach(
            self.pool.clone(),
            self.entry.clone(),
        )))
    }

    fn cost(&self, costs: &mut BTreeMap<String, Length>, read: bool) {
        if read {
            let size = fs::metadata(&self.entry.path)
                .map(|meta| Length(meta.len() as i64))
                .unwrap_or(Length(0));
            *costs.entry(config::node_name()).or_insert(Length(0)) += size;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for PooledHandle {
    fn drop(&mut self) {
        let open = lock(&self.entry.state)
            .clients
            .get(&self.client)
            .map(|status| status.open)
            .unwrap_or(false);
        if open {
            log::warn!("pooled_handle({}) dropped while open", self.name());
        }
        self.pool.detach(&self.entry, self.client);
    }
}
