use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use io_error::{HandleError, Result};
use io_range::{Length, Offset};

use crate::pooled::PooledHandle;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of shared descriptors, one entry per distinct resource name.
///
/// The pool is an explicit object, cheap to clone and share; every clone
/// addresses the same entries and the same open-descriptor budget.
/// Locking is two-level: the entry table behind one mutex, each entry's
/// state behind its own. The table lock is only ever held briefly and
/// never while blocking on an entry, and eviction only `try_lock`s
/// entries, so a client mid-operation can neither deadlock the pool nor
/// have its descriptor closed underneath it.
#[derive(Clone)]
pub struct HandlePool {
    pub(crate) inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    max_open: usize,
    entries: Mutex<BTreeMap<PathBuf, Arc<PoolEntry>>>,
    nb_open_files: AtomicUsize,
}

pub(crate) struct PoolEntry {
    pub(crate) path: PathBuf,
    pub(crate) state: Mutex<EntryState>,
}

pub(crate) struct EntryState {
    pub(crate) file: Option<File>,
    pub(crate) size: Length,
    pub(crate) clients: BTreeMap<u64, ClientStatus>,
    pub(crate) nb_opens: usize,
    pub(crate) nb_reads: usize,
    pub(crate) nb_seeks: usize,
    pub(crate) nb_closes: usize,
}

/// Per-client record: the logical position survives physical closes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClientStatus {
    pub(crate) position: Offset,
    pub(crate) open: bool,
}

impl HandlePool {
    /// Pool with an explicit open-descriptor ceiling.
    pub fn new(max_open: usize) -> Self {
        assert!(max_open >= 1, "the pool must be allowed one open file");
        HandlePool {
            inner: Arc::new(PoolInner {
                max_open,
                entries: Mutex::new(BTreeMap::new()),
                nb_open_files: AtomicUsize::new(0),
            }),
        }
    }

    /// Attaches a new logical client to `path`, creating the entry on
    /// first contact. Nothing is opened yet.
    pub fn attach<P: AsRef<Path>>(&self, path: P) -> PooledHandle {
        let path = path.as_ref().to_path_buf();
        let entry = {
            let mut entries = lock(&self.inner.entries);
            entries
                .entry(path.clone())
                .or_insert_with(|| {
                    Arc::new(PoolEntry {
                        path,
                        state: Mutex::new(EntryState::new()),
                    })
                })
                .clone()
        };
        PooledHandle::attach(self.inner.clone(), entry)
    }

    /// Physical descriptors currently open across the pool.
    pub fn open_files(&self) -> usize {
        self.inner.nb_open_files.load(Ordering::Acquire)
    }

    /// Distinct resources with at least one attached client.
    pub fn entry_count(&self) -> usize {
        lock(&self.inner.entries).len()
    }
}

impl Default for HandlePool {
    /// Ceiling from the environment-derived configuration.
    fn default() -> Self {
        HandlePool::new(io_handle::config::pool_max_open())
    }
}

impl EntryState {
    fn new() -> Self {
        EntryState {
            file: None,
            size: Length(0),
            clients: BTreeMap::new(),
            nb_opens: 0,
            nb_reads: 0,
            nb_seeks: 0,
            nb_closes: 0,
        }
    }
}

impl PoolInner {
    /// Opens the entry's physical file if it is not open, evicting idle
    /// descriptors first when the pool is at its ceiling. Open errors
    /// reach only the triggering client.
    pub(crate) fn ensure_open(&self, entry: &PoolEntry, state: &mut EntryState) -> Result<()> {
        if state.file.is_some() {
            return Ok(());
        }
        self.make_room(entry);

        let file = File::open(&entry.path)
            .map_err(|e| HandleError::Open(entry.path.display().to_string(), e))?;
        state.size = Length(file.metadata()?.len() as i64);
        state.file = Some(file);
        state.nb_opens += 1;
        let open_now = self.nb_open_files.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!(
            "pool opened {} ({} descriptors open)",
            entry.path.display(),
            open_now
        );
        Ok(())
    }

    /// Closes every descriptor no client is using when the pool is at
    /// its ceiling. Entries another client is mid-operation on hold
    /// their own lock; `try_lock` skips them, so an in-flight read
    /// never sees its descriptor close.
    fn make_room(&self, keep: &PoolEntry) {
        if self.nb_open_files.load(Ordering::Acquire) < self.max_open {
            return;
        }
        let entries: Vec<Arc<PoolEntry>> = lock(&self.entries).values().cloned().collect();
        for entry in entries {
            if std::ptr::eq(entry.as_ref(), keep) {
                continue;
            }
            if let Ok(mut state) = entry.state.try_lock() {
                if state.file.take().is_some() {
                    state.nb_closes += 1;
                    self.nb_open_files.fetch_sub(1, Ordering::AcqRel);
                    log::debug!("pool evicted {}", entry.path.display());
                }
            }
        }
    }

    /// Removes a client; the last client out closes the descriptor and
    /// retires the entry from the registry.
    pub(crate) fn detach(&self, entry: &Arc<PoolEntry>, client: u64) {
        let empty = {
            let mut state = lock(&entry.state);
            state.clients.remove(&client);
            if state.clients.is_empty() {
                if state.file.take().is_some() {
                    state.nb_closes += 1;
                    self.nb_open_files.fetch_sub(1, Ordering::AcqRel);
                }
                true
            } else {
                false
            }
        };
        if empty {
            let mut entries = lock(&self.entries);
            if let Some(current) = entries.get(&entry.path) {
                if Arc::ptr_eq(current, entry) {
                    // A concurrent attach may hold the state lock while
                    // registering; leave the entry in place then.
                    let still_empty = current
                        .state
                        .try_lock()
                        .map(|state| state.clients.is_empty())
                        .unwrap_or(false);
                    if still_empty {
                        entries.remove(&entry.path);
                    }
                }
            }
        }
    }
}
