//! Threaded copy overlapping reads and writes through a ring of slots.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Condvar, Mutex, MutexGuard,
    },
    thread,
};

use io_error::{HandleError, Result};
use io_range::Length;

use crate::{handle::Handle, util, watcher::TransferWatcher};

enum SlotState {
    Empty,
    Full(usize),
    Done,
}

struct Slot {
    state: SlotState,
    buffer: Vec<u8>,
}

struct Ring {
    slots: Vec<(Mutex<Slot>, Condvar)>,
    fault: Mutex<Option<HandleError>>,
    stop: AtomicBool,
}

impl Ring {
    fn new(count: usize, size: usize) -> Self {
        Ring {
            slots: (0..count)
                .map(|_| {
                    (
                        Mutex::new(Slot {
                            state: SlotState::Empty,
                            buffer: vec![0u8; size],
                        }),
                        Condvar::new(),
                    )
                })
                .collect(),
            fault: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    fn abort(&self, error: HandleError) {
        *util::lock(&self.fault) = Some(error);
        self.stop.store(true, Ordering::Release);
        for (_, ready) in &self.slots {
            ready.notify_all();
        }
    }
}

fn wait<'a>(ready: &Condvar, guard: MutexGuard<'a, Slot>) -> MutexGuard<'a, Slot> {
    ready.wait(guard).unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Double-buffered bulk copy: the calling thread reads into a ring of
/// slots while one worker thread drains them into the destination, so
/// the two ends overlap in time.
///
/// Errors on either side stop both cleanly; a restart fault from the
/// destination surfaces to the caller exactly as in the single-buffered
/// loop, so `save_into`'s recovery applies unchanged. The watcher is
/// notified from the reading side, as chunks are queued.
pub struct DblBuffer {
    count: usize,
    size: usize,
}

impl DblBuffer {
    pub fn new(count: usize, size: usize) -> Self {
        assert!(count >= 2, "a ring needs at least two slots");
        assert!(size > 0, "slots must hold at least one byte");
        DblBuffer { count, size }
    }

    /// Pumps `from` into `to`; `start` is the byte total already moved
    /// (nonzero when resuming after a restart fault). Returns the final
    /// total.
    pub fn copy(
        &self,
        from: &mut dyn Handle,
        to: &mut dyn Handle,
        start: Length,
        watcher: &mut dyn TransferWatcher,
    ) -> Result<Length> {
        let ring = Ring::new(self.count, self.size);
        let written = AtomicI64::new(start.0);

        let read_result = thread::scope(|scope| {
            let writer = scope.spawn(|| Self::drain(&ring, to, &written));
            let read_result = Self::fill(&ring, from, watcher);
            if read_result.is_err() {
                // Wake the writer should it still wait on a slot.
                ring.stop.store(true, Ordering::Release);
                for (_, ready) in &ring.slots {
                    ready.notify_all();
                }
            }
            let _ = writer.join();
            read_result
        });

        read_result?;
        if let Some(fault) = util::lock(&ring.fault).take() {
            return Err(fault);
        }
        Ok(Length(written.load(Ordering::Acquire)))
    }

    /// Reader side, on the calling thread: fills slots round-robin.
    fn fill(
        ring: &Ring,
        from: &mut dyn Handle,
        watcher: &mut dyn TransferWatcher,
    ) -> Result<()> {
        let mut index = 0;
        loop {
            let (lock, ready) = &ring.slots[index];
            let mut slot = util::lock(lock);
            while matches!(slot.state, SlotState::Full(_)) && !ring.stop.load(Ordering::Acquire) {
                slot = wait(ready, slot);
            }
            if ring.stop.load(Ordering::Acquire) {
                // Writer failed; its fault is the outcome.
                return Ok(());
            }

            match from.read(&mut slot.buffer) {
                Ok(0) => {
                    slot.state = SlotState::Done;
                    ready.notify_all();
                    return Ok(());
                }
                Ok(n) => {
                    watcher.watch(&slot.buffer[..n]);
                    slot.state = SlotState::Full(n);
                    ready.notify_all();
                }
                Err(error) => {
                    slot.state = SlotState::Done;
                    ready.notify_all();
                    return Err(error);
                }
            }
            index = (index + 1) % ring.slots.len();
        }
    }

    /// Writer side, on the worker thread: drains slots in ring order so
    /// bytes land in the order they were read.
    fn drain(ring: &Ring, to: &mut dyn Handle, written: &AtomicI64) {
        let mut index = 0;
        loop {
            let (lock, ready) = &ring.slots[index];
            let mut slot = util::lock(lock);
            while matches!(slot.state, SlotState::Empty) && !ring.stop.load(Ordering::Acquire) {
                slot = wait(ready, slot);
            }
            if ring.stop.load(Ordering::Acquire) {
                return;
            }
            let n = match slot.state {
                SlotState::Full(n) => n,
                SlotState::Done => return,
                SlotState::Empty => unreachable!("woken on an empty slot"),
            };

            let chunk_result = {
                let chunk = &slot.buffer[..n];
                util::write_all(to, chunk)
            };
            match chunk_result {
                Ok(()) => {
                    written.fetch_add(n as i64, Ordering::Release);
                    slot.state = SlotState::Empty;
                    ready.notify_all();
                }
                Err(error) => {
                    drop(slot);
                    ring.abort(error);
                    return;
                }
            }
            index = (index + 1) % ring.slots.len();
        }
    }
}
