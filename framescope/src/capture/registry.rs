//! Thread slot registry
//!
//! Hands each recording thread an exclusive slot on first use. The registry
//! lock is held only for the scan-and-claim in [`SlotRegistry::acquire`] and
//! the flip in [`SlotRegistry::release`]; everything else a producer does
//! touches only its own slot.
//!
//! Each thread remembers `(slot, generation)` per capture in thread-local
//! storage. `reset` bumps the generation, which turns every remembered handle
//! stale and forces a fresh acquire on the next recording call.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use super::slot::ThreadSlot;
use crate::domain::{CapacityError, Generation, SlotIndex};

/// A thread's memoized slot for one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotHandle {
    pub slot: SlotIndex,
    pub generation: Generation,
}

#[derive(Debug, Clone, Copy)]
struct CachedSlot {
    capture_id: u64,
    handle: SlotHandle,
}

thread_local! {
    static SLOT_CACHE: RefCell<Vec<CachedSlot>> = const { RefCell::new(Vec::new()) };
}

/// This thread's handle for `capture_id`, if it has one
pub(crate) fn cached_handle(capture_id: u64) -> Option<SlotHandle> {
    SLOT_CACHE.with(|cache| {
        cache.borrow().iter().find(|c| c.capture_id == capture_id).map(|c| c.handle)
    })
}

fn remember(capture_id: u64, handle: SlotHandle) {
    SLOT_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        match cache.iter_mut().find(|c| c.capture_id == capture_id) {
            Some(cached) => cached.handle = handle,
            None => cache.push(CachedSlot { capture_id, handle }),
        }
    });
}

pub(crate) fn forget(capture_id: u64) {
    SLOT_CACHE.with(|cache| cache.borrow_mut().retain(|c| c.capture_id != capture_id));
}

#[derive(Debug)]
pub(crate) struct SlotRegistry {
    capture_id: u64,
    lock: Mutex<()>,
    generation: AtomicU64,
}

impl SlotRegistry {
    pub(crate) fn new(capture_id: u64) -> Self {
        Self { capture_id, lock: Mutex::new(()), generation: AtomicU64::new(1) }
    }

    pub(crate) fn generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::Acquire))
    }

    /// Take the registry lock. Held by `reset` while it rebuilds every slot.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// Bump the generation. Caller must hold the registry lock.
    pub(crate) fn advance_generation(&self) -> Generation {
        Generation(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// This thread's handle, if it was acquired under the current generation
    pub(crate) fn current_handle(&self) -> Option<SlotHandle> {
        let generation = self.generation();
        cached_handle(self.capture_id).filter(|h| h.generation == generation)
    }

    /// Claim the first free slot for the calling thread.
    ///
    /// A slot that already had an owner this session comes back empty.
    /// `reclaimed` runs for it after the slot lock is dropped but while the
    /// registry lock is still held, so nothing that also takes the registry
    /// lock sees the emptied log next to references into the old one.
    ///
    /// # Errors
    /// [`CapacityError::NoFreeThreadSlot`] when every slot is taken.
    pub(crate) fn acquire(
        &self,
        slots: &[Mutex<ThreadSlot>],
        reclaimed: impl FnOnce(SlotIndex),
    ) -> Result<SlotHandle, CapacityError> {
        let _guard = self.lock.lock();
        let generation = self.generation();

        for slot in slots {
            let mut slot = slot.lock();
            if slot.in_use {
                continue;
            }
            let reused = slot.generation == generation;
            slot.claim(generation);
            let handle = SlotHandle { slot: slot.index, generation };
            drop(slot);

            remember(self.capture_id, handle);
            log::debug!("{:?} acquired {} ({generation})", std::thread::current().id(), handle.slot);
            if reused {
                reclaimed(handle.slot);
            }
            return Ok(handle);
        }

        Err(CapacityError::NoFreeThreadSlot {
            max_threads: u32::try_from(slots.len()).unwrap_or(u32::MAX),
        })
    }

    /// Give the calling thread's slot back. A stale or missing handle is ignored.
    pub(crate) fn release(&self, slots: &[Mutex<ThreadSlot>]) {
        let Some(handle) = cached_handle(self.capture_id) else {
            return;
        };
        forget(self.capture_id);

        let _guard = self.lock.lock();
        if let Some(slot) = slots.get(handle.slot.as_usize()) {
            let mut slot = slot.lock();
            if slot.is_owned_by(handle.generation) {
                slot.in_use = false;
                log::debug!("{:?} released {}", std::thread::current().id(), handle.slot);
            }
        }
    }
}
