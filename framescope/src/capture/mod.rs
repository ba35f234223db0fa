//! The capture aggregate
//!
//! A [`Capture`] owns every buffer a profiling session writes into. It is
//! created once with a [`Configuration`], shared by reference between the
//! instrumented threads, and drained with [`Capture::dump`] once it halts.
//!
//! Producer threads only ever lock their own slot. The frame and region
//! tables have their own short locks and are driven from one thread. The
//! registry lock is taken to acquire or release a slot and by `reset`.
//!
//! Lock order: registry, then slots one at a time, then frames, then regions.
//! `begin_frame` peeks at slots while holding the frame lock; nothing takes
//! the frame lock while holding a slot. Encoding holds the registry lock so a
//! slot cannot be reclaimed halfway through a dump.

mod frames;
pub mod guard;
mod regions;
mod registry;
mod slot;
mod state;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

pub use frames::{FrameRecord, FrameThread};
pub use guard::{RegionGuard, SectionGuard};
pub use regions::RegionRecord;
pub use state::{CaptureState, HaltReason};

pub(crate) use slot::ThreadSlot;

use crate::config::Configuration;
use crate::domain::{CapacityError, ConfigError, DumpError, Generation, SlotIndex};
use crate::protocol;
use crate::snapshot::CaptureSnapshot;
use frames::{FrameOutcome, FrameTable};
use regions::{RegionOutcome, RegionTable};
use registry::SlotRegistry;
use state::StateMachine;

static NEXT_CAPTURE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct Capture {
    id: u64,
    config: Configuration,
    origin: Instant,
    /// Raw clock reading that counts as time zero for the current session
    epoch_ns: AtomicI64,
    registry: SlotRegistry,
    slots: Box<[Mutex<ThreadSlot>]>,
    frames: Mutex<FrameTable>,
    regions: Mutex<RegionTable>,
    state: StateMachine,
    dumped: AtomicBool,
}

impl Capture {
    /// Allocate every buffer for `config` and start armed.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if any limit is unusable.
    pub fn new(config: Configuration) -> Result<Self, ConfigError> {
        config.validate()?;

        let id = NEXT_CAPTURE_ID.fetch_add(1, Ordering::Relaxed);
        let slots = (0..config.max_threads)
            .map(|index| Mutex::new(ThreadSlot::new(SlotIndex(index), &config)))
            .collect();

        log::debug!(
            "capture {id}: {} slots x {} entries, {} frames, {} regions",
            config.max_threads,
            config.max_entries_per_thread,
            config.max_frames,
            config.max_regions
        );

        Ok(Self {
            id,
            config,
            origin: Instant::now(),
            epoch_ns: AtomicI64::new(0),
            registry: SlotRegistry::new(id),
            slots,
            frames: Mutex::new(FrameTable::new(config.max_frames, config.max_threads)),
            regions: Mutex::new(RegionTable::new(config.max_regions)),
            state: StateMachine::new(),
            dumped: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Session counter; bumped by every `reset`
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.registry.generation()
    }

    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.state.state()
    }

    #[must_use]
    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.state.halt_reason()
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.state.is_halted()
    }

    /// Nanoseconds since the current session started
    #[must_use]
    pub fn elapsed_ns(&self) -> i64 {
        self.raw_clock_ns() - self.epoch_ns.load(Ordering::Acquire)
    }

    fn raw_clock_ns(&self) -> i64 {
        // i64::MAX marks open entries, so the clock stays below it
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX - 1)
    }

    /// Clear all recorded data, start a new session and re-arm.
    ///
    /// Every thread's cached slot turns stale; each re-acquires a slot on its
    /// next recording call.
    pub fn reset(&self) {
        let _registry = self.registry.lock();
        let generation = self.registry.advance_generation();

        for slot in self.slots.iter() {
            slot.lock().clear();
        }
        self.frames.lock().clear();
        self.regions.lock().clear();

        self.epoch_ns.store(self.raw_clock_ns(), Ordering::Release);
        self.dumped.store(false, Ordering::Release);
        self.state.rearm();
        log::debug!("capture {} reset, now {generation}", self.id);
    }

    /// Stop recording now. Threads observe it on their next call.
    pub fn request_pause(&self) {
        self.state.halt(HaltReason::PauseRequested);
    }

    /// Run `f` on the calling thread's slot, acquiring one if the thread has
    /// none in this session.
    fn with_own_slot<R>(
        &self,
        mut f: impl FnMut(&mut ThreadSlot) -> Result<R, CapacityError>,
    ) -> Result<R, CapacityError> {
        loop {
            let handle = match self.registry.current_handle() {
                Some(handle) => handle,
                None => self
                    .registry
                    .acquire(&self.slots, |slot| self.frames.lock().forget_slot(slot))?,
            };

            let mut slot = self.slots[handle.slot.as_usize()].lock();
            if slot.is_owned_by(handle.generation) {
                return f(&mut slot);
            }
            drop(slot);

            // A reset ran between the generation check and the slot lock
            log::warn!("stale handle for {} ({}), re-acquiring", handle.slot, handle.generation);
            registry::forget(self.id);
        }
    }

    /// Open a section on the calling thread.
    ///
    /// # Errors
    /// [`CapacityError::NoFreeThreadSlot`] if this thread needs a slot and
    /// none is free, [`CapacityError::CallStackOverflow`] if nesting goes
    /// past `max_call_stack_depth`.
    pub fn try_enter_section(
        &self,
        name: &str,
        color: u32,
        file: &str,
        line: i32,
    ) -> Result<(), CapacityError> {
        if self.state.is_halted() {
            return Ok(());
        }
        let now = self.elapsed_ns();

        let pushed = self.with_own_slot(|slot| {
            if self.state.is_halted() {
                return Ok(None);
            }
            match slot.push(name, color, file, line, now)? {
                Some(outcome) => Ok(Some((slot.index, slot.hidden, outcome))),
                None => {
                    self.state.halt(HaltReason::EntriesFull);
                    Ok(None)
                }
            }
        })?;

        let Some((index, hidden, outcome)) = pushed else {
            return Ok(());
        };
        if outcome.first_entry && !hidden {
            self.frames.lock().register_late_joiner(index, 0);
        }
        if outcome.filled {
            self.state.halt(HaltReason::EntriesFull);
        }
        Ok(())
    }

    /// Open a section on the calling thread.
    ///
    /// # Panics
    /// When the configured limits are too small for the instrumentation, see
    /// [`Capture::try_enter_section`].
    pub fn enter_section(&self, name: &str, color: u32, file: &str, line: i32) {
        if let Err(err) = self.try_enter_section(name, color, file, line) {
            panic!("framescope: {err}");
        }
    }

    /// Close the calling thread's innermost open section.
    pub fn leave_section(&self) {
        if self.state.is_halted() {
            return;
        }
        let Some(handle) = self.registry.current_handle() else {
            return;
        };
        let now = self.elapsed_ns();
        let mut slot = self.slots[handle.slot.as_usize()].lock();
        if slot.is_owned_by(handle.generation) {
            slot.pop(now);
        }
    }

    /// Start a new frame, recording where every visible thread's log stands.
    pub fn begin_frame(&self) {
        if self.state.is_halted() {
            return;
        }
        let now = self.elapsed_ns();

        let outcome = self.frames.lock().begin(now, |threads, max_threads| {
            for slot in self.slots.iter() {
                if threads.len() >= max_threads {
                    break;
                }
                let slot = slot.lock();
                if slot.in_use && !slot.hidden && slot.write_pos() > 0 {
                    threads.push(FrameThread { slot: slot.index, write_pos: slot.write_pos() });
                }
            }
        });

        if outcome != FrameOutcome::Recorded {
            self.state.halt(HaltReason::FramesFull);
        }
    }

    /// Frames close when the next one begins, so this only marks the spot.
    #[allow(clippy::unused_self)]
    pub fn end_frame(&self) {}

    pub fn begin_region(&self) {
        if self.state.is_halted() {
            return;
        }
        let now = self.elapsed_ns();
        self.regions.lock().begin(now);
    }

    pub fn end_region(&self) {
        if self.state.is_halted() {
            return;
        }
        let now = self.elapsed_ns();
        let outcome = self.regions.lock().end(now);
        if outcome != RegionOutcome::Recorded {
            self.state.halt(HaltReason::RegionsFull);
        }
    }

    /// Label the calling thread's slot.
    ///
    /// # Errors
    /// [`CapacityError::NoFreeThreadSlot`] if the thread has no slot and none is free.
    pub fn try_name_current_thread(&self, name: &str) -> Result<(), CapacityError> {
        if self.state.is_halted() {
            return Ok(());
        }
        self.with_own_slot(|slot| {
            name.clone_into(&mut slot.name);
            Ok(())
        })
    }

    /// # Panics
    /// When no thread slot is free.
    pub fn name_current_thread(&self, name: &str) {
        if let Err(err) = self.try_name_current_thread(name) {
            panic!("framescope: {err}");
        }
    }

    /// Keep the calling thread out of frame records and viewers.
    ///
    /// Frames recorded before the call drop this thread as well, so hiding
    /// after the first section behaves the same as hiding before it.
    ///
    /// # Errors
    /// [`CapacityError::NoFreeThreadSlot`] if the thread has no slot and none is free.
    pub fn try_hide_current_thread(&self) -> Result<(), CapacityError> {
        if self.state.is_halted() {
            return Ok(());
        }
        let index = self.with_own_slot(|slot| {
            slot.hidden = true;
            Ok(slot.index)
        })?;
        self.frames.lock().forget_slot(index);
        Ok(())
    }

    /// # Panics
    /// When no thread slot is free.
    pub fn hide_current_thread(&self) {
        if let Err(err) = self.try_hide_current_thread() {
            panic!("framescope: {err}");
        }
    }

    /// Hand the calling thread's slot back before the thread exits.
    ///
    /// Anything the thread recorded this session is discarded when another
    /// thread claims the slot, and the slot's positions leave the frame
    /// records at that point.
    pub fn release_current_thread(&self) {
        self.registry.release(&self.slots);
    }

    /// The calling thread's slot in the current session, if it has one
    #[must_use]
    pub fn current_slot(&self) -> Option<SlotIndex> {
        self.registry.current_handle().map(|handle| handle.slot)
    }

    /// Halted and not yet drained this session
    #[must_use]
    pub fn dump_ready(&self) -> bool {
        self.state.is_halted() && !self.dumped.load(Ordering::Acquire)
    }

    /// Serialize the halted session. Succeeds at most once per session.
    ///
    /// # Errors
    /// [`DumpError::NotHalted`] while recording, [`DumpError::AlreadyDumped`]
    /// after a successful dump, or an encoding failure.
    pub fn try_dump(&self) -> Result<Vec<u8>, DumpError> {
        self.try_dump_with(Ok)
    }

    /// Serialize the halted session and pass the bytes to `ship`.
    ///
    /// The session only counts as dumped once `ship` returns `Ok`. If encoding
    /// or `ship` fails the dump stays available for the next attempt.
    ///
    /// # Errors
    /// The [`DumpError`] cases of [`Capture::try_dump`], or whatever `ship` returns.
    pub fn try_dump_with<T, E>(&self, ship: impl FnOnce(Vec<u8>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DumpError>,
    {
        if !self.state.is_halted() {
            return Err(DumpError::NotHalted.into());
        }
        if self
            .dumped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DumpError::AlreadyDumped.into());
        }

        let encoded = {
            let _registry = self.registry.lock();
            protocol::dump::encode(self)
        };
        let result = match encoded {
            Ok(bytes) => {
                log::info!("capture {} dumped: {} bytes", self.id, bytes.len());
                ship(bytes)
            }
            Err(err) => Err(err.into()),
        };
        if result.is_err() {
            self.dumped.store(false, Ordering::Release);
        }
        result
    }

    /// [`Capture::try_dump`], with "nothing to dump" folded into `None`
    #[must_use]
    pub fn dump(&self) -> Option<Vec<u8>> {
        match self.try_dump() {
            Ok(bytes) => Some(bytes),
            Err(DumpError::NotHalted | DumpError::AlreadyDumped) => None,
            Err(err) => {
                log::warn!("dump of capture {} failed: {err}", self.id);
                None
            }
        }
    }

    /// Decode the current contents in-process, without consuming the dump.
    ///
    /// Works while armed; entries still open show as open.
    ///
    /// # Errors
    /// Returns [`DumpError`] if the contents cannot be encoded or read back.
    pub fn snapshot(&self) -> Result<CaptureSnapshot, DumpError> {
        let bytes = {
            let _registry = self.registry.lock();
            protocol::dump::encode(self)?
        };
        Ok(protocol::restore(&bytes)?)
    }

    pub(crate) fn slots(&self) -> &[Mutex<ThreadSlot>] {
        &self.slots
    }

    pub(crate) fn frames(&self) -> Vec<FrameRecord> {
        self.frames.lock().recorded().to_vec()
    }

    pub(crate) fn regions(&self) -> Vec<RegionRecord> {
        self.regions.lock().recorded().to_vec()
    }

    /// Frames begun this session
    #[must_use]
    pub fn current_frame(&self) -> u32 {
        self.frames.lock().current_frame()
    }

    #[must_use]
    pub fn current_region(&self) -> u32 {
        self.regions.lock().current_region()
    }

    /// Time how long acquiring `mutex` takes, as a section colored
    /// [`LOCK_COLOR`](crate::color::LOCK_COLOR).
    #[track_caller]
    pub fn lock_profiled<'a, T>(&self, mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
        let location = std::panic::Location::caller();
        let line = i32::try_from(location.line()).unwrap_or(i32::MAX);
        self.enter_section(name, crate::color::LOCK_COLOR.to_packed(), location.file(), line);
        let guard = mutex.lock();
        self.leave_section();
        guard
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        registry::forget(self.id);
    }
}
