//! Armed/halted state machine
//!
//! A capture starts armed and halts for good the first time any bound is hit
//! or a pause is requested. Only `reset` re-arms it. The first halt reason
//! wins; later ones are ignored.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use framescope_common::{
    HALT_ENTRIES_FULL, HALT_FRAMES_FULL, HALT_NONE, HALT_PAUSE_REQUESTED, HALT_REGIONS_FULL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Recording calls write into the capture
    Armed,
    /// Recording calls are no-ops; the capture can be dumped
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A thread slot filled its entry log
    EntriesFull,
    /// The frame table filled up
    FramesFull,
    /// The region table filled up
    RegionsFull,
    /// `request_pause` was called
    PauseRequested,
}

impl HaltReason {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            HaltReason::EntriesFull => HALT_ENTRIES_FULL,
            HaltReason::FramesFull => HALT_FRAMES_FULL,
            HaltReason::RegionsFull => HALT_REGIONS_FULL,
            HaltReason::PauseRequested => HALT_PAUSE_REQUESTED,
        }
    }

    /// Decode a wire code. `Ok(None)` means "not halted".
    ///
    /// # Errors
    /// Returns the unknown code back.
    pub fn from_code(code: u8) -> Result<Option<Self>, u8> {
        match code {
            HALT_NONE => Ok(None),
            HALT_ENTRIES_FULL => Ok(Some(HaltReason::EntriesFull)),
            HALT_FRAMES_FULL => Ok(Some(HaltReason::FramesFull)),
            HALT_REGIONS_FULL => Ok(Some(HaltReason::RegionsFull)),
            HALT_PAUSE_REQUESTED => Ok(Some(HaltReason::PauseRequested)),
            other => Err(other),
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HaltReason::EntriesFull => "thread entry log full",
            HaltReason::FramesFull => "frame table full",
            HaltReason::RegionsFull => "region table full",
            HaltReason::PauseRequested => "pause requested",
        };
        f.write_str(text)
    }
}

/// Lock-free state flag, holding `HALT_NONE` while armed or the halt reason code
#[derive(Debug)]
pub(crate) struct StateMachine {
    halt: AtomicU8,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self { halt: AtomicU8::new(HALT_NONE) }
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.halt.load(Ordering::Acquire) != HALT_NONE
    }

    pub(crate) fn state(&self) -> CaptureState {
        if self.is_halted() {
            CaptureState::Halted
        } else {
            CaptureState::Armed
        }
    }

    pub(crate) fn halt_reason(&self) -> Option<HaltReason> {
        HaltReason::from_code(self.halt.load(Ordering::Acquire)).ok().flatten()
    }

    /// Returns true if this call performed the Armed → Halted transition.
    pub(crate) fn halt(&self, reason: HaltReason) -> bool {
        let transitioned = self
            .halt
            .compare_exchange(HALT_NONE, reason.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if transitioned {
            log::info!("capture halted: {reason}");
        }
        transitioned
    }

    pub(crate) fn rearm(&self) {
        self.halt.store(HALT_NONE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_armed() {
        let state = StateMachine::new();
        assert_eq!(state.state(), CaptureState::Armed);
        assert_eq!(state.halt_reason(), None);
    }

    #[test]
    fn test_first_halt_reason_wins() {
        let state = StateMachine::new();
        assert!(state.halt(HaltReason::FramesFull));
        assert!(!state.halt(HaltReason::PauseRequested));
        assert_eq!(state.halt_reason(), Some(HaltReason::FramesFull));
        assert_eq!(state.state(), CaptureState::Halted);
    }

    #[test]
    fn test_rearm_clears_reason() {
        let state = StateMachine::new();
        state.halt(HaltReason::EntriesFull);
        state.rearm();
        assert!(!state.is_halted());
        assert!(state.halt(HaltReason::RegionsFull));
    }

    #[test]
    fn test_codes_round_trip() {
        for reason in [
            HaltReason::EntriesFull,
            HaltReason::FramesFull,
            HaltReason::RegionsFull,
            HaltReason::PauseRequested,
        ] {
            assert_eq!(HaltReason::from_code(reason.code()), Ok(Some(reason)));
        }
        assert_eq!(HaltReason::from_code(0), Ok(None));
        assert_eq!(HaltReason::from_code(99), Err(99));
    }
}
