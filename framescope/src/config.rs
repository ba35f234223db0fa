//! Capture limits
//!
//! All storage is sized from these numbers when a capture is created; nothing
//! grows afterwards. When a limit is reached the capture halts instead.

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

pub const DEFAULT_MAX_THREADS: u32 = 120;
pub const DEFAULT_MAX_CALL_STACK_DEPTH: u32 = 20;
pub const DEFAULT_MAX_ENTRIES_PER_THREAD: u32 = 100_000;
pub const DEFAULT_MAX_FRAMES: u32 = 10_000;
pub const DEFAULT_MAX_REGIONS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Thread slots available; one per recording thread
    pub max_threads: u32,
    /// Deepest allowed section nesting per thread
    pub max_call_stack_depth: u32,
    /// Entries each slot can hold before the capture halts
    pub max_entries_per_thread: u32,
    /// Frame boundaries before the capture halts
    pub max_frames: u32,
    /// Completed regions before the capture halts
    pub max_regions: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_threads: DEFAULT_MAX_THREADS,
            max_call_stack_depth: DEFAULT_MAX_CALL_STACK_DEPTH,
            max_entries_per_thread: DEFAULT_MAX_ENTRIES_PER_THREAD,
            max_frames: DEFAULT_MAX_FRAMES,
            max_regions: DEFAULT_MAX_REGIONS,
        }
    }
}

impl Configuration {
    /// Check that every limit is usable.
    ///
    /// # Errors
    /// Returns [`ConfigError::ZeroLimit`] for a zero limit, and
    /// [`ConfigError::LimitTooLarge`] when entries per thread would reach the
    /// `u32::MAX` "no parent" sentinel.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("max_threads", self.max_threads),
            ("max_call_stack_depth", self.max_call_stack_depth),
            ("max_entries_per_thread", self.max_entries_per_thread),
            ("max_frames", self.max_frames),
            ("max_regions", self.max_regions),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(ConfigError::ZeroLimit { field });
            }
        }
        if self.max_entries_per_thread == framescope_common::NO_PARENT {
            return Err(ConfigError::LimitTooLarge {
                field: "max_entries_per_thread",
                value: self.max_entries_per_thread,
            });
        }
        Ok(())
    }

    pub(crate) fn to_wire(self) -> framescope_common::WireConfiguration {
        framescope_common::WireConfiguration {
            max_threads: self.max_threads,
            max_call_stack_depth: self.max_call_stack_depth,
            max_entries_per_thread: self.max_entries_per_thread,
            max_frames: self.max_frames,
            max_regions: self.max_regions,
        }
    }

    pub(crate) fn from_wire(wire: framescope_common::WireConfiguration) -> Self {
        Self {
            max_threads: wire.max_threads,
            max_call_stack_depth: wire.max_call_stack_depth,
            max_entries_per_thread: wire.max_entries_per_thread,
            max_frames: wire.max_frames,
            max_regions: wire.max_regions,
        }
    }
}
