//! Structured error types for framescope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::SlotIndex;
use thiserror::Error;

/// The configured limits are too small for how the program is instrumented.
///
/// These are programmer errors: the fix is a bigger [`Configuration`](crate::config::Configuration),
/// not a retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    #[error("call stack overflow on {slot}: more than {max_depth} nested sections (raise max_call_stack_depth)")]
    CallStackOverflow { slot: SlotIndex, max_depth: u32 },

    #[error("no free thread slot: all {max_threads} slots are in use (raise max_threads)")]
    NoFreeThreadSlot { max_threads: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroLimit { field: &'static str },

    #[error("{field} = {value} collides with the reserved index sentinel")]
    LimitTooLarge { field: &'static str, value: u32 },
}

#[derive(Error, Debug)]
pub enum DumpError {
    #[error("capture is still recording")]
    NotHalted,

    #[error("capture was already dumped this session")]
    AlreadyDumped,

    #[error("string table overflow: more than {0} distinct names")]
    StringTableOverflow(u32),

    #[error("failed to encode capture: {0}")]
    Encode(#[from] scroll::Error),

    #[error("encoded capture does not read back: {0}")]
    Verify(#[from] RestoreError),
}

/// A received blob could not be turned into a snapshot.
///
/// Restore is all-or-nothing: when this is returned no snapshot exists.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("not a capture blob (magic {0:02x?})")]
    BadMagic([u8; 4]),

    #[error("unsupported capture format version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown halt reason {0}")]
    UnknownHaltReason(u8),

    #[error("capture truncated while reading {section}")]
    Truncated {
        section: &'static str,
        #[source]
        source: scroll::Error,
    },

    #[error("invalid configuration in capture: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("{what} count {count} exceeds configured limit {limit}")]
    LimitExceeded { what: &'static str, count: u32, limit: u32 },

    #[error("slot index {0} out of range")]
    SlotOutOfRange(u32),

    #[error("slot {0} appears more than once")]
    DuplicateSlot(u32),

    #[error("string id {0} is not in the string table")]
    UnknownString(u32),

    #[error("string id {0} appears more than once")]
    DuplicateString(u32),

    #[error("{what} is not valid UTF-8")]
    InvalidUtf8 { what: &'static str },

    #[error("entry {entry} on {slot} has an invalid parent link")]
    BrokenParent { slot: SlotIndex, entry: u32 },

    #[error("frame {frame} points past the end of {slot}'s entry log")]
    FrameOutOfRange { frame: u32, slot: SlotIndex },

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("blob of {0} bytes exceeds the {1} byte transfer limit")]
    TooLarge(usize, usize),

    #[error("transfer ended after {received} of {expected} bytes")]
    Truncated { expected: usize, received: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Dump(#[from] DumpError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_error_display() {
        let err = CapacityError::NoFreeThreadSlot { max_threads: 2 };
        assert_eq!(
            err.to_string(),
            "no free thread slot: all 2 slots are in use (raise max_threads)"
        );
    }

    #[test]
    fn test_call_stack_overflow_names_slot() {
        let err = CapacityError::CallStackOverflow { slot: SlotIndex(1), max_depth: 4 };
        assert!(err.to_string().contains("Slot#1"));
        assert!(err.to_string().contains("max_call_stack_depth"));
    }

    #[test]
    fn test_restore_error_wraps_config_error() {
        let err: RestoreError = ConfigError::ZeroLimit { field: "max_frames" }.into();
        assert!(err.to_string().contains("max_frames must be greater than zero"));
    }
}
