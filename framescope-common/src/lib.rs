//! # Shared Wire Format (Producer ↔ Viewer)
//!
//! Defines the records and constants shared between the process that records a
//! capture (firmware or desktop application) and the host-side viewer that
//! restores it. Every record is `#[repr(C)]`, plain-old-data, and encoded
//! little-endian through `scroll`, so the same definitions work on a `no_std`
//! target and on the host.
//!
//! ## Blob Layout
//!
//! ```text
//! WireHeader
//! WireConfiguration
//! u32 slot_count
//!   WireSlotHeader, name bytes, WireEntry × entry_count     (per slot)
//! u32 frame_count
//!   WireFrameHeader, WireFrameThread × thread_count         (per frame)
//! u32 region_count
//!   WireRegion                                              (per region)
//! u32 string_count
//!   WireStringHeader, string bytes                          (per string)
//! ```
//!
//! Section and file names never travel as addresses: entries carry
//! [`WireEntry::section_id`] / [`WireEntry::file_id`], which index the string
//! table at the end of the blob.

#![no_std]

use scroll::{Pread, Pwrite};

// ============================================================================
// Format Constants
// ============================================================================

/// Leading bytes of every capture blob
pub const CAPTURE_MAGIC: [u8; 4] = *b"FSCP";

/// Current blob layout version
///
/// Bumped whenever a record changes size or meaning. Viewers reject blobs
/// with a version they do not know.
pub const FORMAT_VERSION: u16 = 1;

/// Parent index of a root entry (no enclosing section)
pub const NO_PARENT: u32 = u32::MAX;

/// End time of a section, frame or region that had not closed when dumped
pub const OPEN_END_TIME: i64 = i64::MAX;

/// Number of colors in the name → color palette
pub const PALETTE_SIZE: usize = 16;

/// Size of the little-endian length prefix in front of a transported blob
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// **Host → device**: reset the capture and ship it once it halts
///
/// Sent as a single byte on the command channel.
pub const CMD_REQUEST_DUMP: u8 = 1;

// ============================================================================
// Slot Flags
// ============================================================================

/// Slot was owned by a thread when the capture was dumped
pub const SLOT_FLAG_IN_USE: u32 = 1 << 0;

/// Slot was hidden by its thread and should not be drawn
pub const SLOT_FLAG_HIDDEN: u32 = 1 << 1;

// ============================================================================
// Halt Reasons
// ============================================================================

/// Capture was still armed (only seen in in-process snapshots)
pub const HALT_NONE: u8 = 0;
/// A thread slot ran out of entries
pub const HALT_ENTRIES_FULL: u8 = 1;
/// The frame table filled up
pub const HALT_FRAMES_FULL: u8 = 2;
/// The region table filled up
pub const HALT_REGIONS_FULL: u8 = 3;
/// Someone asked for the capture to stop
pub const HALT_PAUSE_REQUESTED: u8 = 4;

// ============================================================================
// Records
// ============================================================================

/// Encoded size of a fixed-layout record
///
/// Sizes are the sum of the field widths; `scroll` writes fields back to back
/// without padding.
pub trait WireRecord {
    const SIZE: usize;
}

/// Blob header
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pread, Pwrite)]
pub struct WireHeader {
    /// Always [`CAPTURE_MAGIC`]
    pub magic: [u8; 4],
    /// Always [`FORMAT_VERSION`] when written by this crate
    pub version: u16,
    /// One of the `HALT_*` constants
    pub halt_reason: u8,
    #[allow(clippy::pub_underscore_fields)]
    pub _reserved: u8,
    /// Capture generation the blob was taken from
    pub generation: u64,
}

impl WireRecord for WireHeader {
    const SIZE: usize = 4 + 2 + 1 + 1 + 8;
}

/// Capture limits the producer was configured with
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pread, Pwrite)]
pub struct WireConfiguration {
    pub max_threads: u32,
    pub max_call_stack_depth: u32,
    pub max_entries_per_thread: u32,
    pub max_frames: u32,
    pub max_regions: u32,
}

impl WireRecord for WireConfiguration {
    const SIZE: usize = 4 * 5;
}

/// Per-slot metadata, followed by `name_len` UTF-8 bytes and
/// `entry_count` [`WireEntry`] records
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pread, Pwrite)]
pub struct WireSlotHeader {
    pub slot_index: u32,
    /// `SLOT_FLAG_*` bits
    pub flags: u32,
    pub generation: u64,
    /// Earliest timestamp seen by the slot (`i64::MAX` when empty)
    pub min_time_ns: i64,
    /// Latest timestamp seen by the slot
    pub max_time_ns: i64,
    /// Deepest nesting level reached
    pub max_depth: u32,
    /// Sections still open at dump time
    pub open_depth: u32,
    pub name_len: u32,
    pub entry_count: u32,
}

impl WireRecord for WireSlotHeader {
    const SIZE: usize = 4 + 4 + 8 + 8 + 8 + 4 + 4 + 4 + 4;
}

/// One recorded section
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pread, Pwrite)]
pub struct WireEntry {
    /// String table id of the section name
    pub section_id: u32,
    /// String table id of the source file
    pub file_id: u32,
    pub line: i32,
    /// Packed `0xAABBGGRR`
    pub color: u32,
    pub start_time_ns: i64,
    /// [`OPEN_END_TIME`] when the section never closed
    pub end_time_ns: i64,
    /// Index of the enclosing entry in the same slot, or [`NO_PARENT`]
    pub parent_index: u32,
    pub depth: u32,
}

impl WireRecord for WireEntry {
    const SIZE: usize = 4 + 4 + 4 + 4 + 8 + 8 + 4 + 4;
}

/// Frame boundary, followed by `thread_count` [`WireFrameThread`] records
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pread, Pwrite)]
pub struct WireFrameHeader {
    pub start_time_ns: i64,
    /// [`OPEN_END_TIME`] for the frame that was running at dump time
    pub end_time_ns: i64,
    pub thread_count: u32,
}

impl WireRecord for WireFrameHeader {
    const SIZE: usize = 8 + 8 + 4;
}

/// A thread that was active in a frame and where its entry log stood
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pread, Pwrite)]
pub struct WireFrameThread {
    pub slot_index: u32,
    pub write_pos: u32,
}

impl WireRecord for WireFrameThread {
    const SIZE: usize = 4 + 4;
}

/// Completed region span
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pread, Pwrite)]
pub struct WireRegion {
    pub start_time_ns: i64,
    pub end_time_ns: i64,
}

impl WireRecord for WireRegion {
    const SIZE: usize = 8 + 8;
}

/// String table row, followed by `len` UTF-8 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pread, Pwrite)]
pub struct WireStringHeader {
    pub id: u32,
    pub len: u32,
}

impl WireRecord for WireStringHeader {
    const SIZE: usize = 4 + 4;
}
