//! Read-only view of a restored capture
//!
//! A [`CaptureSnapshot`] owns everything it shows: names are resolved to
//! shared [`Arc<str>`] values at restore time and nothing refers back to the
//! producer's memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::capture::{FrameRecord, HaltReason, RegionRecord};
use crate::color::Color;
use crate::config::Configuration;
use crate::domain::{Duration, EntryIndex, Generation, SlotIndex, StringId};
use framescope_common::OPEN_END_TIME;

/// Id → content map carried at the end of a blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    strings: BTreeMap<StringId, Arc<str>>,
}

impl StringTable {
    pub(crate) fn new(strings: BTreeMap<StringId, Arc<str>>) -> Self {
        Self { strings }
    }

    #[must_use]
    pub fn get(&self, id: StringId) -> Option<&str> {
        self.strings.get(&id).map(AsRef::as_ref)
    }

    pub(crate) fn shared(&self, id: StringId) -> Option<Arc<str>> {
        self.strings.get(&id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StringId, &str)> {
        self.strings.iter().map(|(id, s)| (*id, s.as_ref()))
    }
}

/// One section as restored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEntry {
    pub section: Arc<str>,
    pub file: Arc<str>,
    pub section_id: StringId,
    pub file_id: StringId,
    pub line: i32,
    pub color: Color,
    pub start_time_ns: i64,
    /// `i64::MAX` if the section was still open
    pub end_time_ns: i64,
    pub parent: Option<EntryIndex>,
    pub depth: u32,
}

impl SectionEntry {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end_time_ns == OPEN_END_TIME
    }

    /// Inclusive time; `None` while open
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        (!self.is_open()).then(|| Duration::between(self.start_time_ns, self.end_time_ns))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub slot: SlotIndex,
    pub name: String,
    pub in_use: bool,
    pub hidden: bool,
    pub generation: Generation,
    /// `i64::MAX` if the thread never recorded
    pub min_time_ns: i64,
    pub max_time_ns: i64,
    pub max_depth: u32,
    /// Sections left open at dump time
    pub open_depth: u32,
    pub entries: Vec<SectionEntry>,
}

impl ThreadSnapshot {
    #[must_use]
    pub fn entry(&self, index: EntryIndex) -> Option<&SectionEntry> {
        self.entries.get(index.as_usize())
    }

    /// Recorded time span, if the thread recorded anything
    #[must_use]
    pub fn time_span(&self) -> Option<(i64, i64)> {
        (!self.entries.is_empty()).then_some((self.min_time_ns, self.max_time_ns))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSnapshot {
    pub configuration: Configuration,
    pub generation: Generation,
    /// `None` for an in-process snapshot of an armed capture
    pub halt_reason: Option<HaltReason>,
    pub threads: Vec<ThreadSnapshot>,
    pub frames: Vec<FrameRecord>,
    pub regions: Vec<RegionRecord>,
    pub strings: StringTable,
}

impl CaptureSnapshot {
    #[must_use]
    pub fn thread(&self, slot: SlotIndex) -> Option<&ThreadSnapshot> {
        self.threads.iter().find(|t| t.slot == slot)
    }

    /// Threads a viewer should draw
    pub fn visible_threads(&self) -> impl Iterator<Item = &ThreadSnapshot> {
        self.threads.iter().filter(|t| !t.hidden)
    }

    /// Entries `slot` wrote during frame `frame`.
    ///
    /// The slice runs from the thread's position at this frame's start to its
    /// position at the next frame's start, or to the end of its log for the
    /// last frame. Empty if the thread was not active in the frame.
    #[must_use]
    pub fn frame_entries(&self, frame: usize, slot: SlotIndex) -> &[SectionEntry] {
        let Some(thread) = self.thread(slot) else {
            return &[];
        };
        let Some(start) = self.frames.get(frame).and_then(|f| f.position_of(slot)) else {
            return &[];
        };
        let end = self
            .frames
            .get(frame + 1)
            .and_then(|next| next.position_of(slot))
            .map_or(thread.entries.len(), |pos| pos as usize);

        let start = (start as usize).min(thread.entries.len());
        let end = end.clamp(start, thread.entries.len());
        &thread.entries[start..end]
    }

    /// Direct children of `entry` in `slot`'s log
    pub fn children(
        &self,
        slot: SlotIndex,
        entry: EntryIndex,
    ) -> impl Iterator<Item = (EntryIndex, &SectionEntry)> {
        let entries = self.thread(slot).map_or(&[][..], |t| &t.entries[..]);
        (0u32..)
            .zip(entries)
            .skip(entry.as_usize() + 1)
            .filter(move |(_, e)| e.parent == Some(entry))
            .map(|(i, e)| (EntryIndex(i), e))
    }

    /// Length of frame `index`; `None` if it does not exist or is still open
    #[must_use]
    pub fn frame_duration(&self, index: usize) -> Option<Duration> {
        let frame = self.frames.get(index)?;
        (!frame.is_open()).then(|| Duration::between(frame.start_time_ns, frame.end_time_ns))
    }

    #[must_use]
    pub fn region_duration(&self, index: usize) -> Option<Duration> {
        self.regions.get(index).map(|r| Duration(r.duration_ns()))
    }

    /// Name of a section or file by its transmitted id
    #[must_use]
    pub fn string(&self, id: StringId) -> Option<&str> {
        self.strings.get(id)
    }

    /// Earliest and latest timestamps across all threads
    #[must_use]
    pub fn time_span(&self) -> Option<(i64, i64)> {
        self.threads.iter().filter_map(ThreadSnapshot::time_span).reduce(|(a0, a1), (b0, b1)| {
            (a0.min(b0), a1.max(b1))
        })
    }

    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.threads.iter().map(|t| t.entries.len()).sum()
    }
}
