//! Blob → snapshot decoder
//!
//! Everything is decoded and checked before a snapshot is built, so a bad
//! blob never yields a partially restored capture.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use scroll::ctx::TryFromCtx;
use scroll::{Endian, Pread, LE};

use framescope_common::{
    WireConfiguration, WireEntry, WireFrameHeader, WireFrameThread, WireHeader, WireRecord,
    WireRegion, WireSlotHeader, WireStringHeader, CAPTURE_MAGIC, FORMAT_VERSION, NO_PARENT,
    SLOT_FLAG_HIDDEN, SLOT_FLAG_IN_USE,
};

use crate::capture::{FrameRecord, FrameThread, HaltReason, RegionRecord};
use crate::color::Color;
use crate::config::Configuration;
use crate::domain::{EntryIndex, Generation, RestoreError, SlotIndex, StringId};
use crate::snapshot::{CaptureSnapshot, SectionEntry, StringTable, ThreadSnapshot};

struct WireReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn get<T>(&mut self, section: &'static str) -> Result<T, RestoreError>
    where
        T: TryFromCtx<'a, Endian, Error = scroll::Error>,
    {
        self.bytes
            .gread_with::<T>(&mut self.offset, LE)
            .map_err(|source| RestoreError::Truncated { section, source })
    }

    fn get_bytes(&mut self, len: u32, section: &'static str) -> Result<&'a [u8], RestoreError> {
        self.bytes
            .gread_with::<&'a [u8]>(&mut self.offset, len as usize)
            .map_err(|source| RestoreError::Truncated { section, source })
    }

    fn get_str(&mut self, len: u32, what: &'static str) -> Result<&'a str, RestoreError> {
        let bytes = self.get_bytes(len, what)?;
        std::str::from_utf8(bytes).map_err(|_| RestoreError::InvalidUtf8 { what })
    }

    /// Capacity hint that a lying count cannot inflate past the remaining input
    fn capacity_for<T: WireRecord>(&self, count: u32) -> usize {
        (count as usize).min((self.bytes.len() - self.offset) / T::SIZE)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }
}

fn check_limit(what: &'static str, count: u32, limit: u32) -> Result<(), RestoreError> {
    if count > limit {
        return Err(RestoreError::LimitExceeded { what, count, limit });
    }
    Ok(())
}

struct RawSlot<'a> {
    header: WireSlotHeader,
    name: &'a str,
    entries: Vec<WireEntry>,
}

/// Rebuild a capture from a dumped blob.
///
/// # Errors
/// Returns [`RestoreError`] for anything malformed; nothing is returned in
/// that case.
pub fn restore(bytes: &[u8]) -> Result<CaptureSnapshot, RestoreError> {
    let result = decode(bytes);
    match &result {
        Ok(snapshot) => log::debug!(
            "restored {} threads, {} frames, {} regions from {} bytes",
            snapshot.threads.len(),
            snapshot.frames.len(),
            snapshot.regions.len(),
            bytes.len()
        ),
        Err(err) => log::warn!("rejected capture blob: {err}"),
    }
    result
}

fn decode(bytes: &[u8]) -> Result<CaptureSnapshot, RestoreError> {
    let mut reader = WireReader::new(bytes);

    let header: WireHeader = reader.get("header")?;
    if header.magic != CAPTURE_MAGIC {
        return Err(RestoreError::BadMagic(header.magic));
    }
    if header.version != FORMAT_VERSION {
        return Err(RestoreError::UnsupportedVersion(header.version));
    }
    let halt_reason =
        HaltReason::from_code(header.halt_reason).map_err(RestoreError::UnknownHaltReason)?;

    let configuration = Configuration::from_wire(reader.get::<WireConfiguration>("configuration")?);
    configuration.validate()?;

    let slots = decode_slots(&mut reader, &configuration)?;
    let frames = decode_frames(&mut reader, &configuration, &slots)?;
    let regions = decode_regions(&mut reader, &configuration)?;
    let strings = decode_strings(&mut reader)?;

    if reader.remaining() > 0 {
        return Err(RestoreError::TrailingBytes(reader.remaining()));
    }

    let threads = slots
        .into_iter()
        .map(|raw| resolve_slot(raw, &strings))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CaptureSnapshot {
        configuration,
        generation: Generation(header.generation),
        halt_reason,
        threads,
        frames,
        regions,
        strings,
    })
}

fn decode_slots<'a>(
    reader: &mut WireReader<'a>,
    config: &Configuration,
) -> Result<Vec<RawSlot<'a>>, RestoreError> {
    let count: u32 = reader.get("slot count")?;
    check_limit("slot", count, config.max_threads)?;

    let mut seen = BTreeSet::new();
    let mut slots = Vec::with_capacity(reader.capacity_for::<WireSlotHeader>(count));
    for _ in 0..count {
        let header: WireSlotHeader = reader.get("slot header")?;
        if header.slot_index >= config.max_threads {
            return Err(RestoreError::SlotOutOfRange(header.slot_index));
        }
        if !seen.insert(header.slot_index) {
            return Err(RestoreError::DuplicateSlot(header.slot_index));
        }
        check_limit("entry", header.entry_count, config.max_entries_per_thread)?;

        let name = reader.get_str(header.name_len, "thread name")?;
        let mut entries = Vec::with_capacity(reader.capacity_for::<WireEntry>(header.entry_count));
        for _ in 0..header.entry_count {
            entries.push(reader.get::<WireEntry>("entries")?);
        }
        check_parents(SlotIndex(header.slot_index), &entries)?;

        slots.push(RawSlot { header, name, entries });
    }
    Ok(slots)
}

/// Every parent is an earlier entry one level up that started no later.
fn check_parents(slot: SlotIndex, entries: &[WireEntry]) -> Result<(), RestoreError> {
    for (index, entry) in (0u32..).zip(entries) {
        let valid = if entry.parent_index == NO_PARENT {
            entry.depth == 0
        } else {
            entry.parent_index < index
                && entries.get(entry.parent_index as usize).is_some_and(|parent| {
                    parent.depth.checked_add(1) == Some(entry.depth)
                        && parent.start_time_ns <= entry.start_time_ns
                })
        };
        if !valid {
            return Err(RestoreError::BrokenParent { slot, entry: index });
        }
    }
    Ok(())
}

fn decode_frames(
    reader: &mut WireReader<'_>,
    config: &Configuration,
    slots: &[RawSlot<'_>],
) -> Result<Vec<FrameRecord>, RestoreError> {
    let count: u32 = reader.get("frame count")?;
    check_limit("frame", count, config.max_frames)?;

    let entry_count = |slot: u32| {
        slots
            .iter()
            .find(|raw| raw.header.slot_index == slot)
            .map_or(0, |raw| raw.header.entry_count)
    };

    let mut frames = Vec::with_capacity(reader.capacity_for::<WireFrameHeader>(count));
    for frame in 0..count {
        let header: WireFrameHeader = reader.get("frame header")?;
        check_limit("frame thread", header.thread_count, config.max_threads)?;

        let mut active_threads =
            Vec::with_capacity(reader.capacity_for::<WireFrameThread>(header.thread_count));
        for _ in 0..header.thread_count {
            let thread: WireFrameThread = reader.get("frame threads")?;
            if thread.slot_index >= config.max_threads {
                return Err(RestoreError::SlotOutOfRange(thread.slot_index));
            }
            if thread.write_pos > entry_count(thread.slot_index) {
                return Err(RestoreError::FrameOutOfRange {
                    frame,
                    slot: SlotIndex(thread.slot_index),
                });
            }
            active_threads.push(FrameThread {
                slot: SlotIndex(thread.slot_index),
                write_pos: thread.write_pos,
            });
        }

        frames.push(FrameRecord {
            start_time_ns: header.start_time_ns,
            end_time_ns: header.end_time_ns,
            active_threads,
        });
    }
    Ok(frames)
}

fn decode_regions(
    reader: &mut WireReader<'_>,
    config: &Configuration,
) -> Result<Vec<RegionRecord>, RestoreError> {
    let count: u32 = reader.get("region count")?;
    check_limit("region", count, config.max_regions)?;

    let mut regions = Vec::with_capacity(reader.capacity_for::<WireRegion>(count));
    for _ in 0..count {
        let region: WireRegion = reader.get("regions")?;
        regions.push(RegionRecord {
            start_time_ns: region.start_time_ns,
            end_time_ns: region.end_time_ns,
        });
    }
    Ok(regions)
}

fn decode_strings(reader: &mut WireReader<'_>) -> Result<StringTable, RestoreError> {
    let count: u32 = reader.get("string count")?;

    let mut strings = BTreeMap::new();
    for _ in 0..count {
        let header: WireStringHeader = reader.get("string header")?;
        let text = reader.get_str(header.len, "string table")?;
        if strings.insert(StringId(header.id), Arc::<str>::from(text)).is_some() {
            return Err(RestoreError::DuplicateString(header.id));
        }
    }
    Ok(StringTable::new(strings))
}

fn resolve_slot(raw: RawSlot<'_>, strings: &StringTable) -> Result<ThreadSnapshot, RestoreError> {
    let lookup = |id: u32| strings.shared(StringId(id)).ok_or(RestoreError::UnknownString(id));

    let entries = raw
        .entries
        .iter()
        .map(|entry| {
            Ok(SectionEntry {
                section: lookup(entry.section_id)?,
                file: lookup(entry.file_id)?,
                section_id: StringId(entry.section_id),
                file_id: StringId(entry.file_id),
                line: entry.line,
                color: Color::from_packed(entry.color),
                start_time_ns: entry.start_time_ns,
                end_time_ns: entry.end_time_ns,
                parent: (entry.parent_index != NO_PARENT).then_some(EntryIndex(entry.parent_index)),
                depth: entry.depth,
            })
        })
        .collect::<Result<Vec<_>, RestoreError>>()?;

    let header = raw.header;
    Ok(ThreadSnapshot {
        slot: SlotIndex(header.slot_index),
        name: raw.name.to_owned(),
        in_use: header.flags & SLOT_FLAG_IN_USE != 0,
        hidden: header.flags & SLOT_FLAG_HIDDEN != 0,
        generation: Generation(header.generation),
        min_time_ns: header.min_time_ns,
        max_time_ns: header.max_time_ns,
        max_depth: header.max_depth,
        open_depth: header.open_depth,
        entries,
    })
}
