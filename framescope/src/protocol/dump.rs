//! Capture → blob encoder
//!
//! Frames and regions are copied out first, then each slot is encoded under
//! its own lock. A producer can only append, so every frame position copied
//! earlier is still within its slot's log.

use std::collections::HashMap;

use scroll::ctx::TryIntoCtx;
use scroll::{Endian, Pwrite, LE};

use framescope_common::{
    WireEntry, WireFrameHeader, WireFrameThread, WireHeader, WireRecord, WireRegion,
    WireSlotHeader, WireStringHeader, CAPTURE_MAGIC, FORMAT_VERSION, HALT_NONE,
    SLOT_FLAG_HIDDEN, SLOT_FLAG_IN_USE,
};

use crate::capture::{Capture, HaltReason, ThreadSlot};
use crate::domain::{DumpError, StringId};

/// Growable little-endian output buffer
#[derive(Debug, Default)]
struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    fn put<T>(&mut self, record: T) -> Result<(), scroll::Error>
    where
        T: WireRecord + TryIntoCtx<Endian, Error = scroll::Error>,
    {
        let mut offset = self.buf.len();
        self.buf.resize(offset + T::SIZE, 0);
        self.buf.as_mut_slice().gwrite_with(record, &mut offset, LE)?;
        Ok(())
    }

    fn put_u32(&mut self, value: u32) -> Result<(), scroll::Error> {
        let mut offset = self.buf.len();
        self.buf.resize(offset + 4, 0);
        self.buf.as_mut_slice().gwrite_with(value, &mut offset, LE)?;
        Ok(())
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Reserve a count to be filled in once it is known
    fn placeholder(&mut self) -> Result<usize, scroll::Error> {
        let at = self.buf.len();
        self.put_u32(0)?;
        Ok(at)
    }

    fn patch_u32(&mut self, at: usize, value: u32) -> Result<(), scroll::Error> {
        self.buf.as_mut_slice().pwrite_with(value, at, LE)?;
        Ok(())
    }
}

/// Global string ids, assigned in first-seen order across all slots
#[derive(Debug, Default)]
struct StringTableBuilder {
    ids: HashMap<Box<str>, u32>,
    names: Vec<Box<str>>,
}

impl StringTableBuilder {
    fn intern(&mut self, name: &str) -> Result<u32, DumpError> {
        if let Some(id) = self.ids.get(name) {
            return Ok(*id);
        }
        let id = u32::try_from(self.names.len()).map_err(|_| DumpError::StringTableOverflow(u32::MAX))?;
        self.names.push(name.into());
        self.ids.insert(name.into(), id);
        Ok(id)
    }
}

fn len_u32(len: usize) -> Result<u32, DumpError> {
    u32::try_from(len).map_err(|_| DumpError::Encode(scroll::Error::TooBig { size: len, len: u32::MAX as usize }))
}

pub(crate) fn encode(capture: &Capture) -> Result<Vec<u8>, DumpError> {
    let frames = capture.frames();
    let regions = capture.regions();

    let mut writer = WireWriter::default();
    writer.put(WireHeader {
        magic: CAPTURE_MAGIC,
        version: FORMAT_VERSION,
        halt_reason: capture.halt_reason().map_or(HALT_NONE, HaltReason::code),
        _reserved: 0,
        generation: capture.generation().0,
    })?;
    writer.put(capture.configuration().to_wire())?;

    let mut strings = StringTableBuilder::default();
    let slot_count_at = writer.placeholder()?;
    let mut slot_count = 0u32;
    for slot in capture.slots() {
        let slot = slot.lock();
        if !slot.in_use && slot.entries.is_empty() {
            continue;
        }
        encode_slot(&mut writer, &mut strings, &slot)?;
        slot_count += 1;
    }
    writer.patch_u32(slot_count_at, slot_count)?;

    writer.put_u32(len_u32(frames.len())?)?;
    for frame in &frames {
        writer.put(WireFrameHeader {
            start_time_ns: frame.start_time_ns,
            end_time_ns: frame.end_time_ns,
            thread_count: len_u32(frame.active_threads.len())?,
        })?;
        for thread in &frame.active_threads {
            writer.put(WireFrameThread { slot_index: thread.slot.0, write_pos: thread.write_pos })?;
        }
    }

    writer.put_u32(len_u32(regions.len())?)?;
    for region in &regions {
        writer.put(WireRegion { start_time_ns: region.start_time_ns, end_time_ns: region.end_time_ns })?;
    }

    writer.put_u32(len_u32(strings.names.len())?)?;
    for (id, name) in (0u32..).zip(&strings.names) {
        writer.put(WireStringHeader { id, len: len_u32(name.len())? })?;
        writer.put_bytes(name.as_bytes());
    }

    log::debug!(
        "encoded {slot_count} slots, {} frames, {} regions, {} strings into {} bytes",
        frames.len(),
        regions.len(),
        strings.names.len(),
        writer.buf.len()
    );
    Ok(writer.buf)
}

fn encode_slot(
    writer: &mut WireWriter,
    strings: &mut StringTableBuilder,
    slot: &ThreadSlot,
) -> Result<(), DumpError> {
    let mut flags = 0;
    if slot.in_use {
        flags |= SLOT_FLAG_IN_USE;
    }
    if slot.hidden {
        flags |= SLOT_FLAG_HIDDEN;
    }

    writer.put(WireSlotHeader {
        slot_index: slot.index.0,
        flags,
        generation: slot.generation.0,
        min_time_ns: slot.min_time_ns,
        max_time_ns: slot.max_time_ns,
        max_depth: slot.max_depth,
        open_depth: slot.call_stack_depth(),
        name_len: len_u32(slot.name.len())?,
        entry_count: slot.write_pos(),
    })?;
    writer.put_bytes(slot.name.as_bytes());

    // Slot-local id -> global id, filled as entries are scanned
    let mut remap: Vec<Option<u32>> = vec![None; slot.strings.len()];
    let mut global = |local: StringId| -> Result<u32, DumpError> {
        let cached = remap.get(local.0 as usize).copied().flatten();
        if let Some(id) = cached {
            return Ok(id);
        }
        let name = slot.strings.resolve(local).unwrap_or_default();
        let id = strings.intern(name)?;
        if let Some(cell) = remap.get_mut(local.0 as usize) {
            *cell = Some(id);
        }
        Ok(id)
    };

    for entry in &slot.entries {
        let section_id = global(entry.section)?;
        let file_id = global(entry.file)?;
        writer.put(WireEntry {
            section_id,
            file_id,
            line: entry.line,
            color: entry.color,
            start_time_ns: entry.start_time_ns,
            end_time_ns: entry.end_time_ns,
            parent_index: entry.parent_index,
            depth: entry.depth,
        })?;
    }
    Ok(())
}
