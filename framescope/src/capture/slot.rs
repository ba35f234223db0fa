//! Per-thread recording slot
//!
//! A slot holds one thread's entry log and its explicit call stack. Both are
//! allocated once at the configured size, and the owning capture halts
//! before either can grow.
//!
//! Section and file names are interned into a slot-local table on first use,
//! so entries only carry small ids and the owner never touches shared state
//! to record a name. That first use is the one allocation a recording call
//! can make.

use std::collections::HashMap;

use framescope_common::{NO_PARENT, OPEN_END_TIME};

use crate::config::Configuration;
use crate::domain::{CapacityError, Generation, SlotIndex, StringId};

/// One recorded section, as stored while recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    pub section: StringId,
    pub file: StringId,
    pub line: i32,
    pub color: u32,
    pub start_time_ns: i64,
    pub end_time_ns: i64,
    pub parent_index: u32,
    pub depth: u32,
}

/// Slot-local string interner
#[derive(Debug, Default)]
pub(crate) struct SlotStrings {
    ids: HashMap<Box<str>, StringId>,
    names: Vec<Box<str>>,
}

impl SlotStrings {
    /// Allocates only the first time a name is seen in this session.
    pub(crate) fn intern(&mut self, name: &str) -> StringId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        // Entries per slot are bounded by a u32 limit, so ids fit
        #[allow(clippy::cast_possible_truncation)]
        let id = StringId(self.names.len() as u32);
        self.names.push(name.into());
        self.ids.insert(name.into(), id);
        id
    }

    pub(crate) fn resolve(&self, id: StringId) -> Option<&str> {
        self.names.get(id.0 as usize).map(AsRef::as_ref)
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.names.clear();
    }
}

/// What a push did, so the capture can update shared state afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PushOutcome {
    /// Write position after the push
    pub write_pos: u32,
    /// This was the slot's first entry of the session
    pub first_entry: bool,
    /// The entry log is now full
    pub filled: bool,
}

#[derive(Debug)]
pub(crate) struct ThreadSlot {
    pub index: SlotIndex,
    pub in_use: bool,
    pub hidden: bool,
    pub generation: Generation,
    pub name: String,
    pub entries: Vec<Entry>,
    pub call_stack: Vec<u32>,
    pub min_time_ns: i64,
    pub max_time_ns: i64,
    pub max_depth: u32,
    pub strings: SlotStrings,
    max_entries: usize,
    max_call_stack_depth: usize,
}

impl ThreadSlot {
    pub(crate) fn new(index: SlotIndex, config: &Configuration) -> Self {
        Self {
            index,
            in_use: false,
            hidden: false,
            generation: Generation::default(),
            name: default_name(index),
            entries: Vec::with_capacity(config.max_entries_per_thread as usize),
            call_stack: Vec::with_capacity(config.max_call_stack_depth as usize),
            min_time_ns: i64::MAX,
            max_time_ns: 0,
            max_depth: 0,
            strings: SlotStrings::default(),
            max_entries: config.max_entries_per_thread as usize,
            max_call_stack_depth: config.max_call_stack_depth as usize,
        }
    }

    /// Return the slot to its freshly-initialized state, keeping allocations.
    pub(crate) fn clear(&mut self) {
        self.in_use = false;
        self.hidden = false;
        self.name = default_name(self.index);
        self.clear_log();
    }

    /// Hand the slot to a new owner: empty log, stamped with `generation`.
    pub(crate) fn claim(&mut self, generation: Generation) {
        self.in_use = true;
        self.generation = generation;
        self.clear_log();
    }

    fn clear_log(&mut self) {
        self.entries.clear();
        self.call_stack.clear();
        self.min_time_ns = i64::MAX;
        self.max_time_ns = 0;
        self.max_depth = 0;
        self.strings.clear();
    }

    pub(crate) fn is_owned_by(&self, generation: Generation) -> bool {
        self.in_use && self.generation == generation
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn write_pos(&self) -> u32 {
        self.entries.len() as u32
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn call_stack_depth(&self) -> u32 {
        self.call_stack.len() as u32
    }

    /// Open a section at `now`.
    ///
    /// Returns `Ok(None)` when the entry log is already full; the caller
    /// halts the capture in that case.
    ///
    /// # Errors
    /// [`CapacityError::CallStackOverflow`] when nesting exceeds the
    /// configured depth.
    pub(crate) fn push(
        &mut self,
        name: &str,
        color: u32,
        file: &str,
        line: i32,
        now: i64,
    ) -> Result<Option<PushOutcome>, CapacityError> {
        if self.entries.len() >= self.max_entries {
            return Ok(None);
        }
        if self.call_stack.len() >= self.max_call_stack_depth {
            return Err(CapacityError::CallStackOverflow {
                slot: self.index,
                max_depth: u32::try_from(self.max_call_stack_depth).unwrap_or(u32::MAX),
            });
        }

        let index = self.write_pos();
        let parent_index = self.call_stack.last().copied().unwrap_or(NO_PARENT);
        let depth = self.call_stack_depth();
        let section = self.strings.intern(name);
        let file = self.strings.intern(file);

        self.entries.push(Entry {
            section,
            file,
            line,
            color,
            start_time_ns: now,
            end_time_ns: OPEN_END_TIME,
            parent_index,
            depth,
        });
        self.call_stack.push(index);

        self.max_depth = self.max_depth.max(self.call_stack_depth());
        self.min_time_ns = self.min_time_ns.min(now);
        self.max_time_ns = self.max_time_ns.max(now);

        Ok(Some(PushOutcome {
            write_pos: self.write_pos(),
            first_entry: index == 0,
            filled: self.entries.len() >= self.max_entries,
        }))
    }

    /// Close the innermost open section. An empty stack is tolerated.
    pub(crate) fn pop(&mut self, now: i64) -> bool {
        let Some(index) = self.call_stack.pop() else {
            return false;
        };
        if let Some(entry) = self.entries.get_mut(index as usize) {
            entry.end_time_ns = now;
        }
        self.max_time_ns = self.max_time_ns.max(now);
        true
    }
}

fn default_name(index: SlotIndex) -> String {
    format!("Thread {}", index.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(max_entries: u32, max_depth: u32) -> ThreadSlot {
        let config = Configuration {
            max_entries_per_thread: max_entries,
            max_call_stack_depth: max_depth,
            ..Configuration::default()
        };
        let mut slot = ThreadSlot::new(SlotIndex(0), &config);
        slot.claim(Generation(1));
        slot
    }

    #[test]
    fn test_nested_push_links_parent() {
        let mut slot = slot(10, 4);
        slot.push("outer", 0, "f", 1, 10).unwrap();
        slot.push("inner", 0, "f", 2, 20).unwrap();

        assert_eq!(slot.entries[0].parent_index, NO_PARENT);
        assert_eq!(slot.entries[0].depth, 0);
        assert_eq!(slot.entries[1].parent_index, 0);
        assert_eq!(slot.entries[1].depth, 1);
        assert_eq!(slot.max_depth, 2);
    }

    #[test]
    fn test_pop_stamps_end_time() {
        let mut slot = slot(10, 4);
        slot.push("a", 0, "f", 1, 5).unwrap();
        assert_eq!(slot.entries[0].end_time_ns, OPEN_END_TIME);
        assert!(slot.pop(9));
        assert_eq!(slot.entries[0].end_time_ns, 9);
        assert_eq!(slot.max_time_ns, 9);
    }

    #[test]
    fn test_pop_on_empty_stack_is_tolerated() {
        let mut slot = slot(10, 4);
        assert!(!slot.pop(1));
        assert!(slot.entries.is_empty());
    }

    #[test]
    fn test_depth_overflow_is_capacity_error() {
        let mut slot = slot(10, 1);
        slot.push("a", 0, "f", 1, 0).unwrap();
        let err = slot.push("b", 0, "f", 2, 1).unwrap_err();
        assert_eq!(err, CapacityError::CallStackOverflow { slot: SlotIndex(0), max_depth: 1 });
        assert_eq!(slot.write_pos(), 1);
    }

    #[test]
    fn test_full_log_reports_filled_then_refuses() {
        let mut slot = slot(2, 4);
        let first = slot.push("a", 0, "f", 1, 0).unwrap().unwrap();
        assert!(first.first_entry);
        assert!(!first.filled);
        slot.pop(1);
        let second = slot.push("a", 0, "f", 1, 2).unwrap().unwrap();
        assert!(second.filled);
        assert_eq!(slot.push("a", 0, "f", 1, 3).unwrap(), None);
    }

    #[test]
    fn test_names_are_interned_once() {
        let mut slot = slot(10, 4);
        for t in 0..3 {
            slot.push("tick", 0, "main.rs", 7, t).unwrap();
            slot.pop(t);
        }
        assert_eq!(slot.strings.len(), 2);
        assert_eq!(slot.entries[0].section, slot.entries[2].section);
        assert_eq!(slot.strings.resolve(slot.entries[1].file), Some("main.rs"));
    }

    #[test]
    fn test_claim_starts_with_empty_log() {
        let mut slot = slot(10, 4);
        slot.push("a", 0, "f", 1, 0).unwrap();
        slot.claim(Generation(2));
        assert_eq!(slot.write_pos(), 0);
        assert_eq!(slot.call_stack_depth(), 0);
        assert!(slot.is_owned_by(Generation(2)));
        assert!(!slot.is_owned_by(Generation(1)));
    }
}
