//! Frame boundary table
//!
//! Once per logical tick the designated frame thread records which slots are
//! active and how far each one's entry log has advanced. A viewer slices the
//! flat per-thread logs into frames with these positions instead of walking
//! every entry.

use framescope_common::OPEN_END_TIME;

use crate::domain::SlotIndex;

/// A slot that was active in a frame and its write position at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameThread {
    pub slot: SlotIndex,
    pub write_pos: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub start_time_ns: i64,
    /// `i64::MAX` until the next frame begins
    pub end_time_ns: i64,
    pub active_threads: Vec<FrameThread>,
}

impl FrameRecord {
    fn with_capacity(max_threads: usize) -> Self {
        Self { start_time_ns: 0, end_time_ns: OPEN_END_TIME, active_threads: Vec::with_capacity(max_threads) }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end_time_ns == OPEN_END_TIME
    }

    /// Where `slot`'s log stood when this frame began, if it was active
    #[must_use]
    pub fn position_of(&self, slot: SlotIndex) -> Option<u32> {
        self.active_threads.iter().find(|t| t.slot == slot).map(|t| t.write_pos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Recorded,
    /// Recorded, and that used the last free record
    Filled,
    /// Nothing recorded, the table was already full
    Full,
}

/// Preallocated frame records; `current` of them are in use
#[derive(Debug)]
pub(crate) struct FrameTable {
    records: Vec<FrameRecord>,
    current: usize,
    max_threads: usize,
}

impl FrameTable {
    pub(crate) fn new(max_frames: u32, max_threads: u32) -> Self {
        let max_threads = max_threads as usize;
        Self {
            records: (0..max_frames).map(|_| FrameRecord::with_capacity(max_threads)).collect(),
            current: 0,
            max_threads,
        }
    }

    pub(crate) fn clear(&mut self) {
        for record in &mut self.records[..self.current] {
            record.start_time_ns = 0;
            record.end_time_ns = OPEN_END_TIME;
            record.active_threads.clear();
        }
        self.current = 0;
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn current_frame(&self) -> u32 {
        self.current as u32
    }

    pub(crate) fn recorded(&self) -> &[FrameRecord] {
        &self.records[..self.current]
    }

    /// Open frame `current` at `now`, filling its thread list via `snapshot`,
    /// and close the previous frame at the same instant.
    pub(crate) fn begin(
        &mut self,
        now: i64,
        snapshot: impl FnOnce(&mut Vec<FrameThread>, usize),
    ) -> FrameOutcome {
        if self.current >= self.records.len() {
            return FrameOutcome::Full;
        }

        let max_threads = self.max_threads;
        let record = &mut self.records[self.current];
        record.start_time_ns = now;
        record.end_time_ns = OPEN_END_TIME;
        record.active_threads.clear();
        snapshot(&mut record.active_threads, max_threads);

        if let Some(previous) = self.current.checked_sub(1) {
            self.records[previous].end_time_ns = now;
        }
        self.current += 1;

        if self.current == self.records.len() {
            FrameOutcome::Filled
        } else {
            FrameOutcome::Recorded
        }
    }

    /// Add a thread that wrote its first entry after the running frame began.
    pub(crate) fn register_late_joiner(&mut self, slot: SlotIndex, write_pos: u32) {
        let Some(running) = self.current.checked_sub(1) else {
            return;
        };
        let max_threads = self.max_threads;
        let record = &mut self.records[running];
        if record.active_threads.len() >= max_threads || record.position_of(slot).is_some() {
            return;
        }
        record.active_threads.push(FrameThread { slot, write_pos });
    }

    /// Drop `slot` from every recorded frame. Its old positions index a log
    /// that no longer exists once the slot is claimed again or hidden.
    pub(crate) fn forget_slot(&mut self, slot: SlotIndex) {
        for record in &mut self.records[..self.current] {
            record.active_threads.retain(|t| t.slot != slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_closes_previous_frame() {
        let mut table = FrameTable::new(4, 2);
        assert_eq!(table.begin(10, |_, _| {}), FrameOutcome::Recorded);
        assert_eq!(table.begin(25, |_, _| {}), FrameOutcome::Recorded);

        let frames = table.recorded();
        assert_eq!(frames[0].start_time_ns, 10);
        assert_eq!(frames[0].end_time_ns, 25);
        assert!(frames[1].is_open());
        assert_eq!(table.current_frame(), 2);
    }

    #[test]
    fn test_last_record_reports_filled() {
        let mut table = FrameTable::new(2, 1);
        assert_eq!(table.begin(0, |_, _| {}), FrameOutcome::Recorded);
        assert_eq!(table.begin(1, |_, _| {}), FrameOutcome::Filled);
        assert_eq!(table.begin(2, |_, _| {}), FrameOutcome::Full);
        assert_eq!(table.current_frame(), 2);
    }

    #[test]
    fn test_snapshot_fills_thread_list() {
        let mut table = FrameTable::new(2, 2);
        table.begin(0, |threads, _| threads.push(FrameThread { slot: SlotIndex(1), write_pos: 3 }));
        assert_eq!(table.recorded()[0].position_of(SlotIndex(1)), Some(3));
        assert_eq!(table.recorded()[0].position_of(SlotIndex(0)), None);
    }

    #[test]
    fn test_late_joiner_registered_once() {
        let mut table = FrameTable::new(2, 2);
        table.register_late_joiner(SlotIndex(0), 0);
        assert_eq!(table.current_frame(), 0);

        table.begin(0, |_, _| {});
        table.register_late_joiner(SlotIndex(1), 0);
        table.register_late_joiner(SlotIndex(1), 0);
        assert_eq!(table.recorded()[0].active_threads.len(), 1);
    }

    #[test]
    fn test_forget_slot_removes_it_from_every_frame() {
        let mut table = FrameTable::new(3, 2);
        for write_pos in [2, 5] {
            table.begin(0, |threads, _| {
                threads.push(FrameThread { slot: SlotIndex(0), write_pos });
                threads.push(FrameThread { slot: SlotIndex(1), write_pos: 1 });
            });
        }
        table.forget_slot(SlotIndex(0));

        for frame in table.recorded() {
            assert_eq!(frame.position_of(SlotIndex(0)), None);
            assert_eq!(frame.position_of(SlotIndex(1)), Some(1));
        }

        // The new owner can join the running frame again
        table.register_late_joiner(SlotIndex(0), 0);
        assert_eq!(table.recorded()[1].position_of(SlotIndex(0)), Some(0));
    }

    #[test]
    fn test_clear_resets_used_records() {
        let mut table = FrameTable::new(2, 2);
        table.begin(5, |threads, _| threads.push(FrameThread { slot: SlotIndex(0), write_pos: 1 }));
        table.clear();
        assert_eq!(table.current_frame(), 0);
        assert!(table.recorded().is_empty());
        table.begin(7, |_, _| {});
        assert!(table.recorded()[0].active_threads.is_empty());
    }
}
