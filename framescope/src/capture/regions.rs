//! Region table
//!
//! A region is a secondary, always-on span independent of the section call
//! stacks, e.g. one DMA block or one audio callback. Regions do not nest.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRecord {
    pub start_time_ns: i64,
    pub end_time_ns: i64,
}

impl RegionRecord {
    #[must_use]
    pub fn duration_ns(&self) -> u64 {
        self.end_time_ns.saturating_sub(self.start_time_ns).max(0).unsigned_abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegionOutcome {
    Recorded,
    Filled,
    Full,
}

#[derive(Debug)]
pub(crate) struct RegionTable {
    records: Vec<RegionRecord>,
    capacity: usize,
    pending_start: Option<i64>,
}

impl RegionTable {
    pub(crate) fn new(max_regions: u32) -> Self {
        let capacity = max_regions as usize;
        Self { records: Vec::with_capacity(capacity), capacity, pending_start: None }
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.pending_start = None;
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn current_region(&self) -> u32 {
        self.records.len() as u32
    }

    pub(crate) fn recorded(&self) -> &[RegionRecord] {
        &self.records
    }

    pub(crate) fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub(crate) fn begin(&mut self, now: i64) {
        if !self.is_full() {
            self.pending_start = Some(now);
        }
    }

    /// Close the pending region at `now`. Without a pending begin the
    /// region is zero-length.
    pub(crate) fn end(&mut self, now: i64) -> RegionOutcome {
        if self.is_full() {
            return RegionOutcome::Full;
        }
        let start_time_ns = self.pending_start.take().unwrap_or(now);
        self.records.push(RegionRecord { start_time_ns, end_time_ns: now });

        if self.is_full() {
            RegionOutcome::Filled
        } else {
            RegionOutcome::Recorded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_end_records_span() {
        let mut table = RegionTable::new(4);
        table.begin(100);
        assert_eq!(table.end(150), RegionOutcome::Recorded);
        assert_eq!(table.recorded(), &[RegionRecord { start_time_ns: 100, end_time_ns: 150 }]);
        assert_eq!(table.recorded()[0].duration_ns(), 50);
    }

    #[test]
    fn test_end_without_begin_is_zero_length() {
        let mut table = RegionTable::new(4);
        table.end(42);
        assert_eq!(table.recorded()[0], RegionRecord { start_time_ns: 42, end_time_ns: 42 });
    }

    #[test]
    fn test_filled_then_full() {
        let mut table = RegionTable::new(1);
        table.begin(0);
        assert_eq!(table.end(1), RegionOutcome::Filled);
        table.begin(2);
        assert_eq!(table.end(3), RegionOutcome::Full);
        assert_eq!(table.current_region(), 1);
    }

    #[test]
    fn test_clear_drops_pending_start() {
        let mut table = RegionTable::new(2);
        table.begin(10);
        table.clear();
        table.end(20);
        assert_eq!(table.recorded()[0].start_time_ns, 20);
    }
}
