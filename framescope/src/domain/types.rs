//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep slot indices, entry indices and string ids
//! apart, so an entry index can never be passed where a slot is expected.

use std::fmt;

/// Thread slot index (0-based)
///
/// A slot is the fixed-size recording area a producer thread owns.
/// This is NOT an OS thread id; slots are handed out in first-free order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(pub u32);

impl SlotIndex {
    /// Index into per-slot arrays
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot#{}", self.0)
    }
}

/// Position of an entry inside one slot's entry log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryIndex(pub u32);

impl EntryIndex {
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Interned string id
///
/// Ids are slot-local while recording and global (first-seen order) once
/// a capture has been dumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub u32);

/// Capture generation
///
/// Bumped on every reset; a cached slot handle from an older generation is
/// stale and must be re-acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Timestamp in nanoseconds
///
/// Elapsed time since the capture was armed, from one monotonic clock shared
/// by every thread, so values from different slots are directly comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Convert to seconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Convert to microseconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_micros(self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    /// Convert to milliseconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_millis(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.as_millis())
    }
}

/// Duration in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Duration(pub u64);

impl Duration {
    /// Span between two timestamps, clamped at zero
    #[must_use]
    pub fn between(start: i64, end: i64) -> Self {
        Duration(u64::try_from(end.saturating_sub(start)).unwrap_or(0))
    }

    /// Convert to milliseconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_millis(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Convert to seconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Convert to microseconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_micros(self) -> f64 {
        self.0 as f64 / 1_000.0
    }
}

impl std::ops::Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.as_millis();
        if ms >= 1000.0 {
            write!(f, "{:.2}s", self.as_seconds())
        } else if ms >= 1.0 {
            write!(f, "{ms:.2}ms")
        } else {
            write!(f, "{:.1}µs", self.as_micros())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_display() {
        assert_eq!(SlotIndex(3).to_string(), "Slot#3");
    }

    #[test]
    fn test_timestamp_conversions() {
        let ts = Timestamp(1_500_000_000);
        assert_eq!(ts.as_seconds(), 1.5);
        assert_eq!(ts.as_millis(), 1500.0);
        assert_eq!(ts.as_micros(), 1_500_000.0);
    }

    #[test]
    fn test_duration_between_clamps_negative() {
        assert_eq!(Duration::between(10, 4), Duration(0));
        assert_eq!(Duration::between(4, 10), Duration(6));
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(Duration(5_000_000).to_string(), "5.00ms");
        assert_eq!(Duration(1_500_000_000).to_string(), "1.50s");
        assert_eq!(Duration(2_500).to_string(), "2.5µs");
    }
}
