//! Hotspot analysis for restored captures.
//!
//! Aggregates closed sections by name to find where time goes. Each section
//! contributes its inclusive time and its self time (inclusive time minus the
//! time of its direct children), so a parent that only calls into expensive
//! children does not hide them.
//!
//! # Data Flow
//!
//! ```text
//! CaptureSnapshot
//!     │
//!     └──► analyze_hotspots() ──► Vec<SectionHotspot>, most self time first
//! ```
//!
//! # Performance
//!
//! - One pass over every entry to total child time per parent
//! - One pass to aggregate by name: O(entries) `HashMap` updates
//! - Sorting: O(n log n) where n = unique section names

// Percentage calculations intentionally convert integers to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{Duration, SlotIndex};
use crate::snapshot::{CaptureSnapshot, SectionEntry};

/// Maximum distinct callers remembered per hotspot.
///
/// A leaf section can be entered from many parents; the first few are enough
/// to show the main call patterns.
const MAX_CALLERS_PER_HOTSPOT: usize = 5;

/// A section name with its aggregated timing.
#[derive(Debug, Clone)]
pub struct SectionHotspot {
    pub name: Arc<str>,

    /// Closed sections with this name
    pub count: usize,

    /// Sum of inclusive durations
    pub total: Duration,

    /// Sum of self durations (children subtracted)
    pub self_time: Duration,

    /// Share of all self time in the capture (0.0 - 100.0)
    pub percentage: f64,

    /// Per-thread breakdown: slot → section count
    pub threads: HashMap<SlotIndex, usize>,

    /// Source location of the first occurrence
    pub file: Arc<str>,
    pub line: i32,

    /// Names of enclosing sections, in first-seen order
    pub callers: Vec<Arc<str>>,
}

impl SectionHotspot {
    /// Average inclusive time per call
    #[must_use]
    pub fn mean(&self) -> Duration {
        match u64::try_from(self.count) {
            Ok(count) if count > 0 => Duration(self.total.0 / count),
            _ => Duration::default(),
        }
    }
}

/// Time spent in the direct children of each entry of one thread
fn child_time(entries: &[SectionEntry]) -> Vec<u64> {
    let mut children = vec![0u64; entries.len()];
    for entry in entries {
        if let (Some(parent), Some(duration)) = (entry.parent, entry.duration()) {
            if let Some(total) = children.get_mut(parent.as_usize()) {
                *total = total.saturating_add(duration.0);
            }
        }
    }
    children
}

/// Analyze a capture to identify section hotspots.
///
/// Sections still open at dump time have no duration and are skipped.
///
/// # Returns
/// Hotspots sorted by self time (largest first), ties broken by name
#[must_use]
pub fn analyze_hotspots(snapshot: &CaptureSnapshot) -> Vec<SectionHotspot> {
    let mut by_name: HashMap<Arc<str>, SectionHotspot> = HashMap::new();
    let mut total_self: u64 = 0;

    for thread in &snapshot.threads {
        let children = child_time(&thread.entries);

        for (entry, child_ns) in thread.entries.iter().zip(&children) {
            let Some(inclusive) = entry.duration() else {
                continue;
            };
            let self_ns = inclusive.0.saturating_sub(*child_ns);
            total_self = total_self.saturating_add(self_ns);

            let hotspot = by_name.entry(Arc::clone(&entry.section)).or_insert_with(|| SectionHotspot {
                name: Arc::clone(&entry.section),
                count: 0,
                total: Duration::default(),
                self_time: Duration::default(),
                percentage: 0.0,
                threads: HashMap::new(),
                file: Arc::clone(&entry.file),
                line: entry.line,
                callers: Vec::new(),
            });

            hotspot.count += 1;
            hotspot.total += inclusive;
            hotspot.self_time += Duration(self_ns);
            *hotspot.threads.entry(thread.slot).or_insert(0) += 1;

            if let Some(parent) = entry.parent.and_then(|p| thread.entry(p)) {
                if hotspot.callers.len() < MAX_CALLERS_PER_HOTSPOT
                    && !hotspot.callers.contains(&parent.section)
                {
                    hotspot.callers.push(Arc::clone(&parent.section));
                }
            }
        }
    }

    let mut hotspots: Vec<SectionHotspot> = by_name
        .into_values()
        .map(|mut hotspot| {
            hotspot.percentage = if total_self > 0 {
                hotspot.self_time.0 as f64 / total_self as f64 * 100.0
            } else {
                0.0
            };
            hotspot
        })
        .collect();

    hotspots.sort_unstable_by(|a, b| b.self_time.cmp(&a.self_time).then_with(|| a.name.cmp(&b.name)));
    hotspots
}
