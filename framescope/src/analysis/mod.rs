//! Analysis logic for restored captures
//!
//! Pure functions over a [`CaptureSnapshot`](crate::snapshot::CaptureSnapshot),
//! kept apart from the CLI that prints their results.

pub mod hotspot_analyzer;

pub use hotspot_analyzer::{analyze_hotspots, SectionHotspot};
