use std::collections::HashMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::{Duration, ExportError, Timestamp};
use crate::snapshot::{CaptureSnapshot, ThreadSnapshot};

/// Every exported capture is one process
const PID: u32 = 1;

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Event name (section name, frame label or metadata kind)
    name: String,
    /// Category for filtering/coloring
    cat: String,
    /// Phase: "X" = complete, "i" = instant, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Duration in microseconds, "X" events only
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<f64>,
    pid: u32,
    /// Thread slot, or the region track
    tid: u32,
    /// Instant event scope ("g" = global)
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

impl ChromeTraceEvent {
    fn metadata(tid: u32, name: &str, value: JsonValue) -> Self {
        Self {
            name: name.to_string(),
            cat: String::new(),
            ph: "M".to_string(),
            ts: 0.0,
            dur: None,
            pid: PID,
            tid,
            s: None,
            args: Some(HashMap::from([("name".to_string(), value)])),
        }
    }
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Chrome trace exporter for timeline visualization
///
/// One track per visible thread with a complete event per closed section,
/// a global instant event per frame boundary, and a separate track for
/// regions.
#[derive(Debug, Default)]
pub struct ChromeTraceExporter {
    events: Vec<ChromeTraceEvent>,
    /// Sections skipped because they never closed
    open_sections: usize,
}

impl ChromeTraceExporter {
    /// Build the trace for `snapshot`. Hidden threads are left out.
    #[must_use]
    pub fn from_snapshot(snapshot: &CaptureSnapshot) -> Self {
        let mut exporter = Self::default();

        for thread in snapshot.visible_threads() {
            exporter.add_thread(thread);
        }

        // Regions get their own track after the last slot
        let region_tid = snapshot.configuration.max_threads;
        if !snapshot.regions.is_empty() {
            exporter.events.push(ChromeTraceEvent::metadata(
                region_tid,
                "thread_name",
                serde_json::json!("Regions"),
            ));
        }
        for (index, region) in snapshot.regions.iter().enumerate() {
            exporter.events.push(ChromeTraceEvent {
                name: format!("Region {index}"),
                cat: "region".to_string(),
                ph: "X".to_string(),
                ts: Timestamp(region.start_time_ns).as_micros(),
                dur: Some(Duration(region.duration_ns()).as_micros()),
                pid: PID,
                tid: region_tid,
                s: None,
                args: None,
            });
        }

        for (index, frame) in snapshot.frames.iter().enumerate() {
            let mut args = HashMap::new();
            args.insert("threads".to_string(), serde_json::json!(frame.active_threads.len()));
            if let Some(duration) = snapshot.frame_duration(index) {
                args.insert("duration_ms".to_string(), serde_json::json!(duration.as_millis()));
            }
            exporter.events.push(ChromeTraceEvent {
                name: format!("Frame {index}"),
                cat: "frame".to_string(),
                ph: "i".to_string(),
                ts: Timestamp(frame.start_time_ns).as_micros(),
                dur: None,
                pid: PID,
                tid: 0,
                s: Some("g".to_string()),
                args: Some(args),
            });
        }

        if exporter.open_sections > 0 {
            log::debug!("skipped {} sections still open at dump time", exporter.open_sections);
        }
        exporter
    }

    fn add_thread(&mut self, thread: &ThreadSnapshot) {
        let tid = thread.slot.0;
        self.events.push(ChromeTraceEvent::metadata(tid, "thread_name", serde_json::json!(thread.name)));

        for entry in &thread.entries {
            let Some(duration) = entry.duration() else {
                self.open_sections += 1;
                continue;
            };

            let mut args = HashMap::new();
            args.insert("file".to_string(), serde_json::json!(&*entry.file));
            args.insert("line".to_string(), serde_json::json!(entry.line));
            args.insert("depth".to_string(), serde_json::json!(entry.depth));
            args.insert("color".to_string(), serde_json::json!(entry.color.to_hex()));

            self.events.push(ChromeTraceEvent {
                name: entry.section.to_string(),
                cat: "section".to_string(),
                ph: "X".to_string(),
                ts: Timestamp(entry.start_time_ns).as_micros(),
                dur: Some(duration.as_micros()),
                pid: PID,
                tid,
                s: None,
                args: Some(args),
            });
        }
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Errors
    /// Returns [`ExportError::Json`] if serialization fails and
    /// [`ExportError::Io`] if the final flush does.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        let trace = ChromeTrace {
            trace_events: self.events.clone(),
            display_time_unit: "ms".to_string(),
        };
        serde_json::to_writer_pretty(&mut writer, &trace)?;
        writer.flush()?;
        Ok(())
    }

    /// Get the number of events collected
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn open_sections(&self) -> usize {
        self.open_sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::Capture;

    fn snapshot() -> CaptureSnapshot {
        let capture = Capture::new(Configuration {
            max_threads: 2,
            max_call_stack_depth: 4,
            max_entries_per_thread: 16,
            max_frames: 4,
            max_regions: 4,
        })
        .unwrap();
        capture.name_current_thread("main");
        capture.begin_frame();
        capture.enter_section("update", 0, "main.rs", 5);
        capture.leave_section();
        capture.enter_section("never_closed", 0, "main.rs", 9);
        capture.begin_region();
        capture.end_region();
        capture.snapshot().unwrap()
    }

    fn export_json(snapshot: &CaptureSnapshot) -> JsonValue {
        let mut buffer = Vec::new();
        ChromeTraceExporter::from_snapshot(snapshot).export(&mut buffer).unwrap();
        serde_json::from_slice(&buffer).unwrap()
    }

    #[test]
    fn test_exports_sections_frames_and_regions() {
        let json = export_json(&snapshot());
        let events = json["traceEvents"].as_array().unwrap();

        let sections: Vec<_> = events.iter().filter(|e| e["cat"] == "section").collect();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0]["name"], "update");
        assert_eq!(sections[0]["ph"], "X");
        assert_eq!(sections[0]["args"]["line"], 5);

        assert_eq!(events.iter().filter(|e| e["cat"] == "frame").count(), 1);
        let region = events.iter().find(|e| e["cat"] == "region").unwrap();
        assert_eq!(region["tid"], 2);
        assert_eq!(json["displayTimeUnit"], "ms");
    }

    #[test]
    fn test_thread_names_emitted() {
        let json = export_json(&snapshot());
        let names: Vec<_> = json["traceEvents"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["ph"] == "M")
            .map(|e| e["args"]["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"main".to_string()));
        assert!(names.contains(&"Regions".to_string()));
    }

    #[test]
    fn test_open_sections_counted_not_exported() {
        let exporter = ChromeTraceExporter::from_snapshot(&snapshot());
        assert_eq!(exporter.open_sections(), 1);
    }

    #[test]
    fn test_hidden_thread_not_exported() {
        let mut snapshot = snapshot();
        snapshot.threads[0].hidden = true;
        let exporter = ChromeTraceExporter::from_snapshot(&snapshot);
        // Only the frame instant, region metadata and region remain
        assert_eq!(exporter.event_count(), 3);
    }
}
