use std::fs::File;
use std::io::BufWriter;

use framescope::export::ChromeTraceExporter;
use framescope::{profile_name_thread, profile_region, profile_scope, restore, Capture, Configuration};

fn recorded_snapshot() -> framescope::CaptureSnapshot {
    let capture = Capture::new(Configuration {
        max_threads: 2,
        max_call_stack_depth: 4,
        max_entries_per_thread: 64,
        max_frames: 8,
        max_regions: 8,
    })
    .unwrap();
    profile_name_thread!(capture, "render");
    for _ in 0..2 {
        capture.begin_frame();
        profile_region!(capture);
        profile_scope!(capture, "draw");
        {
            profile_scope!(capture, "upload");
        }
    }
    capture.request_pause();
    restore(&capture.dump().unwrap()).unwrap()
}

#[test]
fn test_export_creates_valid_json() {
    let snapshot = recorded_snapshot();
    let exporter = ChromeTraceExporter::from_snapshot(&snapshot);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");
    exporter.export(BufWriter::new(File::create(&path).unwrap())).unwrap();

    let parsed: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).expect("Invalid JSON");
    assert!(parsed.get("traceEvents").is_some());
    assert_eq!(parsed["displayTimeUnit"], "ms");

    let events = parsed["traceEvents"].as_array().unwrap();
    assert_eq!(events.len(), exporter.event_count());
    assert_eq!(events.iter().filter(|e| e["name"] == "draw").count(), 2);
    assert_eq!(events.iter().filter(|e| e["name"] == "upload").count(), 2);
    assert_eq!(events.iter().filter(|e| e["cat"] == "frame").count(), 2);
    assert_eq!(events.iter().filter(|e| e["cat"] == "region").count(), 2);
    assert!(events.iter().any(|e| e["ph"] == "M" && e["args"]["name"] == "render"));
}

#[test]
fn test_nested_events_contained_in_parent() {
    let snapshot = recorded_snapshot();
    let mut buffer = Vec::new();
    ChromeTraceExporter::from_snapshot(&snapshot).export(&mut buffer).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
    let events = parsed["traceEvents"].as_array().unwrap();

    let draw = events.iter().find(|e| e["name"] == "draw").unwrap();
    let upload = events.iter().find(|e| e["name"] == "upload").unwrap();
    let (draw_ts, draw_dur) = (draw["ts"].as_f64().unwrap(), draw["dur"].as_f64().unwrap());
    let (upload_ts, upload_dur) = (upload["ts"].as_f64().unwrap(), upload["dur"].as_f64().unwrap());
    assert!(upload_ts >= draw_ts);
    assert!(upload_ts + upload_dur <= draw_ts + draw_dur + 1e-9);
    assert_eq!(upload["args"]["depth"], 1);
}
