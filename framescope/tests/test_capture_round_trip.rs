use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use framescope::domain::{EntryIndex, RestoreError};
use framescope::{profile_name_thread, profile_region, profile_scope, restore, Capture, Configuration, HaltReason};

fn config(threads: u32, entries: u32, frames: u32, regions: u32) -> Configuration {
    Configuration {
        max_threads: threads,
        max_call_stack_depth: 8,
        max_entries_per_thread: entries,
        max_frames: frames,
        max_regions: regions,
    }
}

fn record_nested(capture: &Capture, outer: usize, inner: usize) {
    for _ in 0..outer {
        profile_scope!(capture, "outer");
        for _ in 0..inner {
            profile_scope!(capture, "inner");
        }
    }
}

#[test]
fn test_threads_record_independent_logs() {
    let capture = Arc::new(Capture::new(config(4, 1000, 16, 16)).unwrap());
    let barrier = Arc::new(Barrier::new(3));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let capture = Arc::clone(&capture);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                profile_name_thread!(capture, &format!("worker-{i}"));
                barrier.wait();
                record_nested(&capture, 10, 3);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    capture.request_pause();

    let snapshot = restore(&capture.dump().unwrap()).unwrap();
    assert_eq!(snapshot.halt_reason, Some(HaltReason::PauseRequested));
    assert_eq!(snapshot.threads.len(), 3);

    let names: BTreeSet<_> = snapshot.threads.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, BTreeSet::from(["worker-0", "worker-1", "worker-2"]));

    for thread in &snapshot.threads {
        assert_eq!(thread.entries.len(), 40);
        assert_eq!(thread.open_depth, 0);
        assert_eq!(thread.max_depth, 2);

        let mut current_outer = None;
        for (index, entry) in (0u32..).zip(&thread.entries) {
            assert!(!entry.is_open());
            assert!(entry.start_time_ns <= entry.end_time_ns);
            if &*entry.section == "outer" {
                assert_eq!(entry.parent, None);
                assert_eq!(entry.depth, 0);
                current_outer = Some(EntryIndex(index));
            } else {
                assert_eq!(&*entry.section, "inner");
                assert_eq!(entry.parent, current_outer);
                assert_eq!(entry.depth, 1);
            }
        }
    }
}

#[test]
fn test_frames_slice_each_thread_log() {
    let capture = Capture::new(config(2, 1000, 16, 16)).unwrap();
    for _ in 0..3 {
        capture.begin_frame();
        profile_region!(capture);
        record_nested(&capture, 2, 1);
        capture.end_frame();
    }
    capture.request_pause();

    let snapshot = restore(&capture.dump().unwrap()).unwrap();
    assert_eq!(snapshot.frames.len(), 3);
    assert_eq!(snapshot.regions.len(), 3);

    let slot = snapshot.threads[0].slot;
    // The thread joined inside the first frame
    assert_eq!(snapshot.frames[0].position_of(slot), Some(0));
    assert_eq!(snapshot.frames[1].position_of(slot), Some(4));
    assert_eq!(snapshot.frames[2].position_of(slot), Some(8));
    for frame in 0..3 {
        let entries = snapshot.frame_entries(frame, slot);
        assert_eq!(entries.len(), 4);
        assert_eq!(&*entries[0].section, "outer");
    }
    assert!(snapshot.frame_duration(0).is_some());
    assert!(snapshot.frame_duration(2).is_none(), "last frame is still open");
}

#[test]
fn test_handed_over_slot_round_trips_with_frames() {
    let capture = Arc::new(Capture::new(config(1, 100, 16, 16)).unwrap());

    let first = Arc::clone(&capture);
    thread::spawn(move || {
        profile_name_thread!(first, "loader");
        first.begin_frame();
        record_nested(&first, 2, 2);
        first.begin_frame();
        record_nested(&first, 1, 0);
        first.release_current_thread();
    })
    .join()
    .unwrap();

    let second = Arc::clone(&capture);
    thread::spawn(move || {
        record_nested(&second, 1, 1);
        second.begin_frame();
        record_nested(&second, 1, 2);
    })
    .join()
    .unwrap();
    capture.request_pause();

    let snapshot = restore(&capture.dump().unwrap()).unwrap();
    assert_eq!(snapshot.frames.len(), 3);
    let thread = &snapshot.threads[0];
    assert_eq!(thread.entries.len(), 5, "only the second owner's entries remain");
    assert!(thread.in_use);

    let slot = thread.slot;
    assert_eq!(snapshot.frames[0].position_of(slot), None);
    assert_eq!(snapshot.frames[1].position_of(slot), Some(0));
    assert_eq!(snapshot.frames[2].position_of(slot), Some(2));
    for frame in &snapshot.frames {
        for active in &frame.active_threads {
            assert!(active.write_pos as usize <= thread.entries.len());
        }
    }
    assert_eq!(snapshot.frame_entries(1, slot).len(), 2);
    assert_eq!(snapshot.frame_entries(2, slot).len(), 3);
}

#[test]
fn test_entry_limit_halts_every_thread() {
    let capture = Arc::new(Capture::new(config(2, 5, 16, 16)).unwrap());
    record_nested(&capture, 1, 4);
    assert_eq!(capture.halt_reason(), Some(HaltReason::EntriesFull));

    let other = Arc::clone(&capture);
    thread::spawn(move || record_nested(&other, 3, 3)).join().unwrap();

    let snapshot = restore(&capture.dump().unwrap()).unwrap();
    assert_eq!(snapshot.threads.len(), 1);
    assert_eq!(snapshot.threads[0].entries.len(), 5);
}

#[test]
fn test_open_sections_survive_dump() {
    let capture = Capture::new(config(1, 100, 4, 4)).unwrap();
    capture.enter_section("still_running", 0, "main.rs", 10);
    capture.enter_section("nested", 0, "main.rs", 11);
    capture.request_pause();

    let snapshot = restore(&capture.dump().unwrap()).unwrap();
    let thread = &snapshot.threads[0];
    assert_eq!(thread.open_depth, 2);
    assert!(thread.entries.iter().all(|e| e.is_open() && e.duration().is_none()));
    assert_eq!(thread.entries[1].parent, Some(EntryIndex(0)));
}

#[test]
fn test_reset_starts_a_new_session() {
    let capture = Capture::new(config(1, 100, 4, 4)).unwrap();
    record_nested(&capture, 2, 2);
    capture.request_pause();
    let first = restore(&capture.dump().unwrap()).unwrap();

    capture.reset();
    assert!(!capture.is_halted());
    record_nested(&capture, 1, 0);
    capture.request_pause();
    let second = restore(&capture.dump().unwrap()).unwrap();

    assert!(second.generation > first.generation);
    assert_eq!(first.total_entries(), 6);
    assert_eq!(second.total_entries(), 1);
}

#[test]
fn test_strings_shared_across_threads() {
    let capture = Arc::new(Capture::new(config(3, 100, 4, 4)).unwrap());
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let capture = Arc::clone(&capture);
            thread::spawn(move || record_nested(&capture, 1, 1))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    capture.request_pause();

    let snapshot = restore(&capture.dump().unwrap()).unwrap();
    // "outer", "inner" and this file, once each
    assert_eq!(snapshot.strings.len(), 3);
    let ids: BTreeSet<_> = snapshot
        .threads
        .iter()
        .map(|t| (t.entries[0].section_id, t.entries[1].section_id))
        .collect();
    assert_eq!(ids.len(), 1, "same names map to the same ids on every thread");
}

#[test]
fn test_corrupted_blobs_are_rejected() {
    let capture = Capture::new(config(1, 100, 4, 4)).unwrap();
    record_nested(&capture, 2, 2);
    capture.request_pause();
    let blob = capture.dump().unwrap();

    let mut bad_magic = blob.clone();
    bad_magic[0] ^= 0xFF;
    assert!(matches!(restore(&bad_magic), Err(RestoreError::BadMagic(_))));

    let truncated = &blob[..blob.len() - 1];
    assert!(restore(truncated).is_err());

    let mut extended = blob.clone();
    extended.push(0);
    assert!(matches!(restore(&extended), Err(RestoreError::TrailingBytes(1))));

    assert!(restore(&blob).is_ok());
}
