//! Instrumented frame loop - records until a buffer fills, then restores the
//! capture in-process and prints the top sections.
//!
//! Run with: cargo run --example instrumented_loop

use std::sync::Arc;
use std::thread;

use framescope::analysis::analyze_hotspots;
use framescope::{profile_name_thread, profile_region, profile_scope, restore, Capture, Configuration};

fn simulate(capture: &Capture, bodies: &mut [f64]) {
    profile_scope!(capture, "simulate");
    for body in bodies.iter_mut() {
        profile_scope!(capture, "integrate");
        *body = (*body * 1.0001).sin().abs();
    }
}

fn render(capture: &Capture, bodies: &[f64]) -> f64 {
    profile_scope!(capture, "render");
    bodies.iter().sum()
}

fn main() {
    env_logger::init();

    let capture = Arc::new(
        Capture::new(Configuration {
            max_threads: 4,
            max_call_stack_depth: 8,
            max_entries_per_thread: 5_000,
            max_frames: 200,
            max_regions: 200,
        })
        .expect("valid configuration"),
    );

    let audio = {
        let capture = Arc::clone(&capture);
        thread::spawn(move || {
            profile_name_thread!(capture, "audio");
            let mut phase = 0.0f64;
            while !capture.is_halted() {
                profile_scope!(capture, "mix_block");
                phase = (phase + 0.01) % 1.0;
                std::hint::black_box(phase);
            }
        })
    };

    profile_name_thread!(capture, "main");
    let mut bodies = vec![0.5; 16];
    while !capture.is_halted() {
        capture.begin_frame();
        profile_region!(capture);
        simulate(&capture, &mut bodies);
        std::hint::black_box(render(&capture, &bodies));
        capture.end_frame();
    }
    audio.join().expect("audio thread");

    println!("halted: {}", capture.halt_reason().map_or("no".into(), |r| r.to_string()));
    let blob = capture.dump().expect("halted capture dumps once");
    let snapshot = restore(&blob).expect("blob restores");
    println!("{} bytes, {} entries, {} frames", blob.len(), snapshot.total_entries(), snapshot.frames.len());

    for hotspot in analyze_hotspots(&snapshot).iter().take(5) {
        println!("{:>6.2}%  {:>8} calls  {}", hotspot.percentage, hotspot.count, hotspot.name);
    }
}
