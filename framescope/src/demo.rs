//! Synthetic instrumented workload
//!
//! Plays both ends of the vendor link in one process: the host requests a
//! dump over one [`byte_channel`], the producer runs a frame thread plus
//! workers until the capture halts, and its [`DumpService`] ships the blob
//! back over a second channel.

use std::hint::black_box;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::capture::Capture;
use crate::config::Configuration;
use crate::protocol::transport::{byte_channel, read_blob, request_dump, DumpService, DEFAULT_MAX_BLOB_SIZE};
use crate::{profile_name_thread, profile_region, profile_scope};

const BLOCK_LEN: usize = 64;
const FRAME_PERIOD: Duration = Duration::from_micros(500);

fn filter(block: &mut [f32; BLOCK_LEN], capture: &Capture) {
    profile_scope!(capture, "filter");
    let mut previous = 0.0;
    for sample in block.iter_mut() {
        *sample = 0.75 * *sample + 0.25 * previous;
        previous = *sample;
    }
}

fn mix(block: &[f32; BLOCK_LEN], capture: &Capture) -> f32 {
    profile_scope!(capture, "mix");
    block.iter().map(|s| s * 0.5).sum()
}

/// One unit of worker activity: a few nested sections over a small buffer
fn process_block(capture: &Capture, seed: u32) -> f32 {
    profile_scope!(capture, "process_block");
    #[allow(clippy::cast_precision_loss)]
    let mut block = [seed as f32; BLOCK_LEN];
    filter(&mut block, capture);
    if seed % 4 == 0 {
        let _lock = capture.lock_profiled(&SHARED_STATE, "shared_state_lock");
    }
    mix(&block, capture)
}

static SHARED_STATE: parking_lot::Mutex<()> = parking_lot::const_mutex(());

fn worker(capture: &Capture, index: u32) {
    profile_name_thread!(capture, &format!("worker-{index}"));
    let mut seed = index;
    while !capture.is_halted() {
        black_box(process_block(capture, seed));
        seed = seed.wrapping_add(1);
        thread::yield_now();
    }
    capture.release_current_thread();
}

/// Drive frames from the calling thread until the capture halts or `timeout`
/// passes, with `workers` threads recording alongside.
pub fn run_workload(capture: &Arc<Capture>, workers: u32, timeout: Duration) {
    profile_name_thread!(capture, "frame");
    let handles: Vec<_> = (0..workers)
        .map(|index| {
            let capture = Arc::clone(capture);
            thread::spawn(move || worker(&capture, index))
        })
        .collect();

    let deadline = Instant::now() + timeout;
    while !capture.is_halted() {
        if Instant::now() >= deadline {
            log::warn!("capture did not fill within {timeout:?}, pausing");
            capture.request_pause();
            break;
        }
        capture.begin_frame();
        {
            profile_region!(capture);
            profile_scope!(capture, "dispatch");
            thread::sleep(FRAME_PERIOD);
        }
        capture.end_frame();
    }

    for handle in handles {
        if handle.join().is_err() {
            log::warn!("demo worker panicked");
        }
    }
    capture.release_current_thread();
}

/// Record one capture with `config` and return the blob as the host received it.
///
/// # Errors
/// Fails if the configuration is invalid or the in-process link breaks.
pub fn record(config: Configuration, workers: u32, timeout: Duration) -> Result<Vec<u8>> {
    let capture = Arc::new(Capture::new(config).context("invalid demo configuration")?);
    let service = DumpService::new(Arc::clone(&capture));

    let (mut host_commands, mut device_commands) = byte_channel();
    let (mut device_bulk, mut host_bulk) = byte_channel();

    request_dump(&mut host_commands).context("failed to send dump request")?;
    let mut command = [0u8; 1];
    device_commands.read_exact(&mut command).context("failed to read dump request")?;
    service.handle_command(command[0]);

    run_workload(&capture, workers, timeout);

    if !service.poll(&mut device_bulk).context("failed to ship capture")? {
        anyhow::bail!("capture was not ready to ship");
    }
    drop(device_bulk);

    let blob = read_blob(&mut host_bulk, DEFAULT_MAX_BLOB_SIZE).context("failed to receive capture")?;
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::restore;

    #[test]
    fn test_record_fills_and_restores() {
        let config = Configuration {
            max_threads: 4,
            max_call_stack_depth: 8,
            max_entries_per_thread: 2_000,
            max_frames: 50,
            max_regions: 50,
        };
        let blob = record(config, 2, Duration::from_secs(10)).unwrap();
        let snapshot = restore(&blob).unwrap();

        assert!(snapshot.halt_reason.is_some());
        assert!(snapshot.total_entries() > 0);
        assert!(snapshot.threads.iter().any(|t| t.name.starts_with("worker-")));
        for thread in &snapshot.threads {
            assert!(thread.entries.len() <= 2_000);
        }
    }
}
