//! # framescope - Fixed-Capacity Multi-Thread Call-Stack Profiler
//!
//! framescope records named, nested, timed sections on many threads into
//! buffers sized once up front. Entry logs and call stacks never grow; only
//! the first use of each name on a thread allocates, to intern it.
//! When any buffer fills (or the host asks for a pause) the capture halts,
//! and the whole session is serialized into one self-contained blob that a
//! host can restore and browse offline.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Instrumented Application                     │
//! │   profile_scope!  profile_region!  begin_frame  name_thread     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ enter / leave (own slot only)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Capture                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │ Slot registry│──▶│ Thread slots │   │ Frame/region │         │
//! │  │ (generation) │   │ (entry logs) │   │    tables    │         │
//! │  └──────────────┘   └──────┬───────┘   └──────┬───────┘         │
//! │                            └────────┬─────────┘                 │
//! │                                     ▼ halted                    │
//! │                            ┌──────────────┐                     │
//! │                            │     Dump     │                     │
//! │                            └──────┬───────┘                     │
//! └───────────────────────────────────┼─────────────────────────────┘
//!                                     │ length-prefixed blob
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Host side                               │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Restore    │──▶│   Analysis   │   │    Export    │         │
//! │  │  (snapshot)  │──▶│  (hotspots)  │   │ (trace.json) │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Recording
//!
//! - [`capture`]: the [`Capture`] aggregate, thread slots, frames, regions,
//!   the halt state machine and the scope guards
//! - [`config`]: the five capacity limits
//! - [`color`]: packed RGBA section colors and the name-hash palette
//!
//! ### Wire
//!
//! - [`protocol`]: dump encoder, validating restore, blob transport and the
//!   producer-side [`DumpService`](protocol::DumpService)
//! - [`snapshot`]: the read-only [`CaptureSnapshot`] a restore produces
//!
//! ### Host tooling
//!
//! - [`analysis`]: self-time hotspots
//! - [`export`]: Chrome Trace Event JSON for Perfetto and `chrome://tracing`
//! - [`cli`]: command-line definitions for the `framescope` binary
//! - [`demo`]: a synthetic workload that exercises the full round trip
//!
//! - [`domain`]: newtype indices, durations and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! # Record a sample capture and look at it
//! framescope demo --output capture.bin
//! framescope inspect --framed capture.bin
//! framescope hotspots --framed capture.bin --top 10
//! framescope export --framed capture.bin -o trace.json
//! ```
//!
//! ## Key Concepts
//!
//! - **Slot**: a per-thread region of the capture with its own entry log
//! - **Generation**: session counter; a reset makes every cached slot stale
//! - **Frame**: a global tick recording each thread's log position at its start
//! - **Region**: a global begin/end interval independent of threads
//! - **Halt**: the one-way switch from recording to dumpable

pub mod analysis;
pub mod capture;
pub mod cli;
pub mod color;
pub mod config;
pub mod demo;
pub mod domain;
pub mod export;
pub mod protocol;
pub mod snapshot;

pub use capture::{
    Capture, CaptureState, FrameRecord, FrameThread, HaltReason, RegionGuard, RegionRecord,
    SectionGuard,
};
pub use color::{color_from_name, Color, LOCK_COLOR};
pub use config::Configuration;
pub use protocol::restore;
pub use snapshot::CaptureSnapshot;
