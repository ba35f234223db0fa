//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Configuration;

#[derive(Parser)]
#[command(
    name = "framescope",
    about = "Inspect, analyze and export fixed-capacity profiler captures",
    after_help = "\
EXAMPLES:
    framescope demo --output capture.bin             Record a sample capture
    framescope inspect --framed capture.bin          Summarize a capture
    framescope hotspots --framed capture.bin --top 10
    framescope export --framed capture.bin -o trace.json"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a summary of a capture
    Inspect {
        #[command(flatten)]
        input: InputArgs,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank sections by self time
    Hotspots {
        #[command(flatten)]
        input: InputArgs,

        /// Show the N sections with the most self time
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Convert a capture to Chrome Trace Event JSON (Perfetto, chrome://tracing)
    Export {
        #[command(flatten)]
        input: InputArgs,

        /// Trace file to write
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Record an instrumented multi-thread workload until the capture fills
    Demo(DemoArgs),
}

#[derive(clap::Args)]
pub struct InputArgs {
    /// Capture file to read
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// File holds a length-prefixed blob as sent over the transport
    #[arg(long)]
    pub framed: bool,
}

#[derive(clap::Args)]
pub struct DemoArgs {
    /// Where to write the length-prefixed capture
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Worker threads to spawn next to the frame thread
    #[arg(long, default_value = "3")]
    pub workers: u32,

    /// Request a pause if the capture has not filled after this long
    #[arg(long, default_value = "5000", value_name = "MS")]
    pub timeout_ms: u64,

    #[arg(long, default_value = "8")]
    pub max_threads: u32,

    #[arg(long, default_value = "20")]
    pub max_call_stack_depth: u32,

    #[arg(long, default_value = "20000")]
    pub max_entries_per_thread: u32,

    #[arg(long, default_value = "500")]
    pub max_frames: u32,

    #[arg(long, default_value = "500")]
    pub max_regions: u32,
}

impl DemoArgs {
    #[must_use]
    pub fn configuration(&self) -> Configuration {
        Configuration {
            max_threads: self.max_threads,
            max_call_stack_depth: self.max_call_stack_depth,
            max_entries_per_thread: self.max_entries_per_thread,
            max_frames: self.max_frames,
            max_regions: self.max_regions,
        }
    }
}

/// Bad arguments that clap cannot catch on its own; exits with the usage code
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct UsageError(pub String);
