//! # framescope - Main Entry Point
//!
//! Host-side tooling for captures:
//! - **inspect**: summary of a restored capture, as text or JSON
//! - **hotspots**: sections ranked by self time
//! - **export**: Chrome Trace Event JSON
//! - **demo**: record a synthetic workload end to end

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::time::Duration;

use framescope::analysis::analyze_hotspots;
use framescope::cli::{Args, Command, DemoArgs, InputArgs, UsageError};
use framescope::domain::{ConfigError, Timestamp};
use framescope::export::ChromeTraceExporter;
use framescope::protocol::transport::{read_blob, write_blob, DEFAULT_MAX_BLOB_SIZE};
use framescope::{demo, restore, CaptureSnapshot, Configuration};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<UsageError>() || cause.is::<ConfigError>()) {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    match args.command {
        Command::Inspect { input, json } => inspect(&input, json),
        Command::Hotspots { input, top } => hotspots(&input, top),
        Command::Export { input, output } => {
            let snapshot = load_snapshot(&input)?;
            let exporter = ChromeTraceExporter::from_snapshot(&snapshot);
            let file = File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            exporter.export(BufWriter::new(file)).context("Failed to export trace")?;
            if !quiet {
                println!("saved: {} ({} events)", output.display(), exporter.event_count());
            }
            Ok(())
        }
        Command::Demo(demo_args) => run_demo(&demo_args, quiet),
    }
}

/// Read and validate a capture file.
fn load_snapshot(input: &InputArgs) -> Result<CaptureSnapshot> {
    let path = &input.file;
    let bytes = if input.framed {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        read_blob(&mut BufReader::new(file), DEFAULT_MAX_BLOB_SIZE)
            .with_context(|| format!("Failed to read framed capture from {}", path.display()))?
    } else {
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
    };

    let snapshot = restore(&bytes).with_context(|| format!("{} is not a valid capture", path.display()))?;
    info!("restored {} entries from {}", snapshot.total_entries(), path.display());
    Ok(snapshot)
}

#[derive(Serialize)]
struct ThreadSummary<'a> {
    slot: u32,
    name: &'a str,
    in_use: bool,
    hidden: bool,
    entries: usize,
    max_depth: u32,
    open_depth: u32,
}

#[derive(Serialize)]
struct CaptureSummary<'a> {
    configuration: &'a Configuration,
    generation: u64,
    halt_reason: Option<String>,
    frames: usize,
    regions: usize,
    strings: usize,
    total_entries: usize,
    span_ms: Option<f64>,
    threads: Vec<ThreadSummary<'a>>,
}

impl<'a> CaptureSummary<'a> {
    fn new(snapshot: &'a CaptureSnapshot) -> Self {
        Self {
            configuration: &snapshot.configuration,
            generation: snapshot.generation.0,
            halt_reason: snapshot.halt_reason.map(|reason| reason.to_string()),
            frames: snapshot.frames.len(),
            regions: snapshot.regions.len(),
            strings: snapshot.strings.len(),
            total_entries: snapshot.total_entries(),
            span_ms: snapshot
                .time_span()
                .map(|(start, end)| Timestamp(end).as_millis() - Timestamp(start).as_millis()),
            threads: snapshot
                .threads
                .iter()
                .map(|t| ThreadSummary {
                    slot: t.slot.0,
                    name: &t.name,
                    in_use: t.in_use,
                    hidden: t.hidden,
                    entries: t.entries.len(),
                    max_depth: t.max_depth,
                    open_depth: t.open_depth,
                })
                .collect(),
        }
    }
}

fn inspect(input: &InputArgs, json: bool) -> Result<()> {
    let snapshot = load_snapshot(input)?;
    let summary = CaptureSummary::new(&snapshot);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &summary).context("Failed to write summary")?;
        writeln!(out)?;
        return Ok(());
    }

    let config = summary.configuration;
    writeln!(out, "generation: {}", summary.generation)?;
    writeln!(out, "halted: {}", summary.halt_reason.as_deref().unwrap_or("no"))?;
    writeln!(
        out,
        "limits: {} threads, depth {}, {} entries/thread, {} frames, {} regions",
        config.max_threads,
        config.max_call_stack_depth,
        config.max_entries_per_thread,
        config.max_frames,
        config.max_regions
    )?;
    writeln!(
        out,
        "recorded: {} entries, {} frames, {} regions, {} strings",
        summary.total_entries, summary.frames, summary.regions, summary.strings
    )?;
    if let Some(span) = summary.span_ms {
        writeln!(out, "span: {span:.3}ms")?;
    }

    writeln!(out)?;
    writeln!(out, "{:>5}  {:<24} {:>9} {:>6} {:>5}  flags", "slot", "name", "entries", "depth", "open")?;
    for thread in &summary.threads {
        let mut flags = Vec::new();
        if !thread.in_use {
            flags.push("released");
        }
        if thread.hidden {
            flags.push("hidden");
        }
        writeln!(
            out,
            "{:>5}  {:<24} {:>9} {:>6} {:>5}  {}",
            thread.slot,
            thread.name,
            thread.entries,
            thread.max_depth,
            thread.open_depth,
            flags.join(",")
        )?;
    }
    Ok(())
}

fn hotspots(input: &InputArgs, top: usize) -> Result<()> {
    if top == 0 {
        return Err(UsageError("--top must be at least 1".to_string()).into());
    }
    let snapshot = load_snapshot(input)?;
    let hotspots = analyze_hotspots(&snapshot);

    if hotspots.is_empty() {
        println!("no closed sections in capture");
        return Ok(());
    }

    println!(
        "{:>7}  {:>12}  {:>12}  {:>10}  {:>7}  section",
        "self%", "self", "total", "mean", "count"
    );
    for hotspot in hotspots.iter().take(top) {
        println!(
            "{:>6.2}%  {:>12}  {:>12}  {:>10}  {:>7}  {} ({}:{})",
            hotspot.percentage,
            hotspot.self_time.to_string(),
            hotspot.total.to_string(),
            hotspot.mean().to_string(),
            hotspot.count,
            hotspot.name,
            hotspot.file,
            hotspot.line
        );
    }
    if hotspots.len() > top {
        println!("... {} more", hotspots.len() - top);
    }
    Ok(())
}

fn run_demo(args: &DemoArgs, quiet: bool) -> Result<()> {
    if args.workers == 0 {
        return Err(UsageError("--workers must be at least 1".to_string()).into());
    }
    if args.workers >= args.max_threads {
        return Err(UsageError(format!(
            "--max-threads ({}) must leave a slot for the frame thread next to {} workers",
            args.max_threads, args.workers
        ))
        .into());
    }

    let config = args.configuration();
    config.validate()?;
    if !quiet {
        println!("framescope v{}", env!("CARGO_PKG_VERSION"));
        println!("recording: {} workers", args.workers);
    }

    let blob = demo::record(config, args.workers, Duration::from_millis(args.timeout_ms))?;

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    write_blob(&mut writer, &blob).context("Failed to write capture")?;
    writer.flush()?;

    if !quiet {
        println!("saved: {} ({} bytes)", args.output.display(), blob.len());
    }
    Ok(())
}
