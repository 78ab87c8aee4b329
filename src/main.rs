//! hoststat - a host telemetry collector.
//!
//! Samples CPU, GPU, memory, disk, network, and process state once per
//! period and emits one JSON snapshot per tick on stdout, for dashboards or
//! log pipelines that poll or tail the output.

mod error;
mod export;
mod logging;
mod orchestrator;
mod probes;
mod rate;
mod registry;
mod snapshot;

use anyhow::{Context, Result};
use clap::Parser;
use logging::SnapshotLogger;
use orchestrator::{SnapshotOrchestrator, DEFAULT_TOP_PROCESSES};
use registry::CpuBasis;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Host telemetry collector emitting periodic JSON snapshots
#[derive(Parser, Debug)]
#[command(name = "hoststat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sampling interval in seconds
    #[arg(short = 'i', long, default_value = "1")]
    interval: f64,

    /// Number of top processes to include per snapshot
    #[arg(short = 't', long, default_value_t = DEFAULT_TOP_PROCESSES)]
    top: usize,

    /// Normalize per-process CPU% against all logical cores instead of one
    #[arg(long)]
    per_host_cpu: bool,

    /// Append timestamped snapshots to a JSON Lines file
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Run for the specified duration (seconds), then exit
    #[arg(short, long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let basis = if args.per_host_cpu {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        CpuBasis::AllCores(cores)
    } else {
        CpuBasis::SingleCore
    };

    let mut orchestrator = SnapshotOrchestrator::new(args.top, basis);
    orchestrator
        .initialize()
        .context("failed to initialize system probes")?;

    let mut logger = match args.log {
        Some(ref path) => Some(SnapshotLogger::new(path)?),
        None => None,
    };

    let period = Duration::from_secs_f64(args.interval.max(0.1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first interval tick completes immediately; use it as a warm-up
    // sample so the first emitted snapshot carries real rates instead of
    // first-observation zeros.
    ticker.tick().await;
    orchestrator.tick(Instant::now());

    let started = Instant::now();
    loop {
        ticker.tick().await;

        let snapshot = orchestrator.tick(Instant::now());
        println!("{}", export::to_json(&snapshot)?);

        if let Some(ref mut logger) = logger {
            if let Err(e) = logger.log(&snapshot) {
                eprintln!("snapshot log error: {e:#}");
            }
        }

        if let Some(limit) = args.duration {
            if snapshot.timestamp.saturating_duration_since(started) >= Duration::from_secs(limit) {
                break;
            }
        }
    }

    Ok(())
}
