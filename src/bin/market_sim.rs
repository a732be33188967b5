//! Command-line front end for the simulation engine.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mktsim::{open_sink, SimConfig, Simulator};

#[derive(Parser, Debug)]
#[command(
    name = "market_sim",
    about = "Synthetic limit-order-book event stream generator"
)]
struct Cli {
    /// Total events across all workers
    #[arg(long, default_value_t = 100_000)]
    events: u64,

    /// Comma-separated symbol list (default AAPL,MSFT,GOOG)
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Arena bytes per assigned symbol
    #[arg(long, default_value_t = 2 << 20)]
    arena_bytes: usize,

    /// Gaussian sigma as a fraction of the mid price
    #[arg(long, default_value_t = 0.001)]
    sigma: f64,

    /// Volatility drift amplitude (0 disables drift)
    #[arg(long, default_value_t = 0.0)]
    drift_ampl: f64,

    /// Drift period in events
    #[arg(long, default_value_t = 10_000)]
    drift_period: u64,

    /// Price tick size
    #[arg(long, default_value_t = 0.01)]
    tick_size: f64,

    /// Worker threads (clamped to the symbol count and hardware)
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Append-only binary event log path (omit to discard events)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Use realtime monotonic timestamps instead of synthetic ones
    #[arg(long)]
    realtime_ts: bool,

    /// Print per-worker arena telemetry after the run
    #[arg(long)]
    print_arena: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let sink = open_sink(cli.log.as_deref())
        .with_context(|| format!("opening event log {:?}", cli.log))?;

    let sim = Simulator::new(SimConfig {
        total_events: cli.events,
        seed: cli.seed,
        symbols: cli.symbols,
        arena_bytes: cli.arena_bytes,
        sigma: cli.sigma,
        drift_ampl: cli.drift_ampl,
        drift_period: cli.drift_period,
        tick_size: cli.tick_size,
        num_threads: cli.threads,
        realtime_ts: cli.realtime_ts,
    });

    let report = sim.run(sink.as_ref());
    println!("{report}");

    if cli.print_arena {
        println!("Arena usage (bytes requested per worker):");
        for w in &report.workers {
            println!("  worker-{}: {} bytes", w.worker, w.arena_bytes_requested);
        }
    }

    anyhow::ensure!(report.flush_ok, "event sink failed to flush");
    Ok(())
}
