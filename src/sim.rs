//! Sharded, share-nothing simulation driver.
//!
//! Symbols are partitioned contiguously across worker threads; each worker
//! owns its arena, books, RNG, live-order lists and id counter outright, so
//! the hot loop takes no locks and touches no shared state except the sink.
//! Workers pin themselves to distinct logical CPUs (best effort) so arena
//! pages stay NUMA-local and caches stay warm.
//!
//! Order ids embed the worker index in the top byte and timestamps embed it
//! in the top 16 bits, which keeps both unique across threads without a
//! shared counter and makes single-thread replays byte-identical.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::arena::Arena;
use crate::event::{Event, EventKind, Side};
use crate::order_book::{Order, OrderBook};
use crate::rng::{Gaussian, Xoroshiro128Plus};
use crate::sink::EventSink;

/// Simulation parameters. `arena_bytes` is per assigned symbol; each worker
/// sizes its region as `arena_bytes × local_symbols`.
#[derive(Clone, Debug)]
pub struct SimConfig {
    pub total_events: u64,
    pub seed: u64,
    pub symbols: Vec<String>,
    pub arena_bytes: usize,
    /// Base price sigma as a fraction of the mid.
    pub sigma: f64,
    /// Sinusoidal volatility drift amplitude; 0.0 disables drift.
    pub drift_ampl: f64,
    /// Drift period in events.
    pub drift_period: u64,
    pub tick_size: f64,
    pub num_threads: usize,
    /// false: deterministic synthetic timestamps (fast).
    /// true: monotonic nanosecond timestamps (slower, not replayable).
    pub realtime_ts: bool,
}

impl SimConfig {
    pub fn default_symbols() -> Vec<String> {
        vec!["AAPL".to_owned(), "MSFT".to_owned(), "GOOG".to_owned()]
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            total_events: 100_000,
            seed: 42,
            symbols: Vec::new(),
            arena_bytes: 2 << 20,
            sigma: 0.001,
            drift_ampl: 0.0,
            drift_period: 10_000,
            tick_size: 0.01,
            num_threads: 1,
            realtime_ts: false,
        }
    }
}

/// Per-worker counters, reported after the run.
#[derive(Clone, Debug)]
pub struct WorkerStats {
    pub worker: usize,
    pub symbols: usize,
    pub adds: u64,
    pub cancels: u64,
    pub trades: u64,
    /// Arena telemetry: bytes ever requested from this worker's region.
    pub arena_bytes_requested: usize,
    pub elapsed: Duration,
}

/// Aggregate results of one simulation run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub workers: Vec<WorkerStats>,
    pub total_events: u64,
    pub adds: u64,
    pub cancels: u64,
    pub trades: u64,
    pub elapsed: Duration,
    pub flush_ok: bool,
}

impl RunReport {
    pub fn events_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_events as f64 / secs
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Per-Worker Summary")?;
        writeln!(f, "-------------------------------")?;
        for w in &self.workers {
            writeln!(
                f,
                "[worker {}] symbols={} adds={} cancels={} trades={} time={:.3} ms",
                w.worker,
                w.symbols,
                w.adds,
                w.cancels,
                w.trades,
                w.elapsed.as_secs_f64() * 1e3
            )?;
        }
        writeln!(f, "-------------------------------")?;
        writeln!(f, "Workers:       {}", self.workers.len())?;
        writeln!(f, "Total events:  {}", self.total_events)?;
        writeln!(f, "Adds:          {}", self.adds)?;
        writeln!(f, "Cancels:       {}", self.cancels)?;
        writeln!(f, "Trades:        {}", self.trades)?;
        writeln!(f, "Elapsed:       {:.3} ms", self.elapsed.as_secs_f64() * 1e3)?;
        write!(f, "Throughput:    {} ev/s", self.events_per_sec() as u64)
    }
}

/// The simulation driver. Construct with a config, then `run` against a
/// sink; the driver joins all workers and flushes the sink exactly once.
pub struct Simulator {
    cfg: SimConfig,
}

impl Simulator {
    pub fn new(mut cfg: SimConfig) -> Self {
        if cfg.symbols.is_empty() {
            cfg.symbols = SimConfig::default_symbols();
        }
        Self { cfg }
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn run(&self, sink: &dyn EventSink) -> RunReport {
        let cfg = &self.cfg;
        let n_symbols = cfg.symbols.len();
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let threads = cfg.num_threads.max(1).min(n_symbols).min(hardware);

        // Contiguous partition; the last worker absorbs both remainders.
        let base_symbols = n_symbols / threads;
        let base_events = cfg.total_events / threads as u64;
        let core_ids = core_affinity::get_core_ids().unwrap_or_default();

        let epoch = Instant::now();
        let mut workers = Vec::with_capacity(threads);
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(threads);
            let mut offset = 0;
            for w in 0..threads {
                let count = if w == threads - 1 {
                    n_symbols - offset
                } else {
                    base_symbols
                };
                let shard = &cfg.symbols[offset..offset + count];
                offset += count;
                let iters = base_events
                    + if w == threads - 1 {
                        cfg.total_events % threads as u64
                    } else {
                        0
                    };
                let core = core_ids.get(w).copied();
                handles.push(
                    scope.spawn(move || worker_run(cfg, w, shard, iters, core, epoch, sink)),
                );
            }
            for handle in handles {
                workers.push(handle.join().expect("simulation worker panicked"));
            }
        });
        let elapsed = epoch.elapsed();

        let flush_ok = match sink.flush() {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "sink flush failed");
                false
            }
        };

        let report = RunReport {
            total_events: cfg.total_events,
            adds: workers.iter().map(|w| w.adds).sum(),
            cancels: workers.iter().map(|w| w.cancels).sum(),
            trades: workers.iter().map(|w| w.trades).sum(),
            workers,
            elapsed,
            flush_ok,
        };
        info!(
            events = report.total_events,
            elapsed_ms = report.elapsed.as_secs_f64() * 1e3,
            throughput = report.events_per_sec() as u64,
            "simulation complete"
        );
        report
    }
}

fn effective_sigma(cfg: &SimConfig, i: u64) -> f64 {
    let mut sigma = cfg.sigma;
    if cfg.drift_ampl > 0.0 && cfg.drift_period > 0 {
        let phase = (i % cfg.drift_period) as f64 / cfg.drift_period as f64;
        sigma *= 1.0 + cfg.drift_ampl * (phase * std::f64::consts::TAU).sin();
    }
    sigma
}

fn worker_run(
    cfg: &SimConfig,
    w: usize,
    symbols: &[String],
    iters: u64,
    core: Option<core_affinity::CoreId>,
    epoch: Instant,
    sink: &dyn EventSink,
) -> WorkerStats {
    match core {
        Some(id) => {
            if !core_affinity::set_for_current(id) {
                warn!(worker = w, core = id.id, "failed to pin worker; continuing unpinned");
            }
        }
        None => warn!(worker = w, "no core available for pinning; continuing unpinned"),
    }

    let arena = Arena::new(
        format!("worker-{w}"),
        cfg.arena_bytes * symbols.len(),
    );
    let mut books: Vec<OrderBook<'_>> = symbols
        .iter()
        .map(|s| OrderBook::new(s.clone(), &arena, cfg.tick_size))
        .collect();
    let mut mids = vec![100.0_f64; symbols.len()];
    let mut live: Vec<Vec<u64>> = vec![Vec::new(); symbols.len()];

    let mut rng = Xoroshiro128Plus::seed_from_u64(cfg.seed.wrapping_add(w as u64));
    let mut gauss = Gaussian::new();

    let mut adds = 0u64;
    let mut cancels = 0u64;
    let mut trades = 0u64;
    let mut local_id = 1u64;

    let started = Instant::now();
    for i in 0..iters {
        let si = rng.uniform_index(symbols.len());
        let ts = if cfg.realtime_ts {
            epoch.elapsed().as_nanos() as u64
        } else {
            ((w as u64) << 48) | i
        };

        let do_add = rng.uniform_bool(0.5);
        if do_add || live[si].is_empty() {
            let side = if rng.uniform_bool(0.5) { Side::Buy } else { Side::Sell };
            let sigma = effective_sigma(cfg, i);
            let price = gauss.sample(&mut rng, mids[si], mids[si] * sigma);
            let qty = rng.uniform_int(1, 100);

            let id = ((w as u64) << 56) | local_id;
            local_id += 1;

            let (filled, trade_price) =
                books[si].add_order(Order { id, price, qty, side, ts_ns: ts });

            match trade_price {
                Some(px) => {
                    sink.write(&Event {
                        ts_ns: ts,
                        kind: EventKind::Trade,
                        symbol: symbols[si].clone(),
                        price: px,
                        qty: filled,
                        side,
                    });
                    trades += 1;
                }
                None => {
                    sink.write(&Event {
                        ts_ns: ts,
                        kind: EventKind::OrderAdd,
                        symbol: symbols[si].clone(),
                        price,
                        qty,
                        side,
                    });
                    adds += 1;
                }
            }

            // Anything not fully filled is resting and cancellable later.
            if filled < qty {
                live[si].push(id);
            }

            let book = &books[si];
            mids[si] = match (book.best_bid(), book.best_ask()) {
                (Some(bid), Some(ask)) => (bid + ask) * 0.5,
                (Some(bid), None) => bid,
                (None, Some(ask)) => ask,
                (None, None) => mids[si],
            };
        } else {
            // The victim is claimed regardless of outcome; a failed cancel
            // means the id was already filled and its entry was stale.
            let li = rng.uniform_index(live[si].len());
            let victim = live[si].swap_remove(li);
            if books[si].cancel_order(victim) {
                sink.write(&Event {
                    ts_ns: ts,
                    kind: EventKind::OrderCancel,
                    symbol: symbols[si].clone(),
                    price: 0.0,
                    qty: 0,
                    side: Side::Buy,
                });
                cancels += 1;
            }
        }
    }

    WorkerStats {
        worker: w,
        symbols: symbols.len(),
        adds,
        cancels,
        trades,
        arena_bytes_requested: arena.bytes_requested(),
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, NullSink};

    #[test]
    fn test_default_symbols_filled_in() {
        let sim = Simulator::new(SimConfig { symbols: Vec::new(), ..Default::default() });
        assert_eq!(sim.config().symbols, SimConfig::default_symbols());
    }

    #[test]
    fn test_small_run_counts_match_stream() {
        let sink = MemorySink::new();
        let sim = Simulator::new(SimConfig {
            total_events: 10_000,
            symbols: vec!["AAA".to_owned(), "BBB".to_owned()],
            ..Default::default()
        });
        let report = sim.run(&sink);

        assert!(report.flush_ok);
        assert_eq!(report.total_events, 10_000);
        let emitted = report.adds + report.cancels + report.trades;
        assert!(emitted <= 10_000);
        assert!(report.adds > 0 && report.trades > 0);

        let events = sink.events();
        assert_eq!(events.len() as u64, emitted);
        let trade_count = events
            .iter()
            .filter(|e| e.kind == EventKind::Trade)
            .count() as u64;
        assert_eq!(trade_count, report.trades);
    }

    #[test]
    fn test_thread_count_clamped_to_symbols() {
        let sim = Simulator::new(SimConfig {
            total_events: 1_000,
            num_threads: 64,
            symbols: vec!["AAA".to_owned(), "BBB".to_owned(), "CCC".to_owned()],
            ..Default::default()
        });
        let report = sim.run(&NullSink);
        assert!(report.workers.len() <= 3);
        assert!(!report.workers.is_empty());
        // Every symbol is assigned somewhere and every event is processed.
        assert_eq!(report.workers.iter().map(|w| w.symbols).sum::<usize>(), 3);
        let per_worker: u64 = report
            .workers
            .iter()
            .map(|w| w.adds + w.cancels + w.trades)
            .sum();
        assert!(per_worker <= 1_000);
    }

    #[test]
    fn test_arena_telemetry_reported() {
        let sim = Simulator::new(SimConfig {
            total_events: 1_000,
            symbols: vec!["AAA".to_owned()],
            ..Default::default()
        });
        let report = sim.run(&NullSink);
        assert!(report.workers[0].arena_bytes_requested > 0);
    }

    #[test]
    fn test_drift_changes_stream() {
        let base = SimConfig {
            total_events: 20_000,
            symbols: vec!["AAA".to_owned()],
            ..Default::default()
        };

        let sink_a = MemorySink::new();
        Simulator::new(base.clone()).run(&sink_a);

        let sink_b = MemorySink::new();
        Simulator::new(SimConfig { drift_ampl: 0.5, drift_period: 1_000, ..base }).run(&sink_b);

        assert_ne!(sink_a.bytes(), sink_b.bytes());
    }
}
