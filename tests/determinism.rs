//! Replay determinism: identical configurations must produce identical
//! event streams.
//!
//! With one worker the framed byte stream is compared verbatim. With more
//! workers the streams interleave through the shared sink in arrival order,
//! so events are compared after sorting on their synthetic timestamps,
//! which are unique per worker-iteration.

use mktsim::{Event, MemorySink, SimConfig, Simulator};

fn base_config() -> SimConfig {
    SimConfig {
        total_events: 50_000,
        seed: 0xDEAD_BEEF,
        symbols: vec![
            "AAPL".to_owned(),
            "MSFT".to_owned(),
            "GOOG".to_owned(),
            "AMZN".to_owned(),
        ],
        sigma: 0.001,
        tick_size: 0.01,
        num_threads: 1,
        realtime_ts: false,
        ..Default::default()
    }
}

fn run_bytes(cfg: SimConfig) -> Vec<u8> {
    let sink = MemorySink::new();
    Simulator::new(cfg).run(&sink);
    sink.bytes()
}

fn run_events_sorted(cfg: SimConfig) -> Vec<Event> {
    let sink = MemorySink::new();
    Simulator::new(cfg).run(&sink);
    let mut events = sink.events();
    events.sort_by_key(|e| e.ts_ns);
    events
}

#[test]
fn test_single_thread_byte_identical() {
    const RUNS: usize = 3;
    let first = run_bytes(base_config());
    assert!(!first.is_empty());
    for run in 1..RUNS {
        let bytes = run_bytes(base_config());
        assert_eq!(bytes, first, "stream diverged on run {run}");
    }
}

#[test]
fn test_different_seeds_produce_different_streams() {
    let a = run_bytes(SimConfig { seed: 1, ..base_config() });
    let b = run_bytes(SimConfig { seed: 2, ..base_config() });
    assert_ne!(a, b, "different seeds must produce different streams");
}

#[test]
fn test_different_thread_counts_produce_different_streams() {
    // Sharding changes which worker drives each symbol, so streams are only
    // comparable for a fixed thread count.
    let one = run_bytes(base_config());
    let two = run_bytes(SimConfig { num_threads: 2, ..base_config() });
    if std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) > 1 {
        assert_ne!(one, two);
    }
}

#[test]
fn test_multi_thread_stable_modulo_interleaving() {
    let cfg = SimConfig { num_threads: 2, ..base_config() };
    let first = run_events_sorted(cfg.clone());
    assert!(!first.is_empty());
    for run in 1..3 {
        let events = run_events_sorted(cfg.clone());
        assert_eq!(events, first, "sorted stream diverged on run {run}");
    }
}

#[test]
fn test_counters_are_deterministic() {
    let sink_a = MemorySink::new();
    let report_a = Simulator::new(base_config()).run(&sink_a);
    let sink_b = MemorySink::new();
    let report_b = Simulator::new(base_config()).run(&sink_b);

    assert_eq!(report_a.adds, report_b.adds);
    assert_eq!(report_a.cancels, report_b.cancels);
    assert_eq!(report_a.trades, report_b.trades);
}
