//! Criterion benchmarks for the matching hot path.
//!
//! The book's indexes are fixed-capacity, so every benchmark holds the book
//! at a steady state: adds are paired with cancels or matched away so long
//! criterion runs cannot exhaust the index.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use mktsim::{Arena, NullSink, Order, OrderBook, Side, SimConfig, Simulator};

fn order(id: u64, price: f64, qty: i32, side: Side) -> Order {
    Order { id, price, qty, side, ts_ns: id }
}

/// Rest an order below the market, then cancel it.
fn bench_add_cancel_no_match(c: &mut Criterion) {
    let arena = Arena::new("bench", 64 << 20);
    let mut book = OrderBook::new("BENCH", &arena, 0.01);
    book.add_order(order(u64::MAX, 110.0, 100, Side::Sell));

    let mut id = 0u64;
    c.bench_function("add_cancel_no_match", |b| {
        b.iter(|| {
            id += 1;
            let tick_offset = (id % 64) as f64 * 0.01;
            black_box(book.add_order(order(id, 90.0 + tick_offset, 100, Side::Buy)));
            black_box(book.cancel_order(id));
        })
    });
}

/// Place a resting maker and a fully matching taker each iteration.
fn bench_full_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_match");

    for depth in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let arena = Arena::new("bench", 64 << 20);
            let mut book = OrderBook::new("BENCH", &arena, 0.01);
            let mut id = 0u64;

            // Standing queue the taker walks through.
            for _ in 0..depth {
                id += 1;
                book.add_order(order(id, 100.0, 100, Side::Sell));
            }

            b.iter(|| {
                // Consume one maker, then replenish it at the queue tail.
                id += 1;
                let result = book.add_order(order(id, 100.0, 100, Side::Buy));
                id += 1;
                book.add_order(order(id, 100.0, 100, Side::Sell));
                black_box(result)
            })
        });
    }
    group.finish();
}

/// Cancel against books of increasing size, replenishing each time.
fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel");

    for book_size in [100u64, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(book_size),
            &book_size,
            |b, &book_size| {
                let arena = Arena::new("bench", 64 << 20);
                let mut book = OrderBook::new("BENCH", &arena, 0.01);
                for id in 0..book_size {
                    let side = if id % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = if id % 2 == 0 { 95.0 } else { 105.0 };
                    book.add_order(order(id, price + (id % 50) as f64 * 0.01, 100, side));
                }

                let mut cancel_id = 0u64;
                let mut next_id = book_size;
                b.iter(|| {
                    let ok = book.cancel_order(cancel_id);
                    let side = if cancel_id % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = if cancel_id % 2 == 0 { 95.0 } else { 105.0 };
                    book.add_order(order(next_id, price + (cancel_id % 50) as f64 * 0.01, 100, side));
                    cancel_id = next_id;
                    next_id += 1;
                    black_box(ok)
                })
            },
        );
    }
    group.finish();
}

/// Random mixed workload, batched onto a fresh book so the live set stays
/// bounded.
fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_workload");
    group.bench_function("50_add_50_cancel_batch_10k", |b| {
        b.iter_batched_ref(
            || {
                let mut rng = ChaCha8Rng::seed_from_u64(0xCAFE_BABE);
                let mut ops = Vec::with_capacity(10_000);
                let mut live: Vec<u64> = Vec::new();
                let mut next_id = 1u64;
                for _ in 0..10_000 {
                    if live.is_empty() || rng.gen_bool(0.5) {
                        let id = next_id;
                        next_id += 1;
                        live.push(id);
                        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                        let price = 100.0 + rng.gen_range(-30..=30) as f64 * 0.01;
                        ops.push((id, price, rng.gen_range(1..=100), side, true));
                    } else {
                        let li = rng.gen_range(0..live.len());
                        let id = live.swap_remove(li);
                        ops.push((id, 0.0, 0, Side::Buy, false));
                    }
                }
                (Arena::new("bench", 64 << 20), ops)
            },
            |(arena, ops)| {
                let mut book = OrderBook::new("BENCH", arena, 0.01);
                for &(id, price, qty, side, is_add) in ops.iter() {
                    if is_add {
                        black_box(book.add_order(order(id, price, qty, side)));
                    } else {
                        black_box(book.cancel_order(id));
                    }
                }
            },
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

/// End-to-end driver throughput against a null sink.
fn bench_sim_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulator");
    group.sample_size(10);
    group.throughput(criterion::Throughput::Elements(50_000));
    group.bench_function("50k_events_single_thread", |b| {
        b.iter(|| {
            let sim = Simulator::new(SimConfig {
                total_events: 50_000,
                symbols: vec!["AAPL".to_owned(), "MSFT".to_owned()],
                ..Default::default()
            });
            black_box(sim.run(&NullSink))
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_add_cancel_no_match,
    bench_full_match,
    bench_cancel,
    bench_mixed_workload,
    bench_sim_end_to_end,
);
criterion_main!(benches);
