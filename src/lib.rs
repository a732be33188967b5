//! # mktsim
//!
//! A synthetic limit-order-book simulation engine: a benchmark and testbed
//! for allocator-aware, low-latency event processing.
//!
//! ## Design Principles
//!
//! - **Share-nothing**: one worker per symbol shard; each worker owns its
//!   arena, books, RNG and id counter outright (no locks in the hot loop)
//! - **Arena allocation**: level queues, index tables and pooled levels all
//!   draw from one bump region per worker; nothing is freed, levels are
//!   recycled through a pool
//! - **Tick-quantized matching**: strict price-time priority over integer
//!   ticks with cached best bid/ask and flat open-addressed indexes
//! - **Deterministic**: per-worker xoroshiro128+ streams and synthetic
//!   timestamps make identical configs produce identical event streams
//!
//! ## Architecture
//!
//! ```text
//! [Worker 0: arena + books + RNG] --\
//! [Worker 1: arena + books + RNG] ---> [EventSink (null / binary log)]
//! [Worker N: arena + books + RNG] --/
//! ```
//!
//! Workers may decouple emission from a downstream consumer thread with the
//! bounded [`spsc`] ring.

pub mod arena;
pub mod event;
pub mod flat_hash;
pub mod order_book;
pub mod rng;
pub mod sim;
pub mod sink;
pub mod spsc;

// Re-exports for convenience
pub use arena::{Arena, ArenaDeque, ArenaVec};
pub use event::{CodecError, Event, EventKind, Side};
pub use flat_hash::{FlatHashMap, FlatKey};
pub use order_book::{Order, OrderBook};
pub use rng::{Gaussian, SplitMix64, Xoroshiro128Plus};
pub use sim::{RunReport, SimConfig, Simulator, WorkerStats};
pub use sink::{open_sink, BinaryLogSink, EventSink, MemorySink, NullSink, SinkError};
