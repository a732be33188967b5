//! Price-time priority limit order book.
//!
//! Prices are quantized to integer ticks on entry and all internal ordering
//! works on ticks, never raw doubles. Each side keeps a fixed-capacity flat
//! hash from tick to a level slot, an unordered list of active ticks, and a
//! cached best tick; levels are plain slots in an arena-backed slab and are
//! recycled through a free pool when they empty. A second flat hash maps
//! resting order ids to their level so cancels avoid any search across
//! ticks.
//!
//! The cached best makes the common case O(1); when the best level empties,
//! the best is recomputed by scanning the (small, capacity-bounded) active
//! tick list. Matching walks the best opposite level's FIFO queue, erasing
//! fully filled orders from the id index before they leave the queue so the
//! index always mirrors the book exactly.

use std::fmt;

use crate::arena::{Arena, ArenaDeque, ArenaVec};
use crate::event::Side;
use crate::flat_hash::FlatHashMap;

/// Default maximum distinct ticks per side.
pub const DEFAULT_LEVEL_CAPACITY: usize = 2048;
/// Default maximum live resting orders per book.
pub const DEFAULT_INDEX_CAPACITY: usize = 16384;

/// An order carried by value through the matching API.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Order {
    pub id: u64,
    pub price: f64,
    pub qty: i32,
    pub side: Side,
    pub ts_ns: u64,
}

/// Where a resting order lives, for O(1) cancel lookup.
#[derive(Clone, Copy, Debug)]
struct OrderRef {
    side: Side,
    tick: i32,
}

/// All resting orders at one price, oldest at the front.
struct Level<'a> {
    tick: i32,
    queue: ArenaDeque<'a, Order>,
}

impl<'a> Level<'a> {
    fn new(tick: i32, arena: &'a Arena) -> Self {
        Self {
            tick,
            queue: ArenaDeque::new(arena),
        }
    }

    /// Reinitialize a recycled level; keeps the queue's storage.
    fn reset(&mut self, tick: i32) {
        self.tick = tick;
        self.queue.clear();
    }
}

/// Per-symbol matching book. All storage draws from the worker's arena.
pub struct OrderBook<'a> {
    symbol: String,
    arena: &'a Arena,

    bid_levels: FlatHashMap<'a, i32, u32>,
    ask_levels: FlatHashMap<'a, i32, u32>,
    index: FlatHashMap<'a, u64, OrderRef>,

    levels: ArenaVec<'a, Level<'a>>,
    free_levels: ArenaVec<'a, u32>,
    bid_ticks: ArenaVec<'a, i32>,
    ask_ticks: ArenaVec<'a, i32>,

    best_bid_tick: Option<i32>,
    best_ask_tick: Option<i32>,

    tick_size: f64,
    inv_tick: f64,
}

impl<'a> OrderBook<'a> {
    /// Book with the default level and index capacities.
    pub fn new(symbol: impl Into<String>, arena: &'a Arena, tick_size: f64) -> Self {
        Self::with_capacity(
            symbol,
            arena,
            tick_size,
            DEFAULT_LEVEL_CAPACITY,
            DEFAULT_INDEX_CAPACITY,
        )
    }

    /// Book with explicit per-side level and resting-order capacities.
    ///
    /// # Panics
    ///
    /// Panics if `tick_size` is not strictly positive.
    pub fn with_capacity(
        symbol: impl Into<String>,
        arena: &'a Arena,
        tick_size: f64,
        level_capacity: usize,
        index_capacity: usize,
    ) -> Self {
        assert!(tick_size > 0.0, "tick size must be positive");
        Self {
            symbol: symbol.into(),
            arena,
            bid_levels: FlatHashMap::new(arena, level_capacity),
            ask_levels: FlatHashMap::new(arena, level_capacity),
            index: FlatHashMap::new(arena, index_capacity),
            levels: ArenaVec::with_capacity(arena, 256),
            free_levels: ArenaVec::with_capacity(arena, 256),
            bid_ticks: ArenaVec::with_capacity(arena, 512),
            ask_ticks: ArenaVec::with_capacity(arena, 512),
            best_bid_tick: None,
            best_ask_tick: None,
            tick_size,
            inv_tick: 1.0 / tick_size,
        }
    }

    // ========================================================================
    // Tick conversions
    // ========================================================================

    #[inline]
    fn price_to_tick(&self, price: f64) -> i32 {
        // Prices are positive in this simulation; round-to-nearest keeps
        // the mapping deterministic across platforms.
        (price * self.inv_tick).round() as i32
    }

    #[inline]
    fn tick_to_price(&self, tick: i32) -> f64 {
        f64::from(tick) * self.tick_size
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Add an order: cross against the opposite side while prices allow,
    /// then rest any remainder at the quantized tick.
    ///
    /// Returns the filled quantity and, if any quantity traded, the price of
    /// the last resting level touched.
    ///
    /// # Panics
    ///
    /// Panics if the order's id is already resting in the book.
    pub fn add_order(&mut self, order: Order) -> (i32, Option<f64>) {
        debug_assert!(order.qty > 0, "order qty must be positive");
        let mut remaining = order.qty;
        let tick = self.price_to_tick(order.price);
        let snapped = self.tick_to_price(tick);
        let mut trade_price = None;

        match order.side {
            Side::Buy => {
                while remaining > 0 {
                    let best = match self.best_ask_tick {
                        Some(t) if t <= tick => t,
                        _ => break,
                    };
                    remaining = self.match_level(Side::Sell, best, remaining, &mut trade_price);
                }
            }
            Side::Sell => {
                while remaining > 0 {
                    let best = match self.best_bid_tick {
                        Some(t) if t >= tick => t,
                        _ => break,
                    };
                    remaining = self.match_level(Side::Buy, best, remaining, &mut trade_price);
                }
            }
        }

        if remaining > 0 {
            let lid = self.get_or_create_level(order.side, tick);
            let mut rest = order;
            rest.qty = remaining;
            rest.price = snapped;
            self.levels[lid as usize].queue.push_back(rest);
            if !self.index.insert(order.id, OrderRef { side: order.side, tick }) {
                panic!(
                    "duplicate order id {} resting in book {}",
                    order.id, self.symbol
                );
            }
        }

        (order.qty - remaining, trade_price)
    }

    /// Consume liquidity from the maker level at `best_tick` until the
    /// taker is satisfied or the level drains. Returns the remaining taker
    /// quantity.
    fn match_level(
        &mut self,
        maker_side: Side,
        best_tick: i32,
        mut remaining: i32,
        trade_price: &mut Option<f64>,
    ) -> i32 {
        let lid = match self.side_levels(maker_side).get(best_tick) {
            Some(lid) => lid,
            None => {
                // Cached best out of sync with the level map; repair it and
                // let the caller re-read.
                self.recompute_best(maker_side);
                return remaining;
            }
        };

        let level = &mut self.levels[lid as usize];
        while remaining > 0 {
            let filled_id = match level.queue.front_mut() {
                None => break,
                Some(top) => {
                    let traded = remaining.min(top.qty);
                    remaining -= traded;
                    top.qty -= traded;
                    *trade_price = Some(top.price);
                    (top.qty == 0).then_some(top.id)
                }
            };
            // A fully filled maker leaves the index before it leaves the
            // queue so the two stay consistent at every step.
            if let Some(id) = filled_id {
                self.index.erase(id);
                level.queue.pop_front();
            }
        }

        if self.levels[lid as usize].queue.is_empty() {
            self.remove_level(maker_side, best_tick, lid);
        }
        remaining
    }

    /// Cancel a resting order by id. Returns `false` for ids that are
    /// unknown or already filled.
    pub fn cancel_order(&mut self, order_id: u64) -> bool {
        let Some(oref) = self.index.get(order_id) else {
            return false;
        };

        let lid = match self.side_levels(oref.side).get(oref.tick) {
            Some(lid) => lid,
            None => {
                // A missing level means the index entry went stale, which
                // the invariants forbid; clean it up and report failure.
                self.index.erase(order_id);
                return false;
            }
        };

        let pos = {
            let queue = &self.levels[lid as usize].queue;
            (0..queue.len()).find(|&i| queue.get(i).id == order_id)
        };
        match pos {
            Some(i) => {
                let level = &mut self.levels[lid as usize];
                level.queue.remove(i);
                let now_empty = level.queue.is_empty();
                self.index.erase(order_id);
                if now_empty {
                    self.remove_level(oref.side, oref.tick, lid);
                }
                true
            }
            None => {
                self.index.erase(order_id);
                false
            }
        }
    }

    // ========================================================================
    // Level lifecycle
    // ========================================================================

    fn get_or_create_level(&mut self, side: Side, tick: i32) -> u32 {
        if let Some(lid) = self.side_levels(side).get(tick) {
            return lid;
        }

        let lid = match self.free_levels.pop() {
            Some(lid) => {
                self.levels[lid as usize].reset(tick);
                lid
            }
            None => {
                let lid = self.levels.len() as u32;
                let arena = self.arena;
                self.levels.push(Level::new(tick, arena));
                lid
            }
        };

        let inserted = self.side_levels_mut(side).insert(tick, lid);
        assert!(inserted, "level map already holds tick {tick}");
        self.add_active_tick(side, tick);
        lid
    }

    fn remove_level(&mut self, side: Side, tick: i32, lid: u32) {
        let erased = self.side_levels_mut(side).erase(tick);
        debug_assert!(erased, "removing level for untracked tick {tick}");
        self.remove_active_tick(side, tick);
        let stale_best = match side {
            Side::Buy => self.best_bid_tick == Some(tick),
            Side::Sell => self.best_ask_tick == Some(tick),
        };
        if stale_best {
            self.recompute_best(side);
        }
        self.free_levels.push(lid);
    }

    fn add_active_tick(&mut self, side: Side, tick: i32) {
        match side {
            Side::Buy => {
                self.bid_ticks.push(tick);
                if self.best_bid_tick.map_or(true, |best| tick > best) {
                    self.best_bid_tick = Some(tick);
                }
            }
            Side::Sell => {
                self.ask_ticks.push(tick);
                if self.best_ask_tick.map_or(true, |best| tick < best) {
                    self.best_ask_tick = Some(tick);
                }
            }
        }
    }

    fn remove_active_tick(&mut self, side: Side, tick: i32) {
        let ticks = self.side_ticks_mut(side);
        for i in 0..ticks.len() {
            if ticks[i] == tick {
                ticks.swap_remove(i);
                break;
            }
        }
    }

    fn recompute_best(&mut self, side: Side) {
        match side {
            Side::Buy => self.best_bid_tick = self.bid_ticks.iter().copied().max(),
            Side::Sell => self.best_ask_tick = self.ask_ticks.iter().copied().min(),
        }
    }

    #[inline]
    fn side_levels(&self, side: Side) -> &FlatHashMap<'a, i32, u32> {
        match side {
            Side::Buy => &self.bid_levels,
            Side::Sell => &self.ask_levels,
        }
    }

    #[inline]
    fn side_levels_mut(&mut self, side: Side) -> &mut FlatHashMap<'a, i32, u32> {
        match side {
            Side::Buy => &mut self.bid_levels,
            Side::Sell => &mut self.ask_levels,
        }
    }

    #[inline]
    fn side_ticks_mut(&mut self, side: Side) -> &mut ArenaVec<'a, i32> {
        match side {
            Side::Buy => &mut self.bid_ticks,
            Side::Sell => &mut self.ask_ticks,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Highest resting bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<f64> {
        self.best_bid_tick.map(|t| self.tick_to_price(t))
    }

    /// Lowest resting ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<f64> {
        self.best_ask_tick.map(|t| self.tick_to_price(t))
    }

    /// Number of resting orders tracked by the cancel index.
    #[inline]
    pub fn index_size(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    /// Walk the whole book and panic on any structural violation: every
    /// active tick maps to a non-empty level, cached bests match the active
    /// sets, the cancel index mirrors the queues exactly, and the book is
    /// never crossed. Intended for tests and debug audits; O(book size).
    pub fn check_invariants(&self) {
        let mut resting = 0usize;
        for (side, ticks) in [(Side::Buy, &self.bid_ticks), (Side::Sell, &self.ask_ticks)] {
            for &tick in ticks.iter() {
                let lid = self
                    .side_levels(side)
                    .get(tick)
                    .unwrap_or_else(|| panic!("active tick {tick} missing from level map"));
                let level = &self.levels[lid as usize];
                assert_eq!(level.tick, tick, "level slot holds the wrong tick");
                assert!(!level.queue.is_empty(), "active level at tick {tick} is empty");
                resting += level.queue.len();
                for order in level.queue.iter() {
                    let oref = self
                        .index
                        .get(order.id)
                        .unwrap_or_else(|| panic!("resting order {} not indexed", order.id));
                    assert_eq!((oref.side, oref.tick), (side, tick));
                }
            }
        }
        assert_eq!(self.index.len(), resting, "index size != resting order count");
        assert_eq!(
            self.best_bid_tick,
            self.bid_ticks.iter().copied().max(),
            "cached best bid is stale"
        );
        assert_eq!(
            self.best_ask_tick,
            self.ask_ticks.iter().copied().min(),
            "cached best ask is stale"
        );
        if let (Some(bid), Some(ask)) = (self.best_bid_tick, self.best_ask_tick) {
            assert!(bid < ask, "book is crossed: bid tick {bid} >= ask tick {ask}");
        }
    }
}

impl fmt::Debug for OrderBook<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol", &self.symbol)
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bid_levels.len())
            .field("ask_levels", &self.ask_levels.len())
            .field("resting", &self.index.len())
            .finish()
    }
}
