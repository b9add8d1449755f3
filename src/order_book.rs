//! Order book - the two-sided price-level index for a single symbol.
//!
//! Bids and asks live in sorted maps keyed by price (best bid = last key,
//! best ask = first key), each level holding a FIFO of pool-resident
//! orders. An FxHashMap from order id to pool index gives O(1) cancel
//! lookup. The sorted maps answer best-of-side directly, so no separate
//! BBO cache is kept.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::events::BookUpdate;
use crate::order::Order;
use crate::pool::{OrderPool, PoolIndex};
use crate::price_level::PriceLevel;
use crate::types::{OrderId, OrderType, Price, Quantity, Side, Timestamp};

/// Default order pool capacity.
pub const DEFAULT_POOL_CAPACITY: u32 = 100_000;

/// Callback invoked synchronously on every level change.
pub type BookUpdateCallback = Box<dyn FnMut(&BookUpdate) + Send>;

/// One aggregated level of market depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: u32,
}

/// Best bid and offer snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbo {
    pub bid_price: Option<Price>,
    pub bid_quantity: Quantity,
    pub ask_price: Option<Price>,
    pub ask_quantity: Quantity,
}

impl Bbo {
    #[inline]
    pub const fn has_bid(&self) -> bool {
        self.bid_price.is_some()
    }

    #[inline]
    pub const fn has_ask(&self) -> bool {
        self.ask_price.is_some()
    }

    #[inline]
    pub const fn has_both(&self) -> bool {
        self.has_bid() && self.has_ask()
    }

    #[inline]
    pub fn spread(&self) -> Option<Price> {
        Some(self.ask_price? - self.bid_price?)
    }

    /// Integer-division midpoint.
    #[inline]
    pub fn mid_price(&self) -> Option<Price> {
        Some((self.bid_price? + self.ask_price?) / 2)
    }
}

/// Limit order book for a single symbol with price-time priority.
///
/// Single-threaded by design: all mutation and all reads happen on the
/// owning thread. The order pool belongs to this book and is never shared.
pub struct OrderBook {
    /// Bid levels, best = last key
    pub(crate) bids: BTreeMap<Price, PriceLevel>,
    /// Ask levels, best = first key
    pub(crate) asks: BTreeMap<Price, PriceLevel>,
    /// OrderId -> pool index for O(1) cancel
    pub(crate) order_index: FxHashMap<OrderId, PoolIndex>,
    pub(crate) pool: OrderPool,
    pub(crate) total_bid_volume: Quantity,
    pub(crate) total_ask_volume: Quantity,
    book_update_callback: Option<BookUpdateCallback>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    /// Create a book whose pool holds up to `pool_capacity` orders.
    pub fn with_capacity(pool_capacity: u32) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_index: FxHashMap::with_capacity_and_hasher(
                pool_capacity as usize,
                Default::default(),
            ),
            pool: OrderPool::new(pool_capacity),
            total_bid_volume: 0,
            total_ask_volume: 0,
            book_update_callback: None,
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Rest a new order in the book.
    ///
    /// Returns `None` on a duplicate id or when the pool is exhausted;
    /// callers surface both as rejections. Fires a `BookUpdate` with the
    /// level's new total.
    pub fn add_order(
        &mut self,
        id: OrderId,
        price: Price,
        quantity: Quantity,
        side: Side,
        order_type: OrderType,
        timestamp: Timestamp,
        participant: u64,
    ) -> Option<PoolIndex> {
        if self.order_index.contains_key(&id) {
            return None;
        }

        let index = self.pool.alloc()?;
        *self.pool.get_mut(index) =
            Order::new(id, price, quantity, side, order_type, timestamp, participant);

        let level_quantity = {
            let levels = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            let level = levels.entry(price).or_insert_with(|| PriceLevel::new(price));
            level.push_back(&mut self.pool, index);
            level.total_quantity
        };

        match side {
            Side::Buy => self.total_bid_volume += quantity,
            Side::Sell => self.total_ask_volume += quantity,
        }

        self.order_index.insert(id, index);
        self.notify_book_update(price, level_quantity, side, timestamp);

        Some(index)
    }

    /// Cancel a resting order by id. Returns `false` if unknown.
    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        let index = match self.order_index.get(&id) {
            Some(&index) => index,
            None => return false,
        };
        self.cancel_resting(index)
    }

    /// Cancel and replace. The new order goes to the end of its level's
    /// queue: time priority is forfeited. Returns `None` if `id` is
    /// unknown or the re-add fails.
    pub fn modify_order(
        &mut self,
        id: OrderId,
        new_price: Price,
        new_quantity: Quantity,
    ) -> Option<PoolIndex> {
        let (side, order_type, timestamp, participant) = {
            let &index = self.order_index.get(&id)?;
            let order = self.pool.get(index);
            (order.side, order.order_type, order.timestamp, order.participant)
        };

        self.cancel_order(id);
        self.add_order(id, new_price, new_quantity, side, order_type, timestamp, participant)
    }

    /// Execution debit for feed replay: consume up to `quantity` from the
    /// level at `(side, price)` head-first, without matching. Fully
    /// consumed orders leave the book. Returns the quantity debited.
    pub fn execute_at(
        &mut self,
        side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: Timestamp,
    ) -> Quantity {
        let mut left = quantity;
        let mut debited = 0;

        while left > 0 {
            let head = {
                let levels = match side {
                    Side::Buy => &self.bids,
                    Side::Sell => &self.asks,
                };
                match levels.get(&price) {
                    Some(level) if !level.is_empty() => level.front(),
                    _ => break,
                }
            };

            let fill = left.min(self.pool.get(head).remaining());
            self.fill_resting(head, fill, timestamp);
            left -= fill;
            debited += fill;
        }

        debited
    }

    /// Drop every order and return all pool slots.
    pub fn clear(&mut self) {
        for &index in self.order_index.values() {
            self.pool.free(index);
        }
        self.order_index.clear();
        self.bids.clear();
        self.asks.clear();
        self.total_bid_volume = 0;
        self.total_ask_volume = 0;
    }

    /// Pre-fault the pool's pages before entering the hot path.
    pub fn warm_up(&mut self) {
        self.pool.warm_up();
    }

    pub fn set_book_update_callback(&mut self, callback: BookUpdateCallback) {
        self.book_update_callback = Some(callback);
    }

    // ========================================================================
    // Crate-internal matching primitives
    // ========================================================================

    /// Best price and head-of-FIFO order on a side.
    pub(crate) fn best_head(&self, side: Side) -> Option<(Price, PoolIndex)> {
        let (price, level) = match side {
            Side::Buy => self.bids.iter().next_back()?,
            Side::Sell => self.asks.iter().next()?,
        };
        debug_assert!(!level.is_empty(), "empty level left in book");
        Some((*price, level.front()))
    }

    /// Apply a fill to a resting order: debits the order, its level and
    /// the side volume; unlinks, deindexes and frees the slot when the
    /// order completes; erases the level when it empties. Fires a
    /// `BookUpdate` with the level's new total (0 = removed).
    pub(crate) fn fill_resting(&mut self, index: PoolIndex, quantity: Quantity, timestamp: Timestamp) {
        let (id, side, price) = {
            let order = self.pool.get(index);
            (order.id, order.side, order.price)
        };

        match side {
            Side::Buy => self.total_bid_volume -= quantity,
            Side::Sell => self.total_ask_volume -= quantity,
        }

        let fully_filled = {
            let order = self.pool.get_mut(index);
            order.fill(quantity);
            order.is_filled()
        };

        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let mut level_quantity = 0;
        let mut now_empty = false;
        if let Some(level) = levels.get_mut(&price) {
            level.reduce_quantity(quantity);
            if fully_filled {
                now_empty = level.remove(&mut self.pool, index);
            }
            level_quantity = level.total_quantity;
        }
        if now_empty {
            levels.remove(&price);
        }

        if fully_filled {
            self.order_index.remove(&id);
            self.pool.free(index);
        }

        self.notify_book_update(price, level_quantity, side, timestamp);
    }

    /// Cancel a resting order by pool index (id already resolved).
    pub(crate) fn cancel_resting(&mut self, index: PoolIndex) -> bool {
        let (id, side, price, remaining, timestamp, active) = {
            let order = self.pool.get(index);
            (
                order.id,
                order.side,
                order.price,
                order.remaining(),
                order.timestamp,
                order.is_active(),
            )
        };
        if !active {
            return false;
        }

        match side {
            Side::Buy => self.total_bid_volume -= remaining,
            Side::Sell => self.total_ask_volume -= remaining,
        }

        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let mut level_quantity = 0;
        let now_empty = match levels.get_mut(&price) {
            Some(level) => {
                let empty = level.remove(&mut self.pool, index);
                if !empty {
                    level_quantity = level.total_quantity;
                }
                empty
            }
            None => false,
        };
        if now_empty {
            levels.remove(&price);
        }

        self.order_index.remove(&id);
        self.pool.get_mut(index).cancel();
        self.pool.free(index);

        self.notify_book_update(price, level_quantity, side, timestamp);
        true
    }

    pub(crate) fn notify_book_update(
        &mut self,
        price: Price,
        quantity: Quantity,
        side: Side,
        timestamp: Timestamp,
    ) {
        if let Some(callback) = self.book_update_callback.as_mut() {
            callback(&BookUpdate {
                price,
                quantity,
                side,
                timestamp,
            });
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Highest resting buy price.
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    /// Lowest resting sell price.
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    #[inline]
    pub fn best_bid_quantity(&self) -> Quantity {
        self.bids
            .values()
            .next_back()
            .map_or(0, |level| level.total_quantity)
    }

    #[inline]
    pub fn best_ask_quantity(&self) -> Quantity {
        self.asks
            .values()
            .next()
            .map_or(0, |level| level.total_quantity)
    }

    pub fn get_bbo(&self) -> Bbo {
        let mut bbo = Bbo::default();
        if let Some((&price, level)) = self.bids.iter().next_back() {
            bbo.bid_price = Some(price);
            bbo.bid_quantity = level.total_quantity;
        }
        if let Some((&price, level)) = self.asks.iter().next() {
            bbo.ask_price = Some(price);
            bbo.ask_quantity = level.total_quantity;
        }
        bbo
    }

    /// Integer-division midpoint; `None` when either side is empty.
    #[inline]
    pub fn mid_price(&self) -> Option<Price> {
        Some((self.best_bid()? + self.best_ask()?) / 2)
    }

    #[inline]
    pub fn spread(&self) -> Option<Price> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    /// Would an order at `price` on `side` match immediately?
    pub fn would_cross(&self, price: Price, side: Side) -> bool {
        match side {
            Side::Buy => self.best_ask().map_or(false, |ask| price >= ask),
            Side::Sell => self.best_bid().map_or(false, |bid| price <= bid),
        }
    }

    /// Top-of-book depth, best-first, up to `max_levels` per side.
    pub fn depth(&self, max_levels: usize) -> (Vec<DepthLevel>, Vec<DepthLevel>) {
        (self.bid_depth(max_levels), self.ask_depth(max_levels))
    }

    pub fn bid_depth(&self, max_levels: usize) -> Vec<DepthLevel> {
        self.bids
            .iter()
            .rev()
            .take(max_levels)
            .map(|(&price, level)| DepthLevel {
                price,
                quantity: level.total_quantity,
                order_count: level.order_count,
            })
            .collect()
    }

    pub fn ask_depth(&self, max_levels: usize) -> Vec<DepthLevel> {
        self.asks
            .iter()
            .take(max_levels)
            .map(|(&price, level)| DepthLevel {
                price,
                quantity: level.total_quantity,
                order_count: level.order_count,
            })
            .collect()
    }

    /// Volume-weighted average price to trade `target_quantity` as an
    /// aggressor on `side`: a buy walks the asks ascending, a sell the
    /// bids descending. Integer division; `None` if nothing would fill.
    /// Partial availability still yields a VWAP over what is there.
    pub fn calculate_vwap(&self, side: Side, target_quantity: Quantity) -> Option<Price> {
        let mut remaining = target_quantity;
        let mut weighted_sum: i128 = 0;
        let mut total_filled: Quantity = 0;

        let mut take = |price: Price, level: &PriceLevel| {
            let fill = level.total_quantity.min(remaining);
            weighted_sum += price as i128 * fill as i128;
            total_filled += fill;
            remaining -= fill;
            remaining == 0
        };

        match side {
            Side::Buy => {
                for (&price, level) in self.asks.iter() {
                    if take(price, level) {
                        break;
                    }
                }
            }
            Side::Sell => {
                for (&price, level) in self.bids.iter().rev() {
                    if take(price, level) {
                        break;
                    }
                }
            }
        }

        if total_filled == 0 {
            return None;
        }
        Some((weighted_sum / total_filled as i128) as Price)
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        let &index = self.order_index.get(&id)?;
        Some(self.pool.get(index))
    }

    #[inline]
    pub fn contains(&self, id: OrderId) -> bool {
        self.order_index.contains_key(&id)
    }

    #[inline]
    pub fn total_bid_volume(&self) -> Quantity {
        self.total_bid_volume
    }

    #[inline]
    pub fn total_ask_volume(&self) -> Quantity {
        self.total_ask_volume
    }

    #[inline]
    pub fn bid_level_count(&self) -> usize {
        self.bids.len()
    }

    #[inline]
    pub fn ask_level_count(&self) -> usize {
        self.asks.len()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.order_index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order_index.is_empty()
    }

    #[inline]
    pub fn pool_in_use(&self) -> u32 {
        self.pool.in_use()
    }

    #[inline]
    pub fn pool_capacity(&self) -> u32 {
        self.pool.capacity()
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.order_index.len())
            .finish()
    }
}
