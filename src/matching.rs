//! Matching engine - price-time priority matching over the order book.
//!
//! An incoming order sweeps the opposite side one resting order at a
//! time, head of the best level first. Trades print at the passive
//! order's resting price. Residual handling depends on the order type:
//! limit residuals rest, market and IOC residuals are cancelled, and FOK
//! runs a dry-run walk first so an infeasible order leaves no trace.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::events::{ExecutionResult, Trade};
use crate::order_book::{Bbo, BookUpdateCallback, DepthLevel, OrderBook};
use crate::pool::NULL_INDEX;
use crate::price_level::PriceLevel;
use crate::types::{
    OrderId, OrderStatus, OrderType, Price, Quantity, Side, Timestamp, INVALID_ORDER_ID,
};

/// Callback invoked synchronously for every trade, before `submit_order`
/// returns. Implementers must not block.
pub type TradeCallback = Box<dyn FnMut(&Trade) + Send>;

/// What happens when an incoming order would trade with the same
/// participant's resting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StpPolicy {
    /// Cancel the resting order and keep matching (default)
    CancelResting,
    /// Cancel the remainder of the incoming order
    CancelIncoming,
}

/// Per-engine matching configuration.
#[derive(Clone, Copy, Debug)]
pub struct MatchConfig {
    pub self_trade_prevention: bool,
    pub stp_policy: StpPolicy,
    pub allow_market_orders: bool,
    pub allow_ioc_orders: bool,
    pub allow_fok_orders: bool,
    pub max_order_quantity: Quantity,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            self_trade_prevention: true,
            stp_policy: StpPolicy::CancelResting,
            allow_market_orders: true,
            allow_ioc_orders: true,
            allow_fok_orders: true,
            max_order_quantity: 1_000_000,
        }
    }
}

/// Result of one matching sweep.
struct SweepOutcome {
    remaining: Quantity,
    /// Σ price × quantity over this sweep's fills
    notional: i128,
    trade_count: u32,
    /// The incoming order was cancelled by self-trade prevention
    stp_killed: bool,
}

/// Matching engine for a single symbol.
///
/// Single-threaded: submissions are matched in call order, and there is
/// no reordering anywhere between validation and trade emission.
pub struct MatchingEngine {
    book: OrderBook,
    config: MatchConfig,

    /// Ordered buffer of trades since the last `get_trades` drain
    trade_queue: VecDeque<Trade>,
    trade_callback: Option<TradeCallback>,

    total_trades: u64,
    total_volume: u64,
    total_orders_submitted: u64,
    total_orders_cancelled: u64,
    next_trade_id: u64,
}

impl MatchingEngine {
    pub fn new(config: MatchConfig) -> Self {
        Self::with_book(config, OrderBook::new())
    }

    /// Build an engine around a book with a specific pool capacity.
    pub fn with_capacity(config: MatchConfig, pool_capacity: u32) -> Self {
        Self::with_book(config, OrderBook::with_capacity(pool_capacity))
    }

    fn with_book(config: MatchConfig, book: OrderBook) -> Self {
        Self {
            book,
            config,
            trade_queue: VecDeque::new(),
            trade_callback: None,
            total_trades: 0,
            total_volume: 0,
            total_orders_submitted: 0,
            total_orders_cancelled: 0,
            next_trade_id: 1,
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Submit an order. Matching, residual handling and trade delivery all
    /// complete before this returns.
    pub fn submit_order(
        &mut self,
        id: OrderId,
        price: Price,
        quantity: Quantity,
        side: Side,
        order_type: OrderType,
        timestamp: Timestamp,
        participant: u64,
    ) -> ExecutionResult {
        self.total_orders_submitted += 1;

        if !self.validate(id, price, quantity, order_type) || self.book.contains(id) {
            return ExecutionResult::rejected(id);
        }

        // A market order sweeps without a price constraint
        let limit = match order_type {
            OrderType::Market => None,
            _ => Some(price),
        };

        // Fill-or-kill: prove feasibility first, leave no trace otherwise
        if order_type == OrderType::Fok && self.fok_available(side, price, quantity, participant) < quantity
        {
            return ExecutionResult {
                order_id: id,
                status: OrderStatus::Cancelled,
                filled_quantity: 0,
                avg_fill_price: 0,
                trade_count: 0,
            };
        }

        let outcome = self.sweep(id, side, limit, quantity, timestamp, participant);
        let filled = quantity - outcome.remaining;

        let status = if outcome.remaining == 0 {
            OrderStatus::Filled
        } else if outcome.stp_killed
            || matches!(order_type, OrderType::Market | OrderType::Ioc | OrderType::Fok)
        {
            if filled > 0 {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Cancelled
            }
        } else {
            self.rest_residual(
                id,
                price,
                quantity,
                outcome.remaining,
                side,
                order_type,
                timestamp,
                participant,
            )
        };

        ExecutionResult {
            order_id: id,
            status,
            filled_quantity: filled,
            avg_fill_price: if filled > 0 {
                (outcome.notional / filled as i128) as Price
            } else {
                0
            },
            trade_count: outcome.trade_count,
        }
    }

    /// Submit a market order: matches until the opposite side is empty,
    /// any residual is cancelled.
    pub fn submit_market_order(
        &mut self,
        id: OrderId,
        quantity: Quantity,
        side: Side,
        timestamp: Timestamp,
        participant: u64,
    ) -> ExecutionResult {
        self.submit_order(id, 0, quantity, side, OrderType::Market, timestamp, participant)
    }

    /// Cancel a resting order. Returns whether anything was cancelled.
    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        let cancelled = self.book.cancel_order(id);
        if cancelled {
            self.total_orders_cancelled += 1;
        }
        cancelled
    }

    /// Cancel-and-resubmit at the new price and quantity. Time priority is
    /// forfeited and the replacement may match immediately. Rejected if
    /// `id` is not resting.
    pub fn modify_order(
        &mut self,
        id: OrderId,
        new_price: Price,
        new_quantity: Quantity,
    ) -> ExecutionResult {
        let (side, order_type, timestamp, participant) = match self.book.get(id) {
            Some(order) => (order.side, order.order_type, order.timestamp, order.participant),
            None => return ExecutionResult::rejected(id),
        };

        self.cancel_order(id);
        self.submit_order(id, new_price, new_quantity, side, order_type, timestamp, participant)
    }

    // ========================================================================
    // Matching internals
    // ========================================================================

    fn validate(&self, id: OrderId, price: Price, quantity: Quantity, order_type: OrderType) -> bool {
        if id == INVALID_ORDER_ID {
            return false;
        }
        if quantity == 0 || quantity > self.config.max_order_quantity {
            return false;
        }
        if order_type == OrderType::Limit && price <= 0 {
            return false;
        }
        match order_type {
            OrderType::Market => self.config.allow_market_orders,
            OrderType::Ioc => self.config.allow_ioc_orders,
            OrderType::Fok => self.config.allow_fok_orders,
            OrderType::Limit => true,
        }
    }

    /// Consume the opposite side head-first while the incoming order still
    /// crosses. `limit == None` means no price constraint (market).
    fn sweep(
        &mut self,
        incoming_id: OrderId,
        side: Side,
        limit: Option<Price>,
        quantity: Quantity,
        timestamp: Timestamp,
        participant: u64,
    ) -> SweepOutcome {
        let passive_side = side.opposite();
        let mut outcome = SweepOutcome {
            remaining: quantity,
            notional: 0,
            trade_count: 0,
            stp_killed: false,
        };

        while outcome.remaining > 0 {
            let Some((best_price, head)) = self.book.best_head(passive_side) else {
                break;
            };

            let crosses = match (limit, side) {
                (None, _) => true,
                (Some(l), Side::Buy) => best_price <= l,
                (Some(l), Side::Sell) => best_price >= l,
            };
            if !crosses {
                break;
            }

            let passive = *self.book.pool.get(head);

            if self.config.self_trade_prevention
                && participant != 0
                && passive.participant == participant
            {
                match self.config.stp_policy {
                    StpPolicy::CancelResting => {
                        self.book.cancel_resting(head);
                        self.total_orders_cancelled += 1;
                        continue;
                    }
                    StpPolicy::CancelIncoming => {
                        outcome.stp_killed = true;
                        break;
                    }
                }
            }

            let fill = outcome.remaining.min(passive.remaining());
            debug_assert!(fill > 0, "resting order with zero remaining");

            let trade_id = self.next_trade_id;
            self.next_trade_id += 1;
            let (buyer_order_id, seller_order_id) = match side {
                Side::Buy => (incoming_id, passive.id),
                Side::Sell => (passive.id, incoming_id),
            };
            let trade = Trade {
                trade_id,
                buyer_order_id,
                seller_order_id,
                price: best_price,
                quantity: fill,
                timestamp,
                aggressor_side: side,
            };

            self.book.fill_resting(head, fill, timestamp);

            self.total_trades += 1;
            self.total_volume += fill;
            self.trade_queue.push_back(trade);
            if let Some(callback) = self.trade_callback.as_mut() {
                callback(&trade);
            }

            outcome.remaining -= fill;
            outcome.notional += best_price as i128 * fill as i128;
            outcome.trade_count += 1;
        }

        outcome
    }

    /// Rest a limit order's residual. The record keeps the original
    /// quantity and the fills already taken, so fill arithmetic holds.
    #[allow(clippy::too_many_arguments)]
    fn rest_residual(
        &mut self,
        id: OrderId,
        price: Price,
        original_quantity: Quantity,
        remaining: Quantity,
        side: Side,
        order_type: OrderType,
        timestamp: Timestamp,
        participant: u64,
    ) -> OrderStatus {
        let filled = original_quantity - remaining;

        match self.book.add_order(id, price, remaining, side, order_type, timestamp, participant) {
            Some(index) => {
                if filled > 0 {
                    let order = self.book.pool.get_mut(index);
                    order.quantity = original_quantity;
                    order.filled = filled;
                    order.status = OrderStatus::PartiallyFilled;
                    OrderStatus::PartiallyFilled
                } else {
                    OrderStatus::New
                }
            }
            // Pool exhausted while resting: the fills stand, the residual is gone
            None => OrderStatus::Rejected,
        }
    }

    /// Dry-run walk for fill-or-kill: how much could fill at prices
    /// crossing `limit`, honouring self-trade prevention. Mutates nothing.
    fn fok_available(
        &self,
        side: Side,
        limit: Price,
        target: Quantity,
        participant: u64,
    ) -> Quantity {
        let mut available = 0;

        match side {
            Side::Buy => {
                for (&price, level) in self.book.asks.iter() {
                    if price > limit {
                        break;
                    }
                    if self.scan_level(level, participant, target, &mut available) {
                        break;
                    }
                }
            }
            Side::Sell => {
                for (&price, level) in self.book.bids.iter().rev() {
                    if price < limit {
                        break;
                    }
                    if self.scan_level(level, participant, target, &mut available) {
                        break;
                    }
                }
            }
        }

        available
    }

    /// Walk one level's FIFO accumulating available quantity. Returns true
    /// when the scan is finished: target reached, or the incoming order
    /// would be cancelled here under CancelIncoming.
    fn scan_level(
        &self,
        level: &PriceLevel,
        participant: u64,
        target: Quantity,
        available: &mut Quantity,
    ) -> bool {
        let mut index = level.front();
        while index != NULL_INDEX {
            let order = self.book.pool.get(index);
            let blocked = self.config.self_trade_prevention
                && participant != 0
                && order.participant == participant;

            if blocked {
                if self.config.stp_policy == StpPolicy::CancelIncoming {
                    return true;
                }
                // CancelResting: the passive would be removed, not traded
            } else {
                *available += order.remaining();
                if *available >= target {
                    return true;
                }
            }

            index = order.next;
        }
        false
    }

    // ========================================================================
    // Trades and callbacks
    // ========================================================================

    /// Drain all trades buffered since the last call.
    pub fn get_trades(&mut self) -> Vec<Trade> {
        self.trade_queue.drain(..).collect()
    }

    /// Inspect buffered trades without draining.
    pub fn peek_trades(&self) -> &VecDeque<Trade> {
        &self.trade_queue
    }

    pub fn set_trade_callback(&mut self, callback: TradeCallback) {
        self.trade_callback = Some(callback);
    }

    pub fn set_book_update_callback(&mut self, callback: BookUpdateCallback) {
        self.book.set_book_update_callback(callback);
    }

    // ========================================================================
    // Queries and state
    // ========================================================================

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.book.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.book.best_ask()
    }

    #[inline]
    pub fn get_bbo(&self) -> Bbo {
        self.book.get_bbo()
    }

    #[inline]
    pub fn depth(&self, max_levels: usize) -> (Vec<DepthLevel>, Vec<DepthLevel>) {
        self.book.depth(max_levels)
    }

    #[inline]
    pub fn calculate_vwap(&self, side: Side, target_quantity: Quantity) -> Option<Price> {
        self.book.calculate_vwap(side, target_quantity)
    }

    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    pub fn total_volume(&self) -> u64 {
        self.total_volume
    }

    pub fn total_orders_submitted(&self) -> u64 {
        self.total_orders_submitted
    }

    pub fn total_orders_cancelled(&self) -> u64 {
        self.total_orders_cancelled
    }

    /// Clear the book, the trade buffer and all counters; every pool slot
    /// returns to the free list.
    pub fn reset(&mut self) {
        self.book.clear();
        self.trade_queue.clear();
        self.total_trades = 0;
        self.total_volume = 0;
        self.total_orders_submitted = 0;
        self.total_orders_cancelled = 0;
        self.next_trade_id = 1;
    }

    /// Pre-fault pool pages before entering the hot path.
    pub fn warm_up(&mut self) {
        self.book.warm_up();
    }

    /// Hash of observable state, for determinism testing.
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.book.best_bid().hash(&mut hasher);
        self.book.best_ask().hash(&mut hasher);
        self.book.order_count().hash(&mut hasher);
        self.book.total_bid_volume().hash(&mut hasher);
        self.book.total_ask_volume().hash(&mut hasher);
        self.book.pool_in_use().hash(&mut hasher);
        self.total_trades.hash(&mut hasher);
        self.total_volume.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}
