//! Output events and execution results.
//!
//! Trades and book updates are delivered synchronously to registered
//! callbacks on the book thread; `ExecutionResult` is returned from every
//! submission.

use serde::{Deserialize, Serialize};

use crate::types::{OrderId, OrderStatus, Price, Quantity, Side, Timestamp};

/// A trade between an aggressive (incoming) and a passive (resting) order.
///
/// `price` is always the passive order's resting price: the aggressor
/// receives any price improvement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Monotonic per-engine trade id
    pub trade_id: u64,
    pub buyer_order_id: OrderId,
    pub seller_order_id: OrderId,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: Timestamp,
    /// Side of the incoming order
    pub aggressor_side: Side,
}

/// Level 2 book change at a single price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub price: Price,
    /// New total quantity resting at `price` (0 = level removed)
    pub quantity: Quantity,
    pub side: Side,
    pub timestamp: Timestamp,
}

/// Synchronous result of an order submission or modification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled_quantity: Quantity,
    /// Volume-weighted average fill price, integer division; 0 if no fills
    pub avg_fill_price: Price,
    /// Number of trades this submission generated
    pub trade_count: u32,
}

impl ExecutionResult {
    /// A rejection carries no fills and no trades.
    #[inline]
    pub const fn rejected(order_id: OrderId) -> Self {
        Self {
            order_id,
            status: OrderStatus::Rejected,
            filled_quantity: 0,
            avg_fill_price: 0,
            trade_count: 0,
        }
    }

    #[inline]
    pub const fn is_accepted(&self) -> bool {
        !matches!(self.status, OrderStatus::Rejected)
    }

    #[inline]
    pub const fn is_filled(&self) -> bool {
        matches!(self.status, OrderStatus::Filled)
    }
}
