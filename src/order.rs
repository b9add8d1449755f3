//! The order record - a cache-line sized, pool-resident node.
//!
//! Orders carry their own FIFO linkage as pool indices, so removal from a
//! price level never touches the allocator. The `(side, price)` pair is the
//! back-reference to the level that owns the order.

use crate::pool::{PoolIndex, NULL_INDEX};
use crate::types::{
    OrderId, OrderStatus, OrderType, Price, Quantity, Side, Timestamp, INVALID_ORDER_ID,
    INVALID_PRICE,
};

/// A single order - exactly 64 bytes (one cache line).
///
/// # Memory Layout
///
/// | Field        | Type | Offset | Size |
/// |--------------|------|--------|------|
/// | id           | u64  | 0      | 8    |
/// | price        | i64  | 8      | 8    |
/// | quantity     | u64  | 16     | 8    |
/// | filled       | u64  | 24     | 8    |
/// | timestamp    | u64  | 32     | 8    |
/// | participant  | u64  | 40     | 8    |
/// | prev         | u32  | 48     | 4    |
/// | next         | u32  | 52     | 4    |
/// | side         | u8   | 56     | 1    |
/// | order_type   | u8   | 57     | 1    |
/// | status       | u8   | 58     | 1    |
/// | (padding)    | -    | 59     | 5    |
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy, Debug)]
pub struct Order {
    /// External order id (client-assigned)
    pub id: OrderId,

    /// Fixed-point limit price
    pub price: Price,

    /// Original submitted quantity
    pub quantity: Quantity,

    /// Cumulative filled quantity, monotonically non-decreasing
    pub filled: Quantity,

    /// Entry time in nanoseconds; audit only, never used for priority
    pub timestamp: Timestamp,

    /// Participant id for self-trade prevention (0 = anonymous)
    pub participant: u64,

    /// Index of the previous order at the same price level
    pub prev: PoolIndex,

    /// Index of the next order at the same price level
    pub next: PoolIndex,

    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
}

// Compile-time assertion: Order must stay within one cache line
const _: () = assert!(
    std::mem::size_of::<Order>() == 64,
    "Order must be exactly 64 bytes (one cache line)"
);

const _: () = assert!(
    std::mem::align_of::<Order>() == 64,
    "Order must be 64-byte aligned"
);

impl Order {
    #[inline]
    pub fn new(
        id: OrderId,
        price: Price,
        quantity: Quantity,
        side: Side,
        order_type: OrderType,
        timestamp: Timestamp,
        participant: u64,
    ) -> Self {
        Self {
            id,
            price,
            quantity,
            filled: 0,
            timestamp,
            participant,
            prev: NULL_INDEX,
            next: NULL_INDEX,
            side,
            order_type,
            status: OrderStatus::New,
        }
    }

    /// An empty slot, as held on the pool free list.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            id: INVALID_ORDER_ID,
            price: INVALID_PRICE,
            quantity: 0,
            filled: 0,
            timestamp: 0,
            participant: 0,
            prev: NULL_INDEX,
            next: NULL_INDEX,
            side: Side::Buy,
            order_type: OrderType::Limit,
            status: OrderStatus::New,
        }
    }

    /// Quantity still open to fill.
    #[inline]
    pub const fn remaining(&self) -> Quantity {
        self.quantity - self.filled
    }

    #[inline]
    pub const fn is_filled(&self) -> bool {
        self.filled >= self.quantity
    }

    /// An active order can still match or be cancelled.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::New | OrderStatus::PartiallyFilled)
    }

    #[inline]
    pub const fn is_buy(&self) -> bool {
        matches!(self.side, Side::Buy)
    }

    #[inline]
    pub const fn is_sell(&self) -> bool {
        matches!(self.side, Side::Sell)
    }

    /// Apply a fill, capped at the remaining quantity. Returns the actual
    /// quantity filled and advances the status.
    #[inline]
    pub fn fill(&mut self, quantity: Quantity) -> Quantity {
        let actual = quantity.min(self.remaining());
        self.filled += actual;

        if self.is_filled() {
            self.status = OrderStatus::Filled;
        } else if self.filled > 0 {
            self.status = OrderStatus::PartiallyFilled;
        }

        actual
    }

    #[inline]
    pub fn cancel(&mut self) {
        self.status = OrderStatus::Cancelled;
    }

    /// Reset the slot for reuse from the pool.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::empty();
    }
}
