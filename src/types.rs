//! Core scalar types and fixed-point price arithmetic.
//!
//! Prices are signed integers carrying four implied decimal places
//! (`$100.50 -> 1_005_000`). Quantities, order ids and timestamps are
//! plain unsigned integers so every message and record stays trivially
//! copyable.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// External order identifier. `0` is reserved as invalid.
pub type OrderId = u64;

/// Fixed-point price: actual = price / `PRICE_MULTIPLIER`.
pub type Price = i64;

/// Order quantity. `0` means "no residual".
pub type Quantity = u64;

/// Nanoseconds since epoch. Informational only; time priority inside a
/// price level is defined by FIFO insertion order, never by this field.
pub type Timestamp = u64;

/// Symbol identifier carried on feed messages.
pub type SymbolId = u32;

/// Four implied decimal places.
pub const PRICE_MULTIPLIER: i64 = 10_000;

/// Sentinel for "no such price" on wire-level messages. The library API
/// expresses absence as `Option<Price>` instead.
pub const INVALID_PRICE: Price = i64::MAX;

/// Reserved invalid order id; never accepted as input.
pub const INVALID_ORDER_ID: OrderId = 0;

/// Convert a decimal price to fixed-point ticks, rounding half-up.
#[inline]
pub fn to_price(value: f64) -> Price {
    (value * PRICE_MULTIPLIER as f64 + 0.5) as Price
}

/// Convert fixed-point ticks back to a decimal price.
#[inline]
pub fn from_price(price: Price) -> f64 {
    price as f64 / PRICE_MULTIPLIER as f64
}

/// Exact decimal-to-tick conversion for feed and configuration inputs.
///
/// Returns 0 on overflow, which downstream validation rejects.
#[inline]
pub fn decimal_to_price(value: Decimal) -> Price {
    (value * Decimal::from(PRICE_MULTIPLIER))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order lifetime, determining matching behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderType {
    /// Limit order - residual rests in the book until cancelled (default)
    #[default]
    Limit = 0,
    /// Market order - matches until the opposite side is empty, residual cancelled
    Market = 1,
    /// Immediate-Or-Cancel - matches like a limit, residual cancelled
    Ioc = 2,
    /// Fill-Or-Kill - fills the entire quantity atomically or does nothing
    Fok = 3,
}

/// Order lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderStatus {
    New = 0,
    PartiallyFilled = 1,
    Filled = 2,
    Cancelled = 3,
    Rejected = 4,
}

/// For buys a higher price is better; for sells a lower one.
#[inline]
pub const fn is_better_price(a: Price, b: Price, side: Side) -> bool {
    match side {
        Side::Buy => a > b,
        Side::Sell => a < b,
    }
}

/// Two prices cross iff the bid meets or exceeds the ask.
#[inline]
pub const fn prices_cross(bid: Price, ask: Price) -> bool {
    bid >= ask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_roundtrip() {
        assert_eq!(to_price(100.0), 1_000_000);
        assert_eq!(to_price(100.5), 1_005_000);
        assert_eq!(to_price(0.0001), 1);
        assert_eq!(from_price(1_005_000), 100.5);
    }

    #[test]
    fn test_to_price_rounds_half_up() {
        assert_eq!(to_price(0.00005), 1);
        assert_eq!(to_price(0.00004), 0);
    }

    #[test]
    fn test_decimal_to_price_exact() {
        use std::str::FromStr;
        let d = Decimal::from_str("100.12345").unwrap();
        assert_eq!(decimal_to_price(d), 1_001_235); // half-up on the 5th decimal
        let d = Decimal::from_str("100.1234").unwrap();
        assert_eq!(decimal_to_price(d), 1_001_234);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_better_price() {
        assert!(is_better_price(101, 100, Side::Buy));
        assert!(!is_better_price(100, 101, Side::Buy));
        assert!(is_better_price(100, 101, Side::Sell));
    }

    #[test]
    fn test_prices_cross() {
        assert!(prices_cross(100, 100));
        assert!(prices_cross(101, 100));
        assert!(!prices_cross(99, 100));
    }

    #[test]
    fn test_order_type_default() {
        assert_eq!(OrderType::default(), OrderType::Limit);
    }
}
