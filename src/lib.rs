//! # Pulse-LOB
//!
//! A single-symbol limit order book and matching engine for exchange
//! simulation, backtesting and high-frequency research.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one thread owns a book exclusively (no locks)
//! - **Pooled Storage**: orders live in a pre-allocated, cache-line
//!   aligned pool; no heap traffic on the hot path
//! - **Intrusive FIFOs**: price levels link orders through pool indices,
//!   so cancel and match are O(1) per order
//! - **Return-Value Failures**: rejection, exhaustion, not-found and
//!   backpressure are statuses and booleans, never panics
//!
//! ## Architecture
//!
//! ```text
//! [Ingest Thread] --> [SPSC Ring] --> [Book Thread]
//!                                          |
//!                            [Trades / BookUpdates / Results]
//! ```

pub mod events;
pub mod feed;
pub mod matching;
pub mod order;
pub mod order_book;
pub mod pool;
pub mod price_level;
pub mod ring;
pub mod types;

// Re-exports for convenience
pub use events::{BookUpdate, ExecutionResult, Trade};
pub use feed::{
    FeedConfig, FeedHandler, FeedProducer, FeedStats, FeedThread, L2Action, L2Message,
};
pub use matching::{MatchConfig, MatchingEngine, StpPolicy, TradeCallback};
pub use order::Order;
pub use order_book::{Bbo, BookUpdateCallback, DepthLevel, OrderBook};
pub use pool::{AtomicIndexPool, OrderPool, PoolIndex, CACHE_LINE_SIZE, NULL_INDEX};
pub use price_level::PriceLevel;
pub use ring::{MpscRing, SpscRing};
pub use types::{
    from_price, to_price, OrderId, OrderStatus, OrderType, Price, Quantity, Side, SymbolId,
    Timestamp, INVALID_ORDER_ID, INVALID_PRICE, PRICE_MULTIPLIER,
};
