//! L2 feed adapter - ring hand-off and the book thread.
//!
//! An ingest thread publishes fixed-size [`L2Message`] records through a
//! [`FeedProducer`]; the book thread drains them in batches, applies each
//! to its order book, and yields the scheduler when the ring runs dry.
//! Sequence numbers are tracked per symbol and gaps are reported through
//! a callback. Stopping is a shared atomic flag polled between batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use rustc_hash::FxHashMap;

use crate::order_book::OrderBook;
use crate::ring::SpscRing;
use crate::types::{OrderId, OrderType, Price, Quantity, Side, SymbolId, Timestamp};

/// Ring capacity for feed hand-off.
pub const FEED_RING_CAPACITY: usize = 65_536;

/// The ring type carrying feed messages to the book thread.
pub type FeedRing = SpscRing<L2Message, FEED_RING_CAPACITY>;

/// Reports a sequence gap as `(expected, received)`.
pub type GapCallback = Box<dyn FnMut(u64, u64) + Send>;

/// Observes every message after sequence tracking, before application.
pub type L2UpdateCallback = Box<dyn FnMut(&L2Message) + Send>;

/// Level update action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum L2Action {
    /// Add quantity at a price level
    Add = 0,
    /// Replace the level with a new quantity (0 removes it)
    Modify = 1,
    /// Remove the price level
    Delete = 2,
    /// Debit executed quantity from the level, head-first
    Execute = 3,
}

/// Fixed-size level-2 update, one cache line, trivially copyable.
///
/// `side` and `action` travel as raw bytes so the record stays `Default`
/// and safe to pre-fill ring slots with; the accessors validate on read.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default)]
pub struct L2Message {
    pub timestamp: Timestamp,
    pub symbol_id: SymbolId,
    pub price: Price,
    pub quantity: Quantity,
    /// 0 = Buy, 1 = Sell
    pub side: u8,
    /// See [`L2Action`]
    pub action: u8,
    /// Monotonic per symbol
    pub sequence: u64,
}

const _: () = assert!(
    std::mem::size_of::<L2Message>() == 64,
    "L2Message must fit in one cache line"
);

impl L2Message {
    pub fn new(
        action: L2Action,
        side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: Timestamp,
        sequence: u64,
        symbol_id: SymbolId,
    ) -> Self {
        Self {
            timestamp,
            symbol_id,
            price,
            quantity,
            side: side as u8,
            action: action as u8,
            sequence,
        }
    }

    #[inline]
    pub fn side(&self) -> Option<Side> {
        match self.side {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }

    #[inline]
    pub fn action(&self) -> Option<L2Action> {
        match self.action {
            0 => Some(L2Action::Add),
            1 => Some(L2Action::Modify),
            2 => Some(L2Action::Delete),
            3 => Some(L2Action::Execute),
            _ => None,
        }
    }
}

/// Feed handler configuration.
#[derive(Clone, Copy, Debug)]
pub struct FeedConfig {
    /// Order pool capacity of the reconstructed book
    pub pool_capacity: u32,
    /// Messages drained per batch on the book thread
    pub max_batch: usize,
    pub detect_gaps: bool,
    /// Pin the book thread to the last CPU core
    pub pin_to_core: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            pool_capacity: crate::order_book::DEFAULT_POOL_CAPACITY,
            max_batch: 1024,
            detect_gaps: true,
            pin_to_core: false,
        }
    }
}

/// Counters maintained by the book thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct FeedStats {
    pub messages_processed: u64,
    pub sequence_gaps: u64,
    pub parse_errors: u64,
    pub last_sequence: u64,
    pub last_message_time: Timestamp,
    pub last_process_time: Timestamp,
}

/// Producer half of the feed ring. Exactly one may exist per handler;
/// the ring is single-producer.
pub struct FeedProducer {
    ring: Arc<FeedRing>,
    published: u64,
    overflows: u64,
}

impl FeedProducer {
    /// Publish a message. `false` means the ring is full; the message is
    /// dropped and counted, and the caller may retry.
    #[inline]
    pub fn try_publish(&mut self, message: L2Message) -> bool {
        if self.ring.try_push(message) {
            self.published += 1;
            true
        } else {
            self.overflows += 1;
            false
        }
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

/// Consumes feed messages and reconstructs an order book from them.
///
/// Only book mutation operations are used: adds, cancels and execution
/// debits. Resting orders are synthetic, tracked per `(side, price)` so
/// modify and delete can replace whole levels.
pub struct FeedHandler {
    config: FeedConfig,
    ring: Arc<FeedRing>,
    book: OrderBook,
    stats: FeedStats,

    gap_callback: Option<GapCallback>,
    update_callback: Option<L2UpdateCallback>,

    /// 0 until the first message fixes the baseline
    expected_sequence: u64,
    next_synthetic_id: OrderId,
    level_ids: FxHashMap<(Side, Price), Vec<OrderId>>,
}

impl FeedHandler {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            ring: Arc::new(FeedRing::new()),
            book: OrderBook::with_capacity(config.pool_capacity),
            stats: FeedStats::default(),
            gap_callback: None,
            update_callback: None,
            expected_sequence: 0,
            next_synthetic_id: 1,
            level_ids: FxHashMap::default(),
        }
    }

    /// Create the producer handle for the ingest thread. The ring is
    /// single-producer: create exactly one.
    pub fn producer(&self) -> FeedProducer {
        FeedProducer {
            ring: Arc::clone(&self.ring),
            published: 0,
            overflows: 0,
        }
    }

    /// Drain up to `max_messages` from the ring (0 = until empty) and
    /// apply them. Returns the number processed.
    pub fn process_messages(&mut self, max_messages: usize) -> usize {
        let mut processed = 0;

        while max_messages == 0 || processed < max_messages {
            let Some(message) = self.ring.try_pop() else {
                break;
            };
            self.apply(&message);
            processed += 1;
        }

        processed
    }

    fn apply(&mut self, message: &L2Message) {
        if self.config.detect_gaps {
            self.check_sequence(message.sequence);
        }
        self.stats.last_sequence = message.sequence;
        self.stats.last_message_time = message.timestamp;

        let (side, action) = match (message.side(), message.action()) {
            (Some(side), Some(action)) => (side, action),
            _ => {
                self.stats.parse_errors += 1;
                return;
            }
        };

        if let Some(callback) = self.update_callback.as_mut() {
            callback(message);
        }

        match action {
            L2Action::Add => {
                if message.quantity > 0 {
                    self.add_level_order(side, message.price, message.quantity, message.timestamp);
                }
            }
            L2Action::Modify => {
                self.clear_level(side, message.price);
                if message.quantity > 0 {
                    self.add_level_order(side, message.price, message.quantity, message.timestamp);
                }
            }
            L2Action::Delete => {
                self.clear_level(side, message.price);
            }
            L2Action::Execute => {
                self.book
                    .execute_at(side, message.price, message.quantity, message.timestamp);
                self.prune_level(side, message.price);
            }
        }

        self.stats.messages_processed += 1;
        self.stats.last_process_time = now_nanos();
    }

    fn add_level_order(&mut self, side: Side, price: Price, quantity: Quantity, timestamp: Timestamp) {
        let id = self.next_synthetic_id;
        self.next_synthetic_id += 1;

        if self
            .book
            .add_order(id, price, quantity, side, OrderType::Limit, timestamp, 0)
            .is_some()
        {
            self.level_ids.entry((side, price)).or_default().push(id);
        } else {
            log::warn!("order pool exhausted, dropping level update at price {}", price);
        }
    }

    fn clear_level(&mut self, side: Side, price: Price) {
        if let Some(ids) = self.level_ids.remove(&(side, price)) {
            for id in ids {
                self.book.cancel_order(id);
            }
        }
    }

    /// Drop tracking entries for orders an execution fully consumed.
    fn prune_level(&mut self, side: Side, price: Price) {
        if let Some(ids) = self.level_ids.get_mut(&(side, price)) {
            ids.retain(|id| self.book.contains(*id));
            if ids.is_empty() {
                self.level_ids.remove(&(side, price));
            }
        }
    }

    fn check_sequence(&mut self, sequence: u64) {
        if self.expected_sequence != 0 && sequence != self.expected_sequence {
            self.stats.sequence_gaps += 1;
            log::warn!(
                "sequence gap: expected {}, received {}",
                self.expected_sequence,
                sequence
            );
            if let Some(callback) = self.gap_callback.as_mut() {
                callback(self.expected_sequence, sequence);
            }
        }
        self.expected_sequence = sequence.wrapping_add(1);
    }

    pub fn set_gap_callback(&mut self, callback: GapCallback) {
        self.gap_callback = Some(callback);
    }

    pub fn set_update_callback(&mut self, callback: L2UpdateCallback) {
        self.update_callback = Some(callback);
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = FeedStats::default();
    }

    /// Messages currently buffered in the ring (approximate).
    pub fn pending(&self) -> usize {
        self.ring.len()
    }

    /// Move the handler onto its own book thread. The thread drains
    /// batches until stopped, yielding whenever the ring is empty.
    pub fn start(self) -> FeedThread {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::spawn(move || self.run(thread_stop));

        FeedThread { stop, handle }
    }

    fn run(mut self, stop: Arc<AtomicBool>) -> Self {
        if self.config.pin_to_core {
            pin_to_last_core();
        }
        self.book.warm_up();
        log::debug!("book thread running, batch size {}", self.config.max_batch);

        while !stop.load(Ordering::Relaxed) {
            let processed = self.process_messages(self.config.max_batch);
            if processed == 0 {
                std::thread::yield_now();
            }
        }

        // Drain whatever the producer managed to publish before the stop
        self.process_messages(0);
        log::debug!(
            "book thread stopped after {} messages",
            self.stats.messages_processed
        );
        self
    }
}

/// Handle to a running book thread.
pub struct FeedThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<FeedHandler>,
}

impl FeedThread {
    /// Signal the book thread and join it, returning the handler for
    /// inspection.
    pub fn stop(self) -> FeedHandler {
        self.stop.store(true, Ordering::Relaxed);
        match self.handle.join() {
            Ok(handler) => handler,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Pin the current thread to the last core, which is the one most likely
/// isolated from OS interrupts.
fn pin_to_last_core() {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(last_core) = core_ids.last() {
            core_affinity::set_for_current(*last_core);
        }
    }
}

fn now_nanos() -> Timestamp {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as Timestamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::to_price;

    fn msg(action: L2Action, side: Side, price: f64, qty: Quantity, seq: u64) -> L2Message {
        L2Message::new(action, side, to_price(price), qty, seq * 10, seq, 1)
    }

    #[test]
    fn test_message_layout() {
        assert_eq!(std::mem::size_of::<L2Message>(), 64);
        assert_eq!(std::mem::align_of::<L2Message>(), 64);
    }

    #[test]
    fn test_message_accessors() {
        let m = msg(L2Action::Add, Side::Sell, 100.0, 10, 1);
        assert_eq!(m.side(), Some(Side::Sell));
        assert_eq!(m.action(), Some(L2Action::Add));

        let mut bad = m;
        bad.side = 9;
        assert_eq!(bad.side(), None);
        bad.side = 0;
        bad.action = 77;
        assert_eq!(bad.action(), None);
    }

    #[test]
    fn test_add_modify_delete_execute() {
        let mut handler = FeedHandler::new(FeedConfig {
            pool_capacity: 64,
            ..Default::default()
        });
        let mut producer = handler.producer();

        producer.try_publish(msg(L2Action::Add, Side::Buy, 100.0, 50, 1));
        producer.try_publish(msg(L2Action::Add, Side::Buy, 100.0, 30, 2));
        producer.try_publish(msg(L2Action::Add, Side::Sell, 101.0, 40, 3));
        assert_eq!(handler.process_messages(0), 3);

        assert_eq!(handler.book().best_bid(), Some(to_price(100.0)));
        assert_eq!(handler.book().best_bid_quantity(), 80);
        assert_eq!(handler.book().best_ask_quantity(), 40);

        // Modify replaces the whole level
        producer.try_publish(msg(L2Action::Modify, Side::Buy, 100.0, 25, 4));
        handler.process_messages(0);
        assert_eq!(handler.book().best_bid_quantity(), 25);

        // Execute debits head-first
        producer.try_publish(msg(L2Action::Execute, Side::Sell, 101.0, 15, 5));
        handler.process_messages(0);
        assert_eq!(handler.book().best_ask_quantity(), 25);

        // Delete removes the level
        producer.try_publish(msg(L2Action::Delete, Side::Buy, 100.0, 0, 6));
        handler.process_messages(0);
        assert_eq!(handler.book().best_bid(), None);

        assert_eq!(handler.stats().messages_processed, 6);
        assert_eq!(handler.stats().sequence_gaps, 0);
        assert_eq!(handler.stats().last_sequence, 6);
    }

    #[test]
    fn test_modify_of_absent_level_adds_it() {
        let mut handler = FeedHandler::new(FeedConfig::default());
        let mut producer = handler.producer();

        producer.try_publish(msg(L2Action::Modify, Side::Sell, 102.0, 10, 1));
        handler.process_messages(0);
        assert_eq!(handler.book().best_ask(), Some(to_price(102.0)));
    }

    #[test]
    fn test_gap_detection() {
        let mut handler = FeedHandler::new(FeedConfig::default());
        let mut producer = handler.producer();

        let gaps = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&gaps);
        handler.set_gap_callback(Box::new(move |expected, received| {
            sink.lock().unwrap().push((expected, received));
        }));

        // First message fixes the baseline at any sequence
        producer.try_publish(msg(L2Action::Add, Side::Buy, 100.0, 10, 5));
        producer.try_publish(msg(L2Action::Add, Side::Buy, 99.0, 10, 6));
        // Jump: 7 is skipped
        producer.try_publish(msg(L2Action::Add, Side::Buy, 98.0, 10, 8));
        handler.process_messages(0);

        assert_eq!(handler.stats().sequence_gaps, 1);
        assert_eq!(*gaps.lock().unwrap(), vec![(7, 8)]);
    }

    #[test]
    fn test_parse_error_counted() {
        let mut handler = FeedHandler::new(FeedConfig::default());
        let mut producer = handler.producer();

        let mut bad = msg(L2Action::Add, Side::Buy, 100.0, 10, 1);
        bad.side = 42;
        producer.try_publish(bad);
        handler.process_messages(0);

        assert_eq!(handler.stats().parse_errors, 1);
        assert!(handler.book().is_empty());
    }

    #[test]
    fn test_thread_end_to_end() {
        let handler = FeedHandler::new(FeedConfig {
            pool_capacity: 1024,
            max_batch: 64,
            ..Default::default()
        });
        let mut producer = handler.producer();
        let thread = handler.start();

        for i in 0..100u64 {
            let message = msg(L2Action::Add, Side::Buy, 100.0 - (i % 10) as f64, 10, i + 1);
            while !producer.try_publish(message) {
                std::thread::yield_now();
            }
        }

        let handler = thread.stop();
        assert_eq!(handler.stats().messages_processed, 100);
        assert_eq!(handler.stats().sequence_gaps, 0);
        assert_eq!(handler.book().order_count(), 100);
        assert_eq!(handler.book().best_bid(), Some(to_price(100.0)));
        assert_eq!(producer.published(), 100);
    }
}
