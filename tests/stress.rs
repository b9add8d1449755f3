//! Stress tests - correctness at the edges.
//!
//! Near-capacity operation, single-level contention, rapid churn, and
//! the feed path under sustained load.

use pulse_lob::{
    to_price, FeedConfig, FeedHandler, L2Action, L2Message, MatchConfig, MatchingEngine,
    OrderStatus, OrderType, Side,
};

fn engine_with(capacity: u32) -> MatchingEngine {
    MatchingEngine::with_capacity(MatchConfig::default(), capacity)
}

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn near_capacity_operation() {
    const CAPACITY: u32 = 10_000;
    let mut engine = engine_with(CAPACITY);

    let target = (CAPACITY as f64 * 0.95) as u64;
    for i in 0..target {
        // Non-overlapping prices so nothing matches: bids low, asks high
        let (side, price) = if i % 2 == 0 {
            (Side::Buy, to_price(80.0) + (i % 100) as i64 * 100)
        } else {
            (Side::Sell, to_price(100.0) + (i % 100) as i64 * 100)
        };

        let result = engine.submit_order(i + 1, price, 100, side, OrderType::Limit, 0, 0);
        assert_eq!(result.status, OrderStatus::New, "order {} not resting", i);
    }

    assert_eq!(engine.book().order_count(), target as usize);
    assert_eq!(engine.book().pool_in_use() as u64, target);
}

#[test]
fn exhausted_pool_recovers_after_cancel() {
    const CAPACITY: u32 = 100;
    let mut engine = engine_with(CAPACITY);

    for i in 0..CAPACITY as u64 {
        engine.submit_order(
            i + 1,
            to_price(90.0) + i as i64 * 100,
            100,
            Side::Buy,
            OrderType::Limit,
            0,
            0,
        );
    }

    let rejected = engine.submit_order(500, to_price(100.0), 100, Side::Buy, OrderType::Limit, 0, 0);
    assert_eq!(rejected.status, OrderStatus::Rejected);

    assert!(engine.cancel_order(50));
    let accepted = engine.submit_order(501, to_price(100.0), 100, Side::Buy, OrderType::Limit, 0, 0);
    assert_eq!(accepted.status, OrderStatus::New);
}

// ============================================================================
// Contention at one level
// ============================================================================

#[test]
fn thousand_orders_one_level_all_match_in_order() {
    const ORDERS: u64 = 1_000;
    let mut engine = engine_with(10_000);

    for i in 0..ORDERS {
        engine.submit_order(i + 1, to_price(100.0), 100, Side::Sell, OrderType::Limit, 0, 0);
    }
    assert_eq!(engine.book().order_count(), ORDERS as usize);

    let result = engine.submit_order(
        ORDERS + 1,
        to_price(100.0),
        ORDERS * 100,
        Side::Buy,
        OrderType::Limit,
        0,
        0,
    );
    assert_eq!(result.status, OrderStatus::Filled);
    assert_eq!(result.trade_count as u64, ORDERS);

    let trades = engine.get_trades();
    for (i, trade) in trades.iter().enumerate() {
        assert_eq!(trade.seller_order_id, i as u64 + 1, "FIFO violated at {}", i);
    }
    assert!(engine.book().is_empty());
    assert_eq!(engine.book().pool_in_use(), 0);
}

// ============================================================================
// Churn
// ============================================================================

#[test]
fn rapid_add_cancel_cycles() {
    const CYCLES: u64 = 10_000;
    let mut engine = engine_with(1_000);

    for cycle in 0..CYCLES {
        let id = cycle + 1;
        let side = if cycle % 2 == 0 { Side::Buy } else { Side::Sell };
        let price = if side == Side::Buy {
            to_price(99.0)
        } else {
            to_price(101.0)
        };

        let result = engine.submit_order(id, price, 100, side, OrderType::Limit, 0, 0);
        assert_eq!(result.status, OrderStatus::New);
        assert!(engine.cancel_order(id));
    }

    assert!(engine.book().is_empty());
    assert_eq!(engine.book().pool_in_use(), 0);
    assert_eq!(engine.total_orders_cancelled(), CYCLES);
}

#[test]
fn rapid_match_cycles() {
    const CYCLES: u64 = 5_000;
    let mut engine = engine_with(10_000);

    for cycle in 0..CYCLES {
        engine.submit_order(
            cycle * 2 + 1,
            to_price(100.0),
            100,
            Side::Sell,
            OrderType::Limit,
            0,
            1,
        );
        let result = engine.submit_order(
            cycle * 2 + 2,
            to_price(100.0),
            100,
            Side::Buy,
            OrderType::Limit,
            0,
            2,
        );
        assert_eq!(result.status, OrderStatus::Filled);
    }

    assert_eq!(engine.total_trades(), CYCLES);
    assert_eq!(engine.total_volume(), CYCLES * 100);
    assert!(engine.book().is_empty());
    assert_eq!(engine.book().pool_in_use(), 0);
}

#[test]
fn deep_book_sweep() {
    let mut engine = engine_with(10_000);

    // 100 ask levels, 10 orders each
    let mut id = 0u64;
    for level in 0..100i64 {
        for _ in 0..10 {
            id += 1;
            engine.submit_order(
                id,
                to_price(100.0) + level * 1000,
                10,
                Side::Sell,
                OrderType::Limit,
                0,
                0,
            );
        }
    }
    assert_eq!(engine.book().ask_level_count(), 100);

    // Sweep the first half of the book
    let result = engine.submit_market_order(id + 1, 5_000, Side::Buy, 0, 0);
    assert_eq!(result.status, OrderStatus::Filled);
    assert_eq!(result.trade_count, 500);
    assert_eq!(engine.book().ask_level_count(), 50);
    assert_eq!(engine.book().total_ask_volume(), 5_000);
}

// ============================================================================
// Feed path under load
// ============================================================================

#[test]
fn feed_thread_sustained_load() {
    const MESSAGES: u64 = 200_000;

    let handler = FeedHandler::new(FeedConfig {
        pool_capacity: 4_096,
        max_batch: 512,
        ..Default::default()
    });
    let mut producer = handler.producer();
    let thread = handler.start();

    // Each 16-message cycle adds one order at each of 8 prices, then
    // deletes those levels again, so the book stays bounded while the
    // ring sees sustained traffic
    for seq in 1..=MESSAGES {
        let slot = seq % 16;
        let price = to_price(100.0) + (slot % 8) as i64 * 500;
        let action = if slot < 8 { L2Action::Add } else { L2Action::Delete };
        let message = L2Message::new(action, Side::Buy, price, 10, seq, seq, 1);

        while !producer.try_publish(message) {
            std::thread::yield_now();
        }
    }

    let handler = thread.stop();
    assert_eq!(handler.stats().messages_processed, MESSAGES);
    assert_eq!(handler.stats().sequence_gaps, 0);
    assert_eq!(handler.stats().parse_errors, 0);
    assert_eq!(producer.published(), MESSAGES);

    // Every remaining order is accounted for in the pool
    assert_eq!(
        handler.book().pool_in_use() as usize,
        handler.book().order_count()
    );
}
