//! Property-based invariant tests.
//!
//! Replays seeded random command streams and asserts the structural
//! invariants that must hold after any sequence of operations: volume
//! accounting, pool conservation, an uncrossed book, fill arithmetic and
//! price improvement.

use proptest::prelude::*;
use pulse_lob::{
    to_price, MatchConfig, MatchingEngine, OrderId, OrderType, Price, Quantity, Side, Trade,
};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

struct Replay {
    engine: MatchingEngine,
    /// Submit price and side per order id
    submitted: HashMap<OrderId, (Side, Price)>,
    /// Quantity traded per order id, accumulated from trades
    traded: HashMap<OrderId, Quantity>,
    all_trades: Vec<Trade>,
}

fn replay(seed: u64, ops: usize) -> Replay {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut state = Replay {
        engine: MatchingEngine::with_capacity(MatchConfig::default(), 100_000),
        submitted: HashMap::new(),
        traded: HashMap::new(),
        all_trades: Vec::new(),
    };

    let mut next_order_id = 1u64;
    let mut active: Vec<OrderId> = Vec::new();

    for _ in 0..ops {
        if active.is_empty() || rng.gen_bool(0.7) {
            let id = next_order_id;
            next_order_id += 1;

            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let price = to_price(99.0) + rng.gen_range(0..40) * 500;
            let qty = rng.gen_range(1..300);
            let order_type = match rng.gen_range(0..10) {
                0 => OrderType::Ioc,
                1 => OrderType::Market,
                _ => OrderType::Limit,
            };

            let result = state.engine.submit_order(id, price, qty, side, order_type, 0, 0);
            state.submitted.insert(id, (side, price));

            let trades = state.engine.get_trades();
            let submission_fill: Quantity = trades.iter().map(|t| t.quantity).sum();
            assert_eq!(
                submission_fill, result.filled_quantity,
                "result fills disagree with emitted trades"
            );
            for trade in &trades {
                *state.traded.entry(trade.buyer_order_id).or_default() += trade.quantity;
                *state.traded.entry(trade.seller_order_id).or_default() += trade.quantity;
            }
            state.all_trades.extend(trades);

            if state.engine.book().contains(id) {
                active.push(id);
            }
        } else {
            let idx = rng.gen_range(0..active.len());
            let id = active.swap_remove(idx);
            state.engine.cancel_order(id);
        }

        // Invariants that must hold at every step
        if let (Some(bid), Some(ask)) = (state.engine.best_bid(), state.engine.best_ask()) {
            assert!(bid < ask, "book crossed: {} >= {}", bid, ask);
        }
        assert_eq!(
            state.engine.book().pool_in_use() as usize,
            state.engine.book().order_count(),
            "pool slots diverged from indexed orders"
        );
    }

    state
}

fn assert_volume_accounting(state: &Replay) {
    let book = state.engine.book();

    let mut bid_sum: Quantity = 0;
    let mut ask_sum: Quantity = 0;
    for &id in state.submitted.keys() {
        if let Some(order) = book.get(id) {
            assert!(order.is_active(), "indexed order is terminal");
            match order.side {
                Side::Buy => bid_sum += order.remaining(),
                Side::Sell => ask_sum += order.remaining(),
            }
        }
    }

    assert_eq!(book.total_bid_volume(), bid_sum);
    assert_eq!(book.total_ask_volume(), ask_sum);

    // Level aggregates agree with the side totals
    let (bids, asks) = book.depth(usize::MAX);
    let bid_levels: Quantity = bids.iter().map(|l| l.quantity).sum();
    let ask_levels: Quantity = asks.iter().map(|l| l.quantity).sum();
    assert_eq!(bid_levels, book.total_bid_volume());
    assert_eq!(ask_levels, book.total_ask_volume());

    // Depth walks are strictly best-first
    for pair in bids.windows(2) {
        assert!(pair[0].price > pair[1].price);
    }
    for pair in asks.windows(2) {
        assert!(pair[0].price < pair[1].price);
    }
}

fn assert_fill_arithmetic(state: &Replay) {
    let book = state.engine.book();

    for &id in state.submitted.keys() {
        if let Some(order) = book.get(id) {
            let traded = state.traded.get(&id).copied().unwrap_or(0);
            assert_eq!(
                order.filled, traded,
                "order {} filled {} but trades sum to {}",
                id, order.filled, traded
            );
            assert!(order.filled <= order.quantity);
        }
    }
}

fn assert_price_improvement(state: &Replay) {
    for trade in &state.all_trades {
        let passive_id = match trade.aggressor_side {
            Side::Buy => trade.seller_order_id,
            Side::Sell => trade.buyer_order_id,
        };
        let (_, passive_price) = state.submitted[&passive_id];
        assert_eq!(
            trade.price, passive_price,
            "trade {} printed {} instead of the passive price {}",
            trade.trade_id, trade.price, passive_price
        );
        assert!(trade.quantity > 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn invariants_hold_after_random_replay(seed in 0u64..1_000_000, ops in 20usize..400) {
        let state = replay(seed, ops);
        assert_volume_accounting(&state);
        assert_fill_arithmetic(&state);
        assert_price_improvement(&state);
    }

    #[test]
    fn reset_returns_every_slot(seed in 0u64..1_000_000, ops in 20usize..200) {
        let mut state = replay(seed, ops);
        state.engine.reset();

        prop_assert_eq!(state.engine.book().pool_in_use(), 0);
        prop_assert_eq!(state.engine.book().order_count(), 0);
        prop_assert_eq!(state.engine.total_trades(), 0);
        prop_assert!(state.engine.best_bid().is_none());
        prop_assert!(state.engine.best_ask().is_none());
    }
}

#[test]
fn fifo_consumption_is_head_first() {
    let mut engine = MatchingEngine::with_capacity(MatchConfig::default(), 1000);

    for i in 1..=20u64 {
        engine.submit_order(i, to_price(100.0), 10, Side::Sell, OrderType::Limit, 0, 0);
    }

    engine.submit_order(100, to_price(100.0), 95, Side::Buy, OrderType::Limit, 0, 0);

    let trades = engine.get_trades();
    assert_eq!(trades.len(), 10);
    for (i, trade) in trades.iter().enumerate() {
        assert_eq!(trade.seller_order_id, i as u64 + 1, "consumed out of order");
    }
    // Order 10 took the partial fill and still heads the queue
    assert_eq!(trades[9].quantity, 5);
    assert_eq!(engine.book().get(10).unwrap().remaining(), 5);
}
