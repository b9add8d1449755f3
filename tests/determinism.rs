//! Determinism tests - golden master verification.
//!
//! The engine must produce byte-identical trade streams and final state
//! across repeated runs of the same seeded command sequence.

use pulse_lob::{to_price, MatchConfig, MatchingEngine, OrderType, Price, Quantity, Side};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

enum Command {
    Submit {
        id: u64,
        price: Price,
        qty: Quantity,
        side: Side,
        order_type: OrderType,
    },
    Cancel {
        id: u64,
    },
}

fn generate_commands(seed: u64, count: usize) -> Vec<Command> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut commands = Vec::with_capacity(count);
    let mut active: Vec<u64> = Vec::new();
    let mut next_id = 1u64;

    for _ in 0..count {
        if active.is_empty() || rng.gen_bool(0.7) {
            let id = next_id;
            next_id += 1;

            commands.push(Command::Submit {
                id,
                price: to_price(95.0) + rng.gen_range(0..100) * 1000,
                qty: rng.gen_range(1..500),
                side: if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
                order_type: if rng.gen_bool(0.9) {
                    OrderType::Limit
                } else {
                    OrderType::Ioc
                },
            });
            active.push(id);
        } else {
            let idx = rng.gen_range(0..active.len());
            commands.push(Command::Cancel {
                id: active.swap_remove(idx),
            });
        }
    }

    commands
}

/// Run the command stream and hash every trade plus the final state.
fn run(commands: &[Command]) -> (u64, u64) {
    let mut engine = MatchingEngine::with_capacity(MatchConfig::default(), 100_000);

    for command in commands {
        match command {
            Command::Submit {
                id,
                price,
                qty,
                side,
                order_type,
            } => {
                engine.submit_order(*id, *price, *qty, *side, *order_type, 0, 0);
            }
            Command::Cancel { id } => {
                engine.cancel_order(*id);
            }
        }
    }

    let mut hasher = DefaultHasher::new();
    for trade in engine.get_trades() {
        trade.trade_id.hash(&mut hasher);
        trade.buyer_order_id.hash(&mut hasher);
        trade.seller_order_id.hash(&mut hasher);
        trade.price.hash(&mut hasher);
        trade.quantity.hash(&mut hasher);
    }

    (hasher.finish(), engine.state_hash())
}

#[test]
fn identical_runs_identical_results() {
    const SEED: u64 = 0xDEAD_BEEF;
    const COUNT: usize = 1_000;
    const RUNS: usize = 10;

    let commands = generate_commands(SEED, COUNT);
    let (first_trades, first_state) = run(&commands);

    for attempt in 1..RUNS {
        let (trades, state) = run(&commands);
        assert_eq!(trades, first_trades, "trade hash mismatch on run {}", attempt);
        assert_eq!(state, first_state, "state hash mismatch on run {}", attempt);
    }
}

#[test]
fn large_stream_is_deterministic() {
    const SEED: u64 = 0xCAFE_BABE;
    const COUNT: usize = 100_000;

    let commands = generate_commands(SEED, COUNT);
    let (first_trades, first_state) = run(&commands);
    let (trades, state) = run(&commands);

    assert_eq!(trades, first_trades);
    assert_eq!(state, first_state);
}

#[test]
fn different_seeds_diverge() {
    let a = run(&generate_commands(1, 1_000));
    let b = run(&generate_commands(2, 1_000));
    assert_ne!(a, b, "different seeds should produce different streams");
}
