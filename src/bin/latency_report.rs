//! Standalone latency report with full percentile distribution.
//!
//! Criterion gives means; this gives the tail. Submits a pre-generated
//! command stream and records per-operation wall time into an HDR
//! histogram.

use hdrhistogram::Histogram;
use pulse_lob::{to_price, MatchConfig, MatchingEngine, OrderType, Side};
use std::time::Instant;

const ITERATIONS: u64 = 1_000_000;
const WARMUP_OPS: u64 = 10_000;

fn main() {
    println!("Preparing latency run...");

    let mut engine = MatchingEngine::with_capacity(MatchConfig::default(), 2_000_000);
    engine.warm_up();

    let mut histogram = match Histogram::<u64>::new_with_bounds(1, 1_000_000, 3) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("histogram setup failed: {:?}", e);
            return;
        }
    };

    // Train the branch predictor and fault in the index maps
    println!("Warming up ({} ops)...", WARMUP_OPS);
    for i in 0..WARMUP_OPS {
        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
        let base = if side == Side::Buy { 90.0 } else { 110.0 };
        engine.submit_order(
            i + 1,
            to_price(base) + (i % 100) as i64 * 100,
            10,
            side,
            OrderType::Limit,
            0,
            0,
        );
    }

    println!("Running {} iterations...", ITERATIONS);

    let mut total = std::time::Duration::ZERO;
    for i in 0..ITERATIONS {
        let id = WARMUP_OPS + i + 1;
        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
        let base = if side == Side::Buy { 90.0 } else { 110.0 };
        let price = to_price(base) + (i % 100) as i64 * 100;

        let start = Instant::now();
        std::hint::black_box(engine.submit_order(id, price, 10, side, OrderType::Limit, 0, 0));
        let elapsed = start.elapsed();

        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total += elapsed;

        // Keep the trade buffer from growing unboundedly
        if i % 10_000 == 0 {
            engine.get_trades();
        }
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total ops:  {}", ITERATIONS);
    println!(
        "Throughput: {:.2} ops/sec",
        ITERATIONS as f64 / total.as_secs_f64()
    );
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");
    println!("Resting orders at end: {}", engine.book().order_count());
    println!("Trades executed:       {}", engine.total_trades());
}
