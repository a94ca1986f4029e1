//! Reusable simulation packages.
//!
//! - [`counter_simpack`]: `counter + stride` per step.
//! - [`slow_counter_simpack`]: the counter with a sleep per step, for
//!   tests that need a cruncher to still be running.
//! - [`fibonacci_simpack`]: history-dependent, sums the last two states.
//! - [`finite_simpack`]: a generator that ends the world at a limit.
//! - [`failing_simpack`] / [`panicking_simpack`]: break at a given value.
//! - [`queue_simpack`]: random inter-event times on a real-valued clock.

use std::thread;
use std::time::Duration;

use braid_core::{History, Simpack, StepError, StepProfile};
use rand::Rng;

use crate::{Counter, Fib, QueueState};

fn stride(profile: &StepProfile) -> u64 {
    profile
        .get_i64("stride")
        .and_then(|s| u64::try_from(s).ok())
        .unwrap_or(1)
}

/// Deterministic counter; the `stride` kwarg sets the increment.
pub fn counter_simpack() -> Simpack<Counter> {
    Simpack::builder("counter")
        .step(|state: &Counter, profile: &StepProfile| {
            Ok(Counter::new(state.counter + stride(profile)))
        })
        .create_root(|| Counter::new(0))
        .create_messy_root(|| Counter::new(rand::rng().random_range(0..1000)))
        .build()
        .expect("counter simpack is valid")
}

/// Counter that sleeps `delay` before each step.
pub fn slow_counter_simpack(delay: Duration) -> Simpack<Counter> {
    Simpack::builder("slow-counter")
        .step(move |state: &Counter, profile: &StepProfile| {
            thread::sleep(delay);
            Ok(Counter::new(state.counter + stride(profile)))
        })
        .create_root(|| Counter::new(0))
        .build()
        .expect("slow counter simpack is valid")
}

/// Fibonacci numbers read back from history: `1, 1, 2, 3, 5, ...`.
pub fn fibonacci_simpack() -> Simpack<Fib> {
    Simpack::builder("fibonacci")
        .history_step(|history: &dyn History<Fib>, _: &StepProfile| {
            let len = history.len()?;
            let last = history.get_last_state()?;
            let value = if len < 2 {
                1
            } else {
                last.state.value + history.get(len - 2)?.state.value
            };
            Ok(Fib { value })
        })
        .create_root(|| Fib { value: 1 })
        .build()
        .expect("fibonacci simpack is valid")
}

/// Generator counting up to `limit` (or the `limit` kwarg), then ending
/// the world.
pub fn finite_simpack(limit: u64) -> Simpack<Counter> {
    Simpack::builder("finite")
        .step_generator(move |state: Counter, profile: StepProfile| {
            let limit = profile
                .get_i64("limit")
                .and_then(|l| u64::try_from(l).ok())
                .unwrap_or(limit);
            let start = state.counter + 1;
            let states = (start..=limit).map(|counter| Ok(Counter::new(counter)));
            Box::new(states.chain(std::iter::once(Err(StepError::WorldEnded))))
        })
        .create_root(|| Counter::new(0))
        .build()
        .expect("finite simpack is valid")
}

/// Counter whose step fails once the counter reaches `fail_at`.
pub fn failing_simpack(fail_at: u64) -> Simpack<Counter> {
    Simpack::builder("failing")
        .step(move |state: &Counter, _: &StepProfile| {
            if state.counter >= fail_at {
                return Err(StepError::failed(format!(
                    "counter reached {}",
                    state.counter
                )));
            }
            Ok(Counter::new(state.counter + 1))
        })
        .create_root(|| Counter::new(0))
        .build()
        .expect("failing simpack is valid")
}

/// Counter whose step panics once the counter reaches `panic_at`.
pub fn panicking_simpack(panic_at: u64) -> Simpack<Counter> {
    Simpack::builder("panicking")
        .step(move |state: &Counter, _: &StepProfile| {
            assert!(state.counter < panic_at, "counter reached {panic_at}");
            Ok(Counter::new(state.counter + 1))
        })
        .create_root(|| Counter::new(0))
        .build()
        .expect("panicking simpack is valid")
}

/// Single-server queue with exponential inter-event times.
///
/// Kwargs: `arrival_rate` (default 1.0) and `service_rate` (default 1.5).
pub fn queue_simpack(seed: u64) -> Simpack<QueueState> {
    Simpack::builder("queue")
        .step(|state: &QueueState, profile: &StepProfile| {
            let arrival_rate = profile.get_f64("arrival_rate").unwrap_or(1.0);
            let service_rate = profile.get_f64("service_rate").unwrap_or(1.5);
            if arrival_rate <= 0.0 || service_rate <= 0.0 {
                return Err(StepError::failed("rates must be positive"));
            }
            let mut next = state.clone();
            let total_rate = if next.queue_len > 0 {
                arrival_rate + service_rate
            } else {
                arrival_rate
            };
            let u: f64 = next.rng.random();
            next.time += -(1.0 - u).ln() / total_rate;
            if next.rng.random::<f64>() * total_rate < arrival_rate {
                next.queue_len += 1;
                next.arrivals += 1;
            } else {
                next.queue_len -= 1;
                next.departures += 1;
            }
            Ok(next)
        })
        .create_root(move || QueueState::seeded(seed))
        .create_messy_root(|| QueueState::seeded(rand::rng().random()))
        .build()
        .expect("queue simpack is valid")
}
