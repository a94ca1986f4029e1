//! Test simulation packages for braid development.
//!
//! The states here are deliberately tiny so tests can assert on exact
//! values. The matching simpack constructors live in [`simpacks`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod simpacks;

use braid_core::State;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub use simpacks::{
    counter_simpack, failing_simpack, fibonacci_simpack, finite_simpack, panicking_simpack,
    queue_simpack, slow_counter_simpack,
};

/// A counter that goes up by one per step. Clock is assigned by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counter {
    pub counter: u64,
}

impl Counter {
    pub fn new(counter: u64) -> Self {
        Self { counter }
    }
}

impl State for Counter {}

/// One term of the Fibonacci sequence; stepped from history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fib {
    pub value: u64,
}

impl State for Fib {}

/// A single-server queue with its own continuous clock.
///
/// The random source travels with the state, so stepping the same state
/// twice produces the same successor.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueState {
    pub time: f64,
    pub queue_len: u32,
    pub arrivals: u64,
    pub departures: u64,
    pub rng: ChaCha8Rng,
}

impl QueueState {
    pub fn seeded(seed: u64) -> Self {
        Self {
            time: 0.0,
            queue_len: 0,
            arrivals: 0,
            departures: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl State for QueueState {
    fn clock(&self) -> Option<f64> {
        Some(self.time)
    }
}
