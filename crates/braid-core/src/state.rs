//! The [`State`] contract and clock-stamped states.

use std::sync::Arc;

/// A simulation-package-defined world snapshot.
///
/// States are immutable once placed in a tree; producing the next state
/// is the step function's job and must not mutate its input. The engine
/// only needs to clone states (for editing forks) and move them across
/// worker threads.
///
/// # Clock
///
/// A state may carry its own clock by overriding [`clock`](State::clock).
/// When it returns `None`, the engine assigns `0` to roots and
/// `parent + 1` to children. Clocks are real numbers; the engine never
/// assumes integer ticks.
pub trait State: Clone + Send + Sync + 'static {
    /// Clock value supplied by the simulation package, if any.
    fn clock(&self) -> Option<f64> {
        None
    }
}

/// A state paired with the clock the engine assigned to it.
#[derive(Debug)]
pub struct Stamped<S> {
    /// Engine-owned clock of this state.
    pub clock: f64,
    /// The shared, immutable state.
    pub state: Arc<S>,
}

impl<S> Stamped<S> {
    /// Stamp a state with a clock.
    pub fn new(clock: f64, state: S) -> Self {
        Self {
            clock,
            state: Arc::new(state),
        }
    }
}

impl<S> Clone for Stamped<S> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock,
            state: Arc::clone(&self.state),
        }
    }
}

/// Clock for `state` given the clock of the state it follows.
///
/// Uses the state's own clock when present, otherwise `previous + 1`, or
/// `0` for a state with no predecessor.
pub fn resolve_clock<S: State>(state: &S, previous: Option<f64>) -> f64 {
    state
        .clock()
        .unwrap_or_else(|| previous.map_or(0.0, |clock| clock + 1.0))
}
