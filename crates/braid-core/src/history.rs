//! The [`History`] seam between history-dependent steps and the engine.
//!
//! A history-dependent step function receives a `&dyn History<S>` and may
//! look backwards along its own timeline. The engine's history browser
//! implements this trait over the finalized tree path plus the cruncher's
//! not-yet-drained output.

use crate::error::LookupError;
use crate::search::{Rounded, Rounding};
use crate::state::{Stamped, State};

/// A clock-ordered, read-only view of one timeline.
///
/// Lengths and indices count states from the root of the timeline.
/// Implementations must never shrink or skip states between calls while
/// their timeline is being extended.
pub trait History<S: State>: Send + Sync {
    /// Number of states currently visible.
    fn len(&self) -> Result<usize, LookupError>;

    /// Whether no state is visible.
    fn is_empty(&self) -> Result<bool, LookupError> {
        Ok(self.len()? == 0)
    }

    /// The state at `index`, counting from the root.
    fn get(&self, index: usize) -> Result<Stamped<S>, LookupError>;

    /// The most recent state.
    fn get_last_state(&self) -> Result<Stamped<S>, LookupError>;

    /// Look up by a monotonic function of the state.
    ///
    /// `function` must be non-decreasing along the timeline.
    fn get_state_by_monotonic_function(
        &self,
        function: &dyn Fn(&Stamped<S>) -> f64,
        value: f64,
        rounding: Rounding,
    ) -> Result<Rounded<Stamped<S>>, LookupError>;

    /// Look up by clock.
    fn get_state_by_clock(
        &self,
        clock: f64,
        rounding: Rounding,
    ) -> Result<Rounded<Stamped<S>>, LookupError> {
        self.get_state_by_monotonic_function(&|stamped| stamped.clock, clock, rounding)
    }
}
