//! Error types shared across the braid workspace.
//!
//! Organized by subsystem: step functions (domain signals and failures),
//! history lookups, and simulation-package binding.

use thiserror::Error;

/// Outcome of a step function that did not produce a state.
///
/// [`StepError::WorldEnded`] is a domain signal, not a fault: a cruncher
/// converts it into an end marker in its output stream.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StepError {
    /// No further states can be derived from this timeline.
    #[error("world ended")]
    WorldEnded,
    /// The step function failed.
    #[error("step failed: {reason}")]
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl StepError {
    /// Convenience constructor for [`StepError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl From<LookupError> for StepError {
    fn from(e: LookupError) -> Self {
        Self::Failed {
            reason: e.to_string(),
        }
    }
}

/// Errors from clock- and index-based history lookups.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum LookupError {
    /// No element satisfies the requested rounding.
    #[error("no state found for value {value} with the requested rounding")]
    NotFound {
        /// The searched value.
        value: f64,
    },
    /// Index past the end of the available history.
    #[error("index {index} out of range for history of length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Current history length.
        len: usize,
    },
    /// The browser's cruncher was retired; its view is no longer defined.
    #[error("cruncher has been retired")]
    CruncherRetired,
    /// The underlying tree rejected the lookup.
    #[error("tree lookup failed: {reason}")]
    Tree {
        /// Description of the tree error.
        reason: String,
    },
}

/// Errors detected while binding a simulation package.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SimpackError {
    /// No step function of any kind was supplied.
    #[error("invalid simpack '{name}': no step function supplied")]
    NoStepFunction {
        /// Simpack name.
        name: String,
    },
    /// Both history-dependent and plain step forms were supplied.
    #[error("invalid simpack '{name}': mixes history-dependent and plain step functions")]
    MixedHistoryForms {
        /// Simpack name.
        name: String,
    },
    /// The step iterator was started from the wrong kind of input.
    #[error("simpack '{name}' needs a {expected} to step from")]
    StartMismatch {
        /// Simpack name.
        name: String,
        /// What the step function expects.
        expected: &'static str,
    },
}
