//! Core types and traits for the braid branching-history engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by the tree and the engine: strongly-typed ids, the
//! [`State`] contract, step and crunching profiles, the clock-keyed binary
//! search, the [`History`] seam used by history-dependent steps, and the
//! [`Simpack`] binding for simulation packages.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod history;
pub mod id;
pub mod profile;
pub mod search;
pub mod simpack;
pub mod state;

pub use error::{LookupError, SimpackError, StepError};
pub use history::History;
pub use id::{BlockId, CruncherId, NodeId, TreeInstanceId};
pub use profile::{CrunchAmount, CrunchTarget, CrunchingProfile, ProfileValue, StepProfile};
pub use search::{binary_search_by_index, Bracket, Rounded, Rounding};
pub use simpack::{
    HistoryHandle, Simpack, SimpackBuilder, StateIter, StepFunction, StepKind, StepResult,
    StepStart,
};
pub use state::{resolve_clock, Stamped, State};
