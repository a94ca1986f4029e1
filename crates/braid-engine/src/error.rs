//! Engine-level error type.

use braid_core::{NodeId, SimpackError, StepError};
use braid_tree::{PathError, TreeError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from [`Project`](crate::Project) and
/// [`CrunchingManager`](crate::CrunchingManager) operations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EngineError {
    /// Configuration rejected at construction.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// The tree rejected an operation.
    #[error("tree: {0}")]
    Tree(#[from] TreeError),
    /// A path could not be built or traversed.
    #[error("path: {0}")]
    Path(#[from] PathError),
    /// The simulation package could not produce a step iterator.
    #[error("simpack: {0}")]
    Simpack(#[from] SimpackError),
    /// A synchronous step failed.
    #[error("step: {0}")]
    Step(#[from] StepError),
    /// The simulation package has no factory for the requested root.
    #[error("simpack '{simpack}' has no {factory} factory")]
    NoRootFactory {
        /// Simpack name.
        simpack: String,
        /// `"create_root"` or `"create_messy_root"`.
        factory: &'static str,
    },
    /// The node is an unfinished edit and cannot be stepped from.
    #[error("node {node} is still in editing")]
    StillEditing {
        /// The node.
        node: NodeId,
    },
    /// The node does not lie on the given path.
    #[error("node {node} is not on the path")]
    NotOnPath {
        /// The node.
        node: NodeId,
    },
    /// History-dependent steps were routed to an isolated cruncher.
    #[error("simpack '{simpack}' needs a thread cruncher")]
    HistoryNeedsThread {
        /// Simpack name.
        simpack: String,
    },
    /// A worker thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// OS error description.
        reason: String,
    },
    /// The project has been shut down.
    #[error("project has shut down")]
    ShutDown,
}
