//! Braid: a simulation engine that records branching timelines.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the braid sub-crates. Most users only need `braid` as a dependency.
//!
//! # Quick start
//!
//! ```no_run
//! use braid::prelude::*;
//!
//! #[derive(Clone)]
//! struct Count(u64);
//! impl State for Count {}
//!
//! let simpack = Simpack::builder("count")
//!     .step(|c: &Count, _: &StepProfile| Ok(Count(c.0 + 1)))
//!     .build()
//!     .unwrap();
//! let mut project = Project::new(simpack, ProjectConfig::default()).unwrap();
//! let root = project.root_this_state(Count(0)).unwrap();
//! project.begin_crunching(root, CrunchAmount::Nodes(100), None).unwrap();
//! while project.is_crunching() {
//!     project.sync_crunchers().unwrap();
//!     std::thread::sleep(std::time::Duration::from_millis(5));
//! }
//!
//! // Fork the timeline at node 40 and crunch the branch.
//! let at = {
//!     let tree = project.read_tree();
//!     let tip = tree.leaves(root, None).unwrap()[0].node;
//!     Path::ending_at(&tree, tip).unwrap().get(&tree, 40).unwrap()
//! };
//! let edited = project.fork_to_edit(at).unwrap();
//! project.edit_state(edited, |c| c.0 = 1_000).unwrap();
//! project.finalize_edit(edited).unwrap();
//! project.begin_crunching(edited, CrunchAmount::Nodes(10), None).unwrap();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `braid-core` | IDs, states, profiles, simpacks, the `History` trait |
//! | [`tree`] | `braid-tree` | The tree, blocks and paths |
//! | [`engine`] | `braid-engine` | Crunchers, the crunching manager, projects |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits (`braid-core`).
///
/// Contains ids, [`types::State`], step and crunching profiles,
/// [`types::Simpack`] and the [`types::History`] trait seen by
/// history-dependent steps.
pub use braid_core as types;

/// The tree of states (`braid-tree`).
///
/// [`tree::Tree`] stores nodes and compacts untouched chains into
/// blocks. [`tree::Path`] picks one timeline through it.
pub use braid_tree as tree;

/// Background crunching (`braid-engine`).
///
/// [`engine::Project`] is the entry point. It drives a
/// [`engine::CrunchingManager`] over [`engine::ThreadCruncher`]s or
/// [`engine::IsolatedCruncher`]s.
pub use braid_engine as engine;

/// Common imports for typical braid usage.
///
/// ```rust
/// use braid::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use braid_core::{
        CrunchAmount, CrunchTarget, CrunchingProfile, History, NodeId, ProfileValue, Rounded,
        Rounding, Simpack, Stamped, State, StepProfile,
    };

    // Errors
    pub use braid_core::{LookupError, SimpackError, StepError};
    pub use braid_engine::{ConfigError, EngineError};
    pub use braid_tree::{PathError, TreeError};

    // Tree
    pub use braid_tree::{Node, Path, Tree};

    // Engine
    pub use braid_engine::{
        CruncherKind, CruncherStatus, HistoryBrowser, Project, ProjectConfig, ShutdownReport,
    };
}
