//! Tree shapes and projects for benchmarking braid.
//!
//! - [`chain`]: one long timeline, compacted into a single block
//! - [`comb`]: a spine with a short fork every few nodes
//! - [`crunch_project`]: a project ready to crunch the counter simpack

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use braid_core::NodeId;
use braid_engine::{CruncherKind, Project, ProjectConfig};
use braid_test_utils::{counter_simpack, Counter};
use braid_tree::{Placement, Tree};

/// A single root followed by `len - 1` stepped nodes. Returns the tree
/// and its last node.
pub fn chain(len: usize) -> (Tree<Counter>, NodeId) {
    let mut tree = Tree::new();
    let mut tip = tree.add_state(Counter::new(0), Placement::root()).unwrap();
    for i in 1..len {
        tip = tree
            .add_stepped_state(tip, Counter::new(i as u64), None)
            .unwrap();
    }
    (tree, tip)
}

/// A spine of `len` nodes with a `branch`-node fork every `every` nodes.
///
/// Each fork breaks the spine's block, so paths along the spine cross
/// many short segments. Returns the tree and the spine's last node.
pub fn comb(len: usize, every: usize, branch: usize) -> (Tree<Counter>, NodeId) {
    let mut tree = Tree::new();
    let mut tip = tree.add_state(Counter::new(0), Placement::root()).unwrap();
    for i in 1..len {
        if i % every == 0 {
            let mut side = tip;
            for j in 0..branch {
                side = tree
                    .add_stepped_state(side, Counter::new(1_000_000 + j as u64), None)
                    .unwrap();
            }
        }
        tip = tree
            .add_stepped_state(tip, Counter::new(i as u64), None)
            .unwrap();
    }
    (tree, tip)
}

/// A project over the counter simpack with one root.
pub fn crunch_project(kind: CruncherKind) -> (Project<Counter>, NodeId) {
    let config = ProjectConfig {
        preferred_cruncher: Some(kind),
        ..ProjectConfig::default()
    };
    let mut project = Project::new(counter_simpack(), config).unwrap();
    let root = project.create_root().unwrap();
    (project, root)
}
