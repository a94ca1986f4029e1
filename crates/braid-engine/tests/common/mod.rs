//! Helpers shared by the engine integration tests.

#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use braid_core::{NodeId, State};
use braid_engine::Project;
use braid_tree::Path;

/// Sync until no request or cruncher is left. Panics after `timeout`.
pub fn crunch_until_idle<S: State>(project: &mut Project<S>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while project.is_crunching() {
        assert!(
            Instant::now() < deadline,
            "crunching did not settle within {timeout:?}"
        );
        project.sync_crunchers().unwrap();
        thread::sleep(Duration::from_millis(1));
    }
}

/// States along the path ending at `end`, root first.
pub fn states_to<S: State>(project: &Project<S>, end: NodeId) -> Vec<S> {
    let tree = project.read_tree();
    let path = Path::ending_at(&tree, end).unwrap();
    path.iter(&tree)
        .unwrap()
        .map(|id| tree.node(id).unwrap().state().clone())
        .collect()
}

/// The single leaf under `node`.
pub fn only_leaf<S: State>(project: &Project<S>, node: NodeId) -> NodeId {
    let leaves = project.read_tree().leaves(node, None).unwrap();
    assert_eq!(leaves.len(), 1, "expected one leaf, got {leaves:?}");
    leaves[0].node
}
