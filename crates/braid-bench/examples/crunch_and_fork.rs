//! Crunch a timeline in the background, fork it by editing, and read
//! both branches back.
//!
//! Run with `RUST_LOG=debug` to watch the manager spawn, drain and
//! retire crunchers.

use std::thread;
use std::time::Duration;

use braid_core::{CrunchAmount, Rounding, StepProfile};
use braid_engine::{CruncherKind, Project, ProjectConfig};
use braid_test_utils::counter_simpack;
use braid_tree::Path;

fn main() {
    env_logger::init();
    println!("=== braid: crunch and fork ===\n");

    let config = ProjectConfig {
        preferred_cruncher: Some(CruncherKind::Thread),
        ..ProjectConfig::default()
    };
    let mut project = Project::new(counter_simpack(), config).unwrap();
    let root = project.create_root().unwrap();

    // --- Main timeline ---
    project
        .begin_crunching(root, CrunchAmount::Nodes(1_000), None)
        .unwrap();
    let mut syncs = 0;
    while project.is_crunching() {
        let added = project.sync_crunchers().unwrap();
        if added > 0 {
            syncs += 1;
        }
        thread::sleep(Duration::from_millis(2));
    }
    let main_tip = {
        let tree = project.read_tree();
        tree.leaves(root, None).unwrap()[0].node
    };
    println!(
        "main timeline: {} nodes in {} productive syncs",
        project.read_tree().len(),
        syncs
    );

    // --- Fork at clock 500 and speed the branch up ---
    let at = {
        let tree = project.read_tree();
        let path = Path::ending_at(&tree, main_tip).unwrap();
        path.get_node_by_clock(&tree, 500.0, Rounding::Exact)
            .unwrap()
            .into_single()
            .unwrap()
    };
    let edited = project.fork_to_edit(at).unwrap();
    project.edit_state(edited, |c| c.counter += 1_000_000).unwrap();
    project.finalize_edit(edited).unwrap();
    project
        .begin_crunching(
            edited,
            CrunchAmount::Clock(100.0),
            Some(StepProfile::new().kwarg("stride", 5)),
        )
        .unwrap();
    while project.is_crunching() {
        project.sync_crunchers().unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    // --- Read both branches ---
    let tree = project.read_tree();
    for (i, path) in tree.all_possible_paths().unwrap().iter().enumerate() {
        let last = path.last_node(&tree).unwrap();
        let node = tree.node(last).unwrap();
        println!(
            "  path {i}: {:>5} nodes, clock {:>7.1}, counter {:>8}",
            path.len(&tree).unwrap(),
            node.clock(),
            node.state().counter,
        );
    }
    drop(tree);

    let report = project.shutdown();
    println!(
        "\nshutdown: {} retired, {} joined, {} detached in {}ms",
        report.retired, report.joined, report.detached, report.total_ms
    );
}
