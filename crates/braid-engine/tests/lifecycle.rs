//! Integration tests: world end, worker failure and shutdown.

mod common;

use std::time::Duration;

use braid_core::{CrunchAmount, StepProfile};
use braid_engine::{CruncherKind, EngineError, Project, ProjectConfig};
use braid_test_utils::{
    failing_simpack, finite_simpack, panicking_simpack, slow_counter_simpack, Counter,
};
use common::{crunch_until_idle, only_leaf, states_to};

const SETTLE: Duration = Duration::from_secs(10);

fn config(kind: CruncherKind) -> ProjectConfig {
    ProjectConfig {
        preferred_cruncher: Some(kind),
        ..ProjectConfig::default()
    }
}

#[test]
fn world_end_stops_crunching_and_flags_the_node() {
    for kind in [CruncherKind::Isolated, CruncherKind::Thread] {
        let mut project = Project::new(finite_simpack(5), config(kind)).unwrap();
        let root = project.create_root().unwrap();
        project
            .begin_crunching(root, CrunchAmount::Nodes(100), None)
            .unwrap();
        crunch_until_idle(&mut project, SETTLE);

        let last = only_leaf(&project, root);
        {
            let tree = project.read_tree();
            let node = tree.node(last).unwrap();
            assert!(node.ends_world(), "{kind:?}");
            assert_eq!(node.state().counter, 5);
            assert_eq!(tree.len(), 6);
        }
        assert!(project.failures().is_empty());

        // An ended world is never a frontier again.
        project
            .begin_crunching(last, CrunchAmount::Nodes(3), None)
            .unwrap();
        assert!(project.requests().is_empty());
        project.ensure_buffer(root, CrunchAmount::Nodes(200)).unwrap();
        assert!(project.requests().is_empty());
    }
}

#[test]
fn simulate_stops_at_world_end() {
    let mut project = Project::new(finite_simpack(3), ProjectConfig::default()).unwrap();
    let root = project.create_root().unwrap();
    let tip = project
        .simulate(root, 50, Some(StepProfile::new().kwarg("limit", 4)))
        .unwrap();
    let tree = project.read_tree();
    assert_eq!(tree.node(tip).unwrap().state().counter, 4);
    assert!(tree.node(tip).unwrap().ends_world());
    drop(tree);
    assert_eq!(project.simulate(tip, 10, None).unwrap(), tip);
}

#[test]
fn step_failure_is_recorded_and_not_retried() {
    for kind in [CruncherKind::Isolated, CruncherKind::Thread] {
        let mut project = Project::new(failing_simpack(3), config(kind)).unwrap();
        let root = project.create_root().unwrap();
        project
            .begin_crunching(root, CrunchAmount::Nodes(10), None)
            .unwrap();
        crunch_until_idle(&mut project, SETTLE);

        let failures = project.failures();
        assert_eq!(failures.len(), 1, "{kind:?}");
        assert!(failures[0].reason.contains("counter reached 3"));
        let frontier = failures[0].frontier;
        assert_eq!(project.read_tree().node(frontier).unwrap().state().counter, 3);
        assert_eq!(project.read_tree().len(), 4);
        assert!(project.requests().is_empty());
    }
}

#[test]
fn synchronous_failure_is_returned() {
    let mut project = Project::new(failing_simpack(2), ProjectConfig::default()).unwrap();
    let root = project.create_root().unwrap();
    let err = project.simulate(root, 5, None).unwrap_err();
    assert!(matches!(err, EngineError::Step(_)), "{err:?}");
    // The states produced before the failure are kept.
    assert_eq!(project.read_tree().len(), 3);
}

#[test]
fn panicking_step_fails_its_cruncher_only() {
    let mut project = Project::new(panicking_simpack(2), ProjectConfig::default()).unwrap();
    let root = project.create_root().unwrap();
    project
        .begin_crunching(root, CrunchAmount::Nodes(10), None)
        .unwrap();
    crunch_until_idle(&mut project, SETTLE);

    assert_eq!(project.failures().len(), 1);
    assert_eq!(project.failures()[0].reason, "step function panicked");
    let states = states_to(&project, only_leaf(&project, root));
    assert_eq!(states.len(), 3);

    // The project keeps working.
    let other = project.root_this_state(Counter::new(0)).unwrap();
    let child = project.simulate(other, 1, None).unwrap();
    assert_eq!(project.read_tree().node(child).unwrap().state().counter, 1);
}

#[test]
fn shutdown_retires_running_crunchers() {
    let mut project = Project::new(
        slow_counter_simpack(Duration::from_millis(1)),
        config(CruncherKind::Thread),
    )
    .unwrap();
    let a = project.create_root().unwrap();
    let b = project.create_root().unwrap();
    project
        .begin_crunching(a, CrunchAmount::Nodes(1_000_000), None)
        .unwrap();
    project
        .begin_crunching(b, CrunchAmount::Nodes(1_000_000), None)
        .unwrap();
    project.sync_crunchers().unwrap();
    assert_eq!(project.crunchers().len(), 2);

    let report = project.shutdown();
    assert_eq!(report.retired, 2);
    assert_eq!(report.joined, 2);
    assert_eq!(report.detached, 0);
    assert!(project.requests().is_empty());
    assert_eq!(
        project.begin_crunching(a, CrunchAmount::Nodes(1), None),
        Err(EngineError::ShutDown)
    );
}

#[test]
fn slow_step_is_detached_after_grace() {
    let config = ProjectConfig {
        shutdown_grace_ms: 10,
        ..ProjectConfig::default()
    };
    let mut project =
        Project::new(slow_counter_simpack(Duration::from_millis(300)), config).unwrap();
    let root = project.create_root().unwrap();
    project
        .begin_crunching(root, CrunchAmount::Nodes(5), None)
        .unwrap();
    project.sync_crunchers().unwrap();
    // Let the worker get into its first step.
    std::thread::sleep(Duration::from_millis(30));

    let report = project.shutdown();
    assert_eq!(report.retired, 1);
    assert_eq!(report.detached, 1);
    assert!(report.total_ms < 300, "waited {}ms", report.total_ms);
}
