//! Clock lookups on paths against a linear-scan reference.

use braid_core::{Rounded, Rounding};
use braid_test_utils::{simpacks::queue_simpack, QueueState};
use braid_tree::{Path, Placement, Tree};
use proptest::prelude::*;

/// A path of `len` queue states with random real-valued clocks, forked
/// every `fork_every` nodes so the path crosses several blocks.
fn queue_path(seed: u64, len: usize, fork_every: usize) -> (Tree<QueueState>, Path) {
    let pack = queue_simpack(seed);
    let mut tree = Tree::new();
    let mut tip = tree
        .add_state(QueueState::seeded(seed), Placement::root())
        .unwrap();
    let steps = pack
        .steps_from(
            braid_core::StepStart::State(QueueState::seeded(seed)),
            pack.default_step_profile().clone(),
        )
        .unwrap();
    for (i, state) in steps.take(len.saturating_sub(1)).enumerate() {
        let state = state.unwrap();
        if fork_every > 0 && i % fork_every == 0 {
            tree.add_stepped_state(tip, state.clone(), None).unwrap();
        }
        tip = tree.add_stepped_state(tip, state, None).unwrap();
    }
    let path = Path::ending_at(&tree, tip).unwrap();
    (tree, path)
}

fn reference(clocks: &[f64], target: f64, rounding: Rounding) -> Option<usize> {
    let exact = clocks.iter().rposition(|&c| c == target);
    let low = exact.or_else(|| clocks.iter().rposition(|&c| c < target));
    let high = exact.or_else(|| clocks.iter().position(|&c| c > target));
    match rounding {
        Rounding::Exact => exact,
        Rounding::Low => low,
        Rounding::High => high,
        Rounding::Closest => match (low, high) {
            (Some(l), Some(h)) => {
                if clocks[h] - target < target - clocks[l] {
                    Some(h)
                } else {
                    Some(l)
                }
            }
            (one, None) | (None, one) => one,
        },
        Rounding::Both => unreachable!(),
    }
}

fn rounding() -> impl Strategy<Value = Rounding> {
    prop_oneof![
        Just(Rounding::Low),
        Just(Rounding::High),
        Just(Rounding::Exact),
        Just(Rounding::Closest),
    ]
}

proptest! {
    #[test]
    fn clock_lookup_matches_linear_scan(
        seed in any::<u64>(),
        len in 1usize..200,
        fork_every in 0usize..7,
        target in -1.0f64..150.0,
        pick_existing in any::<bool>(),
        rounding in rounding(),
    ) {
        let (tree, path) = queue_path(seed, len, fork_every);
        let nodes: Vec<_> = path.iter(&tree).unwrap().collect();
        prop_assert_eq!(nodes.len(), len);
        let clocks: Vec<f64> = nodes.iter().map(|&id| tree.node(id).unwrap().clock()).collect();

        let target = if pick_existing {
            clocks[(target.abs() as usize) % clocks.len()]
        } else {
            target
        };
        let found = path
            .get_node_by_clock(&tree, target, rounding)
            .ok()
            .and_then(Rounded::into_single);
        let expected = reference(&clocks, target, rounding).map(|i| nodes[i]);
        prop_assert_eq!(found, expected);
    }
}
