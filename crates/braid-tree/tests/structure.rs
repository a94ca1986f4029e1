//! Structural properties of trees built from random operation sequences.

use braid_core::NodeId;
use braid_test_utils::Counter;
use braid_tree::{Path, PathError, Placement, Tree};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    /// Step from the node at this (wrapped) index.
    Step(usize),
    /// Edit-fork the node at this index, finalizing when the flag is set.
    Edit(usize, bool),
    /// Start a new root.
    Root,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => any::<usize>().prop_map(Op::Step),
        2 => (any::<usize>(), any::<bool>()).prop_map(|(i, f)| Op::Edit(i, f)),
        1 => Just(Op::Root),
    ]
}

fn pick(tree: &Tree<Counter>, index: usize) -> NodeId {
    tree.nodes().nth(index % tree.len()).unwrap().id()
}

fn build(ops: &[Op]) -> Tree<Counter> {
    let mut tree = Tree::new();
    tree.add_state(Counter::new(0), Placement::root()).unwrap();
    for op in ops {
        let before = tree.len();
        match *op {
            Op::Step(i) => {
                let parent = pick(&tree, i);
                let next = tree.node(parent).unwrap().state().counter + 1;
                tree.add_stepped_state(parent, Counter::new(next), None)
                    .unwrap();
            }
            Op::Edit(i, finalize) => {
                let edited = tree.fork_to_edit(pick(&tree, i)).unwrap();
                if finalize {
                    tree.finalize_edit(edited).unwrap();
                }
            }
            Op::Root => {
                tree.add_state(Counter::new(0), Placement::root()).unwrap();
            }
        }
        assert_eq!(tree.len(), before + 1);
    }
    tree
}

proptest! {
    #[test]
    fn block_invariant_holds(ops in prop::collection::vec(op(), 0..120)) {
        let tree = build(&ops);
        prop_assert_eq!(tree.check_invariants(), Ok(()));
    }

    #[test]
    fn tree_is_append_only(ops in prop::collection::vec(op(), 1..60)) {
        let (head, tail) = ops.split_at(ops.len() / 2);
        let mut tree = build(head);
        let snapshot: Vec<(NodeId, u64, f64)> = tree
            .nodes()
            .map(|n| (n.id(), n.state().counter, n.clock()))
            .collect();
        for op in tail {
            if let Op::Step(i) = *op {
                let parent = pick(&tree, i);
                tree.add_stepped_state(parent, Counter::new(0), None).unwrap();
            }
        }
        for (id, counter, clock) in snapshot {
            let node = tree.node(id).unwrap();
            prop_assert_eq!(node.state().counter, counter);
            prop_assert_eq!(node.clock(), clock);
        }
    }

    #[test]
    fn every_path_is_fully_decided(ops in prop::collection::vec(op(), 0..80)) {
        let tree = build(&ops);
        let paths = tree.all_possible_paths().unwrap();
        let leaves = tree.nodes().filter(|n| n.is_leaf()).count();
        prop_assert_eq!(paths.len(), leaves);

        for path in &paths {
            let nodes: Vec<NodeId> = path.iter(&tree).unwrap().collect();
            let last = *nodes.last().unwrap();
            prop_assert!(tree.node(last).unwrap().is_leaf());
            prop_assert_eq!(nodes.len() as u64, tree.depth(last).unwrap() + 1);
            for pair in nodes.windows(2) {
                prop_assert_eq!(path.next_node(&tree, pair[0]), Ok(pair[1]));
                prop_assert!(path.contains(&tree, pair[1]).unwrap());
            }
            prop_assert_eq!(
                path.next_node(&tree, last),
                Err(PathError::EndOfPath { node: last })
            );
        }
    }
}

/// A root and `len - 1` stepped nodes, compacted into one block.
fn blocked_chain(len: usize) -> (Tree<Counter>, Vec<NodeId>) {
    let mut tree = Tree::new();
    let mut ids = vec![tree.add_state(Counter::new(0), Placement::root()).unwrap()];
    for i in 1..len {
        ids.push(
            tree.add_stepped_state(ids[i - 1], Counter::new(i as u64), None)
                .unwrap(),
        );
    }
    (tree, ids)
}

proptest! {
    #[test]
    fn split_at_any_member(len in 2usize..40, at in any::<prop::sample::Index>()) {
        let (mut tree, ids) = blocked_chain(len);
        let block = tree.node(ids[0]).unwrap().block().unwrap();
        prop_assert_eq!(tree.block(block).unwrap().members(), ids.as_slice());

        let i = at.index(len);
        tree.split_block(block, ids[i]).unwrap();
        let (head, tail) = ids.split_at(i + 1);

        if head.len() >= 2 {
            prop_assert_eq!(tree.block(block).unwrap().members(), head);
        } else {
            prop_assert!(tree.block(block).is_err());
            prop_assert_eq!(tree.node(head[0]).unwrap().block(), None);
        }

        let tail_blocks: Vec<_> = tail
            .iter()
            .map(|&id| tree.node(id).unwrap().block())
            .collect();
        if tail.len() >= 2 {
            let second = tail_blocks[0].unwrap();
            prop_assert_ne!(second, block);
            prop_assert!(tail_blocks.iter().all(|b| *b == Some(second)));
            prop_assert_eq!(tree.block(second).unwrap().members(), tail);
        } else {
            prop_assert!(tail_blocks.iter().all(Option::is_none));
        }

        // Every member lands in exactly one outcome.
        let covered: usize = tree.blocks().map(|b| b.len()).sum::<usize>()
            + ids
                .iter()
                .filter(|&&id| tree.node(id).unwrap().block().is_none())
                .count();
        prop_assert_eq!(covered, len);
        prop_assert_eq!(tree.check_invariants(), Ok(()));
    }
}

#[test]
fn fork_scenario() {
    // root -> 1 .. 10, then edit node 5 and grow 3 nodes from the edit.
    let mut tree = Tree::new();
    let mut main = vec![tree.add_state(Counter::new(0), Placement::root()).unwrap()];
    for i in 1..=10 {
        main.push(
            tree.add_stepped_state(main[i - 1], Counter::new(i as u64), None)
                .unwrap(),
        );
    }
    let edited = tree.fork_to_edit(main[5]).unwrap();
    tree.edit_state(edited, |state| state.counter = 999).unwrap();
    tree.finalize_edit(edited).unwrap();
    let mut tip = edited;
    for i in 1..=3 {
        tip = tree
            .add_stepped_state(tip, Counter::new(999 + i), None)
            .unwrap();
    }

    let paths = tree.all_possible_paths().unwrap();
    assert_eq!(paths.len(), 2);
    let edited_path = paths
        .iter()
        .find(|path| path.contains(&tree, edited).unwrap())
        .unwrap();
    let at_five = edited_path.get(&tree, 5).unwrap();
    assert_eq!(tree.node(at_five).unwrap().state().counter, 999);
    assert_eq!(edited_path.len(&tree).unwrap(), 9);
    assert_eq!(edited_path.get_from_end(&tree, 0).unwrap(), tip);
    tree.check_invariants().unwrap();

    let main_path = Path::ending_at(&tree, main[10]).unwrap();
    assert_eq!(main_path.len(&tree).unwrap(), 11);
    assert!(!main_path.contains(&tree, edited).unwrap());
}
