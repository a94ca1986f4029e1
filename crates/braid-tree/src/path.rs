//! Linear timelines through a branching tree.
//!
//! A [`Path`] is derived data: a root plus a map of decisions at forks,
//! optionally cut off at an end node. It holds no borrow of the tree, so
//! every traversal takes the tree as an argument and re-validates that
//! the path was built for it.
//!
//! Traversal never guesses. Reaching a fork with no recorded decision is
//! [`PathError::UndecidedFork`].
//!
//! For index and clock lookups the path is first resolved into a
//! [`PathIndex`]: one [`Segment`] per block run or loose node, plus the
//! cumulative start index of every segment. Random access is then a
//! binary search over segment starts, and clock lookups are a binary
//! search over node positions, so neither walks the path node by node.

use braid_core::{
    binary_search_by_index, Bracket, NodeId, Rounded, Rounding, TreeInstanceId,
};
use indexmap::IndexMap;

use crate::error::PathError;
use crate::node::Node;
use crate::tree::Tree;

/// One contiguous stretch of a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment<'t> {
    /// Consecutive members of one block.
    Run(&'t [NodeId]),
    /// A node outside any block (or a single remaining block member).
    Single(NodeId),
}

impl Segment<'_> {
    /// Nodes in this segment.
    pub fn as_slice(&self) -> &[NodeId] {
        match self {
            Segment::Run(run) => run,
            Segment::Single(id) => std::slice::from_ref(id),
        }
    }

    /// Number of nodes in this segment.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Always `false`.
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Last node of the segment.
    pub fn last(&self) -> NodeId {
        match self {
            Segment::Run(run) => run[run.len() - 1],
            Segment::Single(id) => *id,
        }
    }
}

/// A path resolved against a tree for random access.
#[derive(Clone, Debug)]
pub struct PathIndex<'t> {
    segments: Vec<Segment<'t>>,
    starts: Vec<usize>,
    len: usize,
}

impl<'t> PathIndex<'t> {
    fn new(segments: Vec<Segment<'t>>) -> Self {
        let mut starts = Vec::with_capacity(segments.len());
        let mut len = 0;
        for segment in &segments {
            starts.push(len);
            len += segment.len();
        }
        Self {
            segments,
            starts,
            len,
        }
    }

    /// Number of nodes on the path.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: a path contains at least its root.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The segments, root first.
    pub fn segments(&self) -> &[Segment<'t>] {
        &self.segments
    }

    /// Node at `index`, counting from the root.
    pub fn get(&self, index: usize) -> Option<NodeId> {
        (index < self.len).then(|| self.at(index))
    }

    pub(crate) fn at(&self, index: usize) -> NodeId {
        let segment = self.starts.partition_point(|&start| start <= index) - 1;
        self.segments[segment].as_slice()[index - self.starts[segment]]
    }

    /// Last node on the path.
    pub fn last(&self) -> Option<NodeId> {
        self.segments.last().map(Segment::last)
    }

    /// All nodes, root first.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.segments
            .iter()
            .flat_map(|segment| segment.as_slice().iter().copied())
    }
}

/// A root plus the decisions that pick one child at every fork.
///
/// ```
/// use braid_core::State;
/// use braid_tree::{Path, Placement, Tree};
///
/// #[derive(Clone)]
/// struct Tick;
/// impl State for Tick {}
///
/// let mut tree = Tree::new();
/// let root = tree.add_state(Tick, Placement::root()).unwrap();
/// let a = tree.add_state(Tick, Placement::child_of(root)).unwrap();
/// let b = tree.add_state(Tick, Placement::child_of(root)).unwrap();
///
/// let path = Path::from_node(&tree, b).unwrap();
/// assert_eq!(path.decisions().get(&root), Some(&b));
/// assert_eq!(path.last_node(&tree).unwrap(), b);
/// assert!(!path.contains(&tree, a).unwrap());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path {
    tree: TreeInstanceId,
    root: NodeId,
    decisions: IndexMap<NodeId, NodeId>,
    end: Option<NodeId>,
}

impl Path {
    /// A path from `root` with no decisions yet.
    ///
    /// # Errors
    ///
    /// [`PathError::NotARoot`] when `root` has a parent.
    pub fn from_root<S>(tree: &Tree<S>, root: NodeId) -> Result<Self, PathError> {
        if tree.node(root)?.parent().is_some() {
            return Err(PathError::NotARoot { node: root });
        }
        Ok(Self {
            tree: tree.instance_id(),
            root,
            decisions: IndexMap::new(),
            end: None,
        })
    }

    /// The path through `node`.
    ///
    /// Walks upward to the root recording, at every ancestor with more
    /// than one child, the child that leads to `node`. Below `node` the
    /// path is open and may still hit undecided forks.
    pub fn from_node<S>(tree: &Tree<S>, node: NodeId) -> Result<Self, PathError> {
        Self::walk_up(tree, node, None)
    }

    /// The path from the root to `node`, ending there.
    pub fn ending_at<S>(tree: &Tree<S>, node: NodeId) -> Result<Self, PathError> {
        Self::walk_up(tree, node, Some(node))
    }

    fn walk_up<S>(tree: &Tree<S>, node: NodeId, end: Option<NodeId>) -> Result<Self, PathError> {
        let mut decisions = IndexMap::new();
        let mut current = tree.node(node)?;
        loop {
            if let Some(block) = tree.block_of_node(current) {
                current = tree.node_ref(block.first());
            }
            let Some(parent) = current.parent else {
                break;
            };
            let p = tree.node_ref(parent);
            if p.children.len() > 1 {
                decisions.insert(parent, current.id);
            }
            current = p;
        }
        Ok(Self {
            tree: tree.instance_id(),
            root: current.id,
            decisions,
            end,
        })
    }

    /// Record that the path continues from `node` to `child`.
    pub fn with_decision<S>(
        mut self,
        tree: &Tree<S>,
        node: NodeId,
        child: NodeId,
    ) -> Result<Self, PathError> {
        self.check_tree(tree)?;
        if !tree.children(node)?.contains(&child) {
            return Err(PathError::NotAChild { node, child });
        }
        self.decisions.insert(node, child);
        Ok(self)
    }

    /// Id of the tree this path was built over.
    pub fn tree_id(&self) -> TreeInstanceId {
        self.tree
    }

    /// First node of the path.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The node the path is cut off at, if any.
    pub fn end(&self) -> Option<NodeId> {
        self.end
    }

    /// Recorded fork decisions, `node -> chosen child`.
    pub fn decisions(&self) -> &IndexMap<NodeId, NodeId> {
        &self.decisions
    }

    fn check_tree<S>(&self, tree: &Tree<S>) -> Result<(), PathError> {
        if tree.instance_id() != self.tree {
            return Err(PathError::ForeignTree {
                path_tree: self.tree,
                tree: tree.instance_id(),
            });
        }
        Ok(())
    }

    /// The node following `node` on this path.
    ///
    /// # Errors
    ///
    /// [`PathError::EndOfPath`] at the end node or a leaf,
    /// [`PathError::UndecidedFork`] at a fork without a decision.
    pub fn next_node<S>(&self, tree: &Tree<S>, node: NodeId) -> Result<NodeId, PathError> {
        self.check_tree(tree)?;
        let children = tree.children(node)?;
        if self.end == Some(node) {
            return Err(PathError::EndOfPath { node });
        }
        if let Some(&child) = self.decisions.get(&node) {
            return Ok(child);
        }
        match children {
            [] => Err(PathError::EndOfPath { node }),
            [only] => Ok(*only),
            _ => Err(PathError::UndecidedFork {
                node,
                children: children.len(),
            }),
        }
    }

    /// The path as block runs and loose nodes, root first.
    pub fn segments<'t, S>(&self, tree: &'t Tree<S>) -> Result<Vec<Segment<'t>>, PathError> {
        self.check_tree(tree)?;
        let end = match self.end {
            Some(end) => Some(tree.node(end)?),
            None => None,
        };

        let mut segments = Vec::new();
        let mut current = self.root;
        loop {
            let node = tree.node(current)?;
            let segment = match tree.block_of_node(node) {
                Some(block) => {
                    let start = node.block_pos as usize;
                    let stop = match end {
                        Some(end) if end.block == node.block && end.block_pos >= node.block_pos => {
                            end.block_pos as usize
                        }
                        _ => block.len() - 1,
                    };
                    match &block.members()[start..=stop] {
                        [only] => Segment::Single(*only),
                        run => Segment::Run(run),
                    }
                }
                None => Segment::Single(current),
            };
            let last = segment.last();
            segments.push(segment);
            match self.next_node(tree, last) {
                Ok(next) => current = next,
                Err(PathError::EndOfPath { .. }) => return Ok(segments),
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolve the path for random access.
    pub fn index<'t, S>(&self, tree: &'t Tree<S>) -> Result<PathIndex<'t>, PathError> {
        Ok(PathIndex::new(self.segments(tree)?))
    }

    /// Number of nodes on the path.
    pub fn len<S>(&self, tree: &Tree<S>) -> Result<usize, PathError> {
        Ok(self.index(tree)?.len())
    }

    /// Node at `index`, counting from the root.
    pub fn get<S>(&self, tree: &Tree<S>, index: usize) -> Result<NodeId, PathError> {
        let resolved = self.index(tree)?;
        resolved.get(index).ok_or(PathError::IndexOutOfRange {
            index,
            len: resolved.len(),
        })
    }

    /// Node `index` steps back from the end; `0` is the last node.
    pub fn get_from_end<S>(&self, tree: &Tree<S>, index: usize) -> Result<NodeId, PathError> {
        let resolved = self.index(tree)?;
        let len = resolved.len();
        len.checked_sub(index + 1)
            .and_then(|i| resolved.get(i))
            .ok_or(PathError::IndexOutOfRange { index, len })
    }

    /// All nodes of the path, root first.
    pub fn iter<S>(&self, tree: &Tree<S>) -> Result<std::vec::IntoIter<NodeId>, PathError> {
        Ok(self.index(tree)?.iter().collect::<Vec<_>>().into_iter())
    }

    /// Last node of the path.
    pub fn last_node<S>(&self, tree: &Tree<S>) -> Result<NodeId, PathError> {
        let segments = self.segments(tree)?;
        Ok(segments.last().map_or(self.root, Segment::last))
    }

    /// Whether `node` lies on this path.
    ///
    /// Walks upward from `node`, so the cost does not depend on how much
    /// of the path lies below it.
    pub fn contains<S>(&self, tree: &Tree<S>, node: NodeId) -> Result<bool, PathError> {
        self.check_tree(tree)?;
        let end = match self.end {
            Some(end) => Some(tree.node(end)?),
            None => None,
        };
        let mut current = tree.node(node)?;
        loop {
            if let Some(block) = tree.block_of_node(current) {
                if let Some(end) = end {
                    if end.block == current.block && end.block_pos < current.block_pos {
                        return Ok(false);
                    }
                }
                current = tree.node_ref(block.first());
            }
            let Some(parent) = current.parent else {
                return Ok(current.id == self.root);
            };
            match self.next_node(tree, parent) {
                Ok(next) if next == current.id => {}
                Ok(_) | Err(PathError::EndOfPath { .. } | PathError::UndecidedFork { .. }) => {
                    return Ok(false)
                }
                Err(e) => return Err(e),
            }
            current = tree.node_ref(parent);
        }
    }

    // ── Lookups ──────────────────────────────────────────────────

    /// Bracket `value` with a function that is monotonic along the path.
    pub fn bracket_by_monotonic_function<S>(
        &self,
        tree: &Tree<S>,
        function: impl Fn(&Node<S>) -> f64,
        value: f64,
    ) -> Result<Bracket<NodeId>, PathError> {
        let resolved = self.index(tree)?;
        let bracket = binary_search_by_index(
            resolved.len(),
            |i| function(tree.node_ref(resolved.at(i))),
            value,
        );
        Ok(bracket.map(|i| resolved.at(i)))
    }

    /// Find a node by a function that is monotonic along the path.
    ///
    /// # Errors
    ///
    /// [`PathError::NotFound`] when the requested side does not exist.
    pub fn get_node_by_monotonic_function<S>(
        &self,
        tree: &Tree<S>,
        function: impl Fn(&Node<S>) -> f64,
        value: f64,
        rounding: Rounding,
    ) -> Result<Rounded<NodeId>, PathError> {
        let bracket = self.bracket_by_monotonic_function(tree, &function, value)?;
        bracket
            .round(rounding, value, |&id| function(tree.node_ref(id)))
            .ok_or(PathError::NotFound { value })
    }

    /// Find a node by clock.
    pub fn get_node_by_clock<S>(
        &self,
        tree: &Tree<S>,
        clock: f64,
        rounding: Rounding,
    ) -> Result<Rounded<NodeId>, PathError> {
        self.get_node_by_monotonic_function(tree, Node::clock, clock, rounding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Placement;
    use braid_core::State;

    #[derive(Clone, Debug, PartialEq)]
    struct Num(i64);
    impl State for Num {}

    struct Fixture {
        tree: Tree<Num>,
        /// root .. main[8], with a fork at main[3]
        main: Vec<NodeId>,
        /// side[0] is the second child of main[3]
        side: Vec<NodeId>,
    }

    fn fixture() -> Fixture {
        let mut tree = Tree::new();
        let mut main = vec![tree.add_state(Num(0), Placement::root()).unwrap()];
        for i in 1..=8 {
            main.push(tree.add_stepped_state(main[i - 1], Num(i as i64), None).unwrap());
        }
        let mut side = vec![tree.add_stepped_state(main[3], Num(-4), None).unwrap()];
        for i in 1..3 {
            side.push(tree.add_stepped_state(side[i - 1], Num(-4 - i as i64), None).unwrap());
        }
        Fixture { tree, main, side }
    }

    #[test]
    fn from_node_records_fork_decisions() {
        let f = fixture();
        let path = Path::from_node(&f.tree, f.side[2]).unwrap();
        assert_eq!(path.root(), f.main[0]);
        assert_eq!(path.decisions().len(), 1);
        assert_eq!(path.decisions().get(&f.main[3]), Some(&f.side[0]));

        let nodes: Vec<NodeId> = path.iter(&f.tree).unwrap().collect();
        let mut expected = f.main[..4].to_vec();
        expected.extend(&f.side);
        assert_eq!(nodes, expected);
    }

    #[test]
    fn undecided_fork_is_an_error() {
        let f = fixture();
        let path = Path::from_root(&f.tree, f.main[0]).unwrap();
        assert_eq!(
            path.len(&f.tree),
            Err(PathError::UndecidedFork {
                node: f.main[3],
                children: 2
            })
        );
        let decided = path.with_decision(&f.tree, f.main[3], f.main[4]).unwrap();
        assert_eq!(decided.len(&f.tree).unwrap(), 9);
    }

    #[test]
    fn next_node_rules() {
        let f = fixture();
        let path = Path::ending_at(&f.tree, f.main[6]).unwrap();
        assert_eq!(path.next_node(&f.tree, f.main[3]).unwrap(), f.main[4]);
        assert_eq!(path.next_node(&f.tree, f.main[5]).unwrap(), f.main[6]);
        assert_eq!(
            path.next_node(&f.tree, f.main[6]),
            Err(PathError::EndOfPath { node: f.main[6] })
        );
        let open = Path::from_node(&f.tree, f.side[0]).unwrap();
        assert_eq!(
            open.next_node(&f.tree, f.side[2]),
            Err(PathError::EndOfPath { node: f.side[2] })
        );
    }

    #[test]
    fn segments_follow_blocks() {
        let f = fixture();
        let path = Path::ending_at(&f.tree, f.main[6]).unwrap();
        let segments = path.segments(&f.tree).unwrap();
        assert_eq!(
            segments,
            vec![Segment::Run(&f.main[..4]), Segment::Run(&f.main[4..7])]
        );
    }

    #[test]
    fn end_inside_block_single_member() {
        let f = fixture();
        let path = Path::ending_at(&f.tree, f.main[4]).unwrap();
        let segments = path.segments(&f.tree).unwrap();
        assert_eq!(segments.last(), Some(&Segment::Single(f.main[4])));
        assert_eq!(path.len(&f.tree).unwrap(), 5);
    }

    #[test]
    fn indexing() {
        let f = fixture();
        let path = Path::ending_at(&f.tree, f.main[8]).unwrap();
        for (i, &id) in f.main.iter().enumerate() {
            assert_eq!(path.get(&f.tree, i).unwrap(), id);
        }
        assert_eq!(
            path.get(&f.tree, 9),
            Err(PathError::IndexOutOfRange { index: 9, len: 9 })
        );
        assert_eq!(path.get_from_end(&f.tree, 0).unwrap(), f.main[8]);
        assert_eq!(path.get_from_end(&f.tree, 8).unwrap(), f.main[0]);
        assert!(path.get_from_end(&f.tree, 9).is_err());
        assert_eq!(path.last_node(&f.tree).unwrap(), f.main[8]);
    }

    #[test]
    fn contains_respects_decisions_and_end() {
        let f = fixture();
        let path = Path::ending_at(&f.tree, f.main[6]).unwrap();
        assert!(path.contains(&f.tree, f.main[0]).unwrap());
        assert!(path.contains(&f.tree, f.main[6]).unwrap());
        assert!(!path.contains(&f.tree, f.main[7]).unwrap());
        assert!(!path.contains(&f.tree, f.side[1]).unwrap());

        let side = Path::from_node(&f.tree, f.side[1]).unwrap();
        assert!(side.contains(&f.tree, f.side[2]).unwrap());
        assert!(side.contains(&f.tree, f.main[2]).unwrap());
        assert!(!side.contains(&f.tree, f.main[4]).unwrap());
    }

    #[test]
    fn clock_lookup() {
        let f = fixture();
        let path = Path::ending_at(&f.tree, f.main[8]).unwrap();
        let single = |clock, rounding| {
            path.get_node_by_clock(&f.tree, clock, rounding)
                .map(|r| r.into_single().unwrap())
        };
        assert_eq!(single(3.0, Rounding::Exact), Ok(f.main[3]));
        assert_eq!(single(3.4, Rounding::Low), Ok(f.main[3]));
        assert_eq!(single(3.4, Rounding::High), Ok(f.main[4]));
        assert_eq!(single(3.6, Rounding::Closest), Ok(f.main[4]));
        assert_eq!(single(3.5, Rounding::Closest), Ok(f.main[3]));
        assert_eq!(single(9.0, Rounding::Low), Ok(f.main[8]));
        assert_eq!(
            single(3.4, Rounding::Exact),
            Err(PathError::NotFound { value: 3.4 })
        );
        assert_eq!(
            single(9.0, Rounding::High),
            Err(PathError::NotFound { value: 9.0 })
        );
        assert_eq!(
            path.get_node_by_clock(&f.tree, -1.0, Rounding::Both),
            Ok(Rounded::Both(None, Some(f.main[0])))
        );
    }

    #[test]
    fn paths_are_bound_to_their_tree() {
        let f = fixture();
        let other: Tree<Num> = Tree::new();
        let path = Path::from_node(&f.tree, f.main[1]).unwrap();
        assert!(matches!(
            path.len(&other),
            Err(PathError::ForeignTree { .. })
        ));
        assert_eq!(
            Path::from_root(&f.tree, f.main[1]),
            Err(PathError::NotARoot { node: f.main[1] })
        );
        assert_eq!(
            path.with_decision(&f.tree, f.main[3], f.main[2]),
            Err(PathError::NotAChild {
                node: f.main[3],
                child: f.main[2]
            })
        );
    }
}
