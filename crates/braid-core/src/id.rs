//! Strongly-typed identifiers for trees, nodes, blocks and crunchers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`TreeInstanceId`] allocation.
static TREE_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a tree.
///
/// Allocated from a monotonic atomic counter via [`TreeInstanceId::next`].
/// Every [`NodeId`] carries the instance id of the tree that created it,
/// so a node id handed to the wrong tree is detected instead of silently
/// resolving to an unrelated node at the same arena index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeInstanceId(u64);

impl TreeInstanceId {
    /// Allocate a fresh, unique instance ID. Thread-safe.
    pub fn next() -> Self {
        Self(TREE_INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TreeInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a node inside one tree's arena.
///
/// Nodes are never removed, so the index stays valid for the lifetime of
/// the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    tree: TreeInstanceId,
    index: u32,
}

impl NodeId {
    /// Build a node id. Only tree implementations should need this.
    pub fn new(tree: TreeInstanceId, index: u32) -> Self {
        Self { tree, index }
    }

    /// The tree this node belongs to.
    pub fn tree(&self) -> TreeInstanceId {
        self.tree
    }

    /// Arena index of the node within its tree.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tree, self.index)
    }
}

/// Identifies a block (compacted run of nodes) inside one tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

/// Counter for unique [`CruncherId`] allocation.
static CRUNCHER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a cruncher, stable across frontier re-keying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CruncherId(u64);

impl CruncherId {
    /// Allocate a fresh cruncher id. Thread-safe.
    pub fn next() -> Self {
        Self(CRUNCHER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CruncherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cruncher#{}", self.0)
    }
}
