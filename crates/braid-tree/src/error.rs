//! Error types for tree, block and path operations.
//!
//! All of these are structural rejections: the offending call has no
//! effect on the tree.

use braid_core::{BlockId, NodeId, TreeInstanceId};
use thiserror::Error;

/// Errors from node insertion, editing and lookup.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TreeError {
    /// The id belongs to a different tree.
    #[error("node {node} belongs to another tree (this tree is {tree})")]
    ForeignNode {
        /// The rejected id.
        node: NodeId,
        /// This tree's instance id.
        tree: TreeInstanceId,
    },
    /// The id is past the end of the arena.
    #[error("unknown node {node}")]
    UnknownNode {
        /// The rejected id.
        node: NodeId,
    },
    /// The template's parent differs from the requested parent.
    #[error("template {template} has parent {expected:?}, not {got:?}")]
    TemplateParentMismatch {
        /// The template node.
        template: NodeId,
        /// The template's actual parent.
        expected: Option<NodeId>,
        /// The parent requested for the new node.
        got: Option<NodeId>,
    },
    /// A template was given for an untouched node.
    #[error("untouched nodes cannot have a template (got {template})")]
    UntouchedWithTemplate {
        /// The template node.
        template: NodeId,
    },
    /// The new node's clock precedes its parent's.
    #[error("clock {clock} precedes parent clock {parent_clock}")]
    ClockRegression {
        /// The new node's clock.
        clock: f64,
        /// The parent's clock.
        parent_clock: f64,
    },
    /// The clock is NaN.
    #[error("clock is NaN")]
    InvalidClock,
    /// The node is not open for editing.
    #[error("node {node} is not in editing")]
    NotEditing {
        /// The node.
        node: NodeId,
    },
    /// The arena cannot address more nodes.
    #[error("tree is full")]
    Full,
    /// A structural invariant does not hold.
    #[error("invariant violated: {reason}")]
    InvariantViolated {
        /// Description of the violation.
        reason: String,
    },
}

/// Errors from block construction, extension and splitting.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum BlockError {
    /// The block id does not name a live block.
    #[error("unknown {block}")]
    UnknownBlock {
        /// The block.
        block: BlockId,
    },
    /// The node is not a member of the block.
    #[error("node {node} is not a member of {block}")]
    NotAMember {
        /// The node.
        node: NodeId,
        /// The block.
        block: BlockId,
    },
    /// The node is not adjacent to the block's ends.
    #[error("node {node} is not adjacent to {block}")]
    NotAdjacent {
        /// The node.
        node: NodeId,
        /// The block.
        block: BlockId,
    },
    /// Touched nodes are never blocked.
    #[error("node {node} is touched")]
    Touched {
        /// The node.
        node: NodeId,
    },
    /// The node already belongs to a block.
    #[error("node {node} already belongs to {block}")]
    AlreadyBlocked {
        /// The node.
        node: NodeId,
        /// Its current block.
        block: BlockId,
    },
    /// A non-last member would have more than one child.
    #[error("node {node} has {children} children and cannot precede another member")]
    Fork {
        /// The node.
        node: NodeId,
        /// Its child count.
        children: usize,
    },
    /// The offered members do not form a parent-to-child chain.
    #[error("node {node} is not the only child of the previous member")]
    NotChained {
        /// The first node out of line.
        node: NodeId,
    },
    /// Blocks need at least two members.
    #[error("a block needs at least 2 members, got {len}")]
    TooShort {
        /// The offered member count.
        len: usize,
    },
    /// A node id was rejected by the tree.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Errors from path construction, traversal and lookup.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PathError {
    /// The path was built over a different tree.
    #[error("path belongs to tree {path_tree}, not {tree}")]
    ForeignTree {
        /// The path's tree.
        path_tree: TreeInstanceId,
        /// The tree it was used with.
        tree: TreeInstanceId,
    },
    /// A path must start at a root.
    #[error("node {node} is not a root")]
    NotARoot {
        /// The rejected start node.
        node: NodeId,
    },
    /// There is no history after this node on the path.
    #[error("no history after node {node}")]
    EndOfPath {
        /// The last node.
        node: NodeId,
    },
    /// The path reaches a fork it has no decision for.
    #[error("node {node} has {children} children and no recorded decision")]
    UndecidedFork {
        /// The forking node.
        node: NodeId,
        /// Its child count.
        children: usize,
    },
    /// A decision names a node that is not a child.
    #[error("node {child} is not a child of {node}")]
    NotAChild {
        /// The deciding node.
        node: NodeId,
        /// The rejected choice.
        child: NodeId,
    },
    /// No node satisfies the requested rounding.
    #[error("no node found for value {value} with the requested rounding")]
    NotFound {
        /// The searched value.
        value: f64,
    },
    /// Index past the end of the path.
    #[error("index {index} out of range for path of length {len}")]
    IndexOutOfRange {
        /// The index.
        index: usize,
        /// Path length.
        len: usize,
    },
    /// A node id was rejected by the tree.
    #[error(transparent)]
    Tree(#[from] TreeError),
}
