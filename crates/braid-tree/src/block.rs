//! Compacted runs of untouched single-child nodes.
//!
//! A [`Block`] is an ordered run of at least two untouched nodes where
//! every member but the last has exactly one child, the next member.
//! Blocks let paths and leaf searches hop over long linear histories in
//! one step while every member stays individually addressable.
//!
//! Blocks are stored in the owning [`Tree`](crate::Tree)'s block arena;
//! all mutation (`append_node`, `prepend_node`, `add_node_list`, `split`)
//! goes through the tree because it touches member back-references.

use braid_core::{BlockId, NodeId};

/// A compacted run of nodes. See the [module docs](self).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub(crate) id: BlockId,
    pub(crate) members: Vec<NodeId>,
}

impl Block {
    /// This block's id.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Members from first (oldest) to last.
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Number of members (always at least 2).
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Oldest member.
    pub fn first(&self) -> NodeId {
        self.members[0]
    }

    /// Newest member.
    pub fn last(&self) -> NodeId {
        self.members[self.members.len() - 1]
    }
}
