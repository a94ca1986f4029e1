//! The arena-owned tree of computed states.
//!
//! [`Tree`] is the single owner of every [`Node`] and [`Block`]. Nodes
//! are appended to a flat `Vec` and never removed, so a [`NodeId`] stays
//! valid for the lifetime of the tree and `len()` never decreases. Blocks
//! live in a second arena; a dissolved block leaves a `None` slot so
//! block ids are never reused.
//!
//! Block compaction is maintained by [`Tree::add_state`]:
//!
//! - an untouched node whose untouched parent now has exactly one child
//!   extends the parent's block, or forms a new `{parent, node}` block;
//! - a parent that gains a second child while in the middle of a block
//!   splits that block so the parent becomes its last member.

use std::sync::Arc;

use braid_core::{
    resolve_clock, BlockId, CrunchAmount, NodeId, State, StepProfile, TreeInstanceId,
};
use log::trace;
use smallvec::SmallVec;

use crate::block::Block;
use crate::error::{BlockError, PathError, TreeError};
use crate::node::{Node, Placement};
use crate::path::Path;

/// A leaf reported by [`Tree::leaves`], with its distance from the
/// origin node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leaf {
    /// The leaf node.
    pub node: NodeId,
    /// Number of hops from the origin.
    pub depth: u64,
    /// Clock difference from the origin.
    pub clock_distance: f64,
}

/// Owner of all nodes, roots and blocks of one branching history.
///
/// The tree performs no locking. The engine wraps it in a read-write
/// lock and mutates it only under the write guard.
#[derive(Debug)]
pub struct Tree<S> {
    instance: TreeInstanceId,
    nodes: Vec<Node<S>>,
    roots: Vec<NodeId>,
    blocks: Vec<Option<Block>>,
}

impl<S> Default for Tree<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Tree<S> {
    /// Create an empty tree with a fresh instance id.
    pub fn new() -> Self {
        Self {
            instance: TreeInstanceId::next(),
            nodes: Vec::new(),
            roots: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// The id stamped into every [`NodeId`] of this tree.
    pub fn instance_id(&self) -> TreeInstanceId {
        self.instance
    }

    /// Number of nodes. Never decreases.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root nodes in creation order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<S>> + '_ {
        self.nodes.iter()
    }

    /// Whether `id` names a node of this tree.
    pub fn contains(&self, id: NodeId) -> bool {
        self.index_of(id).is_ok()
    }

    fn index_of(&self, id: NodeId) -> Result<usize, TreeError> {
        if id.tree() != self.instance {
            return Err(TreeError::ForeignNode {
                node: id,
                tree: self.instance,
            });
        }
        if id.index() >= self.nodes.len() {
            return Err(TreeError::UnknownNode { node: id });
        }
        Ok(id.index())
    }

    /// Look up a node.
    ///
    /// # Errors
    ///
    /// [`TreeError::ForeignNode`] or [`TreeError::UnknownNode`].
    pub fn node(&self, id: NodeId) -> Result<&Node<S>, TreeError> {
        let index = self.index_of(id)?;
        Ok(&self.nodes[index])
    }

    /// Node for an id already known to belong to this tree.
    pub(crate) fn node_ref(&self, id: NodeId) -> &Node<S> {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<S>, TreeError> {
        let index = self.index_of(id)?;
        Ok(&mut self.nodes[index])
    }

    /// Children of `id` in insertion order.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], TreeError> {
        Ok(self.node(id)?.children())
    }

    /// Ancestors of `id`, nearest first, ending at its root.
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut ancestors = Vec::new();
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            ancestors.push(parent);
            current = &self.nodes[parent.index()];
        }
        Ok(ancestors)
    }

    /// Number of ancestors of `id`; roots have depth 0.
    ///
    /// Hops over blocks, so the cost is proportional to the number of
    /// forks and blocks above the node rather than its depth.
    pub fn depth(&self, id: NodeId) -> Result<u64, TreeError> {
        let mut depth = 0u64;
        let mut current = self.node(id)?;
        loop {
            if let Some(block) = self.block_of_node(current) {
                depth += u64::from(current.block_pos);
                current = &self.nodes[block.first().index()];
            }
            match current.parent {
                Some(parent) => {
                    depth += 1;
                    current = &self.nodes[parent.index()];
                }
                None => return Ok(depth),
            }
        }
    }

    /// Leaves under `from` (including `from` itself when it is a leaf).
    ///
    /// With `within`, only leaves no further than that many nodes or that
    /// much clock from `from` are reported. Blocks are crossed in one hop.
    pub fn leaves(
        &self,
        from: NodeId,
        within: Option<CrunchAmount>,
    ) -> Result<Vec<Leaf>, TreeError> {
        let origin_clock = self.node(from)?.clock;
        let mut leaves = Vec::new();
        let mut stack = vec![(from, 0u64)];
        while let Some((id, depth)) = stack.pop() {
            let (id, depth) = self.hop_to_block_end(id, depth);
            let node = &self.nodes[id.index()];
            let clock_distance = node.clock - origin_clock;
            if let Some(amount) = within {
                // Clocks and depths only grow downwards, so the whole
                // subtree is out of reach too.
                if !amount.reaches(depth, clock_distance) {
                    continue;
                }
            }
            if node.children.is_empty() {
                leaves.push(Leaf {
                    node: id,
                    depth,
                    clock_distance,
                });
            } else {
                stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
            }
        }
        Ok(leaves)
    }

    fn hop_to_block_end(&self, id: NodeId, depth: u64) -> (NodeId, u64) {
        let node = &self.nodes[id.index()];
        match self.block_of_node(node) {
            Some(block) => {
                let last_pos = block.len() as u64 - 1;
                (block.last(), depth + last_pos - u64::from(node.block_pos))
            }
            None => (id, depth),
        }
    }

    /// Every root-to-leaf path in the tree.
    pub fn all_possible_paths(&self) -> Result<Vec<Path>, PathError> {
        let mut paths = Vec::new();
        for &root in &self.roots {
            for leaf in self.leaves(root, None)? {
                paths.push(Path::ending_at(self, leaf.node)?);
            }
        }
        Ok(paths)
    }

    /// Flag `id` as the last state of its world.
    pub fn mark_world_end(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.node_mut(id)?.ends_world = true;
        Ok(())
    }

    /// Close an edit: `id` becomes an ordinary touched node. Idempotent.
    pub fn finalize_edit(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.node_mut(id)?.still_in_editing = false;
        Ok(())
    }

    // ── Blocks ───────────────────────────────────────────────────

    /// Look up a live block.
    pub fn block(&self, block: BlockId) -> Result<&Block, BlockError> {
        self.blocks
            .get(block.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BlockError::UnknownBlock { block })
    }

    fn block_mut(&mut self, block: BlockId) -> Result<&mut Block, BlockError> {
        self.blocks
            .get_mut(block.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(BlockError::UnknownBlock { block })
    }

    /// All live blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.blocks.iter().flatten()
    }

    pub(crate) fn block_of_node(&self, node: &Node<S>) -> Option<&Block> {
        node.block
            .and_then(|block| self.blocks.get(block.0 as usize))
            .and_then(Option::as_ref)
    }

    fn check_unblocked(&self, id: NodeId) -> Result<(), BlockError> {
        let node = self.node(id)?;
        if node.touched {
            return Err(BlockError::Touched { node: id });
        }
        if let Some(block) = node.block {
            return Err(BlockError::AlreadyBlocked { node: id, block });
        }
        Ok(())
    }

    fn check_single_child(&self, id: NodeId) -> Result<(), BlockError> {
        let children = self.node(id)?.children.len();
        if children != 1 {
            return Err(BlockError::Fork { node: id, children });
        }
        Ok(())
    }

    fn next_block_id(&self) -> Result<BlockId, TreeError> {
        u32::try_from(self.blocks.len())
            .map(BlockId)
            .map_err(|_| TreeError::Full)
    }

    fn install_block(&mut self, members: Vec<NodeId>) -> Result<BlockId, TreeError> {
        let id = self.next_block_id()?;
        for (pos, member) in members.iter().enumerate() {
            let node = &mut self.nodes[member.index()];
            node.block = Some(id);
            node.block_pos = pos as u32;
        }
        trace!("created {id} with {} members", members.len());
        self.blocks.push(Some(Block { id, members }));
        Ok(id)
    }

    fn renumber(&mut self, block: BlockId) {
        let Self { nodes, blocks, .. } = self;
        if let Some(Some(b)) = blocks.get(block.0 as usize) {
            for (pos, member) in b.members.iter().enumerate() {
                nodes[member.index()].block_pos = pos as u32;
            }
        }
    }

    fn release(&mut self, members: &[NodeId]) {
        for member in members {
            self.nodes[member.index()].block = None;
        }
    }

    /// Compact a chain of unblocked untouched nodes into a new block.
    ///
    /// # Errors
    ///
    /// [`BlockError::TooShort`], [`BlockError::Touched`],
    /// [`BlockError::AlreadyBlocked`], [`BlockError::Fork`] or
    /// [`BlockError::NotChained`]. Nothing is changed on error.
    pub fn create_block(&mut self, members: &[NodeId]) -> Result<BlockId, BlockError> {
        if members.len() < 2 {
            return Err(BlockError::TooShort { len: members.len() });
        }
        for &member in members {
            self.check_unblocked(member)?;
        }
        self.check_chain(members)?;
        Ok(self.install_block(members.to_vec())?)
    }

    fn check_chain(&self, members: &[NodeId]) -> Result<(), BlockError> {
        for pair in members.windows(2) {
            self.check_single_child(pair[0])?;
            if self.node(pair[1])?.parent != Some(pair[0]) {
                return Err(BlockError::NotChained { node: pair[1] });
            }
        }
        Ok(())
    }

    /// Extend `block` with `node`, the only child of its last member.
    pub fn block_append_node(&mut self, block: BlockId, node: NodeId) -> Result<(), BlockError> {
        let last = self.block(block)?.last();
        self.check_unblocked(node)?;
        if self.node(node)?.parent != Some(last) {
            return Err(BlockError::NotAdjacent { node, block });
        }
        self.check_single_child(last)?;
        let b = self.block_mut(block)?;
        b.members.push(node);
        let pos = b.members.len() - 1;
        let n = &mut self.nodes[node.index()];
        n.block = Some(block);
        n.block_pos = pos as u32;
        Ok(())
    }

    /// Extend `block` with `node`, the parent of its first member.
    pub fn block_prepend_node(&mut self, block: BlockId, node: NodeId) -> Result<(), BlockError> {
        let first = self.block(block)?.first();
        self.check_unblocked(node)?;
        if self.node(first)?.parent != Some(node) {
            return Err(BlockError::NotAdjacent { node, block });
        }
        self.check_single_child(node)?;
        self.block_mut(block)?.members.insert(0, node);
        self.nodes[node.index()].block = Some(block);
        self.renumber(block);
        Ok(())
    }

    /// Extend `block` with a chain of nodes attached at either end.
    ///
    /// The whole chain is validated before the block is touched.
    pub fn block_add_node_list(
        &mut self,
        block: BlockId,
        nodes: &[NodeId],
    ) -> Result<(), BlockError> {
        let (Some(&chain_first), Some(&chain_last)) = (nodes.first(), nodes.last()) else {
            return Ok(());
        };
        let (first, last) = {
            let b = self.block(block)?;
            (b.first(), b.last())
        };
        for &node in nodes {
            self.check_unblocked(node)?;
        }
        self.check_chain(nodes)?;

        let append = if self.node(chain_first)?.parent == Some(last) {
            self.check_single_child(last)?;
            true
        } else if self.node(first)?.parent == Some(chain_last) {
            self.check_single_child(chain_last)?;
            false
        } else {
            return Err(BlockError::NotAdjacent {
                node: chain_first,
                block,
            });
        };

        let b = self.block_mut(block)?;
        if append {
            b.members.extend_from_slice(nodes);
        } else {
            b.members.splice(0..0, nodes.iter().copied());
        }
        for &node in nodes {
            self.nodes[node.index()].block = Some(block);
        }
        self.renumber(block);
        Ok(())
    }

    /// Split `block` so that `at` becomes its last member.
    ///
    /// The members after `at` form a new block when there are at least
    /// two of them and become blockless otherwise. A retained part
    /// shorter than two is dissolved as well.
    pub fn split_block(&mut self, block: BlockId, at: NodeId) -> Result<(), BlockError> {
        self.block(block)?;
        let node = self.node(at)?;
        if node.block != Some(block) {
            return Err(BlockError::NotAMember { node: at, block });
        }
        let pos = node.block_pos as usize;
        // Reserve the remainder's id up front so a full arena changes nothing.
        if self.block(block)?.len() - pos - 1 >= 2 {
            self.next_block_id()?;
        }

        let b = self.block_mut(block)?;
        let remainder = b.members.split_off(pos + 1);
        if b.members.len() < 2 {
            let retained = std::mem::take(&mut b.members);
            self.blocks[block.0 as usize] = None;
            self.release(&retained);
            trace!("dissolved {block}");
        }
        if remainder.len() >= 2 {
            self.install_block(remainder)?;
        } else {
            self.release(&remainder);
        }
        Ok(())
    }

    fn link_into_blocks(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let (children, block, parent_touched) = {
            let p = &self.nodes[parent.index()];
            (p.children.len(), p.block, p.touched)
        };
        let child_touched = self.nodes[child.index()].touched;

        let result = match (children, block) {
            (1, _) if parent_touched || child_touched => Ok(()),
            (1, Some(block)) => self.block_append_node(block, child),
            (1, None) => self.create_block(&[parent, child]).map(drop),
            (_, Some(block)) => self.split_block(block, parent),
            (_, None) => Ok(()),
        };
        result.map_err(|e| match e {
            BlockError::Tree(e) => e,
            other => TreeError::InvariantViolated {
                reason: other.to_string(),
            },
        })
    }

    // ── Invariants ───────────────────────────────────────────────

    /// Validate every structural invariant of the tree.
    ///
    /// Checks parent/child symmetry, clock monotonicity, root
    /// bookkeeping, template placement and the full block invariant.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        let violated = |reason: String| Err(TreeError::InvariantViolated { reason });

        let mut roots = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if node.id.index() != index || node.id.tree() != self.instance {
                return violated(format!("node at {index} carries id {}", node.id));
            }
            match node.parent {
                None => roots.push(node.id),
                Some(parent) => {
                    let p = self.node(parent)?;
                    if !p.children.contains(&node.id) {
                        return violated(format!("{} missing from children of {parent}", node.id));
                    }
                    if node.clock < p.clock {
                        return violated(format!("{} clock precedes its parent", node.id));
                    }
                }
            }
            for &child in &node.children {
                if self.node(child)?.parent != Some(node.id) {
                    return violated(format!("{child} does not point back to {}", node.id));
                }
            }
            if let Some(template) = node.template {
                if self.node(template)?.parent != node.parent {
                    return violated(format!("{} is not a sibling of its template", node.id));
                }
            }
            if let Some(block) = node.block {
                let b = self.block(block).map_err(|e| TreeError::InvariantViolated {
                    reason: format!("{}: {e}", node.id),
                })?;
                if b.members.get(node.block_pos as usize) != Some(&node.id) {
                    return violated(format!("{} has a stale position in {block}", node.id));
                }
            }
        }
        if roots != self.roots {
            return violated("roots list out of sync".into());
        }

        for block in self.blocks() {
            if block.members.len() < 2 {
                return violated(format!("{} has {} members", block.id, block.members.len()));
            }
            for (pos, &member) in block.members.iter().enumerate() {
                let node = self.node(member)?;
                if node.touched {
                    return violated(format!("{member} in {} is touched", block.id));
                }
                if node.block != Some(block.id) {
                    return violated(format!("{member} does not point back to {}", block.id));
                }
                if let Some(&next) = block.members.get(pos + 1) {
                    if node.children.as_slice() != [next] {
                        return violated(format!(
                            "{member} in {} does not have {next} as its only child",
                            block.id
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<S: State> Tree<S> {
    /// Insert a state and return its node id.
    ///
    /// The clock comes from the state when it supplies one, otherwise it
    /// is `0` for a root and the parent's clock plus one for a child.
    ///
    /// # Errors
    ///
    /// Bad ids, [`TreeError::UntouchedWithTemplate`],
    /// [`TreeError::TemplateParentMismatch`], [`TreeError::InvalidClock`]
    /// or [`TreeError::ClockRegression`]. The tree is unchanged on error.
    pub fn add_state(&mut self, state: S, placement: Placement) -> Result<NodeId, TreeError> {
        self.add_shared_state(Arc::new(state), placement)
    }

    /// [`add_state`](Self::add_state) for a state that is already shared,
    /// such as one handed over by a cruncher.
    pub fn add_shared_state(
        &mut self,
        state: Arc<S>,
        placement: Placement,
    ) -> Result<NodeId, TreeError> {
        let parent_clock = match placement.parent {
            Some(parent) => Some(self.node(parent)?.clock),
            None => None,
        };
        if let Some(template) = placement.template {
            if !placement.touched {
                return Err(TreeError::UntouchedWithTemplate { template });
            }
            let expected = self.node(template)?.parent;
            if expected != placement.parent {
                return Err(TreeError::TemplateParentMismatch {
                    template,
                    expected,
                    got: placement.parent,
                });
            }
        }
        let clock = resolve_clock(&*state, parent_clock);
        check_clock(clock, parent_clock)?;

        let index = u32::try_from(self.nodes.len()).map_err(|_| TreeError::Full)?;
        let id = NodeId::new(self.instance, index);
        self.nodes.push(Node {
            id,
            state,
            clock,
            parent: placement.parent,
            children: SmallVec::new(),
            touched: placement.touched,
            template: placement.template,
            derived_nodes: Vec::new(),
            block: None,
            block_pos: 0,
            still_in_editing: false,
            step_profile: placement.step_profile,
            ends_world: false,
        });
        if let Some(template) = placement.template {
            self.nodes[template.index()].derived_nodes.push(id);
        }
        match placement.parent {
            Some(parent) => {
                self.nodes[parent.index()].children.push(id);
                if let Err(e) = self.link_into_blocks(parent, id) {
                    self.unlink_newest(id);
                    return Err(e);
                }
            }
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Undo the bookkeeping of a node that was just pushed and has not
    /// been linked into any block.
    fn unlink_newest(&mut self, id: NodeId) {
        let Some(node) = self.nodes.pop() else {
            return;
        };
        debug_assert_eq!(node.id, id);
        if let Some(parent) = node.parent {
            self.nodes[parent.index()].children.retain(|c| *c != id);
        }
        if let Some(template) = node.template {
            self.nodes[template.index()].derived_nodes.retain(|d| *d != id);
        }
    }

    /// Insert an untouched state produced by stepping from `parent`.
    pub fn add_stepped_state(
        &mut self,
        parent: NodeId,
        state: S,
        step_profile: Option<StepProfile>,
    ) -> Result<NodeId, TreeError> {
        self.add_state(
            state,
            Placement::child_of(parent).with_step_profile(step_profile),
        )
    }

    /// Fork `template` for editing.
    ///
    /// The new node holds a copy of the template's state, is touched and
    /// `still_in_editing`, and is a sibling of the template.
    pub fn fork_to_edit(&mut self, template: NodeId) -> Result<NodeId, TreeError> {
        let (state, parent) = {
            let node = self.node(template)?;
            (S::clone(&node.state), node.parent)
        };
        let placement = Placement {
            parent,
            touched: true,
            template: Some(template),
            step_profile: None,
        };
        let id = self.add_state(state, placement)?;
        self.nodes[id.index()].still_in_editing = true;
        Ok(id)
    }

    /// Modify the state of a node that is still in editing.
    ///
    /// `edit` runs on a copy; the node is only updated when the edited
    /// state's clock still fits between the parent and the children.
    pub fn edit_state(&mut self, id: NodeId, edit: impl FnOnce(&mut S)) -> Result<(), TreeError> {
        let node = self.node(id)?;
        if !node.still_in_editing {
            return Err(TreeError::NotEditing { node: id });
        }
        let parent_clock = node.parent.map(|parent| self.nodes[parent.index()].clock);
        let mut state = S::clone(&node.state);
        edit(&mut state);

        let clock = resolve_clock(&state, parent_clock);
        check_clock(clock, parent_clock)?;
        for &child in &node.children {
            let child_clock = self.nodes[child.index()].clock;
            if child_clock < clock {
                return Err(TreeError::ClockRegression {
                    clock: child_clock,
                    parent_clock: clock,
                });
            }
        }

        let node = &mut self.nodes[id.index()];
        node.state = Arc::new(state);
        node.clock = clock;
        Ok(())
    }
}

fn check_clock(clock: f64, parent_clock: Option<f64>) -> Result<(), TreeError> {
    if clock.is_nan() {
        return Err(TreeError::InvalidClock);
    }
    match parent_clock {
        Some(parent_clock) if clock < parent_clock => Err(TreeError::ClockRegression {
            clock,
            parent_clock,
        }),
        _ => Ok(()),
    }
}
