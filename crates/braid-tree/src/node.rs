//! Tree nodes and insertion placement.

use std::sync::Arc;

use braid_core::{BlockId, NodeId, Stamped, StepProfile};
use smallvec::SmallVec;

/// One computed state and its links inside a [`Tree`](crate::Tree).
///
/// Links are arena indices. The state itself is shared (`Arc`) so that
/// history lookups can hand it out without copying.
#[derive(Debug)]
pub struct Node<S> {
    pub(crate) id: NodeId,
    pub(crate) state: Arc<S>,
    pub(crate) clock: f64,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: SmallVec<[NodeId; 2]>,
    pub(crate) touched: bool,
    pub(crate) template: Option<NodeId>,
    pub(crate) derived_nodes: Vec<NodeId>,
    pub(crate) block: Option<BlockId>,
    /// Position inside `block`; meaningless when `block` is `None`.
    pub(crate) block_pos: u32,
    pub(crate) still_in_editing: bool,
    pub(crate) step_profile: Option<StepProfile>,
    pub(crate) ends_world: bool,
}

impl<S> Node<S> {
    /// This node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The wrapped state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The wrapped state as a shared handle.
    pub fn shared_state(&self) -> Arc<S> {
        Arc::clone(&self.state)
    }

    /// The state with its clock.
    pub fn stamped(&self) -> Stamped<S> {
        Stamped {
            clock: self.clock,
            state: Arc::clone(&self.state),
        }
    }

    /// Engine-assigned clock.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Parent node, `None` for roots.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether this node is a root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this node was created by a user edit rather than by stepping.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// The node this one was forked from by editing.
    pub fn template(&self) -> Option<NodeId> {
        self.template
    }

    /// Nodes forked from this one by editing.
    pub fn derived_nodes(&self) -> &[NodeId] {
        &self.derived_nodes
    }

    /// The block this node belongs to.
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    /// Whether this node is an unfinished edit. Such nodes are never
    /// crunched from.
    pub fn still_in_editing(&self) -> bool {
        self.still_in_editing
    }

    /// The step profile that produced this node, for stepped nodes.
    pub fn step_profile(&self) -> Option<&StepProfile> {
        self.step_profile.as_ref()
    }

    /// Whether the simulation signalled that no state follows this one.
    pub fn ends_world(&self) -> bool {
        self.ends_world
    }
}

/// Where and how a new state enters the tree.
///
/// ```
/// use braid_tree::Placement;
///
/// let root = Placement::root();
/// assert!(root.parent.is_none() && !root.touched);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Placement {
    /// Parent node, `None` for a new root.
    pub parent: Option<NodeId>,
    /// Whether the node is a user edit.
    pub touched: bool,
    /// The node this one was forked from by editing. Touched only.
    pub template: Option<NodeId>,
    /// Step profile that produced the state.
    pub step_profile: Option<StepProfile>,
}

impl Placement {
    /// An untouched root.
    pub fn root() -> Self {
        Self::default()
    }

    /// An untouched child of `parent`.
    pub fn child_of(parent: NodeId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// Mark the node as a user edit.
    pub fn touched(mut self) -> Self {
        self.touched = true;
        self
    }

    /// Record the template this edit was forked from.
    pub fn from_template(mut self, template: NodeId) -> Self {
        self.template = Some(template);
        self
    }

    /// Record the producing step profile.
    pub fn with_step_profile(mut self, profile: Option<StepProfile>) -> Self {
        self.step_profile = profile;
        self
    }
}
