//! Arena-owned branching history for braid.
//!
//! A [`Tree`] owns every computed state as a [`Node`] in a flat arena;
//! parent, child, template and block links are [`NodeId`]/[`BlockId`]
//! indices, so there are no reference cycles and no node is ever freed.
//! Long linear runs of untouched nodes are compacted into [`Block`]s,
//! and a [`Path`] resolves forks into one linear, binary-searchable
//! timeline.
//!
//! The tree has no concurrency awareness of its own. The engine keeps it
//! behind a read-write lock and performs every mutation under the write
//! guard.
//!
//! [`NodeId`]: braid_core::NodeId
//! [`BlockId`]: braid_core::BlockId

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod block;
pub mod error;
pub mod node;
pub mod path;
pub mod tree;

pub use block::Block;
pub use error::{BlockError, PathError, TreeError};
pub use node::{Node, Placement};
pub use path::{Path, PathIndex, Segment};
pub use tree::{Leaf, Tree};
