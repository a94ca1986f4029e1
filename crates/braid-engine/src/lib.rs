//! Background crunching for the braid branching-history engine.
//!
//! This crate puts the [`Tree`] to work. A [`Project`] binds a simulation
//! package to a shared tree and accepts crunching requests; a
//! [`CrunchingManager`] turns those requests into background
//! [crunchers](cruncher), drains their output into the tree and re-keys
//! them as their frontier advances.
//!
//! # Threading model
//!
//! One controller thread owns the [`Project`] and calls
//! [`sync_crunchers`](Project::sync_crunchers). Every cruncher runs on
//! its own named worker thread. The tree sits behind a
//! `parking_lot::RwLock`; only the controller writes to it. History
//! steps read it through a [`HistoryBrowser`].
//!
//! Lock order is always tree first, then a cruncher's output queue.
//!
//! [`Tree`]: braid_tree::Tree

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use braid_tree::Tree;
use parking_lot::RwLock;

pub mod browser;
pub mod config;
pub mod cruncher;
pub mod error;
pub mod manager;
pub mod project;

pub use browser::HistoryBrowser;
pub use config::{ConfigError, CruncherKind, ProjectConfig};
pub use cruncher::{
    Cruncher, CruncherStatus, IsolatedCruncher, Product, RetireReason, ThreadCruncher,
};
pub use error::EngineError;
pub use manager::{CruncherFailure, CruncherInfo, CrunchingManager, ShutdownReport};
pub use project::Project;

/// The tree as shared between the controller and the crunchers.
pub type SharedTree<S> = Arc<RwLock<Tree<S>>>;
