//! The user-facing project: one tree, one simpack, one manager.
//!
//! A [`Project`] owns the shared tree and the table of crunching
//! requests. Requests are cheap to make and only take effect on the next
//! [`sync_crunchers`](Project::sync_crunchers), which is where work
//! actually moves between the crunchers and the tree. Callers typically
//! poll it from their own loop.

use std::sync::Arc;
use std::time::Duration;

use braid_core::{
    CrunchAmount, CrunchTarget, CrunchingProfile, HistoryHandle, NodeId, Simpack, State,
    StepError, StepProfile, StepStart,
};
use braid_tree::{Node, Path, PathError, Placement, Tree};
use indexmap::IndexMap;
use log::{debug, info, warn};
use parking_lot::{RwLock, RwLockReadGuard};

use crate::browser::HistoryBrowser;
use crate::config::ProjectConfig;
use crate::error::EngineError;
use crate::manager::{CruncherFailure, CruncherInfo, CrunchingManager, ShutdownReport};
use crate::SharedTree;

/// A simulation project.
///
/// ```no_run
/// use braid_core::{CrunchAmount, Simpack, State, StepProfile};
/// use braid_engine::{Project, ProjectConfig};
///
/// #[derive(Clone)]
/// struct Count(u64);
/// impl State for Count {}
///
/// let simpack = Simpack::builder("count")
///     .step(|c: &Count, _: &StepProfile| Ok(Count(c.0 + 1)))
///     .build()
///     .unwrap();
/// let mut project = Project::new(simpack, ProjectConfig::default()).unwrap();
/// let root = project.root_this_state(Count(0)).unwrap();
/// project.begin_crunching(root, CrunchAmount::Nodes(10), None).unwrap();
/// while project.is_crunching() {
///     project.sync_crunchers().unwrap();
///     std::thread::sleep(std::time::Duration::from_millis(5));
/// }
/// assert_eq!(project.read_tree().len(), 11);
/// ```
pub struct Project<S: State> {
    simpack: Simpack<S>,
    config: ProjectConfig,
    tree: SharedTree<S>,
    manager: CrunchingManager<S>,
    /// Outstanding work, keyed by frontier and measured from it.
    crunching_requests: IndexMap<NodeId, CrunchingProfile>,
    shut_down: bool,
}

impl<S: State> Project<S> {
    /// Create a project with an empty tree.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] if `config` does not suit `simpack`.
    pub fn new(simpack: Simpack<S>, config: ProjectConfig) -> Result<Self, EngineError> {
        let history = simpack.is_history_dependent();
        config.validate(simpack.name(), history)?;
        let kind = config.resolved_cruncher(history);
        info!(
            "project for '{}' started with {kind:?} crunchers",
            simpack.name()
        );
        Ok(Self {
            manager: CrunchingManager::new(
                simpack.clone(),
                kind,
                config.thread_name_prefix.clone(),
            ),
            simpack,
            config,
            tree: Arc::new(RwLock::new(Tree::new())),
            crunching_requests: IndexMap::new(),
            shut_down: false,
        })
    }

    /// The bound simulation package.
    pub fn simpack(&self) -> &Simpack<S> {
        &self.simpack
    }

    /// The configuration the project was created with.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Shared handle to the tree. Take the write lock only for short,
    /// non-blocking mutations.
    pub fn tree(&self) -> &SharedTree<S> {
        &self.tree
    }

    /// Read guard over the tree.
    pub fn read_tree(&self) -> RwLockReadGuard<'_, Tree<S>> {
        self.tree.read()
    }

    // ── Roots and editing ────────────────────────────────────────

    /// Insert `state` as a new, untouched root.
    pub fn root_this_state(&mut self, state: S) -> Result<NodeId, EngineError> {
        Ok(self.tree.write().add_state(state, Placement::root())?)
    }

    /// Insert a root from the simpack's `create_root` factory.
    pub fn create_root(&mut self) -> Result<NodeId, EngineError> {
        let state = self
            .simpack
            .create_root()
            .ok_or_else(|| self.no_factory("create_root"))?;
        self.root_this_state(state)
    }

    /// Insert a root from the simpack's `create_messy_root` factory.
    pub fn create_messy_root(&mut self) -> Result<NodeId, EngineError> {
        let state = self
            .simpack
            .create_messy_root()
            .ok_or_else(|| self.no_factory("create_messy_root"))?;
        self.root_this_state(state)
    }

    fn no_factory(&self, factory: &'static str) -> EngineError {
        EngineError::NoRootFactory {
            simpack: self.simpack.name().to_string(),
            factory,
        }
    }

    /// Fork `template` into a touched sibling that is open for editing.
    pub fn fork_to_edit(&mut self, template: NodeId) -> Result<NodeId, EngineError> {
        Ok(self.tree.write().fork_to_edit(template)?)
    }

    /// Modify a node that is still in editing.
    pub fn edit_state(
        &mut self,
        node: NodeId,
        edit: impl FnOnce(&mut S),
    ) -> Result<(), EngineError> {
        Ok(self.tree.write().edit_state(node, edit)?)
    }

    /// Close an edit so the node can be crunched from.
    pub fn finalize_edit(&mut self, node: NodeId) -> Result<(), EngineError> {
        Ok(self.tree.write().finalize_edit(node)?)
    }

    // ── Crunching requests ───────────────────────────────────────

    /// Ask for `amount` more history past `node`.
    ///
    /// The step profile defaults to the one that produced `node`, then the
    /// project default, then the simpack default. An existing request at
    /// the same node is extended, never shortened; an explicit
    /// `step_profile` replaces its profile, and a running cruncher
    /// switches over between two states. Nothing is requested past a node
    /// that ended its world.
    ///
    /// # Errors
    ///
    /// [`EngineError::StillEditing`] for an unfinished edit, bad ids, or
    /// [`EngineError::ShutDown`].
    pub fn begin_crunching(
        &mut self,
        node: NodeId,
        amount: CrunchAmount,
        step_profile: Option<StepProfile>,
    ) -> Result<(), EngineError> {
        self.ensure_running()?;
        let request = {
            let tree = self.tree.read();
            let frontier = tree.node(node)?;
            if frontier.still_in_editing() {
                return Err(EngineError::StillEditing { node });
            }
            if frontier.ends_world() {
                debug!("not crunching past world end at {node}");
                return Ok(());
            }
            CrunchingProfile::new(
                self.step_profile_for(frontier, step_profile.clone()),
                amount.target_from(frontier.clock()),
            )
        };
        let explicit = step_profile.is_some();
        let merged = match self.crunching_requests.get(&node) {
            Some(existing) if explicit => CrunchingProfile::new(
                request.step_profile.clone(),
                existing.merge_max(&request).target,
            ),
            Some(existing) => existing.merge_max(&request),
            None => request,
        };
        debug!("request at {node}: {:?}", merged.target);
        self.crunching_requests.insert(node, merged);
        Ok(())
    }

    /// Withdraw the request at `node`. Its cruncher is retired on the
    /// next sync, keeping what it produced so far. Returns whether a
    /// request was removed.
    pub fn cancel_crunching(&mut self, node: NodeId) -> bool {
        self.crunching_requests.shift_remove(&node).is_some()
    }

    /// Make sure every timeline through `node` has `amount` of history
    /// past it, requesting the shortfall at each leaf.
    pub fn ensure_buffer(&mut self, node: NodeId, amount: CrunchAmount) -> Result<(), EngineError> {
        self.ensure_running()?;
        let requests = {
            let tree = self.tree.read();
            let origin_clock = tree.node(node)?.clock();
            let mut requests = Vec::new();
            for leaf in tree.leaves(node, Some(amount))? {
                let frontier = tree.node(leaf.node)?;
                if frontier.still_in_editing() || frontier.ends_world() {
                    continue;
                }
                let target = shortfall(amount, leaf.depth, origin_clock);
                let request =
                    CrunchingProfile::new(self.step_profile_for(frontier, None), target);
                if !request.state_satisfies(frontier.clock(), 0) {
                    requests.push((leaf.node, request));
                }
            }
            requests
        };
        for (frontier, request) in requests {
            self.request(frontier, request);
        }
        Ok(())
    }

    /// Like [`ensure_buffer`](Self::ensure_buffer), along one path only.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotOnPath`] if `node` is not on `path`;
    /// [`PathError::UndecidedFork`] if the path is open at a fork within
    /// reach.
    pub fn ensure_buffer_on_path(
        &mut self,
        node: NodeId,
        path: &Path,
        amount: CrunchAmount,
    ) -> Result<(), EngineError> {
        self.ensure_running()?;
        let request = {
            let tree = self.tree.read();
            if !path.contains(&tree, node)? {
                return Err(EngineError::NotOnPath { node });
            }
            let origin_clock = tree.node(node)?.clock();
            let mut tip = node;
            let mut depth = 0;
            loop {
                match path.next_node(&tree, tip) {
                    Ok(next) => {
                        depth += 1;
                        let clock_distance = tree.node(next)?.clock() - origin_clock;
                        if !amount.reaches(depth, clock_distance) {
                            return Ok(());
                        }
                        tip = next;
                    }
                    Err(PathError::EndOfPath { .. }) => break,
                    Err(e) => return Err(e.into()),
                }
            }
            let frontier = tree.node(tip)?;
            if frontier.still_in_editing() || frontier.ends_world() {
                return Ok(());
            }
            let request = CrunchingProfile::new(
                self.step_profile_for(frontier, None),
                shortfall(amount, depth, origin_clock),
            );
            if request.state_satisfies(frontier.clock(), 0) {
                return Ok(());
            }
            (tip, request)
        };
        self.request(request.0, request.1);
        Ok(())
    }

    fn request(&mut self, frontier: NodeId, request: CrunchingProfile) {
        let merged = match self.crunching_requests.get(&frontier) {
            Some(existing) => existing.merge_max(&request),
            None => request,
        };
        debug!("request at {frontier}: {:?}", merged.target);
        self.crunching_requests.insert(frontier, merged);
    }

    fn step_profile_for(&self, frontier: &Node<S>, explicit: Option<StepProfile>) -> StepProfile {
        explicit
            .or_else(|| frontier.step_profile().cloned())
            .or_else(|| self.config.default_step_profile.clone())
            .unwrap_or_else(|| self.simpack.default_step_profile().clone())
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.shut_down {
            Err(EngineError::ShutDown)
        } else {
            Ok(())
        }
    }

    // ── Driving work ─────────────────────────────────────────────

    /// Move finished work into the tree and start or stop crunchers to
    /// match the requests. Returns the number of nodes added.
    pub fn sync_crunchers(&mut self) -> Result<u64, EngineError> {
        self.ensure_running()?;
        self.manager
            .sync_crunchers(&self.tree, &mut self.crunching_requests)
    }

    /// Step `iterations` times from `node` on the calling thread.
    ///
    /// Each state is added to the tree as soon as it is produced. Stops
    /// early when the world ends, flagging the last node. Returns the
    /// last node of the new run (`node` itself when nothing was added).
    pub fn simulate(
        &mut self,
        node: NodeId,
        iterations: u64,
        step_profile: Option<StepProfile>,
    ) -> Result<NodeId, EngineError> {
        self.ensure_running()?;
        let (start, profile) = {
            let tree = self.tree.read();
            let frontier = tree.node(node)?;
            if frontier.still_in_editing() {
                return Err(EngineError::StillEditing { node });
            }
            if frontier.ends_world() {
                return Ok(node);
            }
            (
                S::clone(frontier.state()),
                self.step_profile_for(frontier, step_profile),
            )
        };

        let browser = self
            .simpack
            .is_history_dependent()
            .then(|| Arc::new(HistoryBrowser::detached(Arc::clone(&self.tree), node)));
        let start = match &browser {
            Some(browser) => StepStart::History(Arc::clone(browser) as HistoryHandle<S>),
            None => StepStart::State(start),
        };
        let mut steps = self.simpack.steps_from(start, profile.clone())?;

        let mut tip = node;
        for _ in 0..iterations {
            // Step without holding the lock; history steps read the tree.
            let produced = steps.next();
            let mut tree = self.tree.write();
            match produced {
                Some(Ok(state)) => {
                    tip = tree.add_stepped_state(tip, state, Some(profile.clone()))?;
                    if let Some(browser) = &browser {
                        browser.set_anchor(tip);
                    }
                }
                None | Some(Err(StepError::WorldEnded)) => {
                    tree.mark_world_end(tip)?;
                    break;
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
        Ok(tip)
    }

    // ── Introspection and shutdown ───────────────────────────────

    /// Outstanding requests, keyed by frontier.
    pub fn requests(&self) -> &IndexMap<NodeId, CrunchingProfile> {
        &self.crunching_requests
    }

    /// Whether any request or cruncher is outstanding.
    pub fn is_crunching(&self) -> bool {
        !self.crunching_requests.is_empty() || self.manager.is_crunching()
    }

    /// The running crunchers.
    pub fn crunchers(&self) -> Vec<CruncherInfo> {
        self.manager.crunchers()
    }

    /// Cruncher failures recorded so far.
    pub fn failures(&self) -> &[CruncherFailure] {
        self.manager.failures()
    }

    /// Retire every cruncher, drop all requests and wait for the workers
    /// for up to the configured grace period. Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.shut_down {
            return ShutdownReport::default();
        }
        self.shut_down = true;
        let dropped = self.crunching_requests.len();
        self.crunching_requests.clear();
        let report = self
            .manager
            .shutdown(Duration::from_millis(self.config.shutdown_grace_ms));
        if dropped > 0 {
            warn!("shutdown dropped {dropped} crunching requests");
        }
        info!(
            "project for '{}' shut down: {} joined, {} detached in {}ms",
            self.simpack.name(),
            report.joined,
            report.detached,
            report.total_ms
        );
        report
    }
}

impl<S: State> Drop for Project<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// What is still owed at a leaf `depth` nodes past an origin at
/// `origin_clock`.
fn shortfall(amount: CrunchAmount, depth: u64, origin_clock: f64) -> CrunchTarget {
    match amount {
        CrunchAmount::Nodes(n) => CrunchTarget::Nodes(n.saturating_sub(depth)),
        CrunchAmount::Clock(span) => CrunchTarget::Clock(origin_clock + span),
    }
}
