//! The crunching manager: reconciles crunchers with crunching requests.
//!
//! Requests are keyed by frontier node and measured from that node. Every
//! [`sync_crunchers`](CrunchingManager::sync_crunchers) call:
//!
//! 1. retires crunchers whose frontier is no longer requested, keeping
//!    whatever they produced,
//! 2. drains every running cruncher into the tree, re-keys it and its
//!    request to the new frontier, and forwards changed targets,
//! 3. spawns a cruncher for every request that has none.
//!
//! The manager runs on the controller thread only; crunchers talk back
//! exclusively through their output.

use std::time::{Duration, Instant};

use braid_core::{CruncherId, CrunchingProfile, NodeId, Simpack, State, StepProfile};
use braid_tree::{Placement, Tree, TreeError};
use indexmap::IndexMap;
use log::{debug, error, warn};

use crate::config::CruncherKind;
use crate::cruncher::{
    Cruncher, CruncherStatus, IsolatedCruncher, Product, RetireReason, ThreadCruncher,
};
use crate::error::EngineError;
use crate::SharedTree;

// ── Reporting types ──────────────────────────────────────────────

/// A cruncher that failed, and where.
#[derive(Clone, Debug, PartialEq)]
pub struct CruncherFailure {
    /// The failed cruncher.
    pub cruncher: CruncherId,
    /// Last node its output reached.
    pub frontier: NodeId,
    /// What went wrong.
    pub reason: String,
}

/// Snapshot of one running job.
#[derive(Clone, Debug, PartialEq)]
pub struct CruncherInfo {
    /// Cruncher identity.
    pub id: CruncherId,
    /// Node the cruncher's output currently ends at.
    pub frontier: NodeId,
    /// Worker flavour.
    pub kind: CruncherKind,
    /// Lifecycle position.
    pub status: CruncherStatus,
    /// Nodes added to the tree from this cruncher so far.
    pub nodes_drained: u64,
}

/// Report from [`CrunchingManager::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Crunchers told to retire by this shutdown.
    pub retired: usize,
    /// Worker threads joined within the grace period.
    pub joined: usize,
    /// Worker threads still running at the deadline, left detached.
    pub detached: usize,
    /// Total time spent in shutdown.
    pub total_ms: u64,
}

// ── CrunchingManager ─────────────────────────────────────────────

struct Job<S> {
    cruncher: Box<dyn Cruncher<S>>,
    nodes_drained: u64,
    /// Profile of the states currently coming out of the cruncher.
    step_profile: StepProfile,
    /// Profile last sent to the cruncher, in its own node count.
    sent_profile: CrunchingProfile,
}

struct Absorbed {
    tip: NodeId,
    tip_clock: f64,
    added: u64,
    ended: bool,
    error: Option<TreeError>,
}

/// Owner of all crunchers of one project.
pub struct CrunchingManager<S: State> {
    simpack: Simpack<S>,
    kind: CruncherKind,
    thread_name_prefix: String,
    jobs: IndexMap<NodeId, Job<S>>,
    /// Crunchers told to retire whose threads may still be running.
    retired: Vec<Box<dyn Cruncher<S>>>,
    failures: Vec<CruncherFailure>,
}

impl<S: State> CrunchingManager<S> {
    /// Create a manager spawning crunchers of `kind`.
    pub fn new(simpack: Simpack<S>, kind: CruncherKind, thread_name_prefix: String) -> Self {
        Self {
            simpack,
            kind,
            thread_name_prefix,
            jobs: IndexMap::new(),
            retired: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Bring crunchers in line with `requested`.
    ///
    /// Drained requests are re-keyed to their new frontier with the
    /// remaining amount; satisfied, ended and failed requests are
    /// removed. Returns the number of nodes added to the tree.
    ///
    /// # Errors
    ///
    /// Unknown frontier nodes or a failed thread spawn. Work done before
    /// the error is kept.
    pub fn sync_crunchers(
        &mut self,
        tree: &SharedTree<S>,
        requested: &mut IndexMap<NodeId, CrunchingProfile>,
    ) -> Result<u64, EngineError> {
        self.retired.retain(|cruncher| cruncher.is_alive());
        let mut added = 0;

        // 1. Crunchers nobody asks for any more.
        let stale: Vec<NodeId> = self
            .jobs
            .keys()
            .filter(|frontier| !requested.contains_key(*frontier))
            .copied()
            .collect();
        for frontier in stale {
            if let Some(mut job) = self.jobs.shift_remove(&frontier) {
                job.cruncher.retire();
                let absorbed = absorb(&mut tree.write(), frontier, &mut job);
                added += absorbed.added;
                debug!("{} retired at {}: not requested", job.cruncher.id(), absorbed.tip);
                self.retired.push(job.cruncher);
            }
        }

        // 2. Running crunchers.
        let frontiers: Vec<NodeId> = requested.keys().copied().collect();
        for frontier in frontiers {
            let Some(mut job) = self.jobs.shift_remove(&frontier) else {
                continue;
            };
            let Some(profile) = requested.shift_remove(&frontier) else {
                continue;
            };
            // Read before draining: a dead cruncher's output is complete.
            let was_alive = job.cruncher.is_alive();
            let absorbed = absorb(&mut tree.write(), frontier, &mut job);
            added += absorbed.added;
            let tip = absorbed.tip;
            job.nodes_drained += absorbed.added;
            if absorbed.added > 0 {
                debug!("drained {} nodes from {} up to {tip}", absorbed.added, job.cruncher.id());
            }

            if let Some(e) = absorbed.error {
                job.cruncher.retire();
                self.record_failure(job.cruncher.id(), tip, e.to_string());
                self.retired.push(job.cruncher);
                continue;
            }

            let remaining = profile.remaining_after(absorbed.added);
            if absorbed.ended || remaining.state_satisfies(absorbed.tip_clock, 0) {
                job.cruncher.retire();
                debug!("{} done at {tip}", job.cruncher.id());
                self.retired.push(job.cruncher);
                continue;
            }

            if !was_alive {
                match job.cruncher.status() {
                    CruncherStatus::Retired(RetireReason::Failed) => {
                        let reason = job
                            .cruncher
                            .failure()
                            .unwrap_or_else(|| "unknown failure".to_string());
                        self.record_failure(job.cruncher.id(), tip, reason);
                    }
                    CruncherStatus::Retired(RetireReason::WorldEnded) => {}
                    // Stopped early; a fresh cruncher picks up the rest.
                    _ => {
                        requested.insert(tip, remaining);
                    }
                }
                self.retired.push(job.cruncher);
                continue;
            }

            let cruncher_profile = remaining.offset_nodes(job.nodes_drained);
            if cruncher_profile != job.sent_profile {
                job.cruncher
                    .update_crunching_profile(cruncher_profile.clone());
                job.sent_profile = cruncher_profile;
            }
            requested.insert(tip, remaining);
            self.jobs.insert(tip, job);
        }

        // 3. Requests without a cruncher.
        let pending: Vec<(NodeId, CrunchingProfile)> = requested
            .iter()
            .filter(|(frontier, _)| !self.jobs.contains_key(*frontier))
            .map(|(frontier, profile)| (*frontier, profile.clone()))
            .collect();
        for (frontier, profile) in pending {
            let skip = {
                let tree = tree.read();
                let node = tree.node(frontier)?;
                if node.still_in_editing() || node.ends_world() {
                    warn!("dropped request at {frontier}: node is not a valid frontier");
                    true
                } else {
                    profile.state_satisfies(node.clock(), 0)
                }
            };
            if skip {
                requested.shift_remove(&frontier);
                continue;
            }
            let cruncher = self.spawn(tree, frontier, profile.clone())?;
            self.jobs.insert(
                frontier,
                Job {
                    cruncher,
                    nodes_drained: 0,
                    step_profile: profile.step_profile.clone(),
                    sent_profile: profile,
                },
            );
        }

        Ok(added)
    }

    fn spawn(
        &self,
        tree: &SharedTree<S>,
        frontier: NodeId,
        profile: CrunchingProfile,
    ) -> Result<Box<dyn Cruncher<S>>, EngineError> {
        let cruncher: Box<dyn Cruncher<S>> = match self.kind {
            CruncherKind::Thread => Box::new(ThreadCruncher::spawn(
                tree,
                frontier,
                &self.simpack,
                profile,
                &self.thread_name_prefix,
            )?),
            CruncherKind::Isolated => Box::new(IsolatedCruncher::spawn(
                tree,
                frontier,
                &self.simpack,
                profile,
                &self.thread_name_prefix,
            )?),
        };
        debug!(
            "spawned {} ({:?}) at {frontier} for '{}'",
            cruncher.id(),
            self.kind,
            self.simpack.name()
        );
        Ok(cruncher)
    }

    fn record_failure(&mut self, cruncher: CruncherId, frontier: NodeId, reason: String) {
        error!("{cruncher} failed at {frontier}: {reason}");
        self.failures.push(CruncherFailure {
            cruncher,
            frontier,
            reason,
        });
    }

    /// The running jobs, in request order.
    pub fn crunchers(&self) -> Vec<CruncherInfo> {
        self.jobs
            .iter()
            .map(|(frontier, job)| CruncherInfo {
                id: job.cruncher.id(),
                frontier: *frontier,
                kind: job.cruncher.kind(),
                status: job.cruncher.status(),
                nodes_drained: job.nodes_drained,
            })
            .collect()
    }

    /// Whether any job is still registered.
    pub fn is_crunching(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Every failure recorded so far, oldest first.
    pub fn failures(&self) -> &[CruncherFailure] {
        &self.failures
    }

    /// The flavour of cruncher this manager spawns.
    pub fn kind(&self) -> CruncherKind {
        self.kind
    }

    /// Retire every cruncher and wait up to `grace` for the workers.
    ///
    /// Undrained output is discarded. Workers still stepping at the
    /// deadline are detached.
    pub fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        let start = Instant::now();
        let mut report = ShutdownReport::default();

        for (_, job) in self.jobs.drain(..) {
            job.cruncher.retire();
            report.retired += 1;
            self.retired.push(job.cruncher);
        }

        let deadline = start + grace;
        for mut cruncher in self.retired.drain(..) {
            if cruncher.join(deadline) {
                report.joined += 1;
            } else {
                warn!("{} still running after shutdown grace, detached", cruncher.id());
                report.detached += 1;
            }
        }

        report.total_ms = start.elapsed().as_millis() as u64;
        report
    }
}

/// Move a job's pending output into the tree below `frontier`.
///
/// Runs entirely under the tree write lock, so a history browser sees the
/// states either in the queue or in the tree.
fn absorb<S: State>(tree: &mut Tree<S>, frontier: NodeId, job: &mut Job<S>) -> Absorbed {
    let mut absorbed = Absorbed {
        tip: frontier,
        tip_clock: f64::NAN,
        added: 0,
        ended: false,
        error: None,
    };
    let products = job.cruncher.drain();
    if let Err(e) = tree.node(frontier) {
        absorbed.error = Some(e);
        return absorbed;
    }
    for product in products {
        let step = match product {
            Product::State(stamped) => {
                let placement = Placement::child_of(absorbed.tip)
                    .with_step_profile(Some(job.step_profile.clone()));
                tree.add_shared_state(stamped.state, placement).map(|id| {
                    absorbed.tip = id;
                    absorbed.added += 1;
                })
            }
            Product::ProfileChanged(profile) => {
                job.step_profile = profile;
                Ok(())
            }
            Product::EndMarker => tree.mark_world_end(absorbed.tip).map(|()| {
                absorbed.ended = true;
            }),
        };
        if let Err(e) = step {
            absorbed.error = Some(e);
            break;
        }
    }
    absorbed.tip_clock = tree.node(absorbed.tip).map_or(f64::NAN, |node| node.clock());
    job.cruncher.advance_frontier(absorbed.tip);
    absorbed
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use braid_core::{CrunchTarget, StepProfile};
    use braid_test_utils::{counter_simpack, Counter};
    use parking_lot::RwLock;

    use super::*;

    fn shared_tree() -> SharedTree<Counter> {
        Arc::new(RwLock::new(Tree::new()))
    }

    #[test]
    fn unknown_frontier_retires_the_job() {
        let mut manager = CrunchingManager::new(
            counter_simpack(),
            CruncherKind::Isolated,
            "braid-test".to_string(),
        );
        let home = shared_tree();
        let root = home.write().add_state(Counter::new(0), Placement::root()).unwrap();
        let mut requested = IndexMap::new();
        requested.insert(
            root,
            CrunchingProfile::new(StepProfile::new(), CrunchTarget::Nodes(5)),
        );
        manager.sync_crunchers(&home, &mut requested).unwrap();
        assert_eq!(manager.crunchers().len(), 1);

        // The job's frontier does not exist in this tree.
        let stranger = shared_tree();
        assert_eq!(manager.sync_crunchers(&stranger, &mut requested).unwrap(), 0);
        assert!(manager.crunchers().is_empty());
        assert!(requested.is_empty());
        assert_eq!(manager.failures().len(), 1);
        assert_eq!(manager.failures()[0].frontier, root);
        assert!(stranger.read().is_empty());

        // The cruncher was kept for shutdown rather than leaked.
        let report = manager.shutdown(Duration::from_secs(5));
        assert_eq!(report.retired, 0);
        assert_eq!(report.joined, 1);
    }
}
