//! Cruncher whose worker shares the tree.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use braid_core::{CruncherId, CrunchingProfile, HistoryHandle, NodeId, Simpack, State};
use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::worker::Worker;
use super::{
    join_until, Cruncher, CruncherKind, CruncherShared, CruncherStatus, Order, OutputQueue,
    Product,
};
use crate::browser::HistoryBrowser;
use crate::error::EngineError;
use crate::SharedTree;

/// A worker thread that publishes into a shared [`OutputQueue`].
///
/// History-dependent packages read their timeline through a
/// [`HistoryBrowser`] over the tree and the same queue, so a step always
/// sees every state produced before it, drained or not.
pub struct ThreadCruncher<S: State> {
    id: CruncherId,
    shared: Arc<CruncherShared>,
    orders: Sender<Order>,
    queue: Arc<OutputQueue<S>>,
    /// Last drained node of this cruncher's timeline.
    anchor: Arc<Mutex<NodeId>>,
    handle: Option<JoinHandle<()>>,
}

impl<S: State> ThreadCruncher<S> {
    /// Start crunching from `frontier`.
    pub(crate) fn spawn(
        tree: &SharedTree<S>,
        frontier: NodeId,
        simpack: &Simpack<S>,
        profile: CrunchingProfile,
        thread_name_prefix: &str,
    ) -> Result<Self, EngineError> {
        let start = tree.read().node(frontier)?.stamped();
        let id = CruncherId::next();
        let shared = Arc::new(CruncherShared::new());
        let queue = Arc::new(OutputQueue::new());
        let anchor = Arc::new(Mutex::new(frontier));
        let (orders, order_rx) = crossbeam_channel::unbounded();

        let history = simpack.is_history_dependent().then(|| {
            let browser = HistoryBrowser::for_cruncher(
                Arc::clone(tree),
                Arc::clone(&anchor),
                Arc::clone(&queue),
                Arc::clone(&shared),
            );
            Arc::new(browser) as HistoryHandle<S>
        });

        let worker = Worker {
            id,
            simpack: simpack.clone(),
            shared: Arc::clone(&shared),
            orders: order_rx,
            sink: Arc::clone(&queue),
            history,
            last: start,
            profile,
        };

        shared.set_alive(true);
        let handle = thread::Builder::new()
            .name(format!("{thread_name_prefix}-{}", id.as_u64()))
            .spawn(move || worker.run())
            .map_err(|e| {
                shared.set_alive(false);
                EngineError::ThreadSpawnFailed {
                    reason: e.to_string(),
                }
            })?;

        Ok(Self {
            id,
            shared,
            orders,
            queue,
            anchor,
            handle: Some(handle),
        })
    }
}

impl<S: State> Cruncher<S> for ThreadCruncher<S> {
    fn id(&self) -> CruncherId {
        self.id
    }

    fn kind(&self) -> CruncherKind {
        CruncherKind::Thread
    }

    fn status(&self) -> CruncherStatus {
        self.shared.status()
    }

    fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    fn failure(&self) -> Option<String> {
        self.shared.failure()
    }

    fn retire(&self) {
        self.shared.request_retire();
        let _ = self.orders.send(Order::Retire);
    }

    fn update_crunching_profile(&self, profile: CrunchingProfile) {
        let _ = self.orders.send(Order::UpdateProfile(profile));
    }

    fn drain(&mut self) -> Vec<Product<S>> {
        self.queue.drain()
    }

    fn advance_frontier(&self, node: NodeId) {
        *self.anchor.lock() = node;
    }

    fn join(&mut self, deadline: Instant) -> bool {
        join_until(&self.shared, &mut self.handle, deadline)
    }
}
