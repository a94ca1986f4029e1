//! Cruncher whose worker never touches the tree.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use braid_core::{CruncherId, CrunchingProfile, NodeId, Simpack, Stamped, State};
use crossbeam_channel::{Receiver, Sender};

use super::worker::Worker;
use super::{join_until, Cruncher, CruncherKind, CruncherShared, CruncherStatus, Order, Product};
use crate::error::EngineError;
use crate::SharedTree;

/// A worker thread that owns a private copy of its starting state.
///
/// The worker shares nothing with the tree: it receives orders and sends
/// products over channels. Packages whose steps read history cannot run
/// here.
pub struct IsolatedCruncher<S: State> {
    id: CruncherId,
    shared: Arc<CruncherShared>,
    orders: Sender<Order>,
    products: Receiver<Product<S>>,
    handle: Option<JoinHandle<()>>,
}

impl<S: State> IsolatedCruncher<S> {
    /// Start crunching from a copy of `frontier`'s state.
    pub(crate) fn spawn(
        tree: &SharedTree<S>,
        frontier: NodeId,
        simpack: &Simpack<S>,
        profile: CrunchingProfile,
        thread_name_prefix: &str,
    ) -> Result<Self, EngineError> {
        if simpack.is_history_dependent() {
            return Err(EngineError::HistoryNeedsThread {
                simpack: simpack.name().to_string(),
            });
        }
        let start = {
            let tree = tree.read();
            let node = tree.node(frontier)?;
            Stamped::new(node.clock(), S::clone(node.state()))
        };

        let id = CruncherId::next();
        let shared = Arc::new(CruncherShared::new());
        let (orders, order_rx) = crossbeam_channel::unbounded();
        let (product_tx, products) = crossbeam_channel::unbounded();

        let worker = Worker {
            id,
            simpack: simpack.clone(),
            shared: Arc::clone(&shared),
            orders: order_rx,
            sink: product_tx,
            history: None,
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
            products,
            handle: Some(handle),
        })
    }
}

impl<S: State> Cruncher<S> for IsolatedCruncher<S> {
    fn id(&self) -> CruncherId {
        self.id
    }

    fn kind(&self) -> CruncherKind {
        CruncherKind::Isolated
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
        self.products.try_iter().collect()
    }

    fn advance_frontier(&self, _node: NodeId) {}

    fn join(&mut self, deadline: Instant) -> bool {
        join_until(&self.shared, &mut self.handle, deadline)
    }
}
