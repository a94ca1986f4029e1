//! The stepping loop shared by both cruncher flavours.
//!
//! The loop polls orders before every step, so a retire order or a new
//! profile takes effect between two states and never in the middle of
//! one. Only the output side differs between flavours, behind [`Sink`].

use std::sync::Arc;

use braid_core::{
    resolve_clock, CruncherId, CrunchingProfile, HistoryHandle, Simpack, Stamped, State,
    StateIter, StepError, StepStart,
};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, error};

use super::{CruncherShared, CruncherStatus, LivenessGuard, Order, OutputQueue, Product, RetireReason};

/// Where a worker publishes its products.
pub(crate) trait Sink<S>: Send {
    fn publish(&self, product: Product<S>);
}

impl<S: State> Sink<S> for Arc<OutputQueue<S>> {
    fn publish(&self, product: Product<S>) {
        self.push(product);
    }
}

impl<S: State> Sink<S> for Sender<Product<S>> {
    fn publish(&self, product: Product<S>) {
        // The handle has been dropped; nobody will read this.
        let _ = self.send(product);
    }
}

/// What to do after polling orders.
enum Control {
    Continue,
    Restart,
    Stop(RetireReason),
}

/// One worker's private stepping state.
pub(crate) struct Worker<S: State, K: Sink<S>> {
    pub(crate) id: CruncherId,
    pub(crate) simpack: Simpack<S>,
    pub(crate) shared: Arc<CruncherShared>,
    pub(crate) orders: Receiver<Order>,
    pub(crate) sink: K,
    /// History view for history-dependent packages.
    pub(crate) history: Option<HistoryHandle<S>>,
    /// The last state produced, or the starting state.
    pub(crate) last: Stamped<S>,
    pub(crate) profile: CrunchingProfile,
}

impl<S: State, K: Sink<S>> Worker<S, K> {
    /// Run until retired. Consumes the worker; the liveness flag is
    /// cleared on exit, including by unwinding.
    pub(crate) fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let _guard = LivenessGuard(&shared);
        shared.set_status(CruncherStatus::Running);
        debug!("{} running from clock {}", self.id, self.last.clock);

        let reason = self.crunch();
        if shared.status() != CruncherStatus::Retired(RetireReason::Failed) {
            shared.set_status(CruncherStatus::Retired(reason));
        }
        debug!("{} retired: {:?}", self.id, reason);
    }

    fn crunch(&mut self) -> RetireReason {
        let mut produced: u64 = 0;
        let mut steps = match self.steps() {
            Ok(steps) => steps,
            Err(reason) => return self.fail(reason),
        };

        loop {
            match self.poll_orders() {
                Control::Stop(reason) => return reason,
                Control::Restart => {
                    steps = match self.steps() {
                        Ok(steps) => steps,
                        Err(reason) => return self.fail(reason),
                    };
                }
                Control::Continue => {}
            }
            if self.profile.state_satisfies(self.last.clock, produced) {
                return RetireReason::Satisfied;
            }

            match steps.next() {
                Some(Ok(state)) => {
                    let clock = resolve_clock(&state, Some(self.last.clock));
                    if clock.is_nan() {
                        return self.fail("step produced a NaN clock".to_string());
                    }
                    if clock < self.last.clock {
                        return self.fail(format!(
                            "step moved the clock back from {} to {clock}",
                            self.last.clock
                        ));
                    }
                    let stamped = Stamped::new(clock, state);
                    self.last = stamped.clone();
                    self.sink.publish(Product::State(stamped));
                    produced += 1;
                }
                None | Some(Err(StepError::WorldEnded)) => {
                    self.sink.publish(Product::EndMarker);
                    return RetireReason::WorldEnded;
                }
                Some(Err(e)) => {
                    // History lookups fail once a retire was requested.
                    if self.shared.retire_requested() {
                        return RetireReason::Ordered;
                    }
                    return self.fail(e.to_string());
                }
            }
        }
    }

    /// Fresh step iterator from the last produced state.
    fn steps(&self) -> Result<StateIter<S>, String> {
        let start = match &self.history {
            Some(history) => StepStart::History(Arc::clone(history)),
            None => StepStart::State(S::clone(&self.last.state)),
        };
        self.simpack
            .steps_from(start, self.profile.step_profile.clone())
            .map_err(|e| e.to_string())
    }

    fn poll_orders(&mut self) -> Control {
        let mut control = Control::Continue;
        loop {
            match self.orders.try_recv() {
                Ok(Order::Retire) | Err(TryRecvError::Disconnected) => {
                    return Control::Stop(RetireReason::Ordered)
                }
                Ok(Order::UpdateProfile(profile)) => {
                    if profile.step_profile != self.profile.step_profile {
                        self.sink
                            .publish(Product::ProfileChanged(profile.step_profile.clone()));
                        control = Control::Restart;
                    }
                    self.profile = profile;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        if self.shared.retire_requested() {
            return Control::Stop(RetireReason::Ordered);
        }
        control
    }

    fn fail(&self, reason: String) -> RetireReason {
        error!("{} failed: {reason}", self.id);
        self.shared.fail(reason);
        RetireReason::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{CrunchTarget, StepProfile};
    use crossbeam_channel::unbounded;

    #[derive(Clone, Debug)]
    struct Tick(u64);
    impl State for Tick {}

    fn tick_simpack() -> Simpack<Tick> {
        Simpack::builder("tick")
            .step(|t: &Tick, _: &StepProfile| Ok(Tick(t.0 + 1)))
            .build()
            .unwrap()
    }

    type Parts<K> = (Worker<Tick, K>, Arc<CruncherShared>, Sender<Order>);

    fn worker<K: Sink<Tick>>(sink: K, nodes: u64) -> Parts<K> {
        let shared = Arc::new(CruncherShared::new());
        shared.set_alive(true);
        let (order_tx, orders) = unbounded();
        let worker = Worker {
            id: CruncherId::next(),
            simpack: tick_simpack(),
            shared: Arc::clone(&shared),
            orders,
            sink,
            history: None,
            last: Stamped::new(0.0, Tick(0)),
            profile: CrunchingProfile::new(StepProfile::new(), CrunchTarget::Nodes(nodes)),
        };
        (worker, shared, order_tx)
    }

    #[test]
    fn channel_sink_receives_exactly_the_target() {
        let (tx, rx) = unbounded();
        let (worker, shared, _orders) = worker(tx, 4);
        std::thread::spawn(move || worker.run()).join().unwrap();

        let clocks: Vec<f64> = rx
            .try_iter()
            .map(|product| match product {
                Product::State(stamped) => stamped.clock,
                _ => panic!("unexpected product"),
            })
            .collect();
        assert_eq!(clocks, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            shared.status(),
            CruncherStatus::Retired(RetireReason::Satisfied)
        );
        assert!(!shared.is_alive());
    }

    #[test]
    fn queue_sink_is_shared_with_the_worker_thread() {
        let queue = Arc::new(OutputQueue::new());
        let (worker, _, _orders) = worker(Arc::clone(&queue), 3);
        std::thread::spawn(move || worker.run()).join().unwrap();
        assert_eq!(queue.drain().len(), 3);
    }
}
