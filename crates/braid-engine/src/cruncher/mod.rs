//! Background workers that extend one timeline.
//!
//! A cruncher owns a worker thread that repeatedly applies the simpack's
//! step function from a frontier node and publishes every produced state
//! as a [`Product`]. The controller talks to it only through messages
//! ([`retire`](Cruncher::retire),
//! [`update_crunching_profile`](Cruncher::update_crunching_profile)) and
//! collects its output with [`drain`](Cruncher::drain).
//!
//! # Lifecycle
//!
//! `Created → Running → Retired(reason)`, where the reason is one of
//! [`RetireReason`]. The liveness flag is cleared by a guard on the
//! worker's stack, so it drops to `false` even when the step function
//! panics; a panic is recorded as [`RetireReason::Failed`].
//!
//! Every product is published before the liveness flag is cleared. A
//! controller that observes `is_alive() == false` and then drains is
//! guaranteed to see the cruncher's complete output.

mod isolated;
mod queue;
mod thread;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

use braid_core::{CruncherId, CrunchingProfile, NodeId, Stamped, StepProfile};
use parking_lot::Mutex;

pub use isolated::IsolatedCruncher;
pub(crate) use queue::{OutputQueue, QueueContents};
pub use thread::ThreadCruncher;

pub use crate::config::CruncherKind;

// ── Products and orders ──────────────────────────────────────────

/// One item of a cruncher's output stream.
#[derive(Debug)]
pub enum Product<S> {
    /// A produced state with its clock.
    State(Stamped<S>),
    /// States after this point were produced with a new step profile.
    ProfileChanged(StepProfile),
    /// The simulation signalled that the world has ended.
    EndMarker,
}

/// Controller-to-worker messages.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Order {
    Retire,
    UpdateProfile(CrunchingProfile),
}

// ── Status ───────────────────────────────────────────────────────

/// Why a cruncher stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetireReason {
    /// The crunching profile's target was reached.
    Satisfied,
    /// The controller ordered it to stop.
    Ordered,
    /// The simulation ended the world.
    WorldEnded,
    /// The step function failed or panicked.
    Failed,
}

/// Position in the cruncher lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CruncherStatus {
    /// Spawned, worker not yet stepping.
    Created,
    /// Producing states.
    Running,
    /// Stopped for good.
    Retired(RetireReason),
}

impl CruncherStatus {
    fn encode(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Retired(RetireReason::Satisfied) => 2,
            Self::Retired(RetireReason::Ordered) => 3,
            Self::Retired(RetireReason::WorldEnded) => 4,
            Self::Retired(RetireReason::Failed) => 5,
        }
    }

    fn decode(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Retired(RetireReason::Satisfied),
            3 => Self::Retired(RetireReason::Ordered),
            4 => Self::Retired(RetireReason::WorldEnded),
            _ => Self::Retired(RetireReason::Failed),
        }
    }
}

/// State shared between a cruncher handle and its worker thread.
#[derive(Debug)]
pub(crate) struct CruncherShared {
    status: AtomicU8,
    alive: AtomicBool,
    retire_requested: AtomicBool,
    failure: Mutex<Option<String>>,
}

// Compile-time assertion: shared across the worker boundary.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<CruncherShared>();
};

impl CruncherShared {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(CruncherStatus::Created.encode()),
            alive: AtomicBool::new(false),
            retire_requested: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    pub(crate) fn status(&self) -> CruncherStatus {
        CruncherStatus::decode(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: CruncherStatus) {
        self.status.store(status.encode(), Ordering::Release);
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    pub(crate) fn request_retire(&self) {
        self.retire_requested.store(true, Ordering::Release);
    }

    pub(crate) fn retire_requested(&self) -> bool {
        self.retire_requested.load(Ordering::Acquire)
    }

    pub(crate) fn fail(&self, reason: String) {
        self.failure.lock().get_or_insert(reason);
        self.set_status(CruncherStatus::Retired(RetireReason::Failed));
    }

    pub(crate) fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

/// Clears the liveness flag when the worker leaves its loop, by return
/// or by unwinding.
pub(crate) struct LivenessGuard<'a>(pub(crate) &'a CruncherShared);

impl Drop for LivenessGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.fail("step function panicked".to_string());
        }
        self.0.set_alive(false);
    }
}

// ── Cruncher ─────────────────────────────────────────────────────

/// Handle to one background worker.
///
/// Implementations differ in how the worker gets its input and hands
/// back its output; the controller-facing protocol is the same.
pub trait Cruncher<S>: Send {
    /// Stable identity, independent of the frontier it is keyed under.
    fn id(&self) -> CruncherId;

    /// Which flavour this is.
    fn kind(&self) -> CruncherKind;

    /// Current lifecycle position.
    fn status(&self) -> CruncherStatus;

    /// Whether the worker thread is still inside its loop.
    fn is_alive(&self) -> bool;

    /// Failure description, once the cruncher failed.
    fn failure(&self) -> Option<String>;

    /// Ask the worker to stop after the state it is producing.
    fn retire(&self);

    /// Replace the crunching profile. A different step profile makes the
    /// worker emit [`Product::ProfileChanged`] and restart its steps from
    /// the last produced state.
    fn update_crunching_profile(&self, profile: CrunchingProfile);

    /// Take all output produced since the last drain, in order.
    fn drain(&mut self) -> Vec<Product<S>>;

    /// Tell the cruncher where its finalized history now ends. Called
    /// with the tree write lock held, together with [`drain`](Self::drain).
    fn advance_frontier(&self, node: NodeId);

    /// Join the worker thread, waiting until `deadline` at most.
    ///
    /// Returns `false` if the worker was still running at the deadline;
    /// it is then detached and left to finish on its own.
    fn join(&mut self, deadline: Instant) -> bool;
}

/// Shared `join` logic: poll the liveness flag until the deadline, then
/// join or detach.
pub(crate) fn join_until(
    shared: &CruncherShared,
    handle: &mut Option<std::thread::JoinHandle<()>>,
    deadline: Instant,
) -> bool {
    while shared.is_alive() {
        if Instant::now() >= deadline {
            // Dropping the handle detaches the thread.
            handle.take();
            return false;
        }
        std::thread::yield_now();
    }
    if let Some(handle) = handle.take() {
        // A panic has already been recorded by the liveness guard.
        let _ = handle.join();
    }
    true
}
