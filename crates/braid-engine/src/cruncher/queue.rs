//! The thread cruncher's output queue.
//!
//! States are kept in their own `VecDeque` so the history browser can
//! binary-search them by index; profile changes and the end marker are
//! kept beside them as positional markers and interleaved back on drain.
//!
//! Lock order: callers that also hold the tree lock must take the tree
//! lock first.

use std::collections::VecDeque;

use braid_core::{Stamped, StepProfile};
use parking_lot::{Mutex, MutexGuard};

use super::Product;

#[derive(Debug)]
enum Marker {
    ProfileChanged(StepProfile),
    End,
}

/// Pending output of one cruncher, not yet drained into the tree.
#[derive(Debug)]
pub(crate) struct QueueContents<S> {
    states: VecDeque<Stamped<S>>,
    /// `(i, marker)`: the marker precedes `states[i]`.
    markers: Vec<(usize, Marker)>,
}

impl<S> QueueContents<S> {
    /// Pending states, oldest first.
    pub(crate) fn states(&self) -> &VecDeque<Stamped<S>> {
        &self.states
    }
}

/// Mutex-guarded queue shared between a worker and the controller.
#[derive(Debug)]
pub(crate) struct OutputQueue<S> {
    inner: Mutex<QueueContents<S>>,
}

// Compile-time assertion: the queue is shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<OutputQueue<u64>>();
};

impl<S> OutputQueue<S> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueContents {
                states: VecDeque::new(),
                markers: Vec::new(),
            }),
        }
    }

    pub(crate) fn push(&self, product: Product<S>) {
        let mut inner = self.inner.lock();
        let at = inner.states.len();
        match product {
            Product::State(stamped) => inner.states.push_back(stamped),
            Product::ProfileChanged(profile) => {
                inner.markers.push((at, Marker::ProfileChanged(profile)));
            }
            Product::EndMarker => inner.markers.push((at, Marker::End)),
        }
    }

    /// Lock for reading. Held by the browser for the length of a query.
    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueContents<S>> {
        self.inner.lock()
    }

    /// Take everything, in production order.
    pub(crate) fn drain(&self) -> Vec<Product<S>> {
        let (states, markers) = {
            let mut inner = self.inner.lock();
            (
                std::mem::take(&mut inner.states),
                std::mem::take(&mut inner.markers),
            )
        };
        let mut products = Vec::with_capacity(states.len() + markers.len());
        let mut markers = markers.into_iter().peekable();
        for (i, stamped) in states.into_iter().enumerate() {
            while let Some((_, marker)) = markers.next_if(|(at, _)| *at <= i) {
                products.push(into_product(marker));
            }
            products.push(Product::State(stamped));
        }
        products.extend(markers.map(|(_, marker)| into_product(marker)));
        products
    }
}

fn into_product<S>(marker: Marker) -> Product<S> {
    match marker {
        Marker::ProfileChanged(profile) => Product::ProfileChanged(profile),
        Marker::End => Product::EndMarker,
    }
}
