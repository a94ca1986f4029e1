//! Read-only history view for history-dependent steps.
//!
//! A [`HistoryBrowser`] presents one timeline as a single clock-ordered
//! sequence: the finalized tree path from the root to an anchor node,
//! followed by the cruncher's pending output that has not been drained
//! into the tree yet.
//!
//! # Consistency
//!
//! The manager moves states from the queue into the tree and advances the
//! anchor while holding the tree write lock. A query holds the tree read
//! lock for its whole duration and takes the queue lock after it, so it
//! sees either the state before a drain or the state after it, never a
//! mixture. The visible timeline therefore only grows, without gaps or
//! duplicates.
//!
//! The tree is append-only, so the path to a given anchor only changes
//! when the tree grows. Each browser keeps the last path it built and
//! reuses it while neither the anchor nor the tree size has moved.

use std::sync::Arc;

use braid_core::{
    binary_search_by_index, Bracket, History, LookupError, NodeId, Rounded, Rounding, Stamped,
    State,
};
use braid_tree::{Path, Tree};
use parking_lot::Mutex;

use crate::cruncher::{CruncherShared, OutputQueue, QueueContents};
use crate::SharedTree;

/// A clock-ordered view of one timeline across the tree and a queue.
pub struct HistoryBrowser<S: State> {
    tree: SharedTree<S>,
    anchor: Arc<Mutex<NodeId>>,
    queue: Option<Arc<OutputQueue<S>>>,
    cruncher: Option<Arc<CruncherShared>>,
    cached: Mutex<Option<CachedPath>>,
}

/// Path to `anchor` as of a tree holding `tree_len` nodes.
struct CachedPath {
    anchor: NodeId,
    tree_len: usize,
    path: Arc<Path>,
}

impl<S: State> HistoryBrowser<S> {
    /// A browser over the tree path ending at `end`, with no pending
    /// output.
    pub fn detached(tree: SharedTree<S>, end: NodeId) -> Self {
        Self {
            tree,
            anchor: Arc::new(Mutex::new(end)),
            queue: None,
            cruncher: None,
            cached: Mutex::new(None),
        }
    }

    pub(crate) fn for_cruncher(
        tree: SharedTree<S>,
        anchor: Arc<Mutex<NodeId>>,
        queue: Arc<OutputQueue<S>>,
        cruncher: Arc<CruncherShared>,
    ) -> Self {
        Self {
            tree,
            anchor,
            queue: Some(queue),
            cruncher: Some(cruncher),
            cached: Mutex::new(None),
        }
    }

    /// The last tree node of the timeline.
    pub fn anchor(&self) -> NodeId {
        *self.anchor.lock()
    }

    /// Move the end of the tree part of the timeline. Callers must hold
    /// the tree write lock.
    pub(crate) fn set_anchor(&self, node: NodeId) {
        *self.anchor.lock() = node;
    }

    fn view<R>(
        &self,
        query: impl FnOnce(&Tree<S>, &Path, Option<&QueueContents<S>>) -> Result<R, LookupError>,
    ) -> Result<R, LookupError> {
        if self.cruncher.as_ref().is_some_and(|c| c.retire_requested()) {
            return Err(LookupError::CruncherRetired);
        }
        let tree = self.tree.read();
        let anchor = *self.anchor.lock();
        let path = self.path_to(&tree, anchor)?;
        let queue = self.queue.as_ref().map(|queue| queue.lock());
        query(&tree, &path, queue.as_deref())
    }

    fn path_to(&self, tree: &Tree<S>, anchor: NodeId) -> Result<Arc<Path>, LookupError> {
        let mut cached = self.cached.lock();
        if let Some(hit) = cached
            .as_ref()
            .filter(|c| c.anchor == anchor && c.tree_len == tree.len())
        {
            return Ok(Arc::clone(&hit.path));
        }
        let path = Arc::new(Path::ending_at(tree, anchor).map_err(tree_error)?);
        *cached = Some(CachedPath {
            anchor,
            tree_len: tree.len(),
            path: Arc::clone(&path),
        });
        Ok(path)
    }
}

fn tree_error(e: impl std::fmt::Display) -> LookupError {
    LookupError::Tree {
        reason: e.to_string(),
    }
}

fn stamped_at<S>(tree: &Tree<S>, id: NodeId) -> Result<Stamped<S>, LookupError> {
    tree.node(id).map(|node| node.stamped()).map_err(tree_error)
}

impl<S: State> History<S> for HistoryBrowser<S> {
    fn len(&self) -> Result<usize, LookupError> {
        self.view(|tree, path, queue| {
            let pending = queue.map_or(0, |q| q.states().len());
            Ok(path.len(tree).map_err(tree_error)? + pending)
        })
    }

    fn get(&self, index: usize) -> Result<Stamped<S>, LookupError> {
        self.view(|tree, path, queue| {
            let resolved = path.index(tree).map_err(tree_error)?;
            if let Some(id) = resolved.get(index) {
                return stamped_at(tree, id);
            }
            let pending = queue.map(|q| q.states());
            let offset = index - resolved.len();
            pending
                .and_then(|states| states.get(offset))
                .cloned()
                .ok_or_else(|| LookupError::IndexOutOfRange {
                    index,
                    len: resolved.len() + pending.map_or(0, |states| states.len()),
                })
        })
    }

    fn get_last_state(&self) -> Result<Stamped<S>, LookupError> {
        self.view(|tree, path, queue| {
            if let Some(last) = queue.and_then(|q| q.states().back()) {
                return Ok(last.clone());
            }
            let last = path.last_node(tree).map_err(tree_error)?;
            stamped_at(tree, last)
        })
    }

    fn get_state_by_monotonic_function(
        &self,
        function: &dyn Fn(&Stamped<S>) -> f64,
        value: f64,
        rounding: Rounding,
    ) -> Result<Rounded<Stamped<S>>, LookupError> {
        self.view(|tree, path, queue| {
            let in_tree = path
                .bracket_by_monotonic_function(tree, |node| function(&node.stamped()), value)
                .map_err(tree_error)?;
            let in_tree = Bracket {
                low: in_tree.low.map(|id| stamped_at(tree, id)).transpose()?,
                high: in_tree.high.map(|id| stamped_at(tree, id)).transpose()?,
                exact: in_tree.exact,
            };

            // Everything pending lies after the tree part, so the queue
            // only matters when the tree has nothing at or above `value`.
            let bracket = match queue {
                Some(queue) if in_tree.high.is_none() => {
                    let states = queue.states();
                    let pending =
                        binary_search_by_index(states.len(), |i| function(&states[i]), value);
                    let pending = pending.map(|i| states[i].clone());
                    match (&pending.low, &pending.high) {
                        (None, None) => in_tree,
                        (Some(_), Some(_)) => pending,
                        (None, Some(_)) => Bracket::between(in_tree.low, pending.high),
                        (Some(_), None) => Bracket::between(pending.low, None),
                    }
                }
                _ => in_tree,
            };

            bracket
                .round(rounding, value, function)
                .ok_or(LookupError::NotFound { value })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cruncher::Product;
    use braid_tree::Placement;
    use parking_lot::RwLock;

    #[derive(Clone, Debug, PartialEq)]
    struct Tick(u32);
    impl State for Tick {}

    struct Fixture {
        tree: SharedTree<Tick>,
        /// Root-to-tip chain with clocks `0..len`.
        chain: Vec<NodeId>,
        queue: Arc<OutputQueue<Tick>>,
        shared: Arc<CruncherShared>,
        anchor: Arc<Mutex<NodeId>>,
        browser: HistoryBrowser<Tick>,
    }

    fn fixture(len: u32) -> Fixture {
        let mut tree = Tree::new();
        let mut chain = vec![tree.add_state(Tick(0), Placement::root()).unwrap()];
        for i in 1..len {
            let tip = *chain.last().unwrap();
            chain.push(tree.add_state(Tick(i), Placement::child_of(tip)).unwrap());
        }
        let tree = Arc::new(RwLock::new(tree));
        let queue = Arc::new(OutputQueue::new());
        let shared = Arc::new(CruncherShared::new());
        let anchor = Arc::new(Mutex::new(*chain.last().unwrap()));
        let browser = HistoryBrowser::for_cruncher(
            Arc::clone(&tree),
            Arc::clone(&anchor),
            Arc::clone(&queue),
            Arc::clone(&shared),
        );
        Fixture {
            tree,
            chain,
            queue,
            shared,
            anchor,
            browser,
        }
    }

    fn pend(queue: &OutputQueue<Tick>, clock: f64) {
        queue.push(Product::State(Stamped::new(clock, Tick(clock as u32))));
    }

    fn by_clock(browser: &HistoryBrowser<Tick>, clock: f64, rounding: Rounding) -> Option<Rounded<f64>> {
        browser
            .get_state_by_clock(clock, rounding)
            .ok()
            .map(|found| found.map(|stamped| stamped.clock))
    }

    #[test]
    fn indices_run_through_tree_then_queue() {
        let f = fixture(4);
        pend(&f.queue, 4.0);
        pend(&f.queue, 5.0);

        assert_eq!(f.browser.len().unwrap(), 6);
        assert_eq!(*f.browser.get(3).unwrap().state, Tick(3));
        assert_eq!(*f.browser.get(4).unwrap().state, Tick(4));
        assert_eq!(f.browser.get(5).unwrap().clock, 5.0);
        assert_eq!(
            f.browser.get(6).unwrap_err(),
            LookupError::IndexOutOfRange { index: 6, len: 6 }
        );
        assert_eq!(f.browser.get_last_state().unwrap().clock, 5.0);
    }

    #[test]
    fn clock_lookup_straddles_the_drain_boundary() {
        let f = fixture(4);
        pend(&f.queue, 4.0);
        pend(&f.queue, 6.0);

        assert_eq!(
            by_clock(&f.browser, 5.0, Rounding::Both),
            Some(Rounded::Both(Some(4.0), Some(6.0)))
        );
        assert_eq!(
            by_clock(&f.browser, 3.5, Rounding::Both),
            Some(Rounded::Both(Some(3.0), Some(4.0)))
        );
        assert_eq!(
            by_clock(&f.browser, 2.0, Rounding::Exact),
            Some(Rounded::Single(2.0))
        );
        assert_eq!(
            by_clock(&f.browser, 6.0, Rounding::Exact),
            Some(Rounded::Single(6.0))
        );
        assert_eq!(
            by_clock(&f.browser, 7.0, Rounding::Low),
            Some(Rounded::Single(6.0))
        );
        assert_eq!(
            f.browser.get_state_by_clock(7.0, Rounding::High).unwrap_err(),
            LookupError::NotFound { value: 7.0 }
        );
    }

    #[test]
    fn view_is_unchanged_by_a_drain() {
        let f = fixture(3);
        pend(&f.queue, 3.0);
        pend(&f.queue, 4.0);
        let before: Vec<f64> = (0..5).map(|i| f.browser.get(i).unwrap().clock).collect();

        {
            let mut tree = f.tree.write();
            let mut tip = *f.chain.last().unwrap();
            for product in f.queue.drain() {
                if let Product::State(stamped) = product {
                    tip = tree
                        .add_shared_state(stamped.state, Placement::child_of(tip))
                        .unwrap();
                }
            }
            *f.anchor.lock() = tip;
        }

        let after: Vec<f64> = (0..5).map(|i| f.browser.get(i).unwrap().clock).collect();
        assert_eq!(before, after);
        assert_eq!(f.browser.len().unwrap(), 5);
        assert!(f.queue.lock().states().is_empty());
    }

    #[test]
    fn retired_cruncher_closes_the_view() {
        let f = fixture(2);
        assert_eq!(f.browser.len().unwrap(), 2);
        f.shared.request_retire();
        assert_eq!(f.browser.len().unwrap_err(), LookupError::CruncherRetired);
    }

    fn cached_len(browser: &HistoryBrowser<Tick>) -> Option<usize> {
        browser.cached.lock().as_ref().map(|c| c.tree_len)
    }

    #[test]
    fn path_is_reused_until_the_tree_grows() {
        let f = fixture(5);
        assert_eq!(cached_len(&f.browser), None);
        assert_eq!(f.browser.len().unwrap(), 5);
        let first = Arc::clone(&f.browser.cached.lock().as_ref().unwrap().path);
        assert_eq!(f.browser.get(2).unwrap().clock, 2.0);
        assert!(Arc::ptr_eq(
            &first,
            &f.browser.cached.lock().as_ref().unwrap().path
        ));

        // A fork on the ancestor chain needs a decision the old path lacks.
        f.tree
            .write()
            .add_state(Tick(99), Placement::child_of(f.chain[2]))
            .unwrap();
        assert_eq!(f.browser.len().unwrap(), 5);
        assert_eq!(cached_len(&f.browser), Some(6));
        assert_eq!(*f.browser.get_last_state().unwrap().state, Tick(4));
        assert_eq!(
            f.browser.get_state_by_clock(3.0, Rounding::Exact).unwrap().into_single().unwrap().clock,
            3.0
        );
    }

    #[test]
    fn detached_browser_follows_its_branch() {
        let f = fixture(4);
        let fork = {
            let mut tree = f.tree.write();
            tree.add_state(Tick(10), Placement::child_of(f.chain[1]))
                .unwrap()
        };
        let browser = HistoryBrowser::detached(Arc::clone(&f.tree), fork);

        assert_eq!(browser.len().unwrap(), 3);
        assert_eq!(*browser.get_last_state().unwrap().state, Tick(10));
        assert_eq!(browser.anchor(), fork);
        assert_eq!(
            browser.get_state_by_clock(5.0, Rounding::Low).unwrap().into_single().unwrap().clock,
            2.0
        );
    }
}
