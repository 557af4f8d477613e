//! In-flight operation bookkeeping.
//!
//! `PendingOps` gives "first caller starts, everyone else attaches"
//! memoization. `WaitGraph` tracks which resolution node is awaiting which
//! key so a request that would close a waiting cycle can be answered with a
//! placeholder instead of hanging.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

/// Keyed registry of in-flight or settled results.
pub struct PendingOps<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for PendingOps<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> PendingOps<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Runs `init` unless an operation for `key` already started, in which
    /// case its result is awaited instead. A failed initializer leaves the
    /// slot empty so a later caller may retry.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cells.lock().entry(key).or_default().clone();
        cell.get_or_try_init(init).await.cloned()
    }

    /// Settled value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        self.cells
            .lock()
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    pub fn clear(&self) {
        self.cells.lock().clear();
    }
}

/// Directed "is awaiting" edges between resolution nodes.
#[derive(Debug, Default)]
pub struct WaitGraph {
    edges: Mutex<HashMap<String, HashMap<String, usize>>>,
}

impl WaitGraph {
    /// Records `from -> to` unless `to` can already reach a node in `chain`.
    ///
    /// Returns `None` when waiting would deadlock. The edge lives as long as
    /// the returned guard.
    pub fn enter(&self, chain: &[String], from: &str, to: &str) -> Option<WaitGuard<'_>> {
        let mut edges = self.edges.lock();
        if reaches(&edges, to, chain) {
            return None;
        }
        *edges
            .entry(from.to_string())
            .or_default()
            .entry(to.to_string())
            .or_insert(0) += 1;
        Some(WaitGuard {
            graph: self,
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.edges.lock().is_empty()
    }

    pub fn clear(&self) {
        self.edges.lock().clear();
    }

    fn leave(&self, from: &str, to: &str) {
        let mut edges = self.edges.lock();
        let Some(targets) = edges.get_mut(from) else {
            return;
        };
        if let Some(count) = targets.get_mut(to) {
            *count -= 1;
            if *count == 0 {
                targets.remove(to);
            }
        }
        if targets.is_empty() {
            edges.remove(from);
        }
    }
}

fn reaches(edges: &HashMap<String, HashMap<String, usize>>, start: &str, chain: &[String]) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if chain.iter().any(|id| id == node) {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(targets) = edges.get(node) {
            stack.extend(targets.keys().map(String::as_str));
        }
    }
    false
}

/// Removes its wait edge on drop.
#[derive(Debug)]
pub struct WaitGuard<'a> {
    graph: &'a WaitGraph,
    from: String,
    to: String,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.graph.leave(&self.from, &self.to);
    }
}

/// Message keys already logged during a session.
#[derive(Debug, Default)]
pub struct LogOnce {
    seen: Mutex<HashSet<String>>,
}

impl LogOnce {
    /// True the first time `key` is seen.
    pub fn first(&self, key: impl Into<String>) -> bool {
        self.seen.lock().insert(key.into())
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn chain(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_initialization() {
        let ops: PendingOps<String, usize> = PendingOps::default();
        let calls = AtomicUsize::new(0);
        let init = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<_, ()>(7)
        };
        let (a, b) = tokio::join!(
            ops.get_or_try_init("k".to_string(), init),
            ops.get_or_try_init("k".to_string(), init)
        );
        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ops.get(&"k".to_string()), Some(7));
    }

    #[tokio::test]
    async fn failed_initialization_can_be_retried() {
        let ops: PendingOps<&str, usize> = PendingOps::default();
        let failed = ops.get_or_try_init("k", || async { Err("boom") }).await;
        assert_eq!(failed, Err("boom"));
        let ok = ops.get_or_try_init("k", || async { Ok::<_, &str>(1) }).await;
        assert_eq!(ok, Ok(1));
        ops.clear();
        assert_eq!(ops.get(&"k"), None);
    }

    #[test]
    fn wait_graph_refuses_edges_that_close_a_cycle() {
        let graph = WaitGraph::default();
        let first = graph.enter(&chain(&["a"]), "a", "b").expect("a waits on b");
        let _second = graph.enter(&chain(&["b"]), "b", "c").expect("b waits on c");
        assert!(graph.enter(&chain(&["c"]), "c", "a").is_none());
        drop(first);
        assert!(graph.enter(&chain(&["c"]), "c", "a").is_some());
    }

    #[test]
    fn wait_guards_clean_up_edges() {
        let graph = WaitGraph::default();
        {
            let _a = graph.enter(&chain(&["x"]), "x", "y");
            let _b = graph.enter(&chain(&["x"]), "x", "y");
        }
        assert!(graph.is_empty());
    }

    #[test]
    fn log_once_reports_first_sighting_only() {
        let once = LogOnce::default();
        assert!(once.first("users/a:bio"));
        assert!(!once.first("users/a:bio"));
        once.clear();
        assert!(once.first("users/a:bio"));
    }
}
