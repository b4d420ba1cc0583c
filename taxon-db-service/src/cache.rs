//! Snapshot cache.
//!
//! Tree builds are expensive, so each coordinate has at most one build in
//! flight: the cache maps a coordinate key to a shared [`TreeTask`]. A task
//! runs on the blocking pool and publishes its outcome through a `watch`
//! channel; any number of callers can wait on it or poll its status.
//!
//! Entries are immutable once published. Invalidation is wholesale: the whole
//! map is dropped and the generation bumped. A build that fails or is
//! cancelled removes its own entry before publishing, so the cache never
//! keeps a task that cannot produce a tree.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::debug;

use taxon_db_core::{CoordinateKey, CoreError};
use taxon_db_tree::{CancellationFlag, Tree, TreeError};

use crate::error::{Result, TaxonomyError};

type TaskOutcome = std::result::Result<Arc<Tree>, TreeError>;

/// Observable state of a [`TreeTask`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Ready,
    Failed,
    Cancelled,
}

/// Handle on one tree build.
#[derive(Debug)]
pub struct TreeTask {
    key: CoordinateKey,
    generation: u64,
    cancel: CancellationFlag,
    rx: watch::Receiver<Option<TaskOutcome>>,
}

impl TreeTask {
    pub fn key(&self) -> CoordinateKey {
        self.key
    }

    /// Cache generation the task was started in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> TaskStatus {
        match &*self.rx.borrow() {
            None => TaskStatus::Running,
            Some(Ok(_)) => TaskStatus::Ready,
            Some(Err(TreeError::Cancelled)) => TaskStatus::Cancelled,
            Some(Err(_)) => TaskStatus::Failed,
        }
    }

    /// Ask the build to stop. It stops at the next origin boundary and
    /// resolves to [`TreeError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the build to finish.
    pub async fn get(&self) -> TaskOutcome {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            // Publisher gone without an outcome.
            Err(_) => None,
        };
        outcome.unwrap_or(Err(TreeError::Cancelled))
    }
}

struct CacheState {
    entries: LruCache<CoordinateKey, Arc<TreeTask>>,
    generation: u64,
}

/// LRU of coordinate key → tree task.
pub struct SnapshotCache {
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SnapshotCache")
            .field("entries", &state.entries.len())
            .field("capacity", &state.entries.cap())
            .field("generation", &state.generation)
            .finish()
    }
}

impl SnapshotCache {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(cap),
                generation: 0,
            }),
        }
    }

    /// Task for `key`, starting `build` if none is cached.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get_or_spawn<F>(self: &Arc<Self>, key: CoordinateKey, build: F) -> Result<Arc<TreeTask>>
    where
        F: FnOnce(CancellationFlag) -> std::result::Result<Tree, TreeError> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TaxonomyError::TaskAborted(e.to_string()))?;

        let mut state = self.state.lock();
        if let Some(task) = state.entries.get(&key) {
            return Ok(Arc::clone(task));
        }
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationFlag::new();
        let task = Arc::new(TreeTask {
            key,
            generation: state.generation,
            cancel: cancel.clone(),
            rx,
        });
        state.entries.put(key, Arc::clone(&task));
        let generation = state.generation;
        drop(state);
        debug!(key = key.0, generation, "tree task started");

        let cache = Arc::downgrade(self);
        let handle = Arc::downgrade(&task);
        runtime.spawn(async move {
            let outcome = match tokio::task::spawn_blocking(move || build(cancel)).await {
                Ok(result) => result.map(Arc::new),
                Err(e) => Err(TreeError::Core(CoreError::other(format!(
                    "tree build aborted: {}",
                    e
                )))),
            };
            if outcome.is_err() {
                if let Some(cache) = cache.upgrade() {
                    cache.remove_task(key, &handle);
                }
            }
            debug!(key = key.0, ok = outcome.is_ok(), "tree task finished");
            let _ = tx.send(Some(outcome));
        });
        Ok(task)
    }

    /// Cached task for `key` without touching LRU order.
    pub fn peek(&self, key: CoordinateKey) -> Option<Arc<TreeTask>> {
        self.state.lock().entries.peek(&key).cloned()
    }

    /// Drop every entry. Running builds continue for callers already holding
    /// their task; they are no longer reachable through the cache.
    pub fn invalidate(&self) -> usize {
        let mut state = self.state.lock();
        state.generation += 1;
        let dropped = state.entries.len();
        state.entries.clear();
        debug!(generation = state.generation, dropped, "snapshot cache invalidated");
        dropped
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }

    /// Remove `key` only if it still maps to `task`.
    fn remove_task(&self, key: CoordinateKey, task: &Weak<TreeTask>) {
        let mut state = self.state.lock();
        let same = state
            .entries
            .peek(&key)
            .is_some_and(|cached| std::ptr::eq(Arc::as_ptr(cached), task.as_ptr()));
        if same {
            state.entries.pop(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(n: u64) -> CoordinateKey {
        CoordinateKey(n)
    }

    #[tokio::test]
    async fn same_key_shares_one_build() {
        let cache = Arc::new(SnapshotCache::new(4));
        let builds = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let builds = Arc::clone(&builds);
            tasks.push(
                cache
                    .get_or_spawn(key(1), move |_| {
                        builds.fetch_add(1, Ordering::SeqCst);
                        Ok(Tree::default())
                    })
                    .unwrap(),
            );
        }
        assert!(Arc::ptr_eq(&tasks[0], &tasks[2]));
        for task in &tasks {
            assert!(task.get().await.is_ok());
            assert_eq!(task.status(), TaskStatus::Ready);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failed_build_is_removed() {
        let cache = Arc::new(SnapshotCache::new(4));
        let task = cache
            .get_or_spawn(key(1), |_| Err(TreeError::Core(CoreError::other("boom"))))
            .unwrap();
        assert!(task.get().await.is_err());
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(cache.peek(key(1)).is_none());

        let retry = cache.get_or_spawn(key(1), |_| Ok(Tree::default())).unwrap();
        assert!(!Arc::ptr_eq(&task, &retry));
        assert!(retry.get().await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_build_is_removed() {
        let cache = Arc::new(SnapshotCache::new(4));
        let task = cache
            .get_or_spawn(key(7), |cancel| {
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(TreeError::Cancelled)
            })
            .unwrap();
        assert_eq!(task.status(), TaskStatus::Running);
        task.cancel();
        assert_eq!(task.get().await.unwrap_err(), TreeError::Cancelled);
        assert_eq!(task.status(), TaskStatus::Cancelled);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidation_drops_entries_but_not_waiters() {
        let cache = Arc::new(SnapshotCache::new(4));
        let task = cache.get_or_spawn(key(1), |_| Ok(Tree::default())).unwrap();
        assert_eq!(cache.invalidate(), 1);
        assert_eq!(cache.generation(), 1);
        assert!(task.get().await.is_ok());
        assert!(cache.peek(key(1)).is_none());

        let fresh = cache.get_or_spawn(key(1), |_| Ok(Tree::default())).unwrap();
        assert_eq!(fresh.generation(), 1);
    }

    #[tokio::test]
    async fn lru_evicts_oldest() {
        let cache = Arc::new(SnapshotCache::new(2));
        for n in 0..3 {
            cache.get_or_spawn(key(n), |_| Ok(Tree::default())).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.peek(key(0)).is_none());
        assert!(cache.peek(key(2)).is_some());
    }

    #[test]
    fn spawning_outside_a_runtime_fails() {
        let cache = Arc::new(SnapshotCache::new(1));
        assert!(cache.get_or_spawn(key(1), |_| Ok(Tree::default())).is_err());
        assert!(cache.is_empty());
    }
}
