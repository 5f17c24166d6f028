//! Request-scoped result cache.
//!
//! # Responsibilities
//! - Memoize results per (command, cache key) for one inbound request
//! - Share a pending computation with every concurrent caller of the same key
//! - Drop entries on explicit removal or when the owning scope closes
//!
//! # Design Decisions
//! - Entries are `OnceCell`s inserted under the map lock, so check-and-insert
//!   is atomic and at most one computation per key runs at a time
//! - Failures are cached as well as successes
//! - The value type is part of the entry key; commands of different value
//!   types never collide
//! - A closed cache answers every call with `ScopeNotActive`

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;

use crate::resilience::error::CommandError;

type Cell<V> = OnceCell<Result<V, CommandError>>;
type EntryKey = (String, String, TypeId);
type Entries = HashMap<EntryKey, Arc<dyn Any + Send + Sync>>;

/// Cache owned by one request scope.
#[derive(Debug)]
pub struct RequestCache {
    /// `None` once the owning scope has closed.
    entries: Mutex<Option<Entries>>,
}

impl Default for RequestCache {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Some(HashMap::new())),
        }
    }
}

impl RequestCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Entries>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached result for `(operation, key)` or compute it once.
    pub async fn get_or_compute<V, F, Fut>(
        &self,
        operation: &str,
        key: &str,
        compute: F,
    ) -> Result<V, CommandError>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CommandError>>,
    {
        let cell = {
            let mut guard = self.lock();
            let entries = guard.as_mut().ok_or(CommandError::ScopeNotActive)?;
            let entry_key = (operation.to_string(), key.to_string(), TypeId::of::<V>());

            let existing = entries
                .get(&entry_key)
                .cloned()
                .and_then(|entry| entry.downcast::<Cell<V>>().ok());
            match existing {
                Some(cell) => cell,
                None => {
                    let cell: Arc<Cell<V>> = Arc::new(OnceCell::new());
                    entries.insert(entry_key, Arc::clone(&cell) as Arc<dyn Any + Send + Sync>);
                    cell
                }
            }
        };

        if let Some(hit) = cell.get() {
            tracing::debug!(operation = %operation, key = %key, "Request cache hit");
            return hit.clone();
        }

        cell.get_or_init(compute).await.clone()
    }

    /// Remove every entry for `(operation, key)`; returns how many were dropped.
    pub fn remove(&self, operation: &str, key: &str) -> Result<usize, CommandError> {
        let mut guard = self.lock();
        let entries = guard.as_mut().ok_or(CommandError::ScopeNotActive)?;
        let before = entries.len();
        entries.retain(|(op, k, _), _| !(op == operation && k == key));
        Ok(before - entries.len())
    }

    /// Number of live entries (0 once closed).
    pub fn len(&self) -> usize {
        self.lock().as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Discard all entries and refuse further use.
    ///
    /// Returns the number of discarded entries, or `None` if already closed.
    pub(crate) fn close(&self) -> Option<usize> {
        self.lock().take().map(|entries| entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::remote::RemoteError;

    async fn counted(calls: &AtomicUsize, value: i64) -> Result<i64, CommandError> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(value)
    }

    #[tokio::test]
    async fn test_resolved_entry_is_reused() {
        let cache = RequestCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache.get_or_compute("getUserCache", "7", || counted(&calls, 7)).await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_pending_entry() {
        let cache = RequestCache::new();
        let calls = AtomicUsize::new(0);

        let (a, b, c) = tokio::join!(
            cache.get_or_compute("getUserCache", "7", || counted(&calls, 7)),
            cache.get_or_compute("getUserCache", "7", || counted(&calls, 8)),
            cache.get_or_compute("getUserCache", "7", || counted(&calls, 9)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!((a, b, c), (Ok(7), Ok(7), Ok(7)));
    }

    #[tokio::test]
    async fn test_failures_are_cached() {
        let cache = RequestCache::new();
        let calls = AtomicUsize::new(0);
        let failing = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<i64, _>(CommandError::Downstream(RemoteError::Transport("down".into())))
        };

        assert!(cache.get_or_compute("op", "1", failing).await.is_err());
        assert!(cache.get_or_compute("op", "1", failing).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_forces_recompute() {
        let cache = RequestCache::new();
        let calls = AtomicUsize::new(0);

        cache.get_or_compute("getUserCache", "7", || counted(&calls, 7)).await.unwrap();
        cache.get_or_compute("getUserCache", "8", || counted(&calls, 8)).await.unwrap();
        assert_eq!(cache.remove("getUserCache", "7"), Ok(1));
        assert_eq!(cache.remove("getUserCache", "7"), Ok(0));

        cache.get_or_compute("getUserCache", "7", || counted(&calls, 7)).await.unwrap();
        cache.get_or_compute("getUserCache", "8", || counted(&calls, 8)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_operations_and_types_are_isolated() {
        let cache = RequestCache::new();
        let calls = AtomicUsize::new(0);

        cache.get_or_compute("a", "1", || counted(&calls, 1)).await.unwrap();
        cache.get_or_compute("b", "1", || counted(&calls, 1)).await.unwrap();
        let text = cache
            .get_or_compute("a", "1", || async { Ok::<_, CommandError>("one".to_string()) })
            .await;

        assert_eq!(text.as_deref(), Ok("one"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.remove("a", "1"), Ok(2));
    }

    #[tokio::test]
    async fn test_closed_cache_refuses_use() {
        let cache = RequestCache::new();
        let calls = AtomicUsize::new(0);
        cache.get_or_compute("op", "1", || counted(&calls, 1)).await.unwrap();

        assert_eq!(cache.close(), Some(1));
        assert_eq!(cache.close(), None);
        assert!(!cache.is_open());
        assert_eq!(
            cache.get_or_compute("op", "1", || counted(&calls, 1)).await,
            Err(CommandError::ScopeNotActive)
        );
        assert_eq!(cache.remove("op", "1"), Err(CommandError::ScopeNotActive));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
