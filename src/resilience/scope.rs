//! Request scope management.
//!
//! # Responsibilities
//! - Open one scope per inbound request, with a unique id
//! - Own the scope's request cache
//! - Close the scope exactly once, including on error and cancellation paths
//!
//! # Design Decisions
//! - Scopes are explicit handles passed by reference, never ambient state
//! - `ScopeGuard` closes on drop, so an early return, a panic unwinding
//!   through the handler or a dropped request future all close the scope
//! - Using a closed scope's cache is a hard `ScopeNotActive` failure
//! - Closing does not cancel calls already dispatched by the scope

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::resilience::request_cache::RequestCache;

#[derive(Debug)]
struct ScopeInner {
    id: Uuid,
    opened_at: Instant,
    cache: RequestCache,
}

/// Lifetime boundary of one inbound request. Clones share the same scope.
#[derive(Debug, Clone)]
pub struct RequestScope {
    inner: Arc<ScopeInner>,
}

impl RequestScope {
    fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: Uuid::new_v4(),
                opened_at: Instant::now(),
                cache: RequestCache::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.cache.is_open()
    }

    pub fn age(&self) -> Duration {
        self.inner.opened_at.elapsed()
    }

    pub fn cache(&self) -> &RequestCache {
        &self.inner.cache
    }
}

/// Opens and closes request scopes.
#[derive(Debug, Clone, Default)]
pub struct RequestScopeManager {
    open_scopes: Arc<AtomicUsize>,
}

impl RequestScopeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new scope. The caller is responsible for `close`.
    pub fn open(&self) -> RequestScope {
        let scope = RequestScope::new();
        let open = self.open_scopes.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(scope = %scope.id(), open_scopes = open, "Request scope opened");
        scope
    }

    /// Open a scope that closes itself when the guard is dropped.
    pub fn open_guarded(&self) -> ScopeGuard {
        ScopeGuard {
            manager: self.clone(),
            scope: self.open(),
        }
    }

    /// Close `scope`, discarding its cache. Closing twice is a no-op.
    pub fn close(&self, scope: &RequestScope) {
        if let Some(discarded) = scope.cache().close() {
            let open = self.open_scopes.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
            tracing::debug!(
                scope = %scope.id(),
                discarded_entries = discarded,
                age_ms = scope.age().as_millis() as u64,
                open_scopes = open,
                "Request scope closed"
            );
        }
    }

    /// Scopes opened and not yet closed.
    pub fn open_count(&self) -> usize {
        self.open_scopes.load(Ordering::Relaxed)
    }
}

/// Closes its scope on drop.
#[derive(Debug)]
pub struct ScopeGuard {
    manager: RequestScopeManager,
    scope: RequestScope,
}

impl ScopeGuard {
    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.manager.close(&self.scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_have_unique_ids() {
        let manager = RequestScopeManager::new();
        let a = manager.open();
        let b = manager.open();
        assert_ne!(a.id(), b.id());
        assert_eq!(manager.open_count(), 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        let manager = RequestScopeManager::new();
        let scope = manager.open();
        let clone = scope.clone();

        manager.close(&scope);
        manager.close(&clone);
        assert!(!scope.is_active());
        assert!(!clone.is_active());
        assert_eq!(manager.open_count(), 0);
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let manager = RequestScopeManager::new();
        let scope = {
            let guard = manager.open_guarded();
            assert!(guard.scope().is_active());
            guard.scope().clone()
        };
        assert!(!scope.is_active());
        assert_eq!(manager.open_count(), 0);
    }

    #[test]
    fn test_guard_closes_on_panic() {
        let manager = RequestScopeManager::new();
        let inner = manager.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = inner.open_guarded();
            panic!("handler failed");
        });
        assert!(result.is_err());
        assert_eq!(manager.open_count(), 0);
    }
}
