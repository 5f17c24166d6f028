//! Request collapsing.
//!
//! # Responsibilities
//! - Gather concurrent single-key calls into a batch window
//! - Run one batch command per window through the executor
//! - Hand each waiter the value for its own key
//!
//! # Data Flow
//! ```text
//! collapse(key)
//!     → join open window (or open one and spawn its timer)
//!     → wait on oneshot
//!
//! timer fires | window full | flush()
//!     → window taken
//!     → executor.execute(batch, distinct keys in arrival order)
//!     → per key: value | NotFound; on batch error every waiter gets it
//! ```
//!
//! # Design Decisions
//! - Collapsing is global per collapser, not per request scope
//! - Windows carry an id; a timer only flushes the window it opened
//! - Breaker, bulkhead and timeout apply to the batch command, so the
//!   breaker sees failures that originate from collapsed calls
//! - Per-caller fallback runs after distribution, independently per caller

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::config::{CollapserConfig, ServiceConfig};
use crate::remote::RemoteError;
use crate::resilience::command::Command;
use crate::resilience::error::CommandError;
use crate::resilience::executor::CommandExecutor;
use crate::resilience::fallback::{self, Fallback};
use crate::resilience::scope::RequestScope;

type CacheKeyFn<K> = Arc<dyn Fn(&K) -> String + Send + Sync>;
type Waiter<V> = oneshot::Sender<Result<V, CommandError>>;

/// Batch command type paired with a `Collapser<K, V>`.
pub type BatchCommand<K, V> = Command<Vec<K>, HashMap<K, V>>;

struct BatchWindow<K, V> {
    id: u64,
    opened_at: Instant,
    keys: Vec<K>,
    waiters: HashMap<K, Vec<Waiter<V>>>,
}

impl<K, V> BatchWindow<K, V>
where
    K: Clone + Eq + Hash,
{
    fn new(id: u64) -> Self {
        Self {
            id,
            opened_at: Instant::now(),
            keys: Vec::new(),
            waiters: HashMap::new(),
        }
    }

    fn register(&mut self, key: K, waiter: Waiter<V>) {
        let waiters = self.waiters.entry(key.clone()).or_default();
        if waiters.is_empty() {
            self.keys.push(key);
        }
        waiters.push(waiter);
    }

    fn waiting(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }
}

struct CollapserInner<K, V> {
    name: String,
    config: CollapserConfig,
    batch: BatchCommand<K, V>,
    executor: Arc<CommandExecutor>,
    fallback: Option<Fallback<K, V>>,
    cache_key: Option<CacheKeyFn<K>>,
    window: Mutex<Option<BatchWindow<K, V>>>,
    next_window: AtomicU64,
}

/// Merges concurrent single-key calls into one batch call.
pub struct Collapser<K, V> {
    inner: Arc<CollapserInner<K, V>>,
}

impl<K, V> Clone for Collapser<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for Collapser<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collapser")
            .field("name", &self.inner.name)
            .field("batch", &self.inner.batch.name())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<K, V> Collapser<K, V>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Start building a collapser around its batch command.
    pub fn builder(name: impl Into<String>, batch: BatchCommand<K, V>) -> CollapserBuilder<K, V> {
        CollapserBuilder {
            name: name.into(),
            config: CollapserConfig::default(),
            batch,
            fallback: None,
            cache_key: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn timer_delay(&self) -> Duration {
        Duration::from_millis(self.inner.config.timer_delay_ms)
    }

    /// The batch command windows are flushed through. Executing it directly
    /// shares the collapser's breaker and bulkhead.
    pub fn batch_command(&self) -> &BatchCommand<K, V> {
        &self.inner.batch
    }

    /// Callers waiting in the open window, if any.
    pub fn pending(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, BatchWindow::waiting)
    }

    /// Register `key` in the current window and wait for its batch result.
    ///
    /// No fallback is applied; see [`Collapser::execute`].
    pub async fn collapse(&self, key: K) -> Result<V, CommandError> {
        let (tx, rx) = oneshot::channel();

        let full = {
            let mut guard = self.inner.lock();
            let window = guard.get_or_insert_with(|| {
                let id = self.inner.next_window.fetch_add(1, Ordering::Relaxed);
                self.spawn_timer(id);
                BatchWindow::new(id)
            });
            window.register(key, tx);
            if window.keys.len() >= self.inner.config.max_requests_in_batch {
                guard.take()
            } else {
                None
            }
        };

        if let Some(window) = full {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_batch(window, "max_batch_size").await });
        }

        rx.await.unwrap_or_else(|_| {
            Err(CommandError::Downstream(RemoteError::Internal(format!(
                "batch for collapser {} ended without a result",
                self.inner.name
            ))))
        })
    }

    /// Collapse `key`, recovering a failure through the per-caller fallback.
    pub async fn execute(&self, key: K) -> Result<V, CommandError> {
        match self.collapse(key.clone()).await {
            Ok(value) => Ok(value),
            Err(cause) => fallback::dispatch(&self.inner.name, self.inner.fallback.as_ref(), key, cause).await,
        }
    }

    /// Like `execute`, memoized in the scope's request cache when a cache key
    /// is configured.
    pub async fn execute_in(&self, scope: &RequestScope, key: K) -> Result<V, CommandError> {
        match self.inner.cache_key.as_ref().map(|derive| derive(&key)) {
            Some(cache_key) => {
                scope
                    .cache()
                    .get_or_compute(&self.inner.name, &cache_key, || self.execute(key))
                    .await
            }
            None => self.execute(key).await,
        }
    }

    /// Drop the scope's cached result for `key`.
    pub fn invalidate(&self, scope: &RequestScope, key: &K) -> Result<(), CommandError> {
        if let Some(derive) = self.inner.cache_key.as_ref() {
            let cache_key = derive(key);
            let removed = scope.cache().remove(&self.inner.name, &cache_key)?;
            tracing::debug!(
                collapser = %self.inner.name,
                cache_key = %cache_key,
                removed,
                scope = %scope.id(),
                "Request cache entry invalidated"
            );
        }
        Ok(())
    }

    /// Close the open window now and wait for its batch to resolve.
    pub async fn flush(&self) {
        let window = self.inner.lock().take();
        if let Some(window) = window {
            self.inner.run_batch(window, "flush").await;
        }
    }

    fn spawn_timer(&self, id: u64) {
        let inner = Arc::clone(&self.inner);
        let delay = self.timer_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let window = {
                let mut guard = inner.lock();
                if guard.as_ref().is_some_and(|window| window.id == id) {
                    guard.take()
                } else {
                    None
                }
            };
            if let Some(window) = window {
                inner.run_batch(window, "timer").await;
            }
        });
    }
}

impl<K, V> CollapserInner<K, V>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, Option<BatchWindow<K, V>>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_batch(&self, window: BatchWindow<K, V>, trigger: &'static str) {
        let BatchWindow {
            id,
            opened_at,
            keys,
            waiters,
        } = window;

        tracing::debug!(
            collapser = %self.name,
            window = id,
            trigger,
            batch_size = keys.len(),
            waiting = waiters.values().map(Vec::len).sum::<usize>(),
            window_ms = opened_at.elapsed().as_millis() as u64,
            "Flushing batch window"
        );

        match self.executor.execute(&self.batch, keys).await {
            Ok(values) => {
                for (key, senders) in waiters {
                    let outcome = match values.get(&key) {
                        Some(value) => Ok(value.clone()),
                        None => Err(CommandError::NotFound {
                            command: self.name.clone(),
                            key: format!("{key:?}"),
                        }),
                    };
                    for sender in senders {
                        let _ = sender.send(outcome.clone());
                    }
                }
            }
            Err(error) => {
                tracing::warn!(collapser = %self.name, window = id, error = %error, "Batch failed");
                for sender in waiters.into_values().flatten() {
                    let _ = sender.send(Err(error.clone()));
                }
            }
        }
    }
}

/// Builder for [`Collapser`].
pub struct CollapserBuilder<K, V> {
    name: String,
    config: CollapserConfig,
    batch: BatchCommand<K, V>,
    fallback: Option<Fallback<K, V>>,
    cache_key: Option<CacheKeyFn<K>>,
}

impl<K, V> CollapserBuilder<K, V>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Take window settings for this collapser's name from the service
    /// configuration.
    pub fn configured(mut self, config: &ServiceConfig) -> Self {
        self.config = config.collapser_for(&self.name);
        self
    }

    pub fn timer_delay(mut self, delay: Duration) -> Self {
        self.config.timer_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn max_requests_in_batch(mut self, limit: usize) -> Self {
        self.config.max_requests_in_batch = limit.max(1);
        self
    }

    pub fn fallback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, RemoteError>> + Send + 'static,
    {
        self.fallback = Some(Fallback::new(f));
        self
    }

    pub fn fallback_with_cause<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(K, CommandError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, RemoteError>> + Send + 'static,
    {
        self.fallback = Some(Fallback::with_cause(f));
        self
    }

    pub fn cache_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        self.cache_key = Some(Arc::new(f));
        self
    }

    pub fn build(self, executor: Arc<CommandExecutor>) -> Collapser<K, V> {
        Collapser {
            inner: Arc::new(CollapserInner {
                name: self.name,
                config: self.config,
                batch: self.batch,
                executor,
                fallback: self.fallback,
                cache_key: self.cache_key,
                window: Mutex::new(None),
                next_window: AtomicU64::new(0),
            }),
        }
    }
}
