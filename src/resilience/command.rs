//! Command definitions.
//!
//! A `Command` is the explicit, data-only description of one resilient
//! operation: its name and group, execution limits, breaker settings, the
//! primary function and the optional fallback, cache-key derivation and
//! ignore predicate. Commands are built once at startup and shared.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;

use crate::config::{CircuitBreakerConfig, CommandConfig, ServiceConfig};
use crate::remote::RemoteError;
use crate::resilience::error::CommandError;
use crate::resilience::fallback::Fallback;

type PrimaryFn<K, V> = Arc<dyn Fn(K) -> BoxFuture<'static, Result<V, RemoteError>> + Send + Sync>;
type CacheKeyFn<K> = Arc<dyn Fn(&K) -> String + Send + Sync>;
type IgnoreFn = Arc<dyn Fn(&RemoteError) -> bool + Send + Sync>;

/// A named, resilience-wrapped remote call.
pub struct Command<K, V> {
    name: String,
    group: String,
    config: CommandConfig,
    breaker: CircuitBreakerConfig,
    bulkhead: Arc<Semaphore>,
    run: PrimaryFn<K, V>,
    fallback: Option<Fallback<K, V>>,
    cache_key: Option<CacheKeyFn<K>>,
    ignore: Option<IgnoreFn>,
}

impl<K, V> Command<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Start building a command around its primary function.
    pub fn builder<F, Fut>(name: impl Into<String>, run: F) -> CommandBuilder<K, V>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, RemoteError>> + Send + 'static,
    {
        let run: PrimaryFn<K, V> =
            Arc::new(move |key: K| -> BoxFuture<'static, Result<V, RemoteError>> { Box::pin(run(key)) });
        let name = name.into();
        CommandBuilder {
            group: name.clone(),
            name,
            config: CommandConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            run,
            fallback: None,
            cache_key: None,
            ignore: None,
        }
    }
}

impl<K, V> Command<K, V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    pub fn breaker_config(&self) -> &CircuitBreakerConfig {
        &self.breaker
    }

    pub(crate) fn bulkhead(&self) -> Arc<Semaphore> {
        Arc::clone(&self.bulkhead)
    }

    pub(crate) fn start(&self, key: K) -> BoxFuture<'static, Result<V, RemoteError>> {
        (self.run)(key)
    }

    pub fn fallback(&self) -> Option<&Fallback<K, V>> {
        self.fallback.as_ref()
    }

    /// Cache key for `key`, when the command is request-cached.
    pub fn cache_key_for(&self, key: &K) -> Option<String> {
        self.cache_key.as_ref().map(|derive| derive(key))
    }

    pub fn is_cached(&self) -> bool {
        self.cache_key.is_some()
    }

    /// Whether `error` passes through without counting or fallback.
    pub fn ignores(&self, error: &RemoteError) -> bool {
        self.ignore.as_ref().is_some_and(|ignore| ignore(error))
    }
}

/// Builder for [`Command`].
pub struct CommandBuilder<K, V> {
    name: String,
    group: String,
    config: CommandConfig,
    breaker: CircuitBreakerConfig,
    run: PrimaryFn<K, V>,
    fallback: Option<Fallback<K, V>>,
    cache_key: Option<CacheKeyFn<K>>,
    ignore: Option<IgnoreFn>,
}

impl<K, V> CommandBuilder<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Group name used to aggregate log output. Defaults to the command name.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Take execution and breaker settings for this command's name from
    /// the service configuration.
    pub fn configured(mut self, config: &ServiceConfig) -> Self {
        self.config = config.command_for(&self.name);
        self.breaker = config.circuit_breaker_for(&self.name);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    pub fn circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
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

    /// Enable request caching with the given key derivation.
    pub fn cache_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> String + Send + Sync + 'static,
    {
        self.cache_key = Some(Arc::new(f));
        self
    }

    /// Failures matching `f` propagate as `Ignored`, skipping fallback and
    /// breaker accounting.
    pub fn ignore<F>(mut self, f: F) -> Self
    where
        F: Fn(&RemoteError) -> bool + Send + Sync + 'static,
    {
        self.ignore = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Command<K, V> {
        let permits = self.config.max_concurrent_requests.clamp(1, Semaphore::MAX_PERMITS);
        Command {
            name: self.name,
            group: self.group,
            bulkhead: Arc::new(Semaphore::new(permits)),
            config: self.config,
            breaker: self.breaker,
            run: self.run,
            fallback: self.fallback,
            cache_key: self.cache_key,
            ignore: self.ignore,
        }
    }
}
