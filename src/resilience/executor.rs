//! Command execution.
//!
//! # Data Flow
//! ```text
//! execute(command, key)
//!     → breaker permit?        no  → CircuitOpen ─┐
//!     → bulkhead slot?         no  → Rejected  ───┤ (recorded)
//!     → spawn primary + timeout                   │
//!         Ok                   → Success          │
//!         Err, ignored         → Ignored (returned as-is)
//!         Err                  → Downstream ──────┤ (recorded)
//!         elapsed              → Timeout ─────────┤ (recorded)
//!                                                 ▼
//!                                        fallback::dispatch
//! ```
//!
//! The bulkhead slot is released when the primary finishes, not when the
//! caller stops waiting, so timed-out calls keep counting against the limit.

use std::time::Instant;

use crate::resilience::circuit_breaker::{BreakerRegistry, Outcome};
use crate::resilience::command::Command;
use crate::resilience::error::CommandError;
use crate::resilience::fallback;
use crate::resilience::scope::RequestScope;
use crate::resilience::timeouts::{run_with_timeout, Deadline};

/// Runs commands against their per-name breakers.
#[derive(Debug, Default)]
pub struct CommandExecutor {
    breakers: BreakerRegistry,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Execute `command` for `key`, recovering through its fallback.
    pub async fn execute<K, V>(&self, command: &Command<K, V>, key: K) -> Result<V, CommandError>
    where
        K: Clone + Send + 'static,
        V: Send + 'static,
    {
        match self.execute_primary(command, key.clone()).await {
            Ok(value) => Ok(value),
            Err(cause) => fallback::dispatch(command.name(), command.fallback(), key, cause).await,
        }
    }

    /// Execute through the scope's request cache when the command has a
    /// cache key; otherwise identical to `execute`.
    pub async fn execute_in<K, V>(
        &self,
        scope: &RequestScope,
        command: &Command<K, V>,
        key: K,
    ) -> Result<V, CommandError>
    where
        K: Clone + Send + 'static,
        V: Clone + Send + Sync + 'static,
    {
        match command.cache_key_for(&key) {
            Some(cache_key) => {
                scope
                    .cache()
                    .get_or_compute(command.name(), &cache_key, || self.execute(command, key))
                    .await
            }
            None => self.execute(command, key).await,
        }
    }

    /// Drop the scope's cached result of `command` for `key`.
    pub fn invalidate<K, V>(
        &self,
        scope: &RequestScope,
        command: &Command<K, V>,
        key: &K,
    ) -> Result<(), CommandError> {
        match command.cache_key_for(key) {
            Some(cache_key) => {
                let removed = scope.cache().remove(command.name(), &cache_key)?;
                tracing::debug!(
                    command = %command.name(),
                    cache_key = %cache_key,
                    removed,
                    scope = %scope.id(),
                    "Request cache entry invalidated"
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Breaker, bulkhead, timeout and classification, without fallback.
    pub async fn execute_primary<K, V>(&self, command: &Command<K, V>, key: K) -> Result<V, CommandError>
    where
        K: Send + 'static,
        V: Send + 'static,
    {
        let name = command.name();
        let breaker = self.breakers.get_or_create(name, command.breaker_config());

        let Some(permit) = breaker.try_acquire() else {
            tracing::debug!(command = %name, group = %command.group(), "Short-circuited by open breaker");
            return Err(CommandError::CircuitOpen {
                command: name.to_string(),
            });
        };

        let Ok(slot) = command.bulkhead().try_acquire_owned() else {
            tracing::warn!(command = %name, group = %command.group(), "Concurrency limit reached, rejecting");
            permit.record(Outcome::Rejected);
            return Err(CommandError::Rejected {
                command: name.to_string(),
            });
        };

        let started = Instant::now();
        let timeout = command.timeout();
        // The slot travels with the primary so a detached call still holds it.
        let call = command.start(key);
        let primary = async move {
            let _slot = slot;
            call.await
        };
        match run_with_timeout(primary, timeout).await {
            Deadline::Completed(Ok(value)) => {
                permit.record(Outcome::Success);
                tracing::debug!(
                    command = %name,
                    group = %command.group(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Command succeeded"
                );
                Ok(value)
            }
            Deadline::Completed(Err(error)) if command.ignores(&error) => {
                permit.release();
                tracing::debug!(command = %name, error = %error, "Ignored failure, bypassing fallback");
                Err(CommandError::Ignored(error))
            }
            Deadline::Completed(Err(error)) => {
                permit.record(Outcome::Failure);
                tracing::warn!(command = %name, group = %command.group(), error = %error, "Command failed");
                Err(CommandError::Downstream(error))
            }
            Deadline::Elapsed => {
                permit.record(Outcome::Timeout);
                tracing::warn!(
                    command = %name,
                    group = %command.group(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Command timed out"
                );
                Err(CommandError::Timeout {
                    command: name.to_string(),
                    timeout,
                })
            }
        }
    }
}
