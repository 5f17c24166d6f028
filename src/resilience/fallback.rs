//! Fallback dispatch.
//!
//! # Responsibilities
//! - Hold a substitute function with the same key as the primary path
//! - Decide whether a failure is eligible for fallback
//! - Wrap a failing fallback together with the primary cause
//!
//! # Design Decisions
//! - A fallback only receives the key and the cause, never the executor, so
//!   it has no route back into the primary path
//! - Runs on the caller's task, outside the breaker and without a timeout
//! - Fallback failure is terminal (`FallbackFailed`); there is no second tier

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::remote::RemoteError;
use crate::resilience::error::CommandError;

type FallbackFn<K, V> =
    Arc<dyn Fn(K, CommandError) -> BoxFuture<'static, Result<V, RemoteError>> + Send + Sync>;

/// Substitute logic for a command or collapser.
pub struct Fallback<K, V> {
    f: FallbackFn<K, V>,
}

impl<K, V> Clone for Fallback<K, V> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<K, V> Fallback<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Fallback that only looks at the key.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, RemoteError>> + Send + 'static,
    {
        let f: FallbackFn<K, V> = Arc::new(
            move |key: K, _cause: CommandError| -> BoxFuture<'static, Result<V, RemoteError>> {
                Box::pin(f(key))
            },
        );
        Self { f }
    }

    /// Fallback that also inspects the failure that triggered it.
    pub fn with_cause<F, Fut>(f: F) -> Self
    where
        F: Fn(K, CommandError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, RemoteError>> + Send + 'static,
    {
        let f: FallbackFn<K, V> = Arc::new(
            move |key: K, cause: CommandError| -> BoxFuture<'static, Result<V, RemoteError>> {
                Box::pin(f(key, cause))
            },
        );
        Self { f }
    }
}

/// Recover `cause` through `fallback` when it is eligible.
///
/// Non-recoverable causes and commands without a fallback return the cause
/// unchanged.
pub async fn dispatch<K, V>(
    command: &str,
    fallback: Option<&Fallback<K, V>>,
    key: K,
    cause: CommandError,
) -> Result<V, CommandError> {
    if !cause.is_recoverable() {
        return Err(cause);
    }
    let Some(fallback) = fallback else {
        tracing::debug!(command = %command, kind = cause.kind(), "No fallback configured");
        return Err(cause);
    };

    tracing::warn!(
        command = %command,
        kind = cause.kind(),
        cause = %cause,
        "Primary path failed, dispatching fallback"
    );

    match (fallback.f)(key, cause.clone()).await {
        Ok(value) => Ok(value),
        Err(fallback_error) => {
            tracing::error!(
                command = %command,
                cause = %cause,
                fallback_error = %fallback_error,
                "Fallback failed"
            );
            Err(CommandError::FallbackFailed {
                primary: Box::new(cause),
                fallback: fallback_error,
            })
        }
    }
}
