//! Timeout enforcement.
//!
//! # Responsibilities
//! - Run a primary call on its own task
//! - Bound the wait for it with the command timeout
//! - Report panics of the primary task as ordinary failures
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - A timed-out call is detached, not aborted: its result is discarded
//!   but the downstream request is allowed to finish, holding whatever
//!   resources the call future owns until then

use std::future::Future;
use std::time::Duration;

use tokio::time;

use crate::remote::RemoteError;

/// Result of a deadline-bounded call.
#[derive(Debug)]
pub enum Deadline<V> {
    Completed(Result<V, RemoteError>),
    Elapsed,
}

/// Spawn `call` and wait at most `timeout` for it.
pub async fn run_with_timeout<V, Fut>(call: Fut, timeout: Duration) -> Deadline<V>
where
    V: Send + 'static,
    Fut: Future<Output = Result<V, RemoteError>> + Send + 'static,
{
    let handle = tokio::spawn(call);
    match time::timeout(timeout, handle).await {
        Ok(Ok(result)) => Deadline::Completed(result),
        Ok(Err(join_error)) => Deadline::Completed(Err(RemoteError::Internal(join_error.to_string()))),
        Err(_) => Deadline::Elapsed,
    }
}
