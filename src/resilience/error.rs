//! Failure taxonomy for resilience-wrapped operations.

use std::time::Duration;

use thiserror::Error;

use crate::remote::RemoteError;

/// Why an invocation did not produce its primary value.
///
/// `Clone` because one cached or batched result is handed to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// The downstream call failed or answered with an error envelope.
    #[error("downstream call failed: {0}")]
    Downstream(RemoteError),

    /// No response within the command timeout.
    #[error("command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The breaker rejected the call without attempting it.
    #[error("circuit breaker for '{command}' is open")]
    CircuitOpen { command: String },

    /// The command's concurrency limit was reached.
    #[error("command '{command}' rejected: too many concurrent executions")]
    Rejected { command: String },

    /// A failure the command is configured to pass through untouched.
    #[error("{0}")]
    Ignored(RemoteError),

    /// Both the primary path and the fallback failed.
    #[error("fallback failed ({fallback}) after primary failure ({primary})")]
    FallbackFailed {
        primary: Box<CommandError>,
        fallback: RemoteError,
    },

    /// A request-scoped cache was used with no open request scope.
    #[error("request scope is not active; open a request scope before using the request cache")]
    ScopeNotActive,

    /// A collapsed key was absent from its batch result.
    #[error("key '{key}' not found in batch result of '{command}'")]
    NotFound { command: String, key: String },
}

impl CommandError {
    /// Whether fallback dispatch applies to this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CommandError::Downstream(_)
                | CommandError::Timeout { .. }
                | CommandError::CircuitOpen { .. }
                | CommandError::Rejected { .. }
        )
    }

    /// Short classification used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Downstream(_) => "downstream",
            CommandError::Timeout { .. } => "timeout",
            CommandError::CircuitOpen { .. } => "circuit_open",
            CommandError::Rejected { .. } => "rejected",
            CommandError::Ignored(_) => "ignored",
            CommandError::FallbackFailed { .. } => "fallback_failed",
            CommandError::ScopeNotActive => "scope_not_active",
            CommandError::NotFound { .. } => "not_found",
        }
    }
}
