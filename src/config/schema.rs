//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Inbound HTTP server settings.
    pub server: ServerConfig,

    /// Downstream user service location.
    pub user_service: UserServiceConfig,

    /// Defaults applied to every command.
    pub command: CommandConfig,

    /// Defaults applied to every command's circuit breaker.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Defaults applied to every collapser.
    pub collapser: CollapserConfig,

    /// Per-command overrides, keyed by command name.
    pub commands: HashMap<String, CommandOverride>,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Command settings for `name` with overrides applied.
    pub fn command_for(&self, name: &str) -> CommandConfig {
        let mut resolved = self.command.clone();
        if let Some(o) = self.commands.get(name) {
            if let Some(v) = o.timeout_ms {
                resolved.timeout_ms = v;
            }
            if let Some(v) = o.max_concurrent_requests {
                resolved.max_concurrent_requests = v;
            }
        }
        resolved
    }

    /// Circuit breaker settings for `name` with overrides applied.
    pub fn circuit_breaker_for(&self, name: &str) -> CircuitBreakerConfig {
        let mut resolved = self.circuit_breaker.clone();
        if let Some(o) = self.commands.get(name) {
            if let Some(v) = o.breaker_enabled {
                resolved.enabled = v;
            }
            if let Some(v) = o.request_volume_threshold {
                resolved.request_volume_threshold = v;
            }
            if let Some(v) = o.error_threshold_percentage {
                resolved.error_threshold_percentage = v;
            }
            if let Some(v) = o.sleep_window_ms {
                resolved.sleep_window_ms = v;
            }
            if let Some(v) = o.rolling_window_ms {
                resolved.rolling_window_ms = v;
            }
            if let Some(v) = o.rolling_buckets {
                resolved.rolling_buckets = v;
            }
            if let Some(v) = o.force_open {
                resolved.force_open = v;
            }
            if let Some(v) = o.force_closed {
                resolved.force_closed = v;
            }
        }
        resolved
    }

    /// Collapser settings for `name` with overrides applied.
    pub fn collapser_for(&self, name: &str) -> CollapserConfig {
        let mut resolved = self.collapser.clone();
        if let Some(o) = self.commands.get(name) {
            if let Some(v) = o.timer_delay_ms {
                resolved.timer_delay_ms = v;
            }
            if let Some(v) = o.max_requests_in_batch {
                resolved.max_requests_in_batch = v;
            }
        }
        resolved
    }
}

/// Inbound server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8401").
    pub bind_address: String,

    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8401".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Downstream user service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UserServiceConfig {
    /// Base URL every operation path is resolved against.
    pub base_url: String,

    /// Idle pooled connections kept per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for UserServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8201".to_string(),
            pool_max_idle_per_host: 32,
        }
    }
}

/// Execution settings for a command.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Primary execution timeout in milliseconds.
    pub timeout_ms: u64,

    /// Concurrent primary executions allowed before rejecting.
    pub max_concurrent_requests: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            max_concurrent_requests: 10,
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When false the breaker always allows and never trips.
    pub enabled: bool,

    /// Minimum requests in the rolling window before the breaker may trip.
    pub request_volume_threshold: u64,

    /// Error percentage at or above which the breaker trips.
    pub error_threshold_percentage: u8,

    /// Time spent Open before a probe is allowed, in milliseconds.
    pub sleep_window_ms: u64,

    /// Length of the rolling statistics window in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is split into.
    pub rolling_buckets: u32,

    /// Reject every request.
    pub force_open: bool,

    /// Allow every request regardless of error rate. Outcomes are still counted.
    pub force_closed: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_volume_threshold: 20,
            error_threshold_percentage: 50,
            sleep_window_ms: 5000,
            rolling_window_ms: 10_000,
            rolling_buckets: 10,
            force_open: false,
            force_closed: false,
        }
    }
}

/// Request collapser settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollapserConfig {
    /// How long a batch window stays open, in milliseconds.
    pub timer_delay_ms: u64,

    /// Batch size that flushes the window early.
    pub max_requests_in_batch: usize,
}

impl Default for CollapserConfig {
    fn default() -> Self {
        Self {
            timer_delay_ms: 10,
            max_requests_in_batch: usize::MAX,
        }
    }
}

/// Per-command overrides. Unset fields keep the section defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandOverride {
    pub timeout_ms: Option<u64>,
    pub max_concurrent_requests: Option<usize>,
    pub breaker_enabled: Option<bool>,
    pub request_volume_threshold: Option<u64>,
    pub error_threshold_percentage: Option<u8>,
    pub sleep_window_ms: Option<u64>,
    pub rolling_window_ms: Option<u64>,
    pub rolling_buckets: Option<u32>,
    pub force_open: Option<bool>,
    pub force_closed: Option<bool>,
    pub timer_delay_ms: Option<u64>,
    pub max_requests_in_batch: Option<usize>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "hystrix_service=info,tower_http=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log line format: human-readable for development, JSON for aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8401");
        assert_eq!(config.command.timeout_ms, 1000);
        assert_eq!(config.circuit_breaker.request_volume_threshold, 20);
        assert_eq!(config.collapser.timer_delay_ms, 10);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_json_log_format() {
        let config: ServiceConfig = toml::from_str("[logging]\nformat = \"json\"").unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, LoggingConfig::default().level);
    }

    #[test]
    fn test_overrides_apply_per_command() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [command]
            timeout_ms = 500

            [commands.getUserCommand]
            timeout_ms = 2000
            sleep_window_ms = 100

            [commands.getUserFuture]
            timer_delay_ms = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.command_for("getUserCommand").timeout_ms, 2000);
        assert_eq!(config.command_for("getUser").timeout_ms, 500);
        assert_eq!(config.circuit_breaker_for("getUserCommand").sleep_window_ms, 100);
        assert_eq!(config.circuit_breaker_for("getUser").sleep_window_ms, 5000);
        assert_eq!(config.collapser_for("getUserFuture").timer_delay_ms, 100);
        assert_eq!(config.collapser_for("other").timer_delay_ms, 10);
    }

    #[test]
    fn test_rolling_window_override() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [commands.getUserByIds]
            rolling_window_ms = 2000
            rolling_buckets = 4
            "#,
        )
        .unwrap();

        let batch = config.circuit_breaker_for("getUserByIds");
        assert_eq!((batch.rolling_window_ms, batch.rolling_buckets), (2000, 4));
        let other = config.circuit_breaker_for("getUser");
        assert_eq!((other.rolling_window_ms, other.rolling_buckets), (10_000, 10));
    }
}
