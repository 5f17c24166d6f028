//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, percentages ≤ 100, buckets divide window)
//! - Check addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{CircuitBreakerConfig, ServiceConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }

    if Url::parse(&config.user_service.base_url).is_err() {
        errors.push(ValidationError::new(
            "user_service.base_url",
            format!("'{}' is not a URL", config.user_service.base_url),
        ));
    }

    if config.command.timeout_ms == 0 {
        errors.push(ValidationError::new("command.timeout_ms", "must be > 0"));
    }
    if config.command.max_concurrent_requests == 0 {
        errors.push(ValidationError::new("command.max_concurrent_requests", "must be > 0"));
    }

    check_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);

    if config.collapser.max_requests_in_batch == 0 {
        errors.push(ValidationError::new("collapser.max_requests_in_batch", "must be > 0"));
    }

    let mut names: Vec<_> = config.commands.keys().collect();
    names.sort();
    for name in names {
        let prefix = format!("commands.{}", name);
        if config.command_for(name).timeout_ms == 0 {
            errors.push(ValidationError::new(format!("{}.timeout_ms", prefix), "must be > 0"));
        }
        if config.command_for(name).max_concurrent_requests == 0 {
            errors.push(ValidationError::new(
                format!("{}.max_concurrent_requests", prefix),
                "must be > 0",
            ));
        }
        if config.collapser_for(name).max_requests_in_batch == 0 {
            errors.push(ValidationError::new(
                format!("{}.max_requests_in_batch", prefix),
                "must be > 0",
            ));
        }
        check_breaker(&prefix, &config.circuit_breaker_for(name), &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_breaker(prefix: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.error_threshold_percentage > 100 {
        errors.push(ValidationError::new(
            format!("{}.error_threshold_percentage", prefix),
            "must be between 0 and 100",
        ));
    }
    if breaker.rolling_buckets == 0 {
        errors.push(ValidationError::new(format!("{}.rolling_buckets", prefix), "must be > 0"));
    } else if breaker.rolling_window_ms % u64::from(breaker.rolling_buckets) != 0 {
        errors.push(ValidationError::new(
            format!("{}.rolling_window_ms", prefix),
            "must be divisible by rolling_buckets",
        ));
    }
    if breaker.rolling_window_ms == 0 {
        errors.push(ValidationError::new(format!("{}.rolling_window_ms", prefix), "must be > 0"));
    }
    if breaker.force_open && breaker.force_closed {
        errors.push(ValidationError::new(
            format!("{}.force_open", prefix),
            "force_open and force_closed are mutually exclusive",
        ));
    }
}
