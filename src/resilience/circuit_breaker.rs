//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: downstream assumed down, requests fail fast
//! - Half-Open: testing if downstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: volume >= request_volume_threshold
//!                and error % >= error_threshold_percentage within the rolling window
//! Open → Half-Open: first request after sleep_window (admitted as the probe)
//! Half-Open → Closed: probe succeeds (window reset)
//! Half-Open → Open: probe fails, times out or is rejected (trip time refreshed)
//! ```
//!
//! # Design Decisions
//! - Per-command circuit breaker (not global), see `BreakerRegistry`
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open (prevents hammering a recovering downstream)
//! - A probe permit dropped without an outcome frees the probe slot

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
pub use crate::resilience::rolling::{Outcome, OutcomeCounts};
use crate::resilience::rolling::RollingWindow;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: RollingWindow,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Point-in-time view of a breaker, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub counts: OutcomeCounts,
    pub error_percentage: u8,
}

/// Circuit breaker for one command.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window = RollingWindow::new(
            Duration::from_millis(config.rolling_window_ms),
            config.rolling_buckets,
        );
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let counts = inner.window.snapshot(Instant::now());
        BreakerSnapshot {
            state: inner.state,
            counts,
            error_percentage: counts.error_percentage(),
        }
    }

    /// Decide whether a new invocation may proceed.
    ///
    /// In Half-Open a `true` answer reserves the single probe slot; the caller
    /// must follow up with `record_outcome` (or `release_probe`).
    pub fn allow_request(&self) -> bool {
        self.admit().is_some()
    }

    /// Guarded form of `allow_request` used by the executor.
    pub fn try_acquire(self: &Arc<Self>) -> Option<BreakerPermit> {
        self.admit().map(|probe| BreakerPermit {
            breaker: Arc::clone(self),
            probe,
            finished: false,
        })
    }

    /// Returns `Some(is_probe)` when the request is admitted.
    fn admit(&self) -> Option<bool> {
        if self.config.force_open {
            return None;
        }
        if self.config.force_closed || !self.config.enabled {
            return Some(false);
        }

        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(false),
            CircuitState::Open => {
                let sleep_window = Duration::from_millis(self.config.sleep_window_ms);
                let expired = inner
                    .opened_at
                    .map_or(true, |opened| opened.elapsed() >= sleep_window);
                if expired {
                    tracing::info!(command = %self.name, "Circuit breaker transitioning OPEN -> HALF_OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Some(true)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(true)
                }
            }
        }
    }

    /// Record the outcome of an admitted invocation.
    ///
    /// While Half-Open with a probe in flight, the outcome is taken as the
    /// probe's result.
    pub fn record_outcome(&self, outcome: Outcome) {
        let probe = {
            let inner = self.lock();
            inner.state == CircuitState::HalfOpen && inner.probe_in_flight
        };
        self.complete(outcome, probe);
    }

    fn complete(&self, outcome: Outcome, probe: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.window.record(outcome, now);

        if !self.config.enabled || self.config.force_closed || self.config.force_open {
            return;
        }

        match inner.state {
            CircuitState::HalfOpen if probe => {
                inner.probe_in_flight = false;
                if outcome == Outcome::Success {
                    tracing::info!(command = %self.name, "Circuit breaker transitioning HALF_OPEN -> CLOSED");
                    inner.state = CircuitState::Closed;
                    inner.window.reset();
                    inner.opened_at = None;
                } else {
                    tracing::warn!(
                        command = %self.name,
                        outcome = ?outcome,
                        "Circuit breaker transitioning HALF_OPEN -> OPEN (probe failed)"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                }
            }
            CircuitState::Closed if outcome != Outcome::Success => {
                let counts = inner.window.snapshot(now);
                let error_percentage = counts.error_percentage();
                if counts.total() >= self.config.request_volume_threshold
                    && error_percentage >= self.config.error_threshold_percentage
                {
                    tracing::warn!(
                        command = %self.name,
                        total = counts.total(),
                        error_percentage,
                        threshold = self.config.error_threshold_percentage,
                        "Circuit breaker transitioning CLOSED -> OPEN"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                }
            }
            _ => {}
        }
    }

    /// Free a reserved probe slot without counting an outcome.
    pub fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    /// Reset the breaker to Closed with an empty window.
    pub fn reset(&self) {
        let mut inner = self.lock();
        tracing::info!(command = %self.name, "Circuit breaker manually reset to CLOSED");
        inner.state = CircuitState::Closed;
        inner.window.reset();
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }
}

/// Admission ticket for one invocation.
///
/// Consumed by `record`; dropping it unrecorded frees a probe slot.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    finished: bool,
}

impl BreakerPermit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record(mut self, outcome: Outcome) {
        self.finished = true;
        self.breaker.complete(outcome, self.probe);
    }

    /// Finish without counting (ignored failures).
    pub fn release(mut self) {
        self.finished = true;
        if self.probe {
            self.breaker.release_probe();
        }
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.finished && self.probe {
            self.breaker.release_probe();
        }
    }
}

/// Per-command breakers, created on first use.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breaker for `name`, created from `config` if it does not exist yet.
    pub fn get_or_create(&self, name: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config.clone())));
        Arc::clone(breaker.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
