//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Handler:
//!     → scope.rs (request scope opened by middleware)
//!     → request_cache.rs (memoized result for (command, key)?)
//!     → collapser.rs (optional: merge into a batch window)
//!     → executor.rs
//!         → circuit_breaker.rs (admit? record outcome)
//!         → command.rs bulkhead (free slot?)
//!         → timeouts.rs (spawn primary, bound the wait)
//!     → fallback.rs (recover eligible failures)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline; timeouts always count as failures
//! - The breaker only trips on outcomes it recorded in its rolling window
//! - Commands are plain data built once at startup; the executor owns the
//!   shared breaker registry
//! - Request-scoped state is passed explicitly, never held thread-locally

pub mod circuit_breaker;
pub mod collapser;
pub mod command;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod request_cache;
pub mod rolling;
pub mod scope;
pub mod timeouts;

pub use circuit_breaker::{BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use collapser::{BatchCommand, Collapser, CollapserBuilder};
pub use command::{Command, CommandBuilder};
pub use error::CommandError;
pub use executor::CommandExecutor;
pub use fallback::Fallback;
pub use request_cache::RequestCache;
pub use rolling::{Outcome, OutcomeCounts};
pub use scope::{RequestScope, RequestScopeManager, ScopeGuard};
