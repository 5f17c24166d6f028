//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (command, group, scope, ...)
//!     → logging.rs (filter + fmt/JSON output)
//!
//! HTTP requests:
//!     → tower-http TraceLayer spans, correlated by x-request-id
//! ```

pub mod logging;

pub use logging::init_logging;
