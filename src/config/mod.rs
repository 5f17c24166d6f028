//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → command/collapser settings resolved per name at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; commands are built from it exactly once
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, CollapserConfig, CommandConfig, CommandOverride, LogFormat, LoggingConfig,
    ServerConfig, ServiceConfig, UserServiceConfig,
};
pub use validation::{validate_config, ValidationError};
