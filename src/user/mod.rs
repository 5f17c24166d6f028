//! User operations built on the resilience layer.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → UserService operation
//!     → CommandExecutor / Collapser (breaker, bulkhead, timeout, fallback)
//!     → RemoteCaller (GET /user/{id}, GET /user/getUserByIds, POST /user/delete/{id})
//! ```

pub mod model;
pub mod service;

pub use model::{User, DEFAULT_USER_ID};
pub use service::UserService;
