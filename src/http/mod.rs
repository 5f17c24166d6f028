//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → scope.rs (open request scope, close when done)
//!     → handlers.rs (/user demo endpoints → UserService)
//!     → response.rs (ApiResult envelope, CommandError → status)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod scope;
pub mod server;

pub use request::X_REQUEST_ID;
pub use scope::ActiveScope;
pub use server::{AppState, HttpServer};
