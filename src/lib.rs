//! Resilience layer for calls to a remote user service.
//!
//! Circuit breaking, fallback, request-scoped caching and request collapsing
//! around a `RemoteCaller`, exposed through a small set of demo endpoints.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod remote;
pub mod resilience;
pub mod user;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use user::UserService;
