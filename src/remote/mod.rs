//! Downstream user-service boundary.
//!
//! # Data Flow
//! ```text
//! Command primary function
//!     → RemoteCaller::call(RemoteRequest)
//!     → client.rs (reqwest, base URL join, envelope decode)
//!     → ApiResult envelope, or RemoteError
//! ```
//!
//! # Design Decisions
//! - The resilience core only sees the `RemoteCaller` trait, never reqwest
//! - An envelope whose code is not 200 is a failure, not a value
//! - `RemoteError` is `Clone` so one batch failure can reach every waiter

pub mod client;
pub mod types;

pub use client::{HttpRemoteCaller, RemoteCaller};
pub use types::{ApiResult, RemoteError, RemoteRequest, ERROR_CODE, SUCCESS_CODE};
