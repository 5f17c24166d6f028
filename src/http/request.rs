//! Request identification.
//!
//! # Responsibilities
//! - Name the request ID header
//! - Read the ID back for log correlation
//!
//! # Design Decisions
//! - IDs are UUID v4, set by tower-http as early as possible
//! - An inbound `x-request-id` is kept and echoed on the response

use axum::http::{HeaderMap, HeaderName};

pub const X_REQUEST_ID: &str = "x-request-id";

pub fn request_id_header() -> HeaderName {
    HeaderName::from_static(X_REQUEST_ID)
}

/// Request ID for logging; `"unknown"` when absent or not valid UTF-8.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}
