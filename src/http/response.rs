//! Response mapping.
//!
//! # Responsibilities
//! - Serialize every outcome as an `ApiResult` JSON envelope
//! - Map command failures to HTTP status codes
//!
//! # Design Decisions
//! - The envelope `code` always equals the HTTP status
//! - Ignored failures are the caller's fault (400); unknown collapsed keys
//!   are 404; a missing scope is a server bug (500); every other failure
//!   means the dependency is unavailable (503)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::remote::ApiResult;
use crate::resilience::CommandError;

impl IntoResponse for ApiResult {
    fn into_response(self) -> Response {
        let status = u16::try_from(self.code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// HTTP status for a command failure.
pub fn status_for(error: &CommandError) -> StatusCode {
    match error {
        CommandError::Ignored(_) => StatusCode::BAD_REQUEST,
        CommandError::NotFound { .. } => StatusCode::NOT_FOUND,
        CommandError::ScopeNotActive => StatusCode::INTERNAL_SERVER_ERROR,
        CommandError::Downstream(_)
        | CommandError::Timeout { .. }
        | CommandError::CircuitOpen { .. }
        | CommandError::Rejected { .. }
        | CommandError::FallbackFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::warn!(kind = self.kind(), error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, status = status.as_u16(), "Request rejected");
        }
        ApiResult::error_with(i32::from(status.as_u16()), self.to_string()).into_response()
    }
}
