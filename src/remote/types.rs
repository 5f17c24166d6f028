//! Wire envelope and downstream error definitions.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope code for a successful operation.
pub const SUCCESS_CODE: i32 = 200;

/// Envelope code for a generic failure.
pub const ERROR_CODE: i32 = 500;

const SUCCESS_MSG: &str = "operation succeeded";
const ERROR_MSG: &str = "operation failed";

/// Generic success/failure envelope exchanged with the user service and
/// returned to inbound callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult {
    pub code: i32,
    #[serde(rename = "msg", alias = "message")]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ApiResult {
    pub fn new(code: i32, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// Success envelope without a payload.
    pub fn success() -> Self {
        Self::new(SUCCESS_CODE, SUCCESS_MSG, None)
    }

    /// Success envelope wrapping any serializable payload.
    ///
    /// A payload that fails to serialize is carried as `null`.
    pub fn success_with<T: Serialize>(data: &T) -> Self {
        let value = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
        Self::new(SUCCESS_CODE, SUCCESS_MSG, Some(value))
    }

    pub fn error() -> Self {
        Self::new(ERROR_CODE, ERROR_MSG, None)
    }

    pub fn error_with(code: i32, message: impl Into<String>) -> Self {
        Self::new(code, message, None)
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Deserialize the `data` field into a concrete type.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, RemoteError> {
        let value = self.data.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

/// One call to the user service.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub method: Method,
    /// Path relative to the service base URL (e.g. `/user/7`).
    pub path: String,
    /// Query parameters.
    pub params: Vec<(String, String)>,
}

impl RemoteRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

/// Failures produced on the downstream side of a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Connection, DNS or I/O failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Body or payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The service answered with an error envelope.
    #[error("error envelope {code}: {message}")]
    Envelope { code: i32, message: String },

    /// The caller supplied an argument the operation rejects.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An index or id fell outside the accepted range.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A value the operation needs was absent.
    #[error("missing value: {0}")]
    MissingValue(String),

    /// The primary task itself failed (panic or cancellation).
    #[error("internal error: {0}")]
    Internal(String),
}
