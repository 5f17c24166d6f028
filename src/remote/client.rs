//! HTTP client for the user service.
//!
//! # Responsibilities
//! - Resolve request paths against the configured base URL
//! - Send the request and decode the `ApiResult` envelope
//! - Turn transport, status and envelope failures into `RemoteError`
//!
//! Deadlines are not enforced here; the command executor owns timeouts.

use futures_util::future::BoxFuture;
use url::Url;

use crate::config::UserServiceConfig;
use crate::remote::types::{ApiResult, RemoteError, RemoteRequest};

/// The single network capability the resilience core depends on.
pub trait RemoteCaller: Send + Sync {
    fn call(&self, request: RemoteRequest) -> BoxFuture<'_, Result<ApiResult, RemoteError>>;
}

/// `RemoteCaller` backed by reqwest.
#[derive(Clone)]
pub struct HttpRemoteCaller {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRemoteCaller {
    /// Create a caller from configuration.
    pub fn new(config: &UserServiceConfig) -> Result<Self, RemoteError> {
        let base_url: Url = config.base_url.parse().map_err(|e| {
            RemoteError::InvalidArgument(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        tracing::info!(base_url = %base_url, "User service client initialized");
        Ok(Self { client, base_url })
    }

    fn resolve(&self, path: &str) -> Result<Url, RemoteError> {
        // Keep any path prefix on the base URL; `Url::join` would drop it.
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
            .parse::<Url>()
            .map_err(|e| RemoteError::InvalidArgument(e.to_string()))
    }

    async fn send(&self, request: RemoteRequest) -> Result<ApiResult, RemoteError> {
        let url = self.resolve(&request.path)?;

        tracing::debug!(method = %request.method, url = %url, "Calling user service");

        let response = self
            .client
            .request(request.method, url)
            .query(&request.params)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiResult = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        if !envelope.is_success() {
            return Err(RemoteError::Envelope {
                code: envelope.code,
                message: envelope.message,
            });
        }

        Ok(envelope)
    }
}

impl RemoteCaller for HttpRemoteCaller {
    fn call(&self, request: RemoteRequest) -> BoxFuture<'_, Result<ApiResult, RemoteError>> {
        Box::pin(self.send(request))
    }
}
