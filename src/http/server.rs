//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the `/user` demo handlers
//! - Wire up middleware (tracing, request ID, timeout, request scope)
//! - Serve on a listener until the shutdown signal arrives

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::http::request::request_id_header;
use crate::http::scope::request_scope;
use crate::resilience::RequestScopeManager;
use crate::user::UserService;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<UserService>,
    pub scopes: RequestScopeManager,
}

/// HTTP server for the user demo endpoints.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    scopes: RequestScopeManager,
}

impl HttpServer {
    /// Create a new HTTP server around a ready user service.
    pub fn new(config: ServiceConfig, service: Arc<UserService>) -> Self {
        let scopes = RequestScopeManager::new();
        let state = AppState {
            service,
            scopes: scopes.clone(),
        };

        let router = Self::build_router(&config, state);
        Self { router, config, scopes }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let user_routes = Router::new()
            .route("/testFallback/{id}", get(handlers::test_fallback))
            .route("/testCommand/{id}", get(handlers::test_command))
            .route("/testException/{id}", get(handlers::test_exception))
            .route("/testCache/{id}", get(handlers::test_cache))
            .route("/testRemoveCache/{id}", get(handlers::test_remove_cache))
            .route("/testCollapser", get(handlers::test_collapser))
            .route_layer(middleware::from_fn_with_state(state.clone(), request_scope));

        Router::new()
            .nest("/user", user_routes)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs)))
                    .layer(PropagateRequestIdLayer::new(request_id_header())),
            )
    }

    /// Router with all layers, for serving from a custom listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!(open_scopes = self.scopes.open_count(), "HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
