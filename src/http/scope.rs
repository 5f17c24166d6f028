//! Request scope middleware.
//!
//! # Responsibilities
//! - Open a request scope before any handler runs
//! - Carry it to handlers through request extensions
//! - Close it when the response is produced, or when the request future is
//!   dropped
//!
//! # Design Decisions
//! - The scope lives in a `ScopeGuard` owned by the middleware future, so
//!   every exit path closes it
//! - Handlers take `ActiveScope`; a route mounted outside the middleware
//!   fails with `ScopeNotActive` instead of running without a cache

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::resilience::{CommandError, RequestScope};

/// Open a scope for the request and close it once the handler is done.
pub async fn request_scope(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let guard = state.scopes.open_guarded();
    let scope = guard.scope().clone();

    tracing::debug!(
        scope = %scope.id(),
        request_id = %request_id(request.headers()),
        path = %request.uri().path(),
        "Request scope attached"
    );

    request.extensions_mut().insert(scope);
    let response = next.run(request).await;
    drop(guard);
    response
}

/// The request scope opened by [`request_scope`].
#[derive(Debug, Clone)]
pub struct ActiveScope(pub RequestScope);

impl<S> FromRequestParts<S> for ActiveScope
where
    S: Send + Sync,
{
    type Rejection = CommandError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<RequestScope>() {
            Some(scope) if scope.is_active() => Ok(ActiveScope(scope.clone())),
            _ => Err(CommandError::ScopeNotActive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use crate::config::ServiceConfig;
    use crate::remote::{HttpRemoteCaller, RemoteCaller, RemoteError};
    use crate::resilience::RequestScopeManager;
    use crate::user::UserService;

    fn state() -> AppState {
        let config = ServiceConfig::default();
        let caller: Arc<dyn RemoteCaller> = Arc::new(HttpRemoteCaller::new(&config.user_service).unwrap());
        AppState {
            service: Arc::new(UserService::new(&config, caller)),
            scopes: RequestScopeManager::new(),
        }
    }

    fn get_request(path: &str) -> Request {
        axum::http::Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn envelope(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_handler_outside_middleware_is_refused() {
        let app = Router::new().route(
            "/scoped",
            get(|ActiveScope(scope): ActiveScope| async move { scope.id().to_string() }),
        );

        let response = app.oneshot(get_request("/scoped")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(envelope(response).await["code"], 500);
    }

    #[tokio::test]
    async fn test_scope_closed_after_failing_handler() {
        let state = state();
        let scopes = state.scopes.clone();
        let seen: Arc<Mutex<Option<RequestScope>>> = Arc::default();
        let open_during = Arc::new(AtomicUsize::new(0));

        let handler = {
            let (scopes, seen, open_during) = (scopes.clone(), Arc::clone(&seen), Arc::clone(&open_during));
            move |ActiveScope(scope): ActiveScope| {
                let (scopes, seen, open_during) = (scopes.clone(), Arc::clone(&seen), Arc::clone(&open_during));
                async move {
                    open_during.store(scopes.open_count(), Ordering::SeqCst);
                    *seen.lock().unwrap() = Some(scope);
                    Err::<String, _>(CommandError::Downstream(RemoteError::Transport("reset".into())))
                }
            }
        };
        let app = Router::new()
            .route("/fails", get(handler))
            .route_layer(from_fn_with_state(state.clone(), request_scope))
            .with_state(state);

        let response = app.oneshot(get_request("/fails")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(open_during.load(Ordering::SeqCst), 1);
        assert_eq!(scopes.open_count(), 0);
        let scope = seen.lock().unwrap().take().unwrap();
        assert!(!scope.is_active());
    }

    #[tokio::test]
    async fn test_each_request_gets_a_fresh_scope() {
        let state = state();
        let scopes = state.scopes.clone();
        let app = Router::new()
            .route(
                "/scoped",
                get(|ActiveScope(scope): ActiveScope| async move { scope.id().to_string() }),
            )
            .route_layer(from_fn_with_state(state.clone(), request_scope))
            .with_state(state);

        let first = app.clone().oneshot(get_request("/scoped")).await.unwrap();
        let second = app.oneshot(get_request("/scoped")).await.unwrap();
        let first = to_bytes(first.into_body(), usize::MAX).await.unwrap();
        let second = to_bytes(second.into_body(), usize::MAX).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(scopes.open_count(), 0);
    }
}
