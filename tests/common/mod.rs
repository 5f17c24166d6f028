//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use hystrix_service::config::ServiceConfig;
use hystrix_service::http::HttpServer;
use hystrix_service::lifecycle::Shutdown;
use hystrix_service::remote::{HttpRemoteCaller, RemoteCaller};
use hystrix_service::user::UserService;

/// Id the mock answers with an error envelope.
#[allow(dead_code)]
pub const FAILING_ID: i64 = 5;

/// Programmable stand-in for the downstream user service.
#[derive(Clone, Default)]
pub struct MockUserService {
    hits: Arc<Mutex<Vec<String>>>,
    down: Arc<AtomicBool>,
    delay_ms: Arc<AtomicU64>,
}

#[allow(dead_code)]
impl MockUserService {
    /// Every request seen so far, as `"METHOD /path?query"`.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.lock().unwrap().len()
    }

    /// While down, every request answers 503.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Delay applied before every response.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn enter(&self, hit: String) -> Option<Response> {
        self.hits.lock().unwrap().push(hit);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Some((StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response());
        }
        None
    }
}

pub fn user_json(id: i64) -> serde_json::Value {
    json!({"id": id, "userName": format!("user{id}"), "password": "123456"})
}

fn success(data: serde_json::Value) -> Response {
    Json(json!({"code": 200, "msg": "operation succeeded", "data": data})).into_response()
}

async fn get_user(State(mock): State<MockUserService>, Path(id): Path<i64>) -> Response {
    if let Some(response) = mock.enter(format!("GET /user/{id}")).await {
        return response;
    }
    if id == FAILING_ID {
        return Json(json!({"code": 500, "msg": "user lookup failed"})).into_response();
    }
    success(user_json(id))
}

#[derive(Deserialize)]
struct IdsQuery {
    ids: String,
}

async fn get_user_by_ids(State(mock): State<MockUserService>, Query(query): Query<IdsQuery>) -> Response {
    if let Some(response) = mock.enter(format!("GET /user/getUserByIds?ids={}", query.ids)).await {
        return response;
    }
    let users: Vec<_> = query
        .ids
        .split(',')
        .filter_map(|id| id.parse::<i64>().ok())
        .filter(|id| *id != FAILING_ID)
        .map(user_json)
        .collect();
    success(json!(users))
}

async fn delete_user(State(mock): State<MockUserService>, Path(id): Path<i64>) -> Response {
    if let Some(response) = mock.enter(format!("POST /user/delete/{id}")).await {
        return response;
    }
    success(serde_json::Value::Null)
}

/// Start the mock user service on `addr`.
pub async fn start_user_service(addr: SocketAddr) -> MockUserService {
    let mock = MockUserService::default();
    let app = Router::new()
        .route("/user/getUserByIds", get(get_user_by_ids))
        .route("/user/{id}", get(get_user))
        .route("/user/delete/{id}", post(delete_user))
        .with_state(mock.clone());

    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    mock
}

/// Base configuration pointing the service at `user_service`.
pub fn config_for(user_service: SocketAddr) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.user_service.base_url = format!("http://{user_service}");
    config
}

/// Start the service on `addr`. Keep the returned `Shutdown` alive for the
/// test; triggering or dropping it stops the server.
pub async fn start_service(addr: SocketAddr, config: ServiceConfig) -> Shutdown {
    let caller: Arc<dyn RemoteCaller> = Arc::new(HttpRemoteCaller::new(&config.user_service).unwrap());
    let service = Arc::new(UserService::new(&config, caller));
    let server = HttpServer::new(config, service);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown
}

/// Client that never reuses connections, so each test request is independent.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// GET `path` on the service and return status plus envelope.
pub async fn get_envelope(addr: SocketAddr, path: &str) -> (u16, serde_json::Value) {
    let res = client()
        .get(format!("http://{addr}{path}"))
        .send()
        .await
        .expect("service unreachable");
    let status = res.status().as_u16();
    (status, res.json().await.expect("body is not an envelope"))
}
