//! End-to-end tests for the `/user` demo endpoints against a mock user service.

use std::net::SocketAddr;

use serde_json::json;

mod common;

use common::{get_envelope, start_service, start_user_service, user_json};

fn default_user() -> serde_json::Value {
    json!({"id": -1, "userName": "default", "password": "default"})
}

#[tokio::test]
async fn test_fallback_endpoint() {
    let user_addr: SocketAddr = "127.0.0.1:28401".parse().unwrap();
    let service_addr: SocketAddr = "127.0.0.1:28402".parse().unwrap();
    let mock = start_user_service(user_addr).await;
    let _shutdown = start_service(service_addr, common::config_for(user_addr)).await;

    let (status, body) = get_envelope(service_addr, "/user/testFallback/3").await;
    assert_eq!(status, 200);
    assert_eq!(body["code"], 200);
    assert_eq!(body["data"], user_json(3));

    // Error envelope from the service is recovered by the default user.
    let (status, body) = get_envelope(service_addr, "/user/testFallback/5").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], default_user());

    assert_eq!(mock.hits(), vec!["GET /user/3", "GET /user/5"]);
}

#[tokio::test]
async fn test_exception_endpoint() {
    let user_addr: SocketAddr = "127.0.0.1:28411".parse().unwrap();
    let service_addr: SocketAddr = "127.0.0.1:28412".parse().unwrap();
    let mock = start_user_service(user_addr).await;
    let _shutdown = start_service(service_addr, common::config_for(user_addr)).await;

    for id in [1, 2] {
        let (status, body) = get_envelope(service_addr, &format!("/user/testException/{id}")).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"], default_user());
    }

    let (status, body) = get_envelope(service_addr, "/user/testException/3").await;
    assert_eq!(status, 400, "ignored failure reaches the caller");
    assert_eq!(body["code"], 400);
    assert!(body["msg"].as_str().unwrap().contains("missing value"));

    let (_, body) = get_envelope(service_addr, "/user/testException/4").await;
    assert_eq!(body["data"], user_json(4));

    assert_eq!(mock.hits(), vec!["GET /user/4"]);
}

#[tokio::test]
async fn test_command_endpoint() {
    let user_addr: SocketAddr = "127.0.0.1:28421".parse().unwrap();
    let service_addr: SocketAddr = "127.0.0.1:28422".parse().unwrap();
    let _mock = start_user_service(user_addr).await;
    let _shutdown = start_service(service_addr, common::config_for(user_addr)).await;

    let (status, body) = get_envelope(service_addr, "/user/testCommand/8").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], user_json(8));
}

#[tokio::test]
async fn test_cache_endpoint_hits_downstream_once_per_request() {
    let user_addr: SocketAddr = "127.0.0.1:28431".parse().unwrap();
    let service_addr: SocketAddr = "127.0.0.1:28432".parse().unwrap();
    let mock = start_user_service(user_addr).await;
    let _shutdown = start_service(service_addr, common::config_for(user_addr)).await;

    let (status, body) = get_envelope(service_addr, "/user/testCache/7").await;
    assert_eq!(status, 200);
    assert_eq!(body["code"], 200);
    assert_eq!(mock.hits(), vec!["GET /user/7"]);

    // A new request gets a new scope and an empty cache.
    get_envelope(service_addr, "/user/testCache/7").await;
    assert_eq!(mock.hit_count(), 2);
}

#[tokio::test]
async fn test_remove_cache_endpoint() {
    let user_addr: SocketAddr = "127.0.0.1:28441".parse().unwrap();
    let service_addr: SocketAddr = "127.0.0.1:28442".parse().unwrap();
    let mock = start_user_service(user_addr).await;
    let _shutdown = start_service(service_addr, common::config_for(user_addr)).await;

    let (status, _) = get_envelope(service_addr, "/user/testRemoveCache/7").await;
    assert_eq!(status, 200);
    assert_eq!(
        mock.hits(),
        vec!["GET /user/7", "POST /user/delete/7", "GET /user/7"]
    );
}

#[tokio::test]
async fn test_collapser_endpoint() {
    let user_addr: SocketAddr = "127.0.0.1:28451".parse().unwrap();
    let service_addr: SocketAddr = "127.0.0.1:28452".parse().unwrap();
    let mock = start_user_service(user_addr).await;
    let _shutdown = start_service(service_addr, common::config_for(user_addr)).await;

    let (status, body) = get_envelope(service_addr, "/user/testCollapser").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([user_json(1), user_json(2), user_json(3)]));
    assert_eq!(
        mock.hits(),
        vec!["GET /user/getUserByIds?ids=1,2", "GET /user/getUserByIds?ids=3"]
    );
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let user_addr: SocketAddr = "127.0.0.1:28461".parse().unwrap();
    let service_addr: SocketAddr = "127.0.0.1:28462".parse().unwrap();
    let _mock = start_user_service(user_addr).await;
    let _shutdown = start_service(service_addr, common::config_for(user_addr)).await;

    let res = common::client()
        .get(format!("http://{service_addr}/user/testFallback/1"))
        .header("x-request-id", "test-request-1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "test-request-1");

    let res = common::client()
        .get(format!("http://{service_addr}/user/testFallback/1"))
        .send()
        .await
        .unwrap();
    let generated = res.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}
