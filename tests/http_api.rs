//! Wire-level tests for the attendance API, driven through the router with
//! `tower::ServiceExt::oneshot`.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use scanmark::{
    api::{create_api_router, AppContext},
    config::{AttendanceConfig, Config, ServerConfig},
    rate_limiter::RateLimiter,
    state::AppState,
};

fn test_router() -> Router {
    let config = Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["http://localhost:3000".to_string()],
            requests_per_minute: 10_000,
        },
        attendance: AttendanceConfig::default(),
    };

    let context = AppContext {
        state: AppState::new(&config.attendance),
        config,
        rate_limiter: RateLimiter::new(10_000),
    };

    create_api_router(context)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    let mut builder = Request::builder().method(method).uri(uri);

    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let mut req = builder.body(body).unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_is_up() {
    let router = test_router();
    let (status, body) = send(&router, request("GET", "/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn create_returns_id_and_token() {
    let router = test_router();

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/sessions",
            Some(json!({
                "subjectName": "Algorithms",
                "totalStudents": 30,
                "ttlSeconds": 5,
                "adminUid": "prof-1"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(body["token"].as_str().is_some_and(|t| t.len() == 16));
}

#[tokio::test]
async fn create_accepts_ttl_as_a_numeric_string() {
    let router = test_router();

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/sessions",
            Some(json!({
                "subjectName": "Algorithms",
                "ttlSeconds": "8"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = body["id"].as_str().unwrap();
    let (_, session) = send(&router, request("GET", &format!("/sessions/{id}"), None)).await;
    assert_eq!(session["ttlSeconds"], 8);
}

#[tokio::test]
async fn create_defaults_a_junk_ttl() {
    let router = test_router();

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/sessions",
            Some(json!({
                "subjectName": "Algorithms",
                "ttlSeconds": "soon"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = body["id"].as_str().unwrap();
    let (_, session) = send(&router, request("GET", &format!("/sessions/{id}"), None)).await;
    assert_eq!(session["ttlSeconds"], 5);
}

#[tokio::test]
async fn full_scan_flow_over_http() {
    let router = test_router();

    let (_, created) = send(
        &router,
        request(
            "POST",
            "/sessions",
            Some(json!({ "subjectName": "Databases", "totalStudents": 40, "ttlSeconds": 30 })),
        ),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    let token = created["token"].as_str().unwrap().to_string();

    // Accepted scan.
    let (status, body) = send(
        &router,
        request(
            "POST",
            &format!("/sessions/{id}/attendance"),
            Some(json!({ "token": token, "userId": "R001" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["outcome"], "accepted");

    // Wrong token is a 400 with the distinct error kind.
    let (status, body) = send(
        &router,
        request(
            "POST",
            &format!("/sessions/{id}/attendance"),
            Some(json!({ "token": "bogus", "userId": "R002" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid-or-expired");

    // Snapshot shows the count; the log shows the entry.
    let (_, session) = send(&router, request("GET", &format!("/sessions/{id}"), None)).await;
    assert_eq!(session["scannedCount"], 1);
    assert_eq!(session["active"], true);

    let (_, log) = send(
        &router,
        request("GET", &format!("/sessions/{id}/attendance"), None),
    )
    .await;
    assert_eq!(log["count"], 1);
    assert_eq!(log["entries"][0]["userId"], "R001");

    // Rotate, then end.
    let (status, rotated) = send(
        &router,
        request(
            "POST",
            &format!("/sessions/{id}/rotate"),
            Some(json!({ "ttlSeconds": 10 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["token"], token.as_str());

    let (status, body) = send(
        &router,
        request("POST", &format!("/sessions/{id}/end"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, session) = send(&router, request("GET", &format!("/sessions/{id}"), None)).await;
    assert_eq!(session["active"], false);
}

#[tokio::test]
async fn unknown_sessions_are_404() {
    let router = test_router();

    let (status, body) = send(&router, request("GET", "/sessions/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not-found");

    let (status, _) = send(
        &router,
        request(
            "POST",
            "/sessions/nope/rotate",
            Some(json!({ "ttlSeconds": 5 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/sessions/nope/attendance",
            Some(json!({ "token": "t", "userId": "R001" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not-found");
}

#[tokio::test]
async fn sessions_list_is_newest_first() {
    let router = test_router();

    for subject in ["First", "Second", "Third"] {
        send(
            &router,
            request(
                "POST",
                "/sessions",
                Some(json!({ "subjectName": subject, "ttlSeconds": 30 })),
            ),
        )
        .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let (status, body) = send(&router, request("GET", "/sessions?pageSize=2", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["sessions"][0]["subjectName"], "Third");
    assert_eq!(body["sessions"][1]["subjectName"], "Second");
}
