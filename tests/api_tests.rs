//! In-process router tests
//!
//! These exercise routing, extractors and middleware without a live database:
//! the pool connects lazily and no answer checked here depends on a query succeeding.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use libris_server::{
    api, config::AppConfig, repository::Repository, services::redis::RedisService, services::Services,
    AppState,
};

fn test_app() -> Router {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    app_with(config)
}

fn app_with(config: AppConfig) -> Router {
    // Requests that do reach the database fail fast instead of waiting on a pool
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(250))
        .connect_lazy(&config.database.url)
        .expect("lazy pool");
    // Nothing listens on port 1; no test below reaches Redis
    let redis = RedisService::new("redis://127.0.0.1:1").expect("redis client");

    let services = Services::new(Repository::new(pool), &config, redis);
    api::create_router(AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    })
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_check_reports_healthy() {
    let response = test_app()
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let response = test_app()
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::REFERRER_POLICY], "same-origin");
    assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let response = test_app()
        .oneshot(Request::builder().uri("/api/v1/nowhere").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn profile_requires_credentials() {
    let response = test_app()
        .oneshot(Request::builder().uri("/api/v1/auth/profile").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Authentication credentials were not provided.");
}

#[tokio::test]
async fn malformed_bearer_token_is_rejected() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/my-books")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn audit_log_is_forbidden_to_anonymous_callers() {
    let response = test_app()
        .oneshot(Request::builder().uri("/api/v1/auth/audit-log").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Access denied. Admin privileges required.");
}

#[tokio::test]
async fn register_reports_field_errors() {
    let response = test_app()
        .oneshot(post_json(
            "/api/v1/auth/register",
            json!({
                "email": "not-an-email",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "password1": "Analytical#Engine1843",
                "password2": "Different#Engine1843"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["fields"]["email"].is_array());
    assert_eq!(body["fields"]["password2"][0], "The two password fields didn't match.");
}

#[tokio::test]
async fn login_rejects_malformed_email() {
    // The failed attempt is audited; an unreachable trail must not change the answer
    let response = test_app()
        .oneshot(post_json(
            "/api/v1/auth/login",
            json!({ "email": "nobody", "password": "whatever" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn staff_routes_require_authentication() {
    let response = test_app()
        .oneshot(post_json("/api/v1/books", json!({ "title": "Dune" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn oversized_page_number_is_a_bad_request() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/books?page=9223372036854775807")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Invalid page number.");
}

fn register_from(peer: SocketAddr, forwarded_for: &str) -> Request<Body> {
    let mut request = post_json(
        "/api/v1/auth/register",
        json!({ "email": "not-an-email", "first_name": "", "last_name": "", "password1": "", "password2": "" }),
    );
    request
        .headers_mut()
        .insert("x-forwarded-for", forwarded_for.parse().unwrap());
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

#[tokio::test]
async fn auth_throttle_keys_on_socket_peer_not_forwarded_header() {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = true;
    config.rate_limit.burst_size = 2;
    config.rate_limit.per_second = 600;
    config.server.trusted_proxy = false;
    let app = app_with(config);

    let attacker: SocketAddr = "198.51.100.7:40000".parse().unwrap();
    let mut statuses = Vec::new();
    for i in 0..3 {
        let forged = format!("203.0.113.{}", i + 1);
        let response = app.clone().oneshot(register_from(attacker, &forged)).await.unwrap();
        statuses.push(response.status());
    }
    assert_eq!(
        statuses,
        vec![StatusCode::BAD_REQUEST, StatusCode::BAD_REQUEST, StatusCode::TOO_MANY_REQUESTS]
    );

    // A different client still has its own budget
    let neighbour: SocketAddr = "198.51.100.8:40000".parse().unwrap();
    let response = app.oneshot(register_from(neighbour, "203.0.113.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
