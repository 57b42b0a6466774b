//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, get};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with expected JSON fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let test = common::build_test_app();
    let response = get(test.app(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["store"], "memory");
    assert_eq!(json["pool_size"], 2);
    assert_eq!(json["running_jobs"], 0);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let test = common::build_test_app();
    let response = get(test.app(), "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: Responses carry a generated x-request-id header
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_has_request_id() {
    let test = common::build_test_app();
    let response = get(test.app(), "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("x-request-id header");
    assert!(!request_id.to_str().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: A caller-supplied request id is echoed back
// ---------------------------------------------------------------------------

#[tokio::test]
async fn caller_request_id_is_propagated() {
    let test = common::build_test_app();
    let response = test
        .app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "trace-me-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "trace-me-123");
}

// ---------------------------------------------------------------------------
// Test: CORS preflight from the configured origin is allowed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let test = common::build_test_app();
    let response = test
        .app()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/v1/generation/async")
                .header("origin", "http://localhost:5173")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
}

// ---------------------------------------------------------------------------
// Test: CORS preflight advertises only GET and POST
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_allows_only_get_and_post() {
    let test = common::build_test_app();
    let response = test
        .app()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/v1/jobs")
                .header("origin", "http://localhost:5173")
                .header("access-control-request-method", "DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let allowed = response.headers()["access-control-allow-methods"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(allowed.contains("GET"));
    assert!(allowed.contains("POST"));
    assert!(!allowed.contains("DELETE"));
    assert!(!allowed.contains("PUT"));
}
