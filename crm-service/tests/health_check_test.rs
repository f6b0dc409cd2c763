//! Health, readiness, metrics and fallback routes.

mod common;

use common::TestApp;
use serde_json::Value;

#[tokio::test]
async fn health_check_returns_200() {
    let app = TestApp::spawn().await;

    let response = app
        .client()
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "crm-service-test");
}

#[tokio::test]
async fn api_health_reports_storage_backend() {
    let app = TestApp::spawn().await;

    let response = app.client().get(app.url("/api/health")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "sqlite");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn readiness_check_returns_200() {
    let app = TestApp::spawn().await;

    let response = app.client().get(app.url("/ready")).send().await.unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_text() {
    let app = TestApp::spawn().await;
    crm_service::services::metrics::init_metrics();
    app.client().get(app.url("/health")).send().await.unwrap();

    let response = app.client().get(app.url("/metrics")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("http_requests_total"));
}

#[tokio::test]
async fn unknown_api_path_returns_json_404() {
    let app = TestApp::spawn().await;

    let response = app
        .client()
        .get(app.url("/api/does-not-exist"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Endpoint not found");
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    let app = TestApp::spawn().await;

    let response = app.client().get(app.url("/health")).send().await.unwrap();

    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
}
