use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use berth_recorder::config::RateLimitConfig;
use berth_recorder::database::Database;
use berth_recorder::http::{build_router, AppState};
use berth_recorder::ratelimit::RateLimiter;

async fn test_app_with_limit(config: RateLimitConfig) -> (TempDir, Router) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let db = Database::from_url(&url)
        .await
        .expect("Failed to open database");
    let limiter = Arc::new(RateLimiter::new(config).expect("valid rate limit config"));
    (dir, build_router(AppState::new(db, limiter)))
}

async fn test_app() -> (TempDir, Router) {
    test_app_with_limit(RateLimitConfig::default()).await
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("JSON body")
}

fn arrival_body(serial: &str) -> Value {
    json!({
        "serialNumber": serial,
        "boatName": "Test",
        "flag": "France",
        "berth": "A12",
        "notes": "First call"
    })
}

#[tokio::test]
async fn arrival_returns_created_with_boat_and_movement() {
    let (_dir, app) = test_app().await;

    let response = app
        .oneshot(post_json("/arrivals", arrival_body("fr-12345-a")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get("x-ratelimit-limit").unwrap(),
        "60"
    );
    assert_eq!(
        response.headers().get("x-ratelimit-remaining").unwrap(),
        "59"
    );

    let body = body_json(response).await;
    assert_eq!(body["boat"]["serialNumber"], "FR-12345-A");
    assert_eq!(body["movement"]["isActive"], true);
    assert!(body["movement"]["departureAt"].is_null());
}

#[tokio::test]
async fn duplicate_arrival_returns_conflict() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-12345-A")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(post_json("/arrivals", arrival_body("FR-12345-A")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn invalid_arrival_lists_every_failing_field() {
    let (_dir, app) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/arrivals",
            json!({
                "serialNumber": "bad serial!",
                "boatName": "",
                "capacity": -1,
                "length": 9000.0
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    let details = body["details"].as_array().expect("details array");
    assert_eq!(details.len(), 4);
}

#[tokio::test]
async fn departure_flow_and_not_found_cases() {
    let (_dir, app) = test_app().await;

    // Unknown boat.
    let response = app
        .clone()
        .oneshot(post_json("/departures", json!({ "serialNumber": "XX-0" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-12345-A")))
        .await
        .unwrap();

    // Departure without body notes retains the movement's original notes.
    let response = app
        .clone()
        .oneshot(post_json(
            "/departures",
            json!({ "serialNumber": "fr-12345-a" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["movement"]["isActive"], false);
    assert_eq!(body["movement"]["notes"], "First call");
    assert!(body["movement"]["departureAt"].is_string());

    // No active movement left.
    let response = app
        .oneshot(post_json(
            "/departures",
            json!({ "serialNumber": "FR-12345-A" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn boat_detail_reports_derived_status() {
    let (_dir, app) = test_app().await;

    app.clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-12345-A")))
        .await
        .unwrap();

    let response = app.clone().oneshot(get("/boats/fr-12345-a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "AT_BERTH");
    assert_eq!(body["movements"].as_array().unwrap().len(), 1);

    let response = app.oneshot(get("/boats/UNKNOWN-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_requires_a_query() {
    let (_dir, app) = test_app().await;

    let response = app.clone().oneshot(get("/boats/search")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.clone().oneshot(get("/boats/search?q=%20")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-12345-A")))
        .await
        .unwrap();
    let response = app.oneshot(get("/boats/search?q=12345")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["status"], "AT_BERTH");
}

#[tokio::test]
async fn current_and_history_views() {
    let (_dir, app) = test_app().await;

    app.clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-0001-A")))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-0002-B")))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_json(
            "/departures",
            json!({ "serialNumber": "FR-0001-A" }),
        ))
        .await
        .unwrap();

    let response = app.clone().oneshot(get("/boats/current")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["serialNumber"], "FR-0002-B");

    let response = app.oneshot(get("/boats/history")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn journal_validates_filters_and_paginates() {
    let (_dir, app) = test_app().await;

    app.clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-12345-A")))
        .await
        .unwrap();

    let response = app.clone().oneshot(get("/movements")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["movements"][0]["boat"]["serialNumber"], "FR-12345-A");

    let response = app
        .clone()
        .oneshot(get("/movements?dateFrom=not-a-date&limit=500"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["details"].as_array().unwrap().len(), 2);

    let response = app
        .oneshot(get("/movements?berth=A12&source=MANUAL"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn csv_export_is_bom_prefixed_with_attachment_headers() {
    let (_dir, app) = test_app().await;

    app.clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-12345-A")))
        .await
        .unwrap();

    let response = app.oneshot(get("/movements/export")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/csv; charset=utf-8"
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(disposition.starts_with("attachment; filename="));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with('\u{feff}'));
    // header plus one movement row
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("\"FR-12345-A\""));
}

#[tokio::test]
async fn stats_endpoint_reports_counts() {
    let (_dir, app) = test_app().await;

    app.clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-12345-A")))
        .await
        .unwrap();

    let response = app.oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["totalBoats"], 1);
    assert_eq!(body["atBerth"], 1);
    assert_eq!(body["departed"], 0);
    assert_eq!(body["activeMovements"], 1);
    assert_eq!(body["recentArrivals"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn write_endpoints_are_rate_limited() {
    let config = RateLimitConfig {
        max_requests: 2,
        window: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(300),
    };
    let (_dir, app) = test_app_with_limit(config).await;

    for i in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json("/arrivals", arrival_body(&format!("FR-{i}-A"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .clone()
        .oneshot(post_json("/arrivals", arrival_body("FR-9-A")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("x-ratelimit-remaining").unwrap(),
        "0"
    );
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    // Read endpoints are not throttled.
    let response = app.oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn separate_clients_get_separate_windows() {
    let config = RateLimitConfig {
        max_requests: 1,
        window: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(300),
    };
    let (_dir, app) = test_app_with_limit(config).await;

    let request = Request::builder()
        .method("POST")
        .uri("/arrivals")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::from(arrival_body("FR-1-A").to_string()))
        .unwrap();
    assert_eq!(
        app.clone().oneshot(request).await.unwrap().status(),
        StatusCode::CREATED
    );

    let request = Request::builder()
        .method("POST")
        .uri("/arrivals")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "10.0.0.2")
        .body(Body::from(arrival_body("FR-2-A").to_string()))
        .unwrap();
    assert_eq!(
        app.oneshot(request).await.unwrap().status(),
        StatusCode::CREATED
    );
}

#[tokio::test]
async fn health_endpoint_is_live() {
    let (_dir, app) = test_app().await;
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
