mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::{routing::get, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use notification_engine::config::Config;
use notification_engine::routes;
use notification_engine::services::channels::ChannelRegistry;
use notification_engine::services::dispatcher::NotificationDispatcher;
use notification_engine::services::queue::QueueService;
use notification_engine::AppState;

async fn test_app() -> Router {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let config = Config::default();
    let (bus, _) = tokio::sync::broadcast::channel(16);

    let queue = Arc::new(QueueService::new(
        pool.clone(),
        clock.clone(),
        config.queue.clone(),
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        pool.clone(),
        clock.clone(),
        config.dispatch.clone(),
        ChannelRegistry::standard(&config.dispatch, bus.clone()),
        bus,
    ));

    let state = Arc::new(AppState {
        db: pool,
        config,
        clock,
        queue,
        dispatcher,
    });

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/queue", routes::queue::router())
        .nest("/api/notifications", routes::notifications::router())
        .nest("/api/devices", routes::devices::router())
        .nest("/api/preferences", routes::preferences::router())
        .with_state(state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_reports_healthy() {
    let app = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn enqueue_is_reflected_in_stats() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/queue",
            json!({
                "message_type": "push-notification",
                "payload": {"kind": "order-update"},
                "priority": "high",
                "delay_seconds": 3600
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["id"].as_str().is_some());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/queue/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = json_body(response).await;
    assert_eq!(stats["global"]["high"], 1);
    assert_eq!(stats["dead_letter_depth"], 0);
}

#[tokio::test]
async fn enqueue_rejects_empty_message_type() {
    let app = test_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/queue",
            json!({"message_type": "  ", "payload": {}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn device_lifecycle_over_http() {
    let app = test_app().await;

    let token = "f".repeat(40);
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/devices/register",
            json!({
                "recipient_id": 42,
                "token": &token,
                "channel": "mobile-push-ios",
                "role": "driver",
                "device_info": {"model": "pixel"}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let endpoint = json_body(response).await;
    assert_eq!(endpoint["recipient_id"], 42);
    assert_eq!(endpoint["is_active"], true);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/devices/unregister",
            json!({"recipient_id": 42, "token": &token}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/devices/42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let endpoints = json_body(response).await;
    assert_eq!(endpoints.as_array().unwrap().len(), 1);
    assert_eq!(endpoints[0]["is_active"], false);
}

#[tokio::test]
async fn preferences_roundtrip_over_http() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/preferences/7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let preferences = json_body(response).await;
    assert_eq!(preferences["promotions"], true);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/api/preferences/7",
            json!({"promotions": false}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let preferences = json_body(response).await;
    assert_eq!(preferences["promotions"], false);
    assert_eq!(preferences["order_updates"], true);
}

#[tokio::test]
async fn send_without_endpoints_returns_not_delivered() {
    let app = test_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/notifications/send",
            json!({
                "recipient_id": 9,
                "notification": {"title": "Hi", "body": "There"},
                "options": {"category": "order-updates"}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["delivered"], false);
}
