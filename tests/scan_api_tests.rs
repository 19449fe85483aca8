// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end tests for the collector scan flow over HTTP:
//! token issuance, award, the 20-hour cooldown, role gating, and the
//! collector's scan history.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use cleanbage_rewards::models::Role;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Issue a QR payload for a user through the API.
async fn issue_payload(app: &axum::Router, user_token: &str) -> String {
    let response = app
        .clone()
        .oneshot(post_json("/api/qr/token", user_token, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["payload"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_scan_requires_collector_role() {
    let (app, state) = common::create_test_app();
    common::seed_account(&state, "U1", "John Doe", Role::User, 0);
    let token = common::session_token(&state, "U1", Role::User);

    let response = app
        .oneshot(post_json("/api/scan", &token, json!({"payload": "{}"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_scan_history_requires_collector_role() {
    let (app, state) = common::create_test_app();
    let token = common::session_token(&state, "U1", Role::User);

    let response = app.oneshot(get("/api/scan/history", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_scan_malformed_payload() {
    let (app, state) = common::create_test_app();
    let collector = common::session_token(&state, "COL001", Role::Collector);

    let response = app
        .oneshot(post_json(
            "/api/scan",
            &collector,
            json!({"payload": "definitely not a token"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "malformed_token");
}

#[tokio::test]
async fn test_scan_awards_points_and_updates_balance() {
    let (app, state) = common::create_test_app();
    common::seed_account(&state, "U1", "John Doe", Role::User, 10);
    let user = common::session_token(&state, "U1", Role::User);
    let collector = common::session_token(&state, "COL001", Role::Collector);

    let payload = issue_payload(&app, &user).await;

    let response = app
        .clone()
        .oneshot(post_json("/api/scan", &collector, json!({"payload": payload})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["user_id"], "U1");
    assert_eq!(body["user_name"], "John Doe");
    assert_eq!(body["points_awarded"], 3);
    assert_eq!(body["new_balance"], 13);

    let response = app.oneshot(get("/api/balance", &user)).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["points"], 13);
}

#[tokio::test]
async fn test_second_scan_within_window_conflicts() {
    let (app, state) = common::create_test_app();
    common::seed_account(&state, "U1", "John Doe", Role::User, 0);
    let user = common::session_token(&state, "U1", Role::User);
    let collector = common::session_token(&state, "COL001", Role::Collector);

    let payload = issue_payload(&app, &user).await;

    let first = app
        .clone()
        .oneshot(post_json("/api/scan", &collector, json!({"payload": payload})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(post_json("/api/scan", &collector, json!({"payload": payload})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let body = body_json(second).await;
    assert_eq!(body["error"], "token_deactivated");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .starts_with("already collected"));

    // The rejected scan must not have credited anything.
    let response = app.oneshot(get("/api/balance", &user)).await.unwrap();
    assert_eq!(body_json(response).await["points"], 3);
}

#[tokio::test]
async fn test_qr_status_reflects_cooldown() {
    let (app, state) = common::create_test_app();
    common::seed_account(&state, "U1", "John Doe", Role::User, 0);
    let user = common::session_token(&state, "U1", Role::User);
    let collector = common::session_token(&state, "COL001", Role::Collector);

    let response = app.clone().oneshot(get("/api/qr/status", &user)).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["active"], true);

    let payload = issue_payload(&app, &user).await;
    app.clone()
        .oneshot(post_json("/api/scan", &collector, json!({"payload": payload})))
        .await
        .unwrap();

    let response = app.oneshot(get("/api/qr/status", &user)).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["active"], false);
    assert!(body["reactivates_at"].is_string());
    let remaining = body["remaining_secs"].as_i64().unwrap();
    assert!(remaining > 19 * 3600 && remaining <= 20 * 3600);
}

#[tokio::test]
async fn test_activity_feed_shows_award() {
    let (app, state) = common::create_test_app();
    common::seed_account(&state, "U1", "John Doe", Role::User, 0);
    let user = common::session_token(&state, "U1", Role::User);
    let collector = common::session_token(&state, "COL001", Role::Collector);

    let payload = issue_payload(&app, &user).await;
    app.clone()
        .oneshot(post_json("/api/scan", &collector, json!({"payload": payload})))
        .await
        .unwrap();

    let response = app.oneshot(get("/api/activity", &user)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["user_id"], "U1");
    assert_eq!(records[0]["points_awarded"], 3);
    assert!(body["next_cursor"].is_null());
}

#[tokio::test]
async fn test_activity_pagination_cursor() {
    let (app, state) = common::create_test_app();
    common::seed_account(&state, "U1", "John Doe", Role::User, 0);
    let user = common::session_token(&state, "U1", Role::User);

    // Seed 25 ledger entries far enough apart to survive display dedup.
    let base: chrono::DateTime<chrono::Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
    for i in 0..25 {
        state
            .ledger
            .append("U1", "John Doe", "COL001", 3, base + chrono::Duration::minutes(i))
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(get("/api/activity?limit=10", &user))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["records"].as_array().unwrap().len(), 10);
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/activity?limit=10&cursor={}", cursor), &user))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["records"].as_array().unwrap().len(), 10);
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    let response = app
        .oneshot(get(&format!("/api/activity?limit=10&cursor={}", cursor), &user))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["records"].as_array().unwrap().len(), 5);
    assert!(body["next_cursor"].is_null());
}

#[tokio::test]
async fn test_scan_history_returns_collector_scans() {
    let (app, state) = common::create_test_app();
    common::seed_account(&state, "U1", "John Doe", Role::User, 0);
    common::seed_account(&state, "U2", "Jane Roe", Role::User, 0);
    let collector = common::session_token(&state, "COL001", Role::Collector);

    for user_id in ["U1", "U2"] {
        let user = common::session_token(&state, user_id, Role::User);
        let payload = issue_payload(&app, &user).await;
        let response = app
            .clone()
            .oneshot(post_json("/api/scan", &collector, json!({"payload": payload})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(get("/api/scan/history", &collector)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    // Newest first.
    assert_eq!(records[0]["user_id"], "U2");
    assert_eq!(records[1]["user_id"], "U1");
}

#[tokio::test]
async fn test_scan_of_unknown_user_still_awards() {
    // A token is self-describing; the scan must work even if this service
    // has never seen the user before (fresh store, old token).
    let (app, state) = common::create_test_app();
    let collector = common::session_token(&state, "COL001", Role::Collector);

    let payload = serde_json::to_string(&json!({
        "userId": "GHOST",
        "userName": "Ghost User",
        "issuedAt": "2024-01-01T00:00:00Z",
        "validUntil": "2024-01-02T00:00:00Z",
    }))
    .unwrap();

    let response = app
        .oneshot(post_json("/api/scan", &collector, json!({"payload": payload})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.balance.read("GHOST").unwrap(), 3);
}
