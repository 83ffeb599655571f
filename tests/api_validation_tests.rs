// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request handling tests that need no backing services.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn test_security_headers_present() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.contains_key("strict-transport-security"));
    assert!(headers.contains_key("content-security-policy"));
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
}

#[tokio::test]
async fn test_error_responses_carry_security_headers() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn test_visit_tracking_never_fails() {
    let (app, _) = common::create_test_app();

    // Offline: geolocation is skipped (no client IP) and the write fails,
    // but the page must still get a 200.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/analytics/visit")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "path": "/styles", "referrer": "" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_visit_beacons_still_ok() {
    let cases: [(&str, &str); 4] = [
        ("application/json", "{}"),
        ("application/json", r#"{"path": 42}"#),
        ("application/json", "not json"),
        ("text/plain", r#"{"path":"/"}"#),
    ];

    for (content_type, body) in cases {
        let (app, _) = common::create_test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/analytics/visit")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "{} {}", content_type, body);
    }
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let (app, state) = common::create_test_app();
    let too_big = state.config.max_upload_bytes + 2 * 1024 * 1024;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/analytics/visit")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, too_big)
                .body(Body::from(vec![b' '; too_big]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
