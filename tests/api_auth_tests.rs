// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Protected and admin routes reject requests without valid ID tokens
//! 2. A correctly signed token gets past authentication
//! 3. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

mod common;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Sign arbitrary claims with the test key and the given kid.
fn sign(claims: serde_json::Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(common::TEST_PRIVATE_KEY_PEM.as_bytes()).unwrap(),
    )
    .unwrap()
}

async fn get_with_token(uri: &str, token: Option<&str>) -> axum::response::Response {
    let (app, _) = common::create_test_app();

    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    app.oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let response = get_with_token("/api/me", None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let response = get_with_token("/api/topup/history", Some("invalid.token.here")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_with_unknown_kid_rejected() {
    let project = "edit-aja-test";
    let token = sign(
        json!({
            "sub": "user-1",
            "iss": format!("https://securetoken.google.com/{}", project),
            "aud": project,
            "iat": now() - 5,
            "exp": now() + 3600,
        }),
        "some-other-kid",
    );

    let response = get_with_token("/api/gallery", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_for_other_project_rejected() {
    let token = sign(
        json!({
            "sub": "user-1",
            "iss": "https://securetoken.google.com/another-project",
            "aud": "another-project",
            "iat": now() - 5,
            "exp": now() + 3600,
        }),
        common::TEST_KID,
    );

    let response = get_with_token("/api/me", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let project = "edit-aja-test";
    let token = sign(
        json!({
            "sub": "user-1",
            "iss": format!("https://securetoken.google.com/{}", project),
            "aud": project,
            "iat": now() - 7200,
            "exp": now() - 3600,
        }),
        common::TEST_KID,
    );

    let response = get_with_token("/api/me", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_valid_token() {
    let token = common::create_test_token("user-1", Some("user@example.com"));

    let response = get_with_token("/api/me", Some(&token)).await;

    // With valid token: 200 if Firestore available, 500 if Firestore unavailable.
    // The key check is that we DON'T get 401 (authentication succeeded)
    let status = response.status();
    assert!(
        status == StatusCode::OK || status == StatusCode::INTERNAL_SERVER_ERROR,
        "Expected 200 or 500, got {}. Auth should pass, Firestore may fail without emulator.",
        status
    );
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    for uri in [
        "/api/admin/users",
        "/api/admin/topups",
        "/api/admin/settings",
        "/api/admin/analytics",
    ] {
        let response = get_with_token(uri, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_upload_requires_token() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
                .body(Body::from("--x--\r\n"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/gallery/abc")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // OPTIONS should return 200 (CORS preflight success)
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:3000"
    );
    let methods = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("PATCH"));
}

#[tokio::test]
async fn test_cors_rejects_unknown_origin() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/me")
                .header(header::ORIGIN, "https://evil.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_public_route_no_auth_required() {
    let response = get_with_token("/health", None).await;

    // Health should be accessible without auth
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_public_catalog_skips_auth() {
    // Styles and packages read Firestore; offline that is a 500, never a 401.
    for uri in ["/api/styles", "/api/topup/packages", "/api/gallery/public"] {
        let status = get_with_token(uri, None).await.status();
        assert_ne!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ROLE AND BAN CHECKS (require the Firestore emulator)
// ═══════════════════════════════════════════════════════════════════════════

async fn seed_user(state: &edit_aja::AppState, banned: bool) -> String {
    let uid = format!("user-{}", uuid::Uuid::new_v4().simple());
    let mut user = edit_aja::models::User::new(
        uid.clone(),
        Some("member@example.com".to_string()),
        &chrono::Utc::now().to_rfc3339(),
    );
    user.is_banned = banned;
    assert!(state.db.create_user(&user).await.unwrap());
    uid
}

async fn get_as(app: axum::Router, uri: &str, token: &str) -> StatusCode {
    app.oneshot(
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
    .status()
}

#[tokio::test]
async fn test_banned_user_only_reaches_profile() {
    require_emulator!();

    let (app, state) = common::create_emulator_app("http://127.0.0.1:9").await;
    let uid = seed_user(&state, true).await;
    let token = common::create_test_token(&uid, Some("member@example.com"));

    for uri in ["/api/gallery", "/api/favorites", "/api/topup/history", "/api/beta/status"] {
        assert_eq!(
            get_as(app.clone(), uri, &token).await,
            StatusCode::FORBIDDEN,
            "{}",
            uri
        );
    }
    assert_eq!(get_as(app, "/api/me", &token).await, StatusCode::OK);
}

#[tokio::test]
async fn test_non_admin_rejected_from_admin_routes() {
    require_emulator!();

    let (app, state) = common::create_emulator_app("http://127.0.0.1:9").await;
    let uid = seed_user(&state, false).await;
    let token = common::create_test_token(&uid, Some("member@example.com"));

    for uri in [
        "/api/admin/users",
        "/api/admin/topups",
        "/api/admin/styles",
        "/api/admin/settings",
        "/api/admin/analytics",
    ] {
        assert_eq!(
            get_as(app.clone(), uri, &token).await,
            StatusCode::FORBIDDEN,
            "{}",
            uri
        );
    }
}

#[tokio::test]
async fn test_allowlisted_admin_reaches_admin_routes() {
    require_emulator!();

    let (app, _) = common::create_emulator_app("http://127.0.0.1:9").await;
    let token = common::create_test_token("admin-uid", Some("admin@editaja.test"));

    assert_eq!(
        get_as(app, "/api/admin/settings", &token).await,
        StatusCode::OK
    );
}
