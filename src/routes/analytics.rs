// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Visit tracking (public).

use crate::models::Visit;
use crate::services::geo::client_ip;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

const MAX_PATH_LEN: usize = 512;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/analytics/visit", post(record_visit))
}

#[derive(Deserialize)]
struct VisitRequest {
    #[serde(default)]
    path: String,
    #[serde(default)]
    referrer: Option<String>,
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Record a page visit. Always answers 200; tracking never breaks the page.
/// Malformed or mistyped beacons are dropped, not rejected.
async fn record_visit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let payload: VisitRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed visit beacon");
            return StatusCode::OK;
        }
    };

    let ip = client_ip(&headers);
    let geo = state.geo.lookup(ip.as_deref()).await;

    let visit = Visit {
        id: uuid::Uuid::new_v4().to_string(),
        path: truncate(&payload.path, MAX_PATH_LEN),
        country: geo.country,
        country_code: geo.country_code,
        city: geo.city,
        referrer: payload
            .referrer
            .filter(|r| !r.is_empty())
            .map(|r| truncate(&r, MAX_PATH_LEN)),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    if let Err(e) = state.db.record_visit(&visit).await {
        tracing::warn!(error = %e, path = %visit.path, "Failed to record visit");
    }

    StatusCode::OK
}
