// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Diamond top-up routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{TokenPackage, TopupTransaction};
use crate::routes::extract::{page_limit, ValidJson};
use crate::services::topup::CreatedTopup;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// Top-up routes (require authentication).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/topup", post(create_topup))
        .route("/api/topup/history", get(history))
        .route("/api/topup/{order_id}", get(get_topup))
        .route("/api/topup/{order_id}/complete", post(complete_topup))
}

/// Public routes.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/topup/packages", get(list_packages))
}

#[derive(Deserialize, Validate)]
struct CreateTopupRequest {
    #[validate(length(min = 1, max = 64))]
    package_id: String,
}

/// Start a Snap payment for a package.
async fn create_topup(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    ValidJson(payload): ValidJson<CreateTopupRequest>,
) -> Result<Json<CreatedTopup>> {
    let created = state
        .topups
        .create(
            &caller.uid,
            caller.email.as_deref(),
            caller.name.as_deref(),
            &payload.package_id,
        )
        .await?;
    Ok(Json(created))
}

/// Load an order owned by the caller. Other users' orders look missing.
async fn owned_order(state: &AppState, caller: &AuthUser, order_id: &str) -> Result<()> {
    match state.db.get_topup(order_id).await? {
        Some(t) if t.uid == caller.uid => Ok(()),
        _ => Err(AppError::NotFound(format!("Top-up {}", order_id))),
    }
}

/// Current order state, refreshed from Midtrans while pending.
async fn get_topup(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(order_id): Path<String>,
) -> Result<Json<TopupTransaction>> {
    owned_order(&state, &caller, &order_id).await?;
    Ok(Json(state.topups.poll(&order_id).await?))
}

/// Manual completion fallback: re-query Midtrans and reconcile.
async fn complete_topup(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(order_id): Path<String>,
) -> Result<Json<TopupTransaction>> {
    owned_order(&state, &caller, &order_id).await?;

    tracing::info!(uid = %caller.uid, order_id = %order_id, "Manual top-up completion requested");
    Ok(Json(
        state
            .topups
            .refresh_from_gateway(&order_id, "manual")
            .await?,
    ))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

/// The caller's top-ups, newest first.
async fn history(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<TopupTransaction>>> {
    let limit = page_limit(params.limit, 20, 100);
    Ok(Json(
        state.db.list_topups_for_user(&caller.uid, limit).await?,
    ))
}

async fn list_packages(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TokenPackage>>> {
    Ok(Json(state.db.get_settings().await?.packages))
}
