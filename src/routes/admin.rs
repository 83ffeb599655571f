// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin routes: users, billing, styles, feedback, moderation, settings.
//!
//! Mounted behind `require_auth` + `require_admin` in routes/mod.rs.

use crate::db::LinkedWrite;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::style::slugify;
use crate::models::{
    Feedback, FeedbackStatus, Generation, Settings, Style, TopupStatus, TopupTransaction, User,
    UserRole,
};
use crate::routes::extract::{page_limit, JsonBody, ValidJson};
use crate::services::analytics::{summarize, AnalyticsSummary};
use crate::services::image_host::filename_from_url;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// Upper bound on documents scanned for the analytics dashboard.
const ANALYTICS_SCAN_LIMIT: u32 = 10_000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/{uid}", patch(update_user))
        .route("/api/admin/users/{uid}/tokens", post(adjust_tokens))
        .route("/api/admin/topups", get(list_topups))
        .route(
            "/api/admin/topups/{order_id}/complete",
            post(complete_topup),
        )
        .route("/api/admin/styles", get(list_styles).post(create_style))
        .route(
            "/api/admin/styles/{id}",
            axum::routing::put(update_style).delete(delete_style),
        )
        .route("/api/admin/feedback", get(list_feedback))
        .route(
            "/api/admin/feedback/{id}",
            patch(update_feedback).delete(delete_feedback),
        )
        .route("/api/admin/generations", get(list_generations))
        .route(
            "/api/admin/generations/{id}",
            patch(moderate_generation).delete(delete_generation),
        )
        .route("/api/admin/settings", get(get_settings).put(put_settings))
        .route("/api/admin/analytics", get(analytics))
}

// ─── Users ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct UserQuery {
    email: Option<String>,
    limit: Option<u32>,
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<Vec<User>>> {
    let users = match params.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => {
            state
                .db
                .find_users_by_email(&email.to_ascii_lowercase())
                .await?
        }
        _ => {
            state
                .db
                .list_users(page_limit(params.limit, 50, 500))
                .await?
        }
    };
    Ok(Json(users))
}

#[derive(Deserialize, Validate)]
struct UpdateUserRequest {
    role: Option<UserRole>,
    is_banned: Option<bool>,
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(uid): Path<String>,
    ValidJson(payload): ValidJson<UpdateUserRequest>,
) -> Result<Json<User>> {
    if uid == admin.uid && (payload.is_banned == Some(true) || payload.role == Some(UserRole::User))
    {
        return Err(AppError::BadRequest(
            "Admins cannot ban or demote themselves".to_string(),
        ));
    }

    let user = state
        .ledger
        .apply(
            &uid,
            |user| {
                if let Some(role) = payload.role {
                    user.role = role;
                }
                if let Some(banned) = payload.is_banned {
                    user.is_banned = banned;
                }
                Ok(())
            },
            LinkedWrite::None,
        )
        .await?;

    tracing::info!(
        admin = %admin.uid,
        uid = %uid,
        role = ?payload.role,
        is_banned = ?payload.is_banned,
        "Admin updated user"
    );
    Ok(Json(user))
}

#[derive(Deserialize, Validate)]
struct AdjustTokensRequest {
    #[validate(range(min = -1_000_000, max = 1_000_000))]
    delta: i64,
    #[validate(length(min = 1, max = 200))]
    reason: String,
}

async fn adjust_tokens(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(uid): Path<String>,
    ValidJson(payload): ValidJson<AdjustTokensRequest>,
) -> Result<Json<User>> {
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be zero".to_string()));
    }

    let user = state.ledger.adjust(&uid, payload.delta).await?;

    tracing::warn!(
        admin = %admin.uid,
        uid = %uid,
        delta = payload.delta,
        reason = %payload.reason,
        balance = user.tokens,
        "Manual balance adjustment"
    );
    Ok(Json(user))
}

// ─── Billing ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct TopupQuery {
    status: Option<TopupStatus>,
    limit: Option<u32>,
}

async fn list_topups(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopupQuery>,
) -> Result<Json<Vec<TopupTransaction>>> {
    let limit = page_limit(params.limit, 50, 500);
    Ok(Json(state.db.list_topups(params.status, limit).await?))
}

#[derive(Deserialize, Validate)]
struct CompleteTopupRequest {
    #[serde(default)]
    force: bool,
}

async fn complete_topup(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(order_id): Path<String>,
    ValidJson(payload): ValidJson<CompleteTopupRequest>,
) -> Result<Json<TopupTransaction>> {
    let transaction = state
        .topups
        .admin_complete(&order_id, &admin.uid, payload.force)
        .await?;
    Ok(Json(transaction))
}

// ─── Styles ──────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct StyleRequest {
    #[validate(length(min = 1, max = 80))]
    name: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    description: String,
    #[validate(length(min = 1, max = 4000))]
    prompt: String,
    #[validate(length(max = 2000))]
    negative_prompt: Option<String>,
    #[validate(url)]
    preview_url: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, max = 1000))]
    cost: i64,
    active: Option<bool>,
    #[serde(default)]
    sort_order: i32,
}

impl StyleRequest {
    fn apply_to(self, style: &mut Style) {
        style.name = self.name.trim().to_string();
        style.description = self.description;
        style.prompt = self.prompt;
        style.negative_prompt = self.negative_prompt.filter(|p| !p.trim().is_empty());
        style.preview_url = self.preview_url;
        style.cost = self.cost;
        if let Some(active) = self.active {
            style.active = active;
        }
        style.sort_order = self.sort_order;
    }
}

async fn list_styles(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Style>>> {
    Ok(Json(state.db.list_styles(false).await?))
}

async fn create_style(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<StyleRequest>,
) -> Result<(StatusCode, Json<Style>)> {
    let id = slugify(&payload.name);
    if id.is_empty() {
        return Err(AppError::BadRequest(
            "Style name must contain letters or digits".to_string(),
        ));
    }
    if state.db.get_style(&id).await?.is_some() {
        return Err(AppError::Conflict(format!("Style '{}' already exists", id)));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let mut style = Style {
        id,
        name: String::new(),
        description: String::new(),
        prompt: String::new(),
        negative_prompt: None,
        preview_url: None,
        cost: 0,
        active: true,
        sort_order: 0,
        created_at: now.clone(),
        updated_at: now,
    };
    payload.apply_to(&mut style);

    state.db.set_style(&style).await?;
    tracing::info!(style = %style.id, "Style created");
    Ok((StatusCode::CREATED, Json(style)))
}

async fn update_style(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<StyleRequest>,
) -> Result<Json<Style>> {
    let mut style = state
        .db
        .get_style(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Style {}", id)))?;

    payload.apply_to(&mut style);
    style.updated_at = chrono::Utc::now().to_rfc3339();

    state.db.set_style(&style).await?;
    Ok(Json(style))
}

async fn delete_style(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if state.db.get_style(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Style {}", id)));
    }
    state.db.delete_style(&id).await?;
    tracing::info!(style = %id, "Style deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Feedback ────────────────────────────────────────────────

#[derive(Deserialize)]
struct FeedbackQuery {
    status: Option<FeedbackStatus>,
    limit: Option<u32>,
}

async fn list_feedback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedbackQuery>,
) -> Result<Json<Vec<Feedback>>> {
    let limit = page_limit(params.limit, 50, 500);
    Ok(Json(state.db.list_feedback(params.status, limit).await?))
}

#[derive(Deserialize, Validate)]
struct UpdateFeedbackRequest {
    status: Option<FeedbackStatus>,
    #[validate(length(max = 2000))]
    admin_note: Option<String>,
}

async fn update_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<UpdateFeedbackRequest>,
) -> Result<Json<Feedback>> {
    let mut feedback = state
        .db
        .get_feedback(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Feedback {}", id)))?;

    if let Some(status) = payload.status {
        feedback.status = status;
    }
    if payload.admin_note.is_some() {
        feedback.admin_note = payload.admin_note;
    }
    feedback.updated_at = chrono::Utc::now().to_rfc3339();

    state.db.set_feedback(&feedback).await?;
    Ok(Json(feedback))
}

async fn delete_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.db.delete_feedback(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Gallery Moderation ──────────────────────────────────────

#[derive(Deserialize)]
struct GenerationQuery {
    limit: Option<u32>,
}

async fn list_generations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GenerationQuery>,
) -> Result<Json<Vec<Generation>>> {
    let limit = page_limit(params.limit, 50, 500);
    Ok(Json(state.db.list_generations(limit).await?))
}

#[derive(Deserialize, Validate)]
struct ModerateRequest {
    hidden: bool,
}

async fn moderate_generation(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<ModerateRequest>,
) -> Result<Json<Generation>> {
    let mut generation = state
        .db
        .get_generation(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Generation {}", id)))?;

    generation.hidden = payload.hidden;
    state.db.set_generation(&generation).await?;

    tracing::info!(admin = %admin.uid, generation_id = %id, hidden = payload.hidden, "Generation moderated");
    Ok(Json(generation))
}

/// Delete a generation, its favorites, and (best effort) the source upload.
async fn delete_generation(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let generation = state
        .db
        .get_generation(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Generation {}", id)))?;

    state.db.delete_generation_cascade(&id).await?;

    if let Some(filename) = filename_from_url(&generation.source_image_url) {
        if let Err(e) = state.image_host.delete(filename).await {
            tracing::warn!(generation_id = %id, filename, error = %e, "Source image delete failed");
        }
    }

    tracing::info!(admin = %admin.uid, generation_id = %id, "Generation deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Settings ────────────────────────────────────────────────

async fn get_settings(State(state): State<Arc<AppState>>) -> Result<Json<Settings>> {
    Ok(Json(state.db.get_settings().await?))
}

async fn put_settings(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    JsonBody(settings): JsonBody<Settings>,
) -> Result<Json<Settings>> {
    settings.validate().map_err(AppError::BadRequest)?;
    state.db.set_settings(&settings).await?;
    tracing::info!(admin = %admin.uid, maintenance = settings.maintenance, "Settings updated");
    Ok(Json(settings))
}

// ─── Analytics ───────────────────────────────────────────────

async fn analytics(State(state): State<Arc<AppState>>) -> Result<Json<AnalyticsSummary>> {
    let db = &state.db;
    let (users, testers, generations, topups, feedback, visits) = tokio::try_join!(
        db.list_users(ANALYTICS_SCAN_LIMIT),
        db.count_beta_testers(),
        db.list_generations(ANALYTICS_SCAN_LIMIT),
        db.list_topups(None, ANALYTICS_SCAN_LIMIT),
        db.list_feedback(None, ANALYTICS_SCAN_LIMIT),
        db.list_visits(ANALYTICS_SCAN_LIMIT),
    )?;

    Ok(Json(summarize(
        users.len() as u64,
        u64::from(testers),
        &generations,
        &topups,
        &feedback,
        &visits,
    )))
}
