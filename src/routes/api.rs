// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for signed-in users: profile, feedback, beta program, styles.

use crate::db::LinkedWrite;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{BetaTester, Feedback, FeedbackStatus, Style, User};
use crate::routes::extract::ValidJson;
use crate::services::ledger::apply_credit;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// API routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/feedback", post(submit_feedback))
        .route("/api/beta/register", post(register_beta))
        .route("/api/beta/status", get(beta_status))
}

/// Public routes.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/styles", get(list_styles))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub is_admin: bool,
}

/// Get (and on first sight, provision) the caller's profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let now = chrono::Utc::now().to_rfc3339();

    if state.db.get_user(&caller.uid).await?.is_none() {
        let settings = state.db.get_settings().await?;

        let mut user = User::new(caller.uid.clone(), caller.email.clone(), &now);
        user.display_name = caller.name.clone();
        user.photo_url = caller.picture.clone();
        user.tokens = settings.signup_bonus;

        if state.db.create_user(&user).await? {
            tracing::info!(
                uid = %caller.uid,
                bonus = settings.signup_bonus,
                "User provisioned"
            );
            return Ok(Json(MeResponse {
                user,
                is_admin: caller.is_admin,
            }));
        }
        // Lost a race with a concurrent first request; fall through.
    }

    let user = state
        .ledger
        .apply(
            &caller.uid,
            |user| {
                user.last_active = now.clone();
                if caller.email.is_some() {
                    user.email = caller.email.clone();
                }
                if caller.name.is_some() {
                    user.display_name = caller.name.clone();
                }
                if caller.picture.is_some() {
                    user.photo_url = caller.picture.clone();
                }
                Ok(())
            },
            LinkedWrite::None,
        )
        .await?;

    Ok(Json(MeResponse {
        user,
        is_admin: caller.is_admin,
    }))
}

// ─── Feedback ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct FeedbackRequest {
    #[validate(range(min = 1, max = 5))]
    rating: u8,
    #[validate(length(min = 1, max = 50))]
    category: String,
    #[validate(length(min = 1, max = 2000))]
    message: String,
}

async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    ValidJson(payload): ValidJson<FeedbackRequest>,
) -> Result<Json<Feedback>> {
    let now = chrono::Utc::now().to_rfc3339();
    let feedback = Feedback {
        id: uuid::Uuid::new_v4().to_string(),
        uid: caller.uid.clone(),
        email: caller.email.clone(),
        rating: payload.rating,
        category: payload.category.trim().to_string(),
        message: payload.message.trim().to_string(),
        status: FeedbackStatus::New,
        admin_note: None,
        created_at: now.clone(),
        updated_at: now,
    };

    state.db.set_feedback(&feedback).await?;
    tracing::info!(uid = %caller.uid, rating = feedback.rating, "Feedback received");

    Ok(Json(feedback))
}

// ─── Beta Program ────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct BetaRegisterRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[validate(length(max = 500))]
    reason: Option<String>,
}

#[derive(Serialize)]
pub struct BetaRegisterResponse {
    pub tokens_granted: i64,
    pub balance: i64,
}

/// Register the caller as a beta tester and grant the free diamonds.
async fn register_beta(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    ValidJson(payload): ValidJson<BetaRegisterRequest>,
) -> Result<Json<BetaRegisterResponse>> {
    let _guard = state.beta_lock.lock().await;

    let settings = state.db.get_settings().await?;
    if !settings.beta_open {
        return Err(AppError::Forbidden(
            "Beta registration is closed".to_string(),
        ));
    }

    if state.db.get_beta_tester(&caller.uid).await?.is_some() {
        return Err(AppError::Conflict("Already registered".to_string()));
    }

    let registered = state.db.count_beta_testers().await?;
    if registered >= settings.beta_max_slots {
        return Err(AppError::Conflict("Beta program is full".to_string()));
    }

    let tester = BetaTester {
        uid: caller.uid.clone(),
        email: caller.email.clone(),
        name: payload.name.trim().to_string(),
        reason: payload
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()),
        tokens_granted: settings.beta_free_tokens,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    let grant = settings.beta_free_tokens;
    let user = state
        .ledger
        .apply(
            &caller.uid,
            |user| {
                if user.is_beta_tester {
                    return Err(AppError::Conflict("Already registered".to_string()));
                }
                user.is_beta_tester = true;
                apply_credit(user, grant)
            },
            LinkedWrite::BetaTester(&tester),
        )
        .await?;

    tracing::info!(
        uid = %caller.uid,
        grant,
        slot = registered + 1,
        "Beta tester registered"
    );

    Ok(Json(BetaRegisterResponse {
        tokens_granted: grant,
        balance: user.tokens,
    }))
}

#[derive(Serialize)]
pub struct BetaStatusResponse {
    pub open: bool,
    pub registered: bool,
    pub slots_left: u32,
}

async fn beta_status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<BetaStatusResponse>> {
    let settings = state.db.get_settings().await?;
    let registered = state.db.get_beta_tester(&caller.uid).await?.is_some();
    let count = state.db.count_beta_testers().await?;

    Ok(Json(BetaStatusResponse {
        open: settings.beta_open,
        registered,
        slots_left: settings.beta_max_slots.saturating_sub(count),
    }))
}

// ─── Styles ──────────────────────────────────────────────────

/// Active styles, in display order.
async fn list_styles(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Style>>> {
    Ok(Json(state.db.list_styles(true).await?))
}
