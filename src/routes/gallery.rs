// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gallery and favorites routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Favorite, Generation, GenerationStatus};
use crate::routes::extract::{page_limit, ValidJson};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// Gallery routes (require authentication).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/gallery", get(my_gallery))
        .route(
            "/api/gallery/{id}",
            patch(update_visibility).delete(delete_generation),
        )
        .route("/api/favorites", get(list_favorites).post(add_favorite))
        .route("/api/favorites/{generation_id}", delete(remove_favorite))
}

/// Public routes.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/gallery/public", get(public_gallery))
}

#[derive(Deserialize)]
struct GalleryQuery {
    limit: Option<u32>,
}

async fn my_gallery(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Query(params): Query<GalleryQuery>,
) -> Result<Json<Vec<Generation>>> {
    let limit = page_limit(params.limit, 30, 100);
    Ok(Json(
        state
            .db
            .list_generations_for_user(&caller.uid, limit)
            .await?,
    ))
}

async fn public_gallery(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GalleryQuery>,
) -> Result<Json<Vec<Generation>>> {
    let limit = page_limit(params.limit, 30, 100);
    Ok(Json(state.db.list_public_generations(limit).await?))
}

/// Load a generation the caller owns; anything else looks missing.
async fn owned_generation(state: &AppState, caller: &AuthUser, id: &str) -> Result<Generation> {
    state
        .db
        .get_generation(id)
        .await?
        .filter(|g| g.uid == caller.uid)
        .ok_or_else(|| AppError::NotFound(format!("Generation {}", id)))
}

#[derive(Deserialize, Validate)]
struct VisibilityRequest {
    is_public: bool,
}

async fn update_visibility(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<VisibilityRequest>,
) -> Result<Json<Generation>> {
    let mut generation = owned_generation(&state, &caller, &id).await?;

    if payload.is_public && generation.status != GenerationStatus::Completed {
        return Err(AppError::BadRequest(
            "Only completed generations can be shared".to_string(),
        ));
    }

    generation.is_public = payload.is_public;
    state.db.set_generation(&generation).await?;
    Ok(Json(generation))
}

async fn delete_generation(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let generation = owned_generation(&state, &caller, &id).await?;

    if generation.status == GenerationStatus::Pending {
        return Err(AppError::Conflict(
            "Generation is still in progress".to_string(),
        ));
    }

    let removed = state.db.delete_generation_cascade(&id).await?;
    tracing::info!(uid = %caller.uid, generation_id = %id, favorites_removed = removed, "Generation deleted by owner");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Favorites ───────────────────────────────────────────────

async fn list_favorites(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<Favorite>>> {
    Ok(Json(state.db.list_favorites_for_user(&caller.uid).await?))
}

#[derive(Deserialize, Validate)]
struct FavoriteRequest {
    #[validate(length(min = 1, max = 100))]
    generation_id: String,
}

/// Bookmark a generation. Adding twice returns the existing favorite.
async fn add_favorite(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    ValidJson(payload): ValidJson<FavoriteRequest>,
) -> Result<Json<Favorite>> {
    if let Some(existing) = state
        .db
        .get_favorite(&caller.uid, &payload.generation_id)
        .await?
    {
        return Ok(Json(existing));
    }

    let generation = state
        .db
        .get_generation(&payload.generation_id)
        .await?
        .filter(|g| g.uid == caller.uid || g.is_publicly_listed())
        .ok_or_else(|| AppError::NotFound(format!("Generation {}", payload.generation_id)))?;

    let image_url = match generation.cover_url() {
        Some(url) if generation.status == GenerationStatus::Completed => url.to_string(),
        _ => {
            return Err(AppError::BadRequest(
                "Generation has no result yet".to_string(),
            ))
        }
    };

    let favorite = Favorite {
        uid: caller.uid.clone(),
        generation_id: generation.id.clone(),
        image_url,
        style_name: generation.style_name.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state.db.set_favorite(&favorite).await?;

    Ok(Json(favorite))
}

async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(generation_id): Path<String>,
) -> Result<StatusCode> {
    state
        .db
        .delete_favorite(&caller.uid, &generation_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
