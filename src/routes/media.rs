// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Photo upload and style generation routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::Generation;
use crate::routes::extract::ValidJson;
use crate::services::compress::{compress_image, CompressOptions};
use crate::services::image_host::filename_from_url;
use crate::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// How many of a user's generations are scanned for a file reference.
const OWNERSHIP_SCAN_LIMIT: u32 = 500;

/// Media routes (require authentication).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/upload/{filename}", delete(delete_upload))
        .route("/api/generate", post(start_generation))
        .route("/api/generate/{id}", get(get_generation))
}

// ─── Upload ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub original_bytes: usize,
    pub stored_bytes: usize,
    pub width: u32,
    pub height: u32,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the size limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Accept a photo, compress it, and forward it to the image host.
async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_ascii_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Unsupported content type '{}'; use JPEG, PNG or WebP",
                content_type
            )));
        }

        let data = field.bytes().await.map_err(multipart_error)?;
        if data.len() > state.config.max_upload_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Upload is {} bytes; the limit is {}",
                data.len(),
                state.config.max_upload_bytes
            )));
        }

        let compressed =
            tokio::task::spawn_blocking(move || compress_image(&data, &CompressOptions::default()))
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("compression task failed: {}", e)))??;

        let filename = format!(
            "{}.{}",
            uuid::Uuid::new_v4().simple(),
            extension_for(compressed.content_type)
        );

        let stored_bytes = compressed.bytes.len();
        let stored = state
            .image_host
            .upload(compressed.bytes, &filename, compressed.content_type)
            .await?;

        tracing::info!(
            uid = %caller.uid,
            filename = %stored.filename,
            original = compressed.original_bytes,
            stored = stored_bytes,
            passthrough = compressed.passthrough,
            "Upload stored"
        );

        return Ok(Json(UploadResponse {
            url: stored.url,
            filename: stored.filename,
            original_bytes: compressed.original_bytes,
            stored_bytes,
            width: compressed.width,
            height: compressed.height,
        }));
    }

    Err(AppError::BadRequest("Missing 'file' field".to_string()))
}

fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 200
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Delete an uploaded file the caller has used (admins: any file).
async fn delete_upload(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(filename): Path<String>,
) -> Result<StatusCode> {
    if !is_safe_filename(&filename) {
        return Err(AppError::BadRequest("Invalid filename".to_string()));
    }

    if !caller.is_admin {
        let owns = state
            .db
            .list_generations_for_user(&caller.uid, OWNERSHIP_SCAN_LIMIT)
            .await?
            .iter()
            .any(|g| filename_from_url(&g.source_image_url) == Some(filename.as_str()));

        if !owns {
            tracing::warn!(
                uid = %caller.uid,
                filename = %filename,
                "Security Alert: Attempt to delete unowned upload"
            );
            return Err(AppError::Forbidden(
                "File is not referenced by your generations".to_string(),
            ));
        }
    }

    state.image_host.delete(&filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Generation ──────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct GenerateRequest {
    #[validate(length(min = 1, max = 100))]
    style_id: String,
    #[validate(url, length(max = 2048))]
    image_url: String,
}

/// Charge the caller and start a styled generation.
async fn start_generation(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    ValidJson(payload): ValidJson<GenerateRequest>,
) -> Result<Json<Generation>> {
    let generation = state
        .generations
        .start(&caller.uid, &payload.style_id, &payload.image_url)
        .await?;
    Ok(Json(generation))
}

/// Poll a generation owned by the caller.
async fn get_generation(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Generation>> {
    match state.db.get_generation(&id).await? {
        Some(g) if g.uid == caller.uid || caller.is_admin => {}
        _ => return Err(AppError::NotFound(format!("Generation {}", id))),
    }

    Ok(Json(state.generations.poll(&id).await?))
}
