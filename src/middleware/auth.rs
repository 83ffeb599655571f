// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase authentication middleware.

use crate::error::AppError;
use crate::services::AuthError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
    Extension,
};
use std::sync::Arc;

/// Path that stays reachable for banned users so the client can show why.
const PROFILE_PATH: &str = "/api/me";

/// Authenticated caller extracted from a Firebase ID token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    /// Allowlisted email or stored admin role.
    pub is_admin: bool,
}

/// Middleware that requires a valid Firebase ID token.
///
/// Also rejects banned users everywhere except the profile endpoint.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let verified = state
        .auth
        .verify(request.headers().get(header::AUTHORIZATION))
        .await
        .map_err(|e| match e {
            AuthError::Forbidden(reason) => {
                tracing::debug!(reason = %reason, "Rejected ID token");
                AppError::Unauthorized
            }
            AuthError::Transient(reason) => {
                AppError::Internal(anyhow::anyhow!("token verification unavailable: {}", reason))
            }
        })?;

    let stored = state.db.get_user(&verified.uid).await?;

    if let Some(user) = &stored {
        if user.is_banned && request.uri().path() != PROFILE_PATH {
            tracing::warn!(uid = %verified.uid, path = %request.uri().path(), "Banned user blocked");
            return Err(AppError::Forbidden("Account is banned".to_string()));
        }
    }

    let allowlisted = verified
        .email
        .as_deref()
        .is_some_and(|email| state.config.is_admin_email(email));
    let is_admin = allowlisted || stored.as_ref().is_some_and(|u| u.is_admin());

    request.extensions_mut().insert(AuthUser {
        uid: verified.uid,
        email: verified.email,
        name: verified.name,
        picture: verified.picture,
        is_admin,
    });

    Ok(next.run(request).await)
}

/// Middleware that requires an admin caller. Runs after [`require_auth`].
pub async fn require_admin(
    Extension(user): Extension<AuthUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !user.is_admin {
        tracing::warn!(
            uid = %user.uid,
            path = %request.uri().path(),
            "Security Alert: Non-admin attempted admin route"
        );
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(request).await)
}
