// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Midtrans payment notifications.

use crate::error::AppError;
use crate::services::midtrans::GatewayStatus;
use crate::services::topup::NotificationOutcome;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/webhooks/midtrans", post(handle_notification))
}

/// Handle a Midtrans HTTP notification.
///
/// Anything other than 200 makes Midtrans retry, so every verified
/// notification is acknowledged, including ones for unknown orders and ones
/// that failed to apply. Those are picked up again by status polling or
/// admin completion.
async fn handle_notification(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let notification: GatewayStatus = match serde_json::from_slice(&body) {
        Ok(notification) => notification,
        Err(e) => {
            return AppError::BadRequest(format!("Malformed notification: {}", e)).into_response()
        }
    };
    let order_id = notification.order_id.clone();

    let status = match state.topups.handle_notification(notification).await {
        Ok(NotificationOutcome::InvalidSignature) => {
            return AppError::Forbidden("Invalid signature".to_string()).into_response()
        }
        Ok(NotificationOutcome::UnknownOrder) => StatusCode::OK,
        Ok(NotificationOutcome::Applied(transaction)) => {
            tracing::info!(
                order_id = %order_id,
                status = transaction.status.as_str(),
                credited = transaction.credited,
                "Notification processed"
            );
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(order_id = %order_id, error = %e, "Failed to process notification");
            StatusCode::OK
        }
    };
    status.into_response()
}
