// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Midtrans API client.
//!
//! Handles:
//! - Snap transaction creation (payment page token)
//! - Transaction status queries
//! - Notification signature verification
//! - Mapping gateway states to top-up statuses

use crate::error::AppError;
use crate::models::TopupStatus;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use std::time::Duration;

const SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com";
const PRODUCTION_SNAP_URL: &str = "https://app.midtrans.com";
const SANDBOX_API_URL: &str = "https://api.sandbox.midtrans.com";
const PRODUCTION_API_URL: &str = "https://api.midtrans.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Midtrans API client.
#[derive(Clone)]
pub struct MidtransClient {
    http: reqwest::Client,
    server_key: String,
    snap_base_url: String,
    api_base_url: String,
}

/// Snap transaction request body.
#[derive(Debug, Clone, Serialize)]
pub struct SnapRequest {
    pub transaction_details: TransactionDetails,
    pub customer_details: CustomerDetails,
    pub item_details: Vec<ItemDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callbacks: Option<SnapCallbacks>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    pub id: String,
    pub price: i64,
    pub quantity: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapCallbacks {
    pub finish: String,
}

/// Snap transaction response.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapResponse {
    pub token: String,
    pub redirect_url: String,
}

/// Transaction state as reported by the status API or a notification.
///
/// Both share the same shape; `signature_key` is present on notifications
/// and status responses alike.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayStatus {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub status_code: String,
    #[serde(default)]
    pub gross_amount: String,
    #[serde(default)]
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub signature_key: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

impl GatewayStatus {
    /// Mapped top-up status.
    pub fn topup_status(&self) -> TopupStatus {
        map_status(&self.transaction_status, self.fraud_status.as_deref())
    }

    /// Gross amount in whole rupiah.
    pub fn gross_amount_idr(&self) -> Option<i64> {
        parse_gross_amount(&self.gross_amount)
    }
}

impl MidtransClient {
    /// Create a client for the sandbox or production environment.
    pub fn new(server_key: String, is_production: bool) -> Self {
        let (snap, api) = if is_production {
            (PRODUCTION_SNAP_URL, PRODUCTION_API_URL)
        } else {
            (SANDBOX_SNAP_URL, SANDBOX_API_URL)
        };

        Self {
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            server_key,
            snap_base_url: snap.to_string(),
            api_base_url: api.to_string(),
        }
    }

    /// Point the client at different hosts (tests).
    pub fn with_base_urls(mut self, snap_base_url: &str, api_base_url: &str) -> Self {
        self.snap_base_url = snap_base_url.trim_end_matches('/').to_string();
        self.api_base_url = api_base_url.trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:", self.server_key)))
    }

    /// Create a Snap transaction and return its token and payment page URL.
    pub async fn create_snap_transaction(
        &self,
        request: &SnapRequest,
    ) -> Result<SnapResponse, AppError> {
        let url = format!("{}/snap/v1/transactions", self.snap_base_url);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Midtrans(format!("Snap request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Midtrans(format!("Snap HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Midtrans(format!("Invalid Snap response: {}", e)))
    }

    /// Query the current status of an order.
    pub async fn get_status(&self, order_id: &str) -> Result<GatewayStatus, AppError> {
        let url = format!(
            "{}/v2/{}/status",
            self.api_base_url,
            urlencoding::encode(order_id)
        );

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::Midtrans(format!("Status request failed: {}", e)))?;

        let http_status = response.status();
        if http_status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Midtrans order {}", order_id)));
        }
        if !http_status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Midtrans(format!(
                "Status HTTP {}: {}",
                http_status, body
            )));
        }

        let status: GatewayStatus = response
            .json()
            .await
            .map_err(|e| AppError::Midtrans(format!("Invalid status response: {}", e)))?;

        // The status API reports unknown orders in-band with HTTP 200.
        if status.status_code == "404" {
            return Err(AppError::NotFound(format!("Midtrans order {}", order_id)));
        }

        Ok(status)
    }

    /// Check a notification's `signature_key`.
    pub fn verify_signature(&self, notification: &GatewayStatus) -> bool {
        let Some(received) = notification.signature_key.as_deref() else {
            return false;
        };

        let expected = signature_for(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &self.server_key,
        );

        received
            .to_ascii_lowercase()
            .as_bytes()
            .ct_eq(expected.as_bytes())
            .into()
    }
}

/// Hex SHA-512 of `order_id + status_code + gross_amount + server_key`.
pub fn signature_for(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Map Midtrans `transaction_status`/`fraud_status` to a top-up status.
pub fn map_status(transaction_status: &str, fraud_status: Option<&str>) -> TopupStatus {
    match transaction_status {
        "capture" => match fraud_status {
            Some("challenge") => TopupStatus::Pending,
            Some("deny") => TopupStatus::Failed,
            _ => TopupStatus::Success,
        },
        "settlement" => TopupStatus::Success,
        "pending" => TopupStatus::Pending,
        "deny" | "cancel" | "failure" => TopupStatus::Failed,
        "expire" => TopupStatus::Expired,
        "refund" | "partial_refund" | "chargeback" | "partial_chargeback" => TopupStatus::Refunded,
        _ => TopupStatus::Pending,
    }
}

/// Parse a Midtrans amount string ("45000.00") into whole rupiah.
pub fn parse_gross_amount(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    if !fraction.chars().all(|c| c == '0') {
        return None;
    }
    whole.parse().ok()
}
