// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Diamond top-up transaction tracked against a Midtrans order.

use serde::{Deserialize, Serialize};

/// Settlement state of a top-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopupStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Expired,
    Refunded,
}

impl TopupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopupStatus::Pending => "pending",
            TopupStatus::Success => "success",
            TopupStatus::Failed => "failed",
            TopupStatus::Expired => "expired",
            TopupStatus::Refunded => "refunded",
        }
    }

    /// No further gateway updates are expected.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TopupStatus::Pending)
    }
}

/// Stored at `topup_transactions/{order_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupTransaction {
    /// Midtrans order ID (also used as document ID)
    pub order_id: String,
    pub uid: String,
    pub email: Option<String>,
    pub package_id: String,
    /// Diamonds credited on success
    pub diamonds: i64,
    /// Gross amount charged (IDR)
    pub amount: i64,
    #[serde(default)]
    pub status: TopupStatus,
    pub snap_token: Option<String>,
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub gateway_transaction_id: Option<String>,
    /// Raw `transaction_status` last reported by Midtrans
    #[serde(default)]
    pub gateway_status: Option<String>,
    /// Diamonds have been added to the user's balance
    #[serde(default)]
    pub credited: bool,
    /// "webhook", "poll", "manual" or "admin:{uid}"
    #[serde(default)]
    pub completed_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub settled_at: Option<String>,
}
