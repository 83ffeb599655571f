// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Diamond top-up reconciliation.
//!
//! A top-up moves through: create (Snap order) → webhook notification →
//! status polling → manual completion fallback. All three update paths end in
//! [`TopupService::reconcile`], which holds a per-order lock and credits a
//! transaction at most once.

use crate::db::{FirestoreDb, LinkedWrite};
use crate::error::AppError;
use crate::models::{TopupStatus, TopupTransaction};
use crate::services::ledger::{apply_credit, lock_key, KeyedLocks, LedgerService};
use crate::services::midtrans::{
    CustomerDetails, GatewayStatus, ItemDetail, MidtransClient, SnapCallbacks, SnapRequest,
    TransactionDetails,
};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

/// What reconciling a new status does to a stored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to write.
    NoOp,
    /// Store the new status without touching the balance.
    Record(TopupStatus),
    /// Mark successful and credit the diamonds.
    Credit,
}

/// Decide how to apply `incoming` to `current`.
pub fn plan_transition(current: &TopupTransaction, incoming: TopupStatus) -> Transition {
    if current.credited {
        // A refund after crediting is recorded for the books; the diamonds stay.
        return if incoming == TopupStatus::Refunded && current.status != TopupStatus::Refunded {
            Transition::Record(TopupStatus::Refunded)
        } else {
            Transition::NoOp
        };
    }

    if incoming == TopupStatus::Success {
        return Transition::Credit;
    }

    if incoming == current.status {
        return Transition::NoOp;
    }

    // Terminal states are never reopened by a late "pending".
    if current.status.is_terminal() && incoming == TopupStatus::Pending {
        return Transition::NoOp;
    }

    Transition::Record(incoming)
}

/// Build a Midtrans-safe order ID: `EA-{unix_ms}-{uid prefix}-{random hex}`.
pub fn generate_order_id(uid: &str, now_ms: i64) -> String {
    let prefix: String = uid
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    format!("EA-{}-{}-{:04x}", now_ms, prefix, rand::random::<u16>())
}

/// Result of creating a top-up, returned to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTopup {
    pub order_id: String,
    pub snap_token: String,
    pub redirect_url: String,
    pub client_key: String,
    pub diamonds: i64,
    pub amount: i64,
}

/// Result of processing a Midtrans notification.
#[derive(Debug)]
pub enum NotificationOutcome {
    InvalidSignature,
    UnknownOrder,
    Applied(TopupTransaction),
}

/// Top-up orchestration over Midtrans, Firestore and the ledger.
#[derive(Clone)]
pub struct TopupService {
    db: FirestoreDb,
    ledger: LedgerService,
    midtrans: MidtransClient,
    order_locks: KeyedLocks,
    frontend_url: String,
    client_key: String,
}

impl TopupService {
    pub fn new(
        db: FirestoreDb,
        ledger: LedgerService,
        midtrans: MidtransClient,
        frontend_url: String,
        client_key: String,
    ) -> Self {
        Self {
            db,
            ledger,
            midtrans,
            order_locks: Arc::new(DashMap::new()),
            frontend_url,
            client_key,
        }
    }

    /// Create a Snap order for a package and store it as pending.
    pub async fn create(
        &self,
        uid: &str,
        email: Option<&str>,
        display_name: Option<&str>,
        package_id: &str,
    ) -> Result<CreatedTopup, AppError> {
        let settings = self.db.get_settings().await?;
        if settings.maintenance {
            return Err(AppError::Forbidden(
                "Top-ups are paused for maintenance".to_string(),
            ));
        }

        let package = settings
            .find_package(package_id)
            .cloned()
            .ok_or_else(|| AppError::BadRequest(format!("Unknown package: {}", package_id)))?;

        let now = chrono::Utc::now();
        let order_id = generate_order_id(uid, now.timestamp_millis());

        let request = SnapRequest {
            transaction_details: TransactionDetails {
                order_id: order_id.clone(),
                gross_amount: package.price,
            },
            customer_details: CustomerDetails {
                first_name: display_name.map(str::to_string),
                email: email.map(str::to_string),
            },
            item_details: vec![ItemDetail {
                id: package.id.clone(),
                price: package.price,
                quantity: 1,
                name: format!("{} ({} diamonds)", package.name, package.diamonds),
            }],
            callbacks: Some(SnapCallbacks {
                finish: format!(
                    "{}/topup/finish?order_id={}",
                    self.frontend_url.trim_end_matches('/'),
                    urlencoding::encode(&order_id)
                ),
            }),
        };

        let snap = self.midtrans.create_snap_transaction(&request).await?;

        let now = now.to_rfc3339();
        let transaction = TopupTransaction {
            order_id: order_id.clone(),
            uid: uid.to_string(),
            email: email.map(str::to_string),
            package_id: package.id.clone(),
            diamonds: package.diamonds,
            amount: package.price,
            status: TopupStatus::Pending,
            snap_token: Some(snap.token.clone()),
            redirect_url: Some(snap.redirect_url.clone()),
            payment_type: None,
            gateway_transaction_id: None,
            gateway_status: None,
            credited: false,
            completed_by: None,
            created_at: now.clone(),
            updated_at: now,
            settled_at: None,
        };

        self.db.set_topup(&transaction).await?;

        tracing::info!(
            uid,
            order_id = %order_id,
            package = %package.id,
            amount = package.price,
            "Top-up created"
        );

        Ok(CreatedTopup {
            order_id,
            snap_token: snap.token,
            redirect_url: snap.redirect_url,
            client_key: self.client_key.clone(),
            diamonds: package.diamonds,
            amount: package.price,
        })
    }

    /// Apply a Midtrans HTTP notification.
    pub async fn handle_notification(
        &self,
        notification: GatewayStatus,
    ) -> Result<NotificationOutcome, AppError> {
        if !self.midtrans.verify_signature(&notification) {
            tracing::warn!(
                order_id = %notification.order_id,
                "Security Alert: Midtrans notification signature mismatch"
            );
            return Ok(NotificationOutcome::InvalidSignature);
        }

        tracing::info!(
            order_id = %notification.order_id,
            transaction_status = %notification.transaction_status,
            fraud_status = ?notification.fraud_status,
            "Midtrans notification verified"
        );

        let order_id = notification.order_id.clone();
        match self
            .reconcile(
                &order_id,
                notification.topup_status(),
                Some(&notification),
                "webhook",
            )
            .await
        {
            Ok(transaction) => Ok(NotificationOutcome::Applied(transaction)),
            Err(AppError::NotFound(_)) => {
                tracing::warn!(
                    order_id = %notification.order_id,
                    "Notification for unknown order"
                );
                Ok(NotificationOutcome::UnknownOrder)
            }
            Err(e) => Err(e),
        }
    }

    /// Query Midtrans for the order and reconcile what it reports.
    ///
    /// An order Midtrans has never seen (payment page not opened yet) is
    /// returned unchanged.
    pub async fn refresh_from_gateway(
        &self,
        order_id: &str,
        completed_by: &str,
    ) -> Result<TopupTransaction, AppError> {
        match self.midtrans.get_status(order_id).await {
            Ok(status) => {
                self.reconcile(order_id, status.topup_status(), Some(&status), completed_by)
                    .await
            }
            Err(AppError::NotFound(_)) => {
                tracing::debug!(order_id, "Order not yet known to Midtrans");
                self.load(order_id).await
            }
            Err(e) => Err(e),
        }
    }

    /// Load an order, refreshing it from the gateway while it is pending.
    ///
    /// Gateway failures fall back to the stored state.
    pub async fn poll(&self, order_id: &str) -> Result<TopupTransaction, AppError> {
        let stored = self.load(order_id).await?;

        if stored.status != TopupStatus::Pending {
            return Ok(stored);
        }

        match self.refresh_from_gateway(order_id, "poll").await {
            Ok(transaction) => Ok(transaction),
            Err(AppError::Midtrans(msg)) => {
                tracing::warn!(order_id, error = %msg, "Status poll failed, returning stored state");
                Ok(stored)
            }
            Err(e) => Err(e),
        }
    }

    /// Admin completion. Re-checks the gateway first; with `force`, credits
    /// an order that is still pending because the gateway is unreachable,
    /// has no record of it, or has not settled it. Orders the gateway
    /// reported as denied, cancelled, expired or mismatched are returned as is.
    pub async fn admin_complete(
        &self,
        order_id: &str,
        admin_uid: &str,
        force: bool,
    ) -> Result<TopupTransaction, AppError> {
        let completed_by = format!("admin:{}", admin_uid);

        let current = match self.refresh_from_gateway(order_id, &completed_by).await {
            Ok(transaction) => transaction,
            Err(AppError::Midtrans(msg)) if force => {
                tracing::warn!(order_id, error = %msg, "Gateway unavailable for forced completion");
                self.load(order_id).await?
            }
            Err(e) => return Err(e),
        };

        if current.credited || !force {
            return Ok(current);
        }
        if current.status != TopupStatus::Pending {
            tracing::warn!(
                order_id,
                admin = admin_uid,
                status = current.status.as_str(),
                "Refusing to force a top-up the gateway already closed"
            );
            return Ok(current);
        }

        tracing::warn!(order_id, admin = admin_uid, "Forcing top-up completion");
        self.reconcile(order_id, TopupStatus::Success, None, &completed_by)
            .await
    }

    async fn load(&self, order_id: &str) -> Result<TopupTransaction, AppError> {
        self.db
            .get_topup(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Top-up {}", order_id)))
    }

    /// Apply `incoming` to the stored order. Idempotent.
    pub async fn reconcile(
        &self,
        order_id: &str,
        incoming: TopupStatus,
        gateway: Option<&GatewayStatus>,
        completed_by: &str,
    ) -> Result<TopupTransaction, AppError> {
        let _guard = lock_key(&self.order_locks, order_id).await;

        let mut transaction = self.load(order_id).await?;

        // A forced completion only applies to an order that is still pending.
        if gateway.is_none() && transaction.status != TopupStatus::Pending {
            return Ok(transaction);
        }

        let mut incoming = incoming;
        if let Some(gateway) = gateway {
            if gateway.gross_amount_idr() != Some(transaction.amount) {
                tracing::error!(
                    order_id,
                    expected = transaction.amount,
                    reported = %gateway.gross_amount,
                    "Security Alert: Gross amount mismatch, marking failed"
                );
                incoming = TopupStatus::Failed;
            }

            if !transaction.credited {
                transaction.gateway_status = Some(gateway.transaction_status.clone());
                if gateway.payment_type.is_some() {
                    transaction.payment_type = gateway.payment_type.clone();
                }
                if gateway.transaction_id.is_some() {
                    transaction.gateway_transaction_id = gateway.transaction_id.clone();
                }
            }
        }

        let now = chrono::Utc::now().to_rfc3339();

        match plan_transition(&transaction, incoming) {
            Transition::NoOp => {
                tracing::debug!(order_id, status = incoming.as_str(), "Top-up unchanged");
                Ok(transaction)
            }
            Transition::Record(status) => {
                transaction.status = status;
                transaction.updated_at = now;
                if !self.db.set_topup_if_uncredited(&transaction).await? {
                    tracing::info!(order_id, "Top-up credited elsewhere, keeping stored state");
                    return self.load(order_id).await;
                }

                tracing::info!(order_id, status = status.as_str(), "Top-up status recorded");
                Ok(transaction)
            }
            Transition::Credit => {
                transaction.status = TopupStatus::Success;
                transaction.credited = true;
                transaction.settled_at = Some(now.clone());
                transaction.completed_by = Some(completed_by.to_string());
                transaction.updated_at = now;

                let diamonds = transaction.diamonds;
                let amount = transaction.amount;
                let credited = self
                    .ledger
                    .apply(
                        &transaction.uid,
                        |user| {
                            apply_credit(user, diamonds)?;
                            user.total_spent = user.total_spent.saturating_add(amount);
                            Ok(())
                        },
                        LinkedWrite::Topup(&transaction),
                    )
                    .await;
                let user = match credited {
                    Ok(user) => user,
                    Err(AppError::Conflict(_)) => {
                        tracing::info!(order_id, "Top-up already credited by another instance");
                        return self.load(order_id).await;
                    }
                    Err(e) => return Err(e),
                };

                tracing::info!(
                    order_id,
                    uid = %user.uid,
                    diamonds,
                    balance = user.tokens,
                    completed_by,
                    "Top-up credited"
                );
                Ok(transaction)
            }
        }
    }
}
