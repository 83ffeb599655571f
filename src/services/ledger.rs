// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Diamond balance changes.
//!
//! Every change to `users/{uid}.tokens` goes through this service. Changes for
//! one user are serialized with a per-user lock, and each one is committed in
//! the same Firestore transaction as the document that explains it.

use crate::db::{FirestoreDb, LinkedWrite};
use crate::error::AppError;
use crate::models::User;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async locks, shared across requests.
pub type KeyedLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Acquire the lock for `key`, creating it on first use.
pub async fn lock_key(locks: &KeyedLocks, key: &str) -> OwnedMutexGuard<()> {
    let lock = locks
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    lock.lock_owned().await
}

/// Add diamonds to a user.
pub fn apply_credit(user: &mut User, amount: i64) -> Result<(), AppError> {
    if amount < 0 {
        return Err(AppError::BadRequest(
            "Credit amount must not be negative".to_string(),
        ));
    }
    user.tokens = user.tokens.saturating_add(amount);
    Ok(())
}

/// Remove diamonds from a user; the balance never goes negative.
pub fn apply_debit(user: &mut User, amount: i64) -> Result<(), AppError> {
    if amount < 0 {
        return Err(AppError::BadRequest(
            "Debit amount must not be negative".to_string(),
        ));
    }
    if user.tokens < amount {
        return Err(AppError::InsufficientTokens {
            balance: user.tokens,
            required: amount,
        });
    }
    user.tokens -= amount;
    Ok(())
}

/// Admin correction: add `delta` (may be negative), clamping at zero.
pub fn apply_adjustment(user: &mut User, delta: i64) {
    user.tokens = user.tokens.saturating_add(delta).max(0);
}

/// Serialized, transactional balance updates.
#[derive(Clone)]
pub struct LedgerService {
    db: FirestoreDb,
    locks: KeyedLocks,
}

impl LedgerService {
    pub fn new(db: FirestoreDb) -> Self {
        Self {
            db,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Run `change` on the stored user under its lock and commit the result
    /// together with `linked`.
    ///
    /// The lock serializes this process; the Firestore transaction handles
    /// other instances, and may run `change` again after a conflict.
    /// Returns the updated user.
    pub async fn apply<F>(
        &self,
        uid: &str,
        change: F,
        linked: LinkedWrite<'_>,
    ) -> Result<User, AppError>
    where
        F: Fn(&mut User) -> Result<(), AppError>,
    {
        let _guard = lock_key(&self.locks, uid).await;

        let before = AtomicI64::new(0);
        let user = self
            .db
            .commit_user_with(uid, &linked, |user| {
                before.store(user.tokens, Ordering::Relaxed);
                change(user)
            })
            .await?;

        tracing::info!(
            uid,
            before = before.load(Ordering::Relaxed),
            after = user.tokens,
            "Balance updated"
        );

        Ok(user)
    }

    /// Add `amount` diamonds.
    pub async fn credit(
        &self,
        uid: &str,
        amount: i64,
        linked: LinkedWrite<'_>,
    ) -> Result<User, AppError> {
        self.apply(uid, |user| apply_credit(user, amount), linked)
            .await
    }

    /// Remove `amount` diamonds, failing with `InsufficientTokens`.
    pub async fn debit(
        &self,
        uid: &str,
        amount: i64,
        linked: LinkedWrite<'_>,
    ) -> Result<User, AppError> {
        self.apply(uid, |user| apply_debit(user, amount), linked)
            .await
    }

    /// Admin manual correction.
    pub async fn adjust(&self, uid: &str, delta: i64) -> Result<User, AppError> {
        self.apply(
            uid,
            |user| {
                apply_adjustment(user, delta);
                Ok(())
            },
            LinkedWrite::None,
        )
        .await
    }
}
