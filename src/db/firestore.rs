// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile and diamond balance)
//! - Generations, favorites and feedback
//! - Top-up transactions (Midtrans orders)
//! - Styles, settings and beta testers
//! - Page visits (analytics)

use crate::db::{collections, SETTINGS_DOC_ID};
use crate::error::AppError;
use crate::models::{
    BetaTester, Favorite, Feedback, FeedbackStatus, Generation, Settings, Style, TopupStatus,
    TopupTransaction, User, Visit,
};
use serde::{Deserialize, Serialize};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// A second document committed in the same transaction as a user write.
///
/// Each variant carries a guard that is checked against the stored copy
/// inside the transaction.
pub enum LinkedWrite<'a> {
    None,
    Topup(&'a TopupTransaction),
    Generation(&'a Generation),
    BetaTester(&'a BetaTester),
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Generic Document Helpers ────────────────────────────────

    async fn get_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj::<T>()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_doc<T>(&self, collection: &str, id: &str, object: &T) -> Result<(), AppError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Sync + Send,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_doc(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by Firebase UID.
    pub async fn get_user(&self, uid: &str) -> Result<Option<User>, AppError> {
        self.get_doc(collections::USERS, uid).await
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.set_doc(collections::USERS, &user.uid, user).await
    }

    /// Create a user only if no document exists yet.
    ///
    /// Returns `false` when the user already exists, so concurrent first
    /// requests provision (and grant the signup bonus) exactly once.
    pub async fn create_user(&self, user: &User) -> Result<bool, AppError> {
        let result: Result<(), firestore::errors::FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::USERS)
            .document_id(&user.uid)
            .object(user)
            .execute()
            .await;

        match result {
            Ok(()) => Ok(true),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    /// List users, newest first.
    pub async fn list_users(&self, limit: u32) -> Result<Vec<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find users by exact email.
    pub async fn find_users_by_email(&self, email: &str) -> Result<Vec<User>, AppError> {
        let email = email.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Generation Operations ───────────────────────────────────

    pub async fn get_generation(&self, id: &str) -> Result<Option<Generation>, AppError> {
        self.get_doc(collections::GENERATIONS, id).await
    }

    pub async fn set_generation(&self, generation: &Generation) -> Result<(), AppError> {
        self.set_doc(collections::GENERATIONS, &generation.id, generation)
            .await
    }

    /// A user's generations, newest first.
    pub async fn list_generations_for_user(
        &self,
        uid: &str,
        limit: u32,
    ) -> Result<Vec<Generation>, AppError> {
        let uid = uid.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::GENERATIONS)
            .filter(move |q| q.for_all([q.field("uid").eq(uid.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Completed generations shared to the public gallery and not hidden.
    pub async fn list_public_generations(&self, limit: u32) -> Result<Vec<Generation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::GENERATIONS)
            .filter(|q| {
                q.for_all([
                    q.field("is_public").eq(true),
                    q.field("hidden").eq(false),
                    q.field("status").eq("completed"),
                ])
            })
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All generations (moderation view), newest first.
    pub async fn list_generations(&self, limit: u32) -> Result<Vec<Generation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::GENERATIONS)
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a generation together with every favorite pointing at it.
    ///
    /// Returns the number of favorites removed.
    pub async fn delete_generation_cascade(&self, generation_id: &str) -> Result<usize, AppError> {
        let id = generation_id.to_string();
        let favorites: Vec<Favorite> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::FAVORITES)
            .filter(move |q| q.for_all([q.field("generation_id").eq(id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let count = favorites.len();
        self.batch_delete(&favorites, collections::FAVORITES, |f: &Favorite| {
            Favorite::doc_id(&f.uid, &f.generation_id)
        })
        .await?;

        self.delete_doc(collections::GENERATIONS, generation_id)
            .await?;

        tracing::debug!(
            generation_id,
            favorites_removed = count,
            "Deleted generation"
        );
        Ok(count)
    }

    // ─── Favorite Operations ─────────────────────────────────────

    pub async fn get_favorite(
        &self,
        uid: &str,
        generation_id: &str,
    ) -> Result<Option<Favorite>, AppError> {
        self.get_doc(collections::FAVORITES, &Favorite::doc_id(uid, generation_id))
            .await
    }

    pub async fn set_favorite(&self, favorite: &Favorite) -> Result<(), AppError> {
        let doc_id = Favorite::doc_id(&favorite.uid, &favorite.generation_id);
        self.set_doc(collections::FAVORITES, &doc_id, favorite).await
    }

    pub async fn delete_favorite(&self, uid: &str, generation_id: &str) -> Result<(), AppError> {
        self.delete_doc(collections::FAVORITES, &Favorite::doc_id(uid, generation_id))
            .await
    }

    pub async fn list_favorites_for_user(&self, uid: &str) -> Result<Vec<Favorite>, AppError> {
        let uid = uid.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::FAVORITES)
            .filter(move |q| q.for_all([q.field("uid").eq(uid.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Feedback Operations ─────────────────────────────────────

    pub async fn get_feedback(&self, id: &str) -> Result<Option<Feedback>, AppError> {
        self.get_doc(collections::FEEDBACK, id).await
    }

    pub async fn set_feedback(&self, feedback: &Feedback) -> Result<(), AppError> {
        self.set_doc(collections::FEEDBACK, &feedback.id, feedback)
            .await
    }

    pub async fn delete_feedback(&self, id: &str) -> Result<(), AppError> {
        self.delete_doc(collections::FEEDBACK, id).await
    }

    /// Feedback newest first, optionally filtered by status.
    pub async fn list_feedback(
        &self,
        status: Option<FeedbackStatus>,
        limit: u32,
    ) -> Result<Vec<Feedback>, AppError> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::FEEDBACK);

        let query = if let Some(status) = status {
            query.filter(move |q| q.for_all([q.field("status").eq(status.as_str())]))
        } else {
            query
        };

        query
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Top-up Operations ───────────────────────────────────────

    pub async fn get_topup(&self, order_id: &str) -> Result<Option<TopupTransaction>, AppError> {
        self.get_doc(collections::TOPUP_TRANSACTIONS, order_id)
            .await
    }

    pub async fn set_topup(&self, topup: &TopupTransaction) -> Result<(), AppError> {
        self.set_doc(collections::TOPUP_TRANSACTIONS, &topup.order_id, topup)
            .await
    }

    /// Top-ups newest first, optionally filtered by status.
    pub async fn list_topups(
        &self,
        status: Option<TopupStatus>,
        limit: u32,
    ) -> Result<Vec<TopupTransaction>, AppError> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TOPUP_TRANSACTIONS);

        let query = if let Some(status) = status {
            query.filter(move |q| q.for_all([q.field("status").eq(status.as_str())]))
        } else {
            query
        };

        query
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// A user's top-ups, newest first.
    pub async fn list_topups_for_user(
        &self,
        uid: &str,
        limit: u32,
    ) -> Result<Vec<TopupTransaction>, AppError> {
        let uid = uid.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::TOPUP_TRANSACTIONS)
            .filter(move |q| q.for_all([q.field("uid").eq(uid.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Style Operations ────────────────────────────────────────

    pub async fn get_style(&self, id: &str) -> Result<Option<Style>, AppError> {
        self.get_doc(collections::STYLES, id).await
    }

    pub async fn set_style(&self, style: &Style) -> Result<(), AppError> {
        self.set_doc(collections::STYLES, &style.id, style).await
    }

    pub async fn delete_style(&self, id: &str) -> Result<(), AppError> {
        self.delete_doc(collections::STYLES, id).await
    }

    /// Styles sorted by `sort_order`, then name.
    pub async fn list_styles(&self, active_only: bool) -> Result<Vec<Style>, AppError> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::STYLES);

        let query = if active_only {
            query.filter(|q| q.for_all([q.field("active").eq(true)]))
        } else {
            query
        };

        let mut styles: Vec<Style> = query
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        styles.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(styles)
    }

    // ─── Settings Operations ─────────────────────────────────────

    /// Global settings, or defaults if the document does not exist yet.
    pub async fn get_settings(&self) -> Result<Settings, AppError> {
        Ok(self
            .get_doc(collections::SETTINGS, SETTINGS_DOC_ID)
            .await?
            .unwrap_or_default())
    }

    pub async fn set_settings(&self, settings: &Settings) -> Result<(), AppError> {
        self.set_doc(collections::SETTINGS, SETTINGS_DOC_ID, settings)
            .await
    }

    // ─── Beta Tester Operations ──────────────────────────────────

    pub async fn get_beta_tester(&self, uid: &str) -> Result<Option<BetaTester>, AppError> {
        self.get_doc(collections::BETA_TESTERS, uid).await
    }

    /// Every beta tester record (admin analytics).
    pub async fn list_beta_testers(&self) -> Result<Vec<BetaTester>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::BETA_TESTERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn count_beta_testers(&self) -> Result<u32, AppError> {
        Ok(self.list_beta_testers().await?.len() as u32)
    }

    // ─── Visit Operations ────────────────────────────────────────

    pub async fn record_visit(&self, visit: &Visit) -> Result<(), AppError> {
        self.set_doc(collections::VISITS, &visit.id, visit).await
    }

    pub async fn list_visits(&self, limit: u32) -> Result<Vec<Visit>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::VISITS)
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Atomic Balance Writes ───────────────────────────────────

    /// Read-modify-write a user and one linked document in a single transaction.
    ///
    /// The user and the linked document are both read inside the transaction,
    /// so a concurrent commit from another instance aborts this one and it is
    /// retried against fresh data. The linked document's guard (top-up not yet
    /// credited, generation still pending, beta tester not yet registered) is
    /// re-checked on every attempt and reported as `Conflict`.
    ///
    /// `change` may run more than once.
    pub async fn commit_user_with<F>(
        &self,
        uid: &str,
        linked: &LinkedWrite<'_>,
        change: F,
    ) -> Result<User, AppError>
    where
        F: Fn(&mut User) -> Result<(), AppError>,
    {
        let client = self.get_client()?;

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;
            let reader = client.clone_with_consistency_selector(
                firestore::FirestoreConsistencySelector::Transaction(
                    transaction.transaction_id().clone(),
                ),
            );

            let staged = match Self::stage_user_write(
                client,
                &reader,
                &mut transaction,
                uid,
                linked,
                &change,
            )
            .await
            {
                Ok(user) => user,
                Err(TxError::Contention(e)) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    transaction.rollback().await.ok();
                    tracing::debug!(uid, attempt, error = %e, "Transaction read contended, retrying");
                    continue;
                }
                Err(e) => {
                    transaction.rollback().await.ok();
                    return Err(e.into());
                }
            };

            match transaction.commit().await {
                Ok(_) => return Ok(staged),
                Err(e) if is_contention(&e) && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(uid, attempt, error = %e, "Transaction contended, retrying");
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Transaction commit failed: {}",
                        e
                    )))
                }
            }
        }

        Err(AppError::Database(format!(
            "Transaction for user {} kept conflicting",
            uid
        )))
    }

    /// Reads and guards for one attempt of [`Self::commit_user_with`].
    async fn stage_user_write<F>(
        client: &firestore::FirestoreDb,
        reader: &firestore::FirestoreDb,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        uid: &str,
        linked: &LinkedWrite<'_>,
        change: &F,
    ) -> Result<User, TxError>
    where
        F: Fn(&mut User) -> Result<(), AppError>,
    {
        let mut user: User = read_in(reader, collections::USERS, uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", uid)))?;

        match linked {
            LinkedWrite::None => {}
            LinkedWrite::Topup(topup) => {
                let stored: Option<TopupTransaction> =
                    read_in(reader, collections::TOPUP_TRANSACTIONS, &topup.order_id).await?;
                if stored.is_some_and(|t| t.credited) {
                    return Err(AppError::Conflict(format!(
                        "Top-up {} already credited",
                        topup.order_id
                    ))
                    .into());
                }
            }
            LinkedWrite::Generation(generation) => {
                let stored: Option<Generation> =
                    read_in(reader, collections::GENERATIONS, &generation.id).await?;
                if stored.is_some_and(|g| !g.is_open()) {
                    return Err(AppError::Conflict(format!(
                        "Generation {} already settled",
                        generation.id
                    ))
                    .into());
                }
            }
            LinkedWrite::BetaTester(tester) => {
                let stored: Option<BetaTester> =
                    read_in(reader, collections::BETA_TESTERS, &tester.uid).await?;
                if stored.is_some() {
                    return Err(AppError::Conflict("Already registered".to_string()).into());
                }
            }
        }

        change(&mut user)?;

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.uid)
            .object(&user)
            .add_to_transaction(&mut *transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user to transaction: {}", e)))?;

        let added = match linked {
            LinkedWrite::None => Ok(()),
            LinkedWrite::Topup(topup) => client
                .fluent()
                .update()
                .in_col(collections::TOPUP_TRANSACTIONS)
                .document_id(&topup.order_id)
                .object(*topup)
                .add_to_transaction(&mut *transaction)
                .map(|_| ()),
            LinkedWrite::Generation(generation) => client
                .fluent()
                .update()
                .in_col(collections::GENERATIONS)
                .document_id(&generation.id)
                .object(*generation)
                .add_to_transaction(&mut *transaction)
                .map(|_| ()),
            LinkedWrite::BetaTester(tester) => client
                .fluent()
                .update()
                .in_col(collections::BETA_TESTERS)
                .document_id(&tester.uid)
                .object(*tester)
                .add_to_transaction(&mut *transaction)
                .map(|_| ()),
        };
        added.map_err(|e| {
            AppError::Database(format!("Failed to add linked write to transaction: {}", e))
        })?;

        Ok(user)
    }

    /// Overwrite a top-up unless the stored copy has been credited meanwhile.
    ///
    /// Returns `false` when the write was skipped.
    pub async fn set_topup_if_uncredited(
        &self,
        topup: &TopupTransaction,
    ) -> Result<bool, AppError> {
        self.set_doc_guarded(
            collections::TOPUP_TRANSACTIONS,
            &topup.order_id,
            topup,
            |stored: Option<&TopupTransaction>| !stored.is_some_and(|t| t.credited),
        )
        .await
    }

    /// Overwrite a generation only while the stored copy is still pending.
    ///
    /// Returns `false` when the write was skipped.
    pub async fn set_generation_if_open(&self, generation: &Generation) -> Result<bool, AppError> {
        self.set_doc_guarded(
            collections::GENERATIONS,
            &generation.id,
            generation,
            |stored: Option<&Generation>| stored.is_some_and(Generation::is_open),
        )
        .await
    }

    async fn set_doc_guarded<T, P>(
        &self,
        collection: &str,
        id: &str,
        object: &T,
        allow: P,
    ) -> Result<bool, AppError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Sync + Send,
        P: Fn(Option<&T>) -> bool,
    {
        let client = self.get_client()?;

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;
            let reader = client.clone_with_consistency_selector(
                firestore::FirestoreConsistencySelector::Transaction(
                    transaction.transaction_id().clone(),
                ),
            );

            let stored: Option<T> = match read_in(&reader, collection, id).await {
                Ok(stored) => stored,
                Err(TxError::Contention(e)) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    transaction.rollback().await.ok();
                    tracing::debug!(collection, id, attempt, error = %e, "Transaction read contended, retrying");
                    continue;
                }
                Err(e) => {
                    transaction.rollback().await.ok();
                    return Err(e.into());
                }
            };
            if !allow(stored.as_ref()) {
                transaction.rollback().await.ok();
                return Ok(false);
            }

            let added = client
                .fluent()
                .update()
                .in_col(collection)
                .document_id(id)
                .object(object)
                .add_to_transaction(&mut transaction)
                .map(|_| ());
            if let Err(e) = added {
                transaction.rollback().await.ok();
                return Err(AppError::Database(format!(
                    "Failed to add {} to transaction: {}",
                    collection, e
                )));
            }

            match transaction.commit().await {
                Ok(_) => return Ok(true),
                Err(e) if is_contention(&e) && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(collection, id, attempt, error = %e, "Transaction contended, retrying");
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Transaction commit failed: {}",
                        e
                    )))
                }
            }
        }

        Err(AppError::Database(format!(
            "Transaction for {}/{} kept conflicting",
            collection, id
        )))
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Failure inside a read-write transaction attempt.
enum TxError {
    /// Aborted or unavailable; the attempt may be retried.
    Contention(firestore::errors::FirestoreError),
    App(AppError),
}

impl From<AppError> for TxError {
    fn from(error: AppError) -> Self {
        TxError::App(error)
    }
}

impl From<TxError> for AppError {
    fn from(error: TxError) -> Self {
        match error {
            TxError::Contention(e) => AppError::Database(format!("Transaction contended: {}", e)),
            TxError::App(e) => e,
        }
    }
}

/// Read one document through a transaction-bound client.
async fn read_in<T>(
    reader: &firestore::FirestoreDb,
    collection: &str,
    id: &str,
) -> Result<Option<T>, TxError>
where
    T: for<'de> Deserialize<'de> + Send,
{
    reader
        .fluent()
        .select()
        .by_id_in(collection)
        .obj::<T>()
        .one(id)
        .await
        .map_err(|e| {
            if is_contention(&e) {
                TxError::Contention(e)
            } else {
                TxError::App(AppError::Database(e.to_string()))
            }
        })
}

/// Aborted or unavailable commits are worth another attempt.
fn is_contention(error: &firestore::errors::FirestoreError) -> bool {
    matches!(
        error,
        firestore::errors::FirestoreError::DatabaseError(e) if e.retry_possible
    )
}
