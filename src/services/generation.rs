// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Style generation lifecycle.
//!
//! Start: validate style → fetch source → debit + pending record (one commit)
//! → create remote task. Poll: query task → store results, or fail and refund.
//! The `refunded` flag is written in the same commit as the refund credit, so a
//! generation is refunded at most once.

use crate::db::{FirestoreDb, LinkedWrite};
use crate::error::AppError;
use crate::models::{Generation, GenerationStatus};
use crate::services::freepik::{FreepikClient, TaskStatus};
use crate::services::ledger::{apply_credit, lock_key, KeyedLocks, LedgerService};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

const SOURCE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A pending generation with no task ID after this long never got its task.
const TASKLESS_GRACE: chrono::Duration = chrono::Duration::minutes(5);

/// Generation orchestration.
#[derive(Clone)]
pub struct GenerationService {
    db: FirestoreDb,
    ledger: LedgerService,
    freepik: FreepikClient,
    http: reqwest::Client,
    image_host_url: String,
    max_source_bytes: usize,
    locks: KeyedLocks,
}

impl GenerationService {
    pub fn new(
        db: FirestoreDb,
        ledger: LedgerService,
        freepik: FreepikClient,
        image_host_url: &str,
        max_source_bytes: usize,
    ) -> Self {
        Self {
            db,
            ledger,
            freepik,
            http: reqwest::Client::builder()
                .timeout(SOURCE_FETCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            image_host_url: image_host_url.trim_end_matches('/').to_string(),
            max_source_bytes,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Source images must come from our own image host.
    pub fn check_source_url(&self, image_url: &str) -> Result<(), AppError> {
        let allowed = image_url
            .strip_prefix(&self.image_host_url)
            .is_some_and(|rest| rest.starts_with('/'));
        if !allowed || image_url.contains("..") {
            return Err(AppError::BadRequest(
                "image_url must point to an uploaded image".to_string(),
            ));
        }
        Ok(())
    }

    /// Charge the user and start a generation.
    pub async fn start(
        &self,
        uid: &str,
        style_id: &str,
        image_url: &str,
    ) -> Result<Generation, AppError> {
        self.check_source_url(image_url)?;

        let settings = self.db.get_settings().await?;
        if settings.maintenance {
            return Err(AppError::Forbidden(
                "Generation is paused for maintenance".to_string(),
            ));
        }

        let style = self
            .db
            .get_style(style_id)
            .await?
            .filter(|s| s.active)
            .ok_or_else(|| AppError::NotFound(format!("Style {}", style_id)))?;
        let cost = style.effective_cost(settings.generation_cost);

        // Fetch before charging so a dead URL costs nothing.
        let reference = self.fetch_source_b64(image_url).await?;

        let mut generation = Generation {
            id: uuid::Uuid::new_v4().to_string(),
            uid: uid.to_string(),
            style_id: style.id.clone(),
            style_name: style.name.clone(),
            source_image_url: image_url.to_string(),
            task_id: String::new(),
            status: GenerationStatus::Pending,
            result_urls: Vec::new(),
            cost,
            refunded: false,
            is_public: false,
            hidden: false,
            error: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        };

        self.ledger
            .debit(uid, cost, LinkedWrite::Generation(&generation))
            .await?;

        match self
            .freepik
            .create_task(&style.prompt, style.negative_prompt.as_deref(), &reference)
            .await
        {
            Ok(task) => {
                generation.task_id = task.task_id;
                if !self.db.set_generation_if_open(&generation).await? {
                    tracing::warn!(
                        uid,
                        generation_id = %generation.id,
                        task_id = %generation.task_id,
                        "Generation settled before its task was recorded"
                    );
                    return self.load(&generation.id).await;
                }
                tracing::info!(
                    uid,
                    generation_id = %generation.id,
                    task_id = %generation.task_id,
                    style = %generation.style_id,
                    cost,
                    "Generation started"
                );
                Ok(generation)
            }
            Err(e) => {
                tracing::error!(
                    uid,
                    generation_id = %generation.id,
                    error = %e,
                    "Failed to create generation task, refunding"
                );
                self.fail_and_refund(&generation.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Refresh a pending generation from the remote task.
    ///
    /// Remote errors leave the generation pending and are only logged.
    pub async fn poll(&self, generation_id: &str) -> Result<Generation, AppError> {
        let _guard = lock_key(&self.locks, generation_id).await;

        let mut generation = self.load(generation_id).await?;
        if !generation.is_open() {
            return Ok(generation);
        }

        if generation.task_id.is_empty() {
            if is_taskless_stale(&generation, chrono::Utc::now()) {
                tracing::warn!(generation_id, "Generation never got a task, refunding");
                self.refund_locked(&mut generation, "Generation task was never created")
                    .await?;
            }
            return Ok(generation);
        }

        let task = match self.freepik.get_task(&generation.task_id).await {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(generation_id, error = %e, "Task poll failed");
                return Ok(generation);
            }
        };

        match task.status {
            TaskStatus::Completed if !task.generated.is_empty() => {
                generation.status = GenerationStatus::Completed;
                generation.result_urls = task.generated;
                generation.completed_at = Some(chrono::Utc::now().to_rfc3339());

                let committed = self
                    .ledger
                    .apply(
                        &generation.uid,
                        |user| {
                            user.total_generations = user.total_generations.saturating_add(1);
                            Ok(())
                        },
                        LinkedWrite::Generation(&generation),
                    )
                    .await;
                match committed {
                    Ok(_) => {}
                    Err(AppError::Conflict(_)) => return self.load(generation_id).await,
                    Err(e) => return Err(e),
                }

                tracing::info!(
                    generation_id,
                    results = generation.result_urls.len(),
                    "Generation completed"
                );
                Ok(generation)
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                let reason = if task.status == TaskStatus::Failed {
                    "Generation task failed"
                } else {
                    "Generation task returned no images"
                };
                self.refund_locked(&mut generation, reason).await?;
                Ok(generation)
            }
            TaskStatus::Created | TaskStatus::InProgress => Ok(generation),
        }
    }

    /// Mark a generation failed and return its cost, once.
    pub async fn fail_and_refund(
        &self,
        generation_id: &str,
        reason: &str,
    ) -> Result<Generation, AppError> {
        let _guard = lock_key(&self.locks, generation_id).await;
        let mut generation = self.load(generation_id).await?;
        self.refund_locked(&mut generation, reason).await?;
        Ok(generation)
    }

    /// Caller holds the generation's lock. On return `generation` reflects
    /// the stored state.
    async fn refund_locked(
        &self,
        generation: &mut Generation,
        reason: &str,
    ) -> Result<(), AppError> {
        if !generation.is_open() {
            return Ok(());
        }

        generation.status = GenerationStatus::Failed;
        generation.refunded = true;
        generation.error = Some(reason.to_string());
        generation.completed_at = Some(chrono::Utc::now().to_rfc3339());

        let cost = generation.cost;
        let committed = self
            .ledger
            .apply(
                &generation.uid,
                |user| apply_credit(user, cost),
                LinkedWrite::Generation(&*generation),
            )
            .await;
        match committed {
            Ok(_) => {}
            Err(AppError::Conflict(_)) => {
                tracing::info!(generation_id = %generation.id, "Generation already settled");
                let id = generation.id.clone();
                *generation = self.load(&id).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            generation_id = %generation.id,
            uid = %generation.uid,
            cost,
            reason,
            "Generation refunded"
        );
        Ok(())
    }

    async fn load(&self, generation_id: &str) -> Result<Generation, AppError> {
        self.db
            .get_generation(generation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Generation {}", generation_id)))
    }

    async fn fetch_source_b64(&self, image_url: &str) -> Result<String, AppError> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .map_err(|e| AppError::BadRequest(format!("Could not fetch source image: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::BadRequest(format!(
                "Could not fetch source image: HTTP {}",
                response.status()
            )));
        }

        if response
            .content_length()
            .is_some_and(|len| len as usize > self.max_source_bytes)
        {
            return Err(AppError::PayloadTooLarge(
                "Source image is too large".to_string(),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Could not read source image: {}", e)))?;

        if bytes.len() > self.max_source_bytes {
            return Err(AppError::PayloadTooLarge(
                "Source image is too large".to_string(),
            ));
        }

        Ok(STANDARD.encode(&bytes))
    }
}

/// Whether a pending generation without a task ID has waited past the grace period.
fn is_taskless_stale(generation: &Generation, now: chrono::DateTime<chrono::Utc>) -> bool {
    chrono::DateTime::parse_from_rfc3339(&generation.created_at)
        .map(|created| now.signed_duration_since(created) > TASKLESS_GRACE)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(image_host_url: &str) -> GenerationService {
        let db = FirestoreDb::new_mock();
        GenerationService::new(
            db.clone(),
            LedgerService::new(db),
            FreepikClient::new("k".to_string()),
            image_host_url,
            1024,
        )
    }

    #[test]
    fn test_source_url_must_be_on_image_host() {
        let svc = service("https://img.editaja.test/");

        assert!(svc
            .check_source_url("https://img.editaja.test/uploads/a.jpg")
            .is_ok());
        assert!(svc
            .check_source_url("https://img.editaja.test.evil.com/a.jpg")
            .is_err());
        assert!(svc.check_source_url("http://169.254.169.254/").is_err());
        assert!(svc
            .check_source_url("https://img.editaja.test/../etc/passwd")
            .is_err());
    }

    #[tokio::test]
    async fn test_fetch_source_enforces_size() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big.jpg")
            .with_status(200)
            .with_body(vec![0u8; 2048])
            .create_async()
            .await;
        server
            .mock("GET", "/small.jpg")
            .with_status(200)
            .with_body("ABC")
            .create_async()
            .await;

        let svc = service(&server.url());

        let err = svc
            .fetch_source_b64(&format!("{}/big.jpg", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));

        let encoded = svc
            .fetch_source_b64(&format!("{}/small.jpg", server.url()))
            .await
            .unwrap();
        assert_eq!(encoded, "QUJD");
    }

    #[tokio::test]
    async fn test_start_rejects_foreign_url_before_db() {
        let svc = service("https://img.editaja.test");
        let err = svc
            .start("u1", "anime", "https://elsewhere.test/a.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    fn taskless(created_at: &str) -> Generation {
        Generation {
            id: "g1".to_string(),
            uid: "u1".to_string(),
            style_id: "anime".to_string(),
            style_name: "Anime".to_string(),
            source_image_url: "https://img.editaja.test/uploads/a.jpg".to_string(),
            task_id: String::new(),
            status: GenerationStatus::Pending,
            result_urls: Vec::new(),
            cost: 2,
            refunded: false,
            is_public: false,
            hidden: false,
            error: None,
            created_at: created_at.to_string(),
            completed_at: None,
        }
    }

    #[test]
    fn test_taskless_generation_goes_stale_after_grace() {
        let now = chrono::DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);

        assert!(!is_taskless_stale(&taskless("2026-03-01T11:59:00Z"), now));
        assert!(is_taskless_stale(&taskless("2026-03-01T11:50:00Z"), now));
        // Unparseable timestamps are not allowed to strand the diamonds.
        assert!(is_taskless_stale(&taskless("garbage"), now));
    }
}
