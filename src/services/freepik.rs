// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Freepik Mystic API client (async image generation tasks).

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.freepik.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Freepik API client.
#[derive(Clone)]
pub struct FreepikClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct MysticRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    structure_reference: &'a str,
    structure_strength: u8,
    resolution: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Task state as reported by Freepik.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Created,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub generated: Vec<String>,
}

impl FreepikClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different host (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Start a generation using `reference_image_b64` as structure reference.
    pub async fn create_task(
        &self,
        prompt: &str,
        negative_prompt: Option<&str>,
        reference_image_b64: &str,
    ) -> Result<Task, AppError> {
        let body = MysticRequest {
            prompt,
            negative_prompt,
            structure_reference: reference_image_b64,
            structure_strength: 50,
            resolution: "2k",
        };

        let response = self
            .http
            .post(format!("{}/v1/ai/mystic", self.base_url))
            .header("x-freepik-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Generation(format!("Task request failed: {}", e)))?;

        Self::read_task(response).await
    }

    /// Fetch task status and results.
    pub async fn get_task(&self, task_id: &str) -> Result<Task, AppError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/ai/mystic/{}",
                self.base_url,
                urlencoding::encode(task_id)
            ))
            .header("x-freepik-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Generation(format!("Task status request failed: {}", e)))?;

        Self::read_task(response).await
    }

    async fn read_task(response: reqwest::Response) -> Result<Task, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation(format!("HTTP {}: {}", status, body)));
        }

        let envelope: Envelope<Task> = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Invalid task response: {}", e)))?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_task() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/ai/mystic")
            .match_header("x-freepik-api-key", "fp-key")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"prompt":"watercolor portrait","structure_reference":"QUJD"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"data":{"task_id":"t-1","status":"CREATED","generated":[]}}"#)
            .create_async()
            .await;

        let client = FreepikClient::new("fp-key".to_string()).with_base_url(&server.url());
        let task = client
            .create_task("watercolor portrait", None, "QUJD")
            .await
            .unwrap();

        assert_eq!(task.task_id, "t-1");
        assert_eq!(task.status, TaskStatus::Created);
        assert!(!task.status.is_finished());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_completed_task() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/ai/mystic/t-1")
            .with_status(200)
            .with_body(
                r#"{"data":{"task_id":"t-1","status":"COMPLETED","generated":["https://cdn.test/1.png"]}}"#,
            )
            .create_async()
            .await;

        let client = FreepikClient::new("fp-key".to_string()).with_base_url(&server.url());
        let task = client.get_task("t-1").await.unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.generated, vec!["https://cdn.test/1.png".to_string()]);
    }

    #[tokio::test]
    async fn test_http_error_maps_to_generation_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/ai/mystic")
            .with_status(401)
            .with_body(r#"{"message":"Invalid API key"}"#)
            .create_async()
            .await;

        let client = FreepikClient::new("bad".to_string()).with_base_url(&server.url());
        let err = client.create_task("p", None, "QUJD").await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
    }
}
