// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for the remote image host (PHP upload/delete endpoints).

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Image host client.
#[derive(Clone)]
pub struct ImageHostClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Raw host reply. Both endpoints share it.
#[derive(Debug, Deserialize)]
struct HostReply {
    #[serde(default)]
    success: bool,
    url: Option<String>,
    filename: Option<String>,
    message: Option<String>,
}

/// A stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredImage {
    pub url: String,
    pub filename: String,
}

impl ImageHostClient {
    pub fn new(base_url: &str, api_key: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Upload image bytes.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<StoredImage, AppError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| AppError::BadRequest(format!("Invalid content type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .http
            .post(format!("{}/upload.php", self.base_url))
            .header("X-API-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::ImageHost(format!("Upload request failed: {}", e)))?;

        let reply = Self::read_reply(response).await?;

        match (reply.url, reply.filename) {
            (Some(url), Some(filename)) => Ok(StoredImage { url, filename }),
            (Some(url), None) => {
                // Older host versions only return the URL.
                let filename = url.rsplit('/').next().unwrap_or_default().to_string();
                Ok(StoredImage { url, filename })
            }
            _ => Err(AppError::ImageHost(
                "Upload succeeded without a URL".to_string(),
            )),
        }
    }

    /// Delete a stored file by name.
    pub async fn delete(&self, filename: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(format!("{}/delete.php", self.base_url))
            .header("X-API-Key", &self.api_key)
            .form(&[("filename", filename)])
            .send()
            .await
            .map_err(|e| AppError::ImageHost(format!("Delete request failed: {}", e)))?;

        Self::read_reply(response).await?;
        tracing::info!(filename, "Deleted image from host");
        Ok(())
    }

    async fn read_reply(response: reqwest::Response) -> Result<HostReply, AppError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ImageHost(format!("Failed to read response: {}", e)))?;

        let reply: HostReply = serde_json::from_str(&body).map_err(|_| {
            AppError::ImageHost(format!("HTTP {}: unexpected response body", status))
        })?;

        if !reply.success {
            return Err(AppError::ImageHost(
                reply
                    .message
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }

        Ok(reply)
    }
}

/// Last path segment of a hosted image URL.
pub fn filename_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    if name.is_empty() || name.contains("..") {
        None
    } else {
        Some(name)
    }
}
