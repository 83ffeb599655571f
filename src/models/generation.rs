// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI generation record (one styled image per request).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Stored generation in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Generation ID (UUID, also used as document ID)
    pub id: String,
    /// Owner UID
    pub uid: String,
    pub style_id: String,
    pub style_name: String,
    /// Uploaded photo on the image host
    pub source_image_url: String,
    /// Remote generation task ID (empty until the task is created)
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub status: GenerationStatus,
    #[serde(default)]
    pub result_urls: Vec<String>,
    /// Diamonds charged
    pub cost: i64,
    /// Whether the cost was returned after a failure
    #[serde(default)]
    pub refunded: bool,
    /// Shared to the public gallery by the owner
    #[serde(default)]
    pub is_public: bool,
    /// Hidden from the public gallery by moderation
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl Generation {
    /// First result image, if any.
    pub fn cover_url(&self) -> Option<&str> {
        self.result_urls.first().map(String::as_str)
    }

    /// Still waiting on the remote task: neither completed nor refunded.
    pub fn is_open(&self) -> bool {
        self.status == GenerationStatus::Pending && !self.refunded
    }

    /// Visible in the public gallery.
    pub fn is_publicly_listed(&self) -> bool {
        self.is_public && !self.hidden && self.status == GenerationStatus::Completed
    }
}
