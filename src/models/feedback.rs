//! User feedback submitted from the app.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    #[default]
    New,
    Read,
    Resolved,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::New => "new",
            FeedbackStatus::Read => "read",
            FeedbackStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub uid: String,
    pub email: Option<String>,
    /// 1 to 5
    pub rating: u8,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub status: FeedbackStatus,
    #[serde(default)]
    pub admin_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
