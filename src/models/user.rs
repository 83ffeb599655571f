//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// Account role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Firebase UID (also used as document ID)
    pub uid: String,
    /// Email address (absent for some sign-in providers)
    pub email: Option<String>,
    /// Display name
    pub display_name: Option<String>,
    /// Profile picture URL
    pub photo_url: Option<String>,
    /// Diamond balance
    #[serde(default)]
    pub tokens: i64,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub is_beta_tester: bool,
    #[serde(default)]
    pub is_banned: bool,
    /// Completed generations
    #[serde(default)]
    pub total_generations: u32,
    /// Total paid through top-ups (IDR)
    #[serde(default)]
    pub total_spent: i64,
    /// When the user was first seen
    pub created_at: String,
    /// Last authenticated request
    pub last_active: String,
}

impl User {
    /// New profile with a zero balance.
    pub fn new(uid: impl Into<String>, email: Option<String>, now: &str) -> Self {
        Self {
            uid: uid.into(),
            email,
            display_name: None,
            photo_url: None,
            tokens: 0,
            role: UserRole::User,
            is_beta_tester: false,
            is_banned: false,
            total_generations: 0,
            total_spent: 0,
            created_at: now.to_string(),
            last_active: now.to_string(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
