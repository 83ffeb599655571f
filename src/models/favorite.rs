//! Favorite (bookmark of a generation).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    pub uid: String,
    pub generation_id: String,
    pub image_url: String,
    pub style_name: String,
    pub created_at: String,
}

impl Favorite {
    /// Document ID: one favorite per (user, generation).
    pub fn doc_id(uid: &str, generation_id: &str) -> String {
        format!("{}_{}", uid, generation_id)
    }
}
