//! Page visit recorded for analytics.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    pub id: String,
    pub path: String,
    pub country: String,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub referrer: Option<String>,
    pub created_at: String,
}
