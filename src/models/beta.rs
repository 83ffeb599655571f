//! Beta tester registration record.

use serde::{Deserialize, Serialize};

/// Stored at `beta_testers/{uid}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaTester {
    pub uid: String,
    pub email: Option<String>,
    pub name: String,
    pub reason: Option<String>,
    /// Free diamonds granted on registration
    pub tokens_granted: i64,
    pub created_at: String,
}
