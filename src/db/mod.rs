//! Database layer (Firestore).

pub mod firestore;

pub use firestore::{FirestoreDb, LinkedWrite};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const GENERATIONS: &str = "generations";
    pub const FAVORITES: &str = "favorites";
    pub const FEEDBACK: &str = "feedback";
    pub const TOPUP_TRANSACTIONS: &str = "topup_transactions";
    pub const STYLES: &str = "styles";
    /// Single document `settings/app`
    pub const SETTINGS: &str = "settings";
    pub const BETA_TESTERS: &str = "beta_testers";
    pub const VISITS: &str = "visits";
}

/// Document ID of the global settings document.
pub const SETTINGS_DOC_ID: &str = "app";
