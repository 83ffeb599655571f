// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment platform
//! and read once at startup.

use std::env;

/// Default upload limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Firebase project ID (token audience and Firestore project)
    pub firebase_project_id: String,
    /// Frontend URL for CORS and payment redirects
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Use the Midtrans production endpoints instead of sandbox
    pub midtrans_is_production: bool,
    /// Midtrans client key (public, returned to the browser for Snap.js)
    pub midtrans_client_key: String,
    /// Base URL of the remote image host
    pub image_host_url: String,
    /// Emails that are always treated as admins
    pub admin_emails: Vec<String>,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,

    // --- Secrets ---
    /// Midtrans server key (Basic auth + notification signatures)
    pub midtrans_server_key: String,
    /// API key sent to the image host
    pub image_host_api_key: String,
    /// Freepik API key
    pub freepik_api_key: String,
    /// Firebase web API key for the REST token lookup fallback
    pub firebase_web_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            firebase_project_id: required("FIREBASE_PROJECT_ID")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            midtrans_is_production: env::var("MIDTRANS_IS_PRODUCTION")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            midtrans_client_key: env::var("MIDTRANS_CLIENT_KEY").unwrap_or_default(),
            image_host_url: required("IMAGE_HOST_URL")?
                .trim_end_matches('/')
                .to_string(),
            admin_emails: env::var("ADMIN_EMAILS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),

            midtrans_server_key: required("MIDTRANS_SERVER_KEY")?,
            image_host_api_key: required("IMAGE_HOST_API_KEY")?,
            freepik_api_key: required("FREEPIK_API_KEY")?,
            firebase_web_api_key: env::var("FIREBASE_WEB_API_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }

    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            firebase_project_id: "edit-aja-test".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            port: 8080,
            midtrans_is_production: false,
            midtrans_client_key: "SB-Mid-client-test".to_string(),
            image_host_url: "http://127.0.0.1:9".to_string(),
            admin_emails: vec!["admin@editaja.test".to_string()],
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            midtrans_server_key: "SB-Mid-server-test".to_string(),
            image_host_api_key: "test_image_key".to_string(),
            freepik_api_key: "test_freepik_key".to_string(),
            firebase_web_api_key: None,
        }
    }

    /// Whether an email is in the configured admin allowlist.
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        self.admin_emails.iter().any(|a| *a == email)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("FIREBASE_PROJECT_ID", "test-project");
        env::set_var("MIDTRANS_SERVER_KEY", " SB-Mid-server-abc ");
        env::set_var("IMAGE_HOST_URL", "https://img.example.com/");
        env::set_var("IMAGE_HOST_API_KEY", "img_key");
        env::set_var("FREEPIK_API_KEY", "fp_key");
        env::set_var("ADMIN_EMAILS", "Boss@Example.com, ops@example.com,,");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.firebase_project_id, "test-project");
        assert_eq!(config.midtrans_server_key, "SB-Mid-server-abc");
        assert_eq!(config.image_host_url, "https://img.example.com");
        assert_eq!(config.port, 8080);
        assert!(config.is_admin_email("boss@example.com"));
        assert!(config.is_admin_email("OPS@example.com"));
        assert_eq!(config.admin_emails.len(), 2);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }
}
