// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase ID token verification.
//!
//! Tokens are verified locally against Google's securetoken JWKS. When the
//! JWKS cannot be fetched and a web API key is configured, the token is
//! checked with the Firebase Auth REST `accounts:lookup` endpoint instead.

use crate::config::Config;
use anyhow::Context;
use axum::http::HeaderValue;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const DEFAULT_LOOKUP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:lookup";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
const CLOCK_SKEW_SECS: u64 = 60;
/// Minimum spacing between JWKS fetches forced by an unknown `kid`.
const FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Identity extracted from a verified Firebase ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedFirebaseUser {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Verification error categories.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// The token is missing/invalid or claims do not match expectations.
    Forbidden(String),
    /// Key material could not be fetched.
    Transient(String),
}

#[derive(Clone)]
enum VerifierMode {
    Google,
    StaticKey {
        kid: String,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Firebase Authentication ID tokens.
pub struct FirebaseAuthVerifier {
    http_client: reqwest::Client,
    project_id: String,
    web_api_key: Option<String>,
    jwks_url: String,
    lookup_url: String,
    mode: VerifierMode,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    /// Held while fetching; records when the last fetch happened.
    refresh_lock: Mutex<Option<Instant>>,
}

impl FirebaseAuthVerifier {
    /// Create a production verifier that fetches and caches the securetoken JWKS.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let verifier = Self::build(config, VerifierMode::Google)?;

        tracing::info!(
            project = %verifier.project_id,
            rest_fallback = verifier.web_api_key.is_some(),
            "Initialized Firebase token verifier"
        );

        Ok(verifier)
    }

    /// Create a verifier with a static RSA public key.
    ///
    /// This is intended for deterministic local/integration tests.
    pub fn new_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static key kid must not be empty");
        }

        Self::build(
            config,
            VerifierMode::StaticKey {
                kid,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn build(config: &Config, mode: VerifierMode) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building Firebase auth HTTP client")?;

        Ok(Self {
            http_client,
            project_id: config.firebase_project_id.clone(),
            web_api_key: config.firebase_web_api_key.clone(),
            jwks_url: DEFAULT_JWKS_URL.to_string(),
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            mode,
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(None),
        })
    }

    /// Override the JWKS and REST lookup endpoints (tests).
    pub fn with_endpoints(mut self, jwks_url: &str, lookup_url: &str) -> Self {
        self.jwks_url = jwks_url.to_string();
        self.lookup_url = lookup_url.to_string();
        self
    }

    /// Verify a Firebase ID token from an Authorization header.
    pub async fn verify(
        &self,
        auth_header: Option<&HeaderValue>,
    ) -> Result<VerifiedFirebaseUser, AuthError> {
        let token = extract_bearer_token(auth_header)?;

        match self.verify_locally(token).await {
            Err(AuthError::Transient(reason)) if self.web_api_key.is_some() => {
                tracing::warn!(
                    reason = %reason,
                    "JWKS unavailable, falling back to Firebase REST lookup"
                );
                self.verify_via_rest(token).await
            }
            other => other,
        }
    }

    async fn verify_locally(&self, token: &str) -> Result<VerifiedFirebaseUser, AuthError> {
        let header = decode_header(token)
            .map_err(|e| AuthError::Forbidden(format!("invalid JWT header: {e}")))?;

        if header.alg != Algorithm::RS256 {
            return Err(AuthError::Forbidden(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| AuthError::Forbidden("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let issuer = format!("https://securetoken.google.com/{}", self.project_id);
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<FirebaseIdTokenClaims>(token, decoding_key.as_ref(), &validation)
            .map_err(|e| AuthError::Forbidden(format!("JWT validation failed: {e}")))?
            .claims;

        validate_iat(claims.iat)?;

        if claims.sub.trim().is_empty() {
            return Err(AuthError::Forbidden("empty sub claim".to_string()));
        }

        Ok(VerifiedFirebaseUser {
            uid: claims.sub,
            email: claims.email.map(|e| e.to_ascii_lowercase()),
            name: claims.name,
            picture: claims.picture,
        })
    }

    /// Ask Firebase Auth to resolve the token to an account.
    async fn verify_via_rest(&self, token: &str) -> Result<VerifiedFirebaseUser, AuthError> {
        let api_key = self
            .web_api_key
            .as_deref()
            .ok_or_else(|| AuthError::Transient("REST fallback not configured".to_string()))?;

        let response = self
            .http_client
            .post(&self.lookup_url)
            .query(&[("key", api_key)])
            .json(&serde_json::json!({ "idToken": token }))
            .send()
            .await
            .map_err(|e| AuthError::Transient(format!("accounts:lookup request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AuthError::Transient(format!(
                "accounts:lookup returned status {status}"
            )));
        }
        if !status.is_success() {
            return Err(AuthError::Forbidden(format!(
                "accounts:lookup rejected token ({status})"
            )));
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Transient(format!("invalid accounts:lookup JSON: {e}")))?;

        let account = lookup
            .users
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Forbidden("no account for token".to_string()))?;

        if account.disabled.unwrap_or(false) {
            return Err(AuthError::Forbidden("account disabled".to_string()));
        }

        Ok(VerifiedFirebaseUser {
            uid: account.local_id,
            email: account.email.map(|e| e.to_ascii_lowercase()),
            name: account.display_name,
            picture: account.photo_url,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, AuthError> {
        match &self.mode {
            VerifierMode::StaticKey {
                kid: static_kid,
                decoding_key,
            } => {
                if kid == static_kid {
                    return Ok(decoding_key.clone());
                }

                return Err(AuthError::Forbidden(format!(
                    "unknown JWT kid for static verifier: {kid}"
                )));
            }
            VerifierMode::Google => {}
        }

        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        // Keys rotate; a miss on a fresh cache forces one more fetch.
        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(AuthError::Forbidden(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), AuthError> {
        let mut last_fetch = self.refresh_lock.lock().await;

        // The kid is unverified input, so forced refreshes are rate limited.
        if force_refresh
            && last_fetch.is_some_and(|at| at.elapsed() < FORCED_REFRESH_INTERVAL)
        {
            tracing::debug!("Skipping forced JWKS refresh, fetched recently");
            return Ok(());
        }

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        tracing::debug!(jwks_url = %self.jwks_url, "Refreshing securetoken JWKS cache");
        *last_fetch = Some(Instant::now());

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| AuthError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_keys(jwks);

        if keys_by_kid.is_empty() {
            return Err(AuthError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "securetoken JWKS cache refreshed");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirebaseIdTokenClaims {
    sub: String,
    iat: Option<usize>,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupAccount {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    disabled: Option<bool>,
}

fn usable_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        if jwk.use_.as_deref().is_some_and(|u| u != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

fn extract_bearer_token(auth_header: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let value = auth_header
        .ok_or_else(|| AuthError::Forbidden("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AuthError::Forbidden("invalid Authorization header".to_string()))?;

    let token = value.strip_prefix("Bearer ").ok_or_else(|| {
        AuthError::Forbidden("Authorization header must be Bearer token".to_string())
    })?;

    if token.is_empty() {
        return Err(AuthError::Forbidden("Bearer token is empty".to_string()));
    }

    Ok(token)
}

fn validate_iat(iat: Option<usize>) -> Result<(), AuthError> {
    let now = now_unix_secs();

    let Some(iat) = iat else {
        return Err(AuthError::Forbidden("missing iat claim".to_string()));
    };

    if iat as u64 > now + CLOCK_SKEW_SECS {
        return Err(AuthError::Forbidden(
            "iat claim is in the future".to_string(),
        ));
    }

    Ok(())
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|raw| raw.trim_matches('"').parse::<u64>().ok())
    })
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cache_control_max_age_valid() {
        assert_eq!(
            parse_cache_control_max_age("public, max-age=19302, must-revalidate, no-transform"),
            Some(19302)
        );
        assert_eq!(parse_cache_control_max_age("max-age=\"120\""), Some(120));
    }

    #[test]
    fn parse_cache_control_max_age_invalid() {
        assert_eq!(parse_cache_control_max_age("public, immutable"), None);
        assert_eq!(parse_cache_control_max_age("max-age=abc"), None);
        assert_eq!(parse_cache_control_max_age(""), None);
    }

    #[test]
    fn extract_bearer_token_errors() {
        assert!(matches!(
            extract_bearer_token(None),
            Err(AuthError::Forbidden(_))
        ));

        let bad = HeaderValue::from_static("Basic abc");
        assert!(matches!(
            extract_bearer_token(Some(&bad)),
            Err(AuthError::Forbidden(_))
        ));

        let empty = HeaderValue::from_static("Bearer ");
        assert!(matches!(
            extract_bearer_token(Some(&empty)),
            Err(AuthError::Forbidden(_))
        ));
    }

    #[test]
    fn validate_iat_rejects_future_and_missing() {
        assert!(validate_iat(None).is_err());
        let future = (now_unix_secs() + 3600) as usize;
        assert!(validate_iat(Some(future)).is_err());
        let past = (now_unix_secs() - 10) as usize;
        assert!(validate_iat(Some(past)).is_ok());
    }

    #[test]
    fn usable_keys_skips_non_signing_keys() {
        let jwks: Jwks = serde_json::from_value(serde_json::json!({
            "keys": [
                { "kid": "enc", "kty": "RSA", "use": "enc", "n": "AQAB", "e": "AQAB" },
                { "kid": "ec", "kty": "EC", "n": "AQAB", "e": "AQAB" },
                { "kid": "", "kty": "RSA", "n": "AQAB", "e": "AQAB" },
                { "kid": "hs", "kty": "RSA", "alg": "HS256", "n": "AQAB", "e": "AQAB" }
            ]
        }))
        .unwrap();

        assert!(usable_keys(jwks).is_empty());
    }

    #[tokio::test]
    async fn rest_fallback_used_when_jwks_unreachable() {
        let mut server = mockito::Server::new_async().await;
        let jwks = server
            .mock("GET", "/jwks")
            .with_status(503)
            .create_async()
            .await;
        let lookup = server
            .mock("POST", "/lookup")
            .match_query(mockito::Matcher::UrlEncoded(
                "key".into(),
                "web-key".into(),
            ))
            .with_status(200)
            .with_body(
                r#"{"users":[{"localId":"uid-123","email":"User@Example.com","displayName":"Ana"}]}"#,
            )
            .create_async()
            .await;

        let mut config = Config::test_default();
        config.firebase_web_api_key = Some("web-key".to_string());
        let verifier = FirebaseAuthVerifier::new(&config).unwrap().with_endpoints(
            &format!("{}/jwks", server.url()),
            &format!("{}/lookup", server.url()),
        );

        // RS256 header with a kid; the signature is never checked locally
        // because the key fetch fails first.
        let token = "eyJhbGciOiJSUzI1NiIsImtpZCI6ImsxIiwidHlwIjoiSldUIn0.e30.c2ln";
        let header = HeaderValue::from_str(&format!("Bearer {token}")).unwrap();

        let user = verifier.verify(Some(&header)).await.unwrap();
        assert_eq!(user.uid, "uid-123");
        assert_eq!(user.email.as_deref(), Some("user@example.com"));

        jwks.assert_async().await;
        lookup.assert_async().await;
    }

    #[tokio::test]
    async fn no_fallback_without_web_api_key() {
        let mut server = mockito::Server::new_async().await;
        let _jwks = server
            .mock("GET", "/jwks")
            .with_status(503)
            .create_async()
            .await;

        let verifier = FirebaseAuthVerifier::new(&Config::test_default())
            .unwrap()
            .with_endpoints(
                &format!("{}/jwks", server.url()),
                &format!("{}/lookup", server.url()),
            );

        let token = "eyJhbGciOiJSUzI1NiIsImtpZCI6ImsxIiwidHlwIjoiSldUIn0.e30.c2ln";
        let header = HeaderValue::from_str(&format!("Bearer {token}")).unwrap();

        assert!(matches!(
            verifier.verify(Some(&header)).await,
            Err(AuthError::Transient(_))
        ));
    }

    #[tokio::test]
    async fn unknown_kid_refetches_jwks_at_most_once_per_interval() {
        let mut server = mockito::Server::new_async().await;
        let jwks = server
            .mock("GET", "/jwks")
            .with_status(200)
            .with_header("cache-control", "public, max-age=3600")
            .with_body(r#"{"keys":[{"kid":"k1","kty":"RSA","alg":"RS256","use":"sig","n":"AQAB","e":"AQAB"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let verifier = FirebaseAuthVerifier::new(&Config::test_default())
            .unwrap()
            .with_endpoints(
                &format!("{}/jwks", server.url()),
                &format!("{}/lookup", server.url()),
            );

        for _ in 0..5 {
            assert!(matches!(
                verifier.decoding_key_for_kid("rotated-away").await,
                Err(AuthError::Forbidden(_))
            ));
        }
        assert!(verifier.decoding_key_for_kid("k1").await.is_ok());

        jwks.assert_async().await;
    }
}
