// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! IP geolocation for visit analytics.
//!
//! Tries ip-api.com first and ipapi.co second. Failures are never surfaced to
//! callers; they get [`GeoInfo::unknown`].

use axum::http::HeaderMap;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

const IP_API_URL: &str = "http://ip-api.com";
const IPAPI_CO_URL: &str = "https://ipapi.co";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub country: String,
    pub country_code: Option<String>,
    pub city: Option<String>,
}

impl GeoInfo {
    pub fn unknown() -> Self {
        Self {
            country: "Unknown".to_string(),
            country_code: None,
            city: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiReply {
    status: String,
    country: Option<String>,
    country_code: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpapiCoReply {
    #[serde(default)]
    error: bool,
    country_name: Option<String>,
    country_code: Option<String>,
    city: Option<String>,
}

#[derive(Clone)]
pub struct GeoLocator {
    http: reqwest::Client,
    primary_url: String,
    fallback_url: String,
}

impl Default for GeoLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoLocator {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            primary_url: IP_API_URL.to_string(),
            fallback_url: IPAPI_CO_URL.to_string(),
        }
    }

    /// Point the locator at different hosts (tests).
    pub fn with_base_urls(mut self, primary: &str, fallback: &str) -> Self {
        self.primary_url = primary.trim_end_matches('/').to_string();
        self.fallback_url = fallback.trim_end_matches('/').to_string();
        self
    }

    /// Look up `ip`. Private, loopback and unparseable addresses are not sent
    /// anywhere.
    pub async fn lookup(&self, ip: Option<&str>) -> GeoInfo {
        let Some(ip) = ip.and_then(|raw| raw.trim().parse::<IpAddr>().ok()) else {
            return GeoInfo::unknown();
        };
        if !is_public_ip(&ip) {
            return GeoInfo::unknown();
        }

        match self.lookup_ip_api(&ip).await {
            Ok(info) => return info,
            Err(e) => tracing::debug!(%ip, error = %e, "ip-api lookup failed"),
        }

        match self.lookup_ipapi_co(&ip).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(%ip, error = %e, "All geolocation lookups failed");
                GeoInfo::unknown()
            }
        }
    }

    async fn lookup_ip_api(&self, ip: &IpAddr) -> anyhow::Result<GeoInfo> {
        let reply: IpApiReply = self
            .http
            .get(format!("{}/json/{}", self.primary_url, ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if reply.status != "success" {
            anyhow::bail!("status {}", reply.status);
        }
        let country = reply
            .country
            .ok_or_else(|| anyhow::anyhow!("missing country"))?;

        Ok(GeoInfo {
            country,
            country_code: reply.country_code,
            city: reply.city,
        })
    }

    async fn lookup_ipapi_co(&self, ip: &IpAddr) -> anyhow::Result<GeoInfo> {
        let reply: IpapiCoReply = self
            .http
            .get(format!("{}/{}/json/", self.fallback_url, ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if reply.error {
            anyhow::bail!("ipapi.co reported an error");
        }
        let country = reply
            .country_name
            .ok_or_else(|| anyhow::anyhow!("missing country"))?;

        Ok(GeoInfo {
            country,
            country_code: reply.country_code,
            city: reply.city,
        })
    }
}

/// Client IP from proxy headers: first `X-Forwarded-For` entry, then
/// `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
}

fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // 100.64.0.0/10 carrier-grade NAT
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64))
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.7"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.5"));

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_private_ranges_are_not_public() {
        for ip in ["10.1.2.3", "192.168.0.1", "127.0.0.1", "100.64.1.1", "::1", "fd00::1", "fe80::1"] {
            assert!(!is_public_ip(&ip.parse().unwrap()), "{} should be private", ip);
        }
        assert!(is_public_ip(&"36.84.0.1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_private_ip_skips_lookup() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let locator = GeoLocator::new().with_base_urls(&server.url(), &server.url());
        assert_eq!(locator.lookup(Some("192.168.1.10")).await, GeoInfo::unknown());
        assert_eq!(locator.lookup(Some("not-an-ip")).await, GeoInfo::unknown());
        assert_eq!(locator.lookup(None).await, GeoInfo::unknown());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_primary_lookup() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/json/36.84.0.1")
            .with_status(200)
            .with_body(r#"{"status":"success","country":"Indonesia","countryCode":"ID","city":"Jakarta"}"#)
            .create_async()
            .await;

        let locator = GeoLocator::new().with_base_urls(&server.url(), "http://127.0.0.1:9");
        let info = locator.lookup(Some("36.84.0.1")).await;

        assert_eq!(info.country, "Indonesia");
        assert_eq!(info.country_code.as_deref(), Some("ID"));
        assert_eq!(info.city.as_deref(), Some("Jakarta"));
    }

    #[tokio::test]
    async fn test_falls_back_to_second_provider() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/json/36.84.0.1")
            .with_status(200)
            .with_body(r#"{"status":"fail","message":"quota"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/36.84.0.1/json/")
            .with_status(200)
            .with_body(r#"{"country_name":"Indonesia","country_code":"ID","city":"Bandung"}"#)
            .create_async()
            .await;

        let locator = GeoLocator::new().with_base_urls(&server.url(), &server.url());
        let info = locator.lookup(Some("36.84.0.1")).await;

        assert_eq!(info.country, "Indonesia");
        assert_eq!(info.city.as_deref(), Some("Bandung"));
    }

    #[tokio::test]
    async fn test_both_fail_gives_unknown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let locator = GeoLocator::new().with_base_urls(&server.url(), &server.url());
        assert_eq!(locator.lookup(Some("36.84.0.1")).await, GeoInfo::unknown());
    }
}
