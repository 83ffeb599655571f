// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Global application settings stored at `settings/app`.

use serde::{Deserialize, Serialize};

/// A purchasable diamond bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPackage {
    pub id: String,
    pub name: String,
    pub diamonds: i64,
    /// Price in IDR
    pub price: i64,
}

/// Admin-editable settings. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_packages")]
    pub packages: Vec<TokenPackage>,
    /// Diamonds per generation when a style has no explicit cost
    #[serde(default = "default_generation_cost")]
    pub generation_cost: i64,
    /// Diamonds granted to a new account
    #[serde(default = "default_signup_bonus")]
    pub signup_bonus: i64,
    #[serde(default = "default_true")]
    pub beta_open: bool,
    #[serde(default = "default_beta_max_slots")]
    pub beta_max_slots: u32,
    #[serde(default = "default_beta_free_tokens")]
    pub beta_free_tokens: i64,
    /// Reject new generations and top-ups
    #[serde(default)]
    pub maintenance: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            packages: default_packages(),
            generation_cost: default_generation_cost(),
            signup_bonus: default_signup_bonus(),
            beta_open: true,
            beta_max_slots: default_beta_max_slots(),
            beta_free_tokens: default_beta_free_tokens(),
            maintenance: false,
        }
    }
}

impl Settings {
    pub fn find_package(&self, id: &str) -> Option<&TokenPackage> {
        self.packages.iter().find(|p| p.id == id)
    }

    /// Check admin-supplied settings before saving.
    pub fn validate(&self) -> Result<(), String> {
        if self.packages.is_empty() {
            return Err("At least one package is required".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for package in &self.packages {
            if package.id.trim().is_empty() {
                return Err("Package id must not be empty".to_string());
            }
            if !seen.insert(package.id.as_str()) {
                return Err(format!("Duplicate package id: {}", package.id));
            }
            if package.price <= 0 || package.diamonds <= 0 {
                return Err(format!(
                    "Package {} must have a positive price and diamond count",
                    package.id
                ));
            }
        }

        if self.generation_cost <= 0 {
            return Err("generation_cost must be positive".to_string());
        }
        if self.signup_bonus < 0 || self.beta_free_tokens < 0 {
            return Err("Bonus amounts must not be negative".to_string());
        }

        Ok(())
    }
}

fn default_packages() -> Vec<TokenPackage> {
    vec![
        TokenPackage {
            id: "starter".to_string(),
            name: "Starter".to_string(),
            diamonds: 10,
            price: 10_000,
        },
        TokenPackage {
            id: "popular".to_string(),
            name: "Popular".to_string(),
            diamonds: 50,
            price: 45_000,
        },
        TokenPackage {
            id: "pro".to_string(),
            name: "Pro".to_string(),
            diamonds: 120,
            price: 100_000,
        },
    ]
}

fn default_generation_cost() -> i64 {
    1
}

fn default_signup_bonus() -> i64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_beta_max_slots() -> u32 {
    100
}

fn default_beta_free_tokens() -> i64 {
    20
}
