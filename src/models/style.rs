//! Admin-curated style (prompt template).

use serde::{Deserialize, Serialize};

/// Stored at `styles/{id}` where the ID is a slug of the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Prompt sent to the generation API
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    /// Diamonds per generation; 0 means use the global default
    #[serde(default)]
    pub cost: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub sort_order: i32,
    pub created_at: String,
    pub updated_at: String,
}

fn default_active() -> bool {
    true
}

impl Style {
    /// Diamonds charged for one generation with this style.
    pub fn effective_cost(&self, default_cost: i64) -> i64 {
        if self.cost > 0 {
            self.cost
        } else {
            default_cost
        }
    }
}

/// Lowercase ASCII slug: alphanumerics kept, runs of anything else become `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Anime Portrait"), "anime-portrait");
        assert_eq!(slugify("  Ghibli -- Style!! "), "ghibli-style");
        assert_eq!(slugify("3D Render"), "3d-render");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn test_effective_cost_falls_back_to_default() {
        let mut style = Style {
            id: "x".into(),
            name: "X".into(),
            description: String::new(),
            prompt: "p".into(),
            negative_prompt: None,
            preview_url: None,
            cost: 0,
            active: true,
            sort_order: 0,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(style.effective_cost(2), 2);
        style.cost = 7;
        assert_eq!(style.effective_cost(2), 7);
    }
}
