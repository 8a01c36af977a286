use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::FrontmatterFormat;

/// Metadata block prepended to hugo/jekyll posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    pub title: String,
    pub date: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub summary: String,
}

impl Frontmatter {
    pub fn render(&self, format: FrontmatterFormat) -> Result<String> {
        match format {
            FrontmatterFormat::Yaml => {
                let body = serde_yaml::to_string(self)
                    .map_err(|e| AppError::Publish(format!("frontmatter: {}", e)))?;
                Ok(format!("---\n{}---\n\n", body))
            }
            FrontmatterFormat::Toml => {
                let body = toml::to_string(self)
                    .map_err(|e| AppError::Publish(format!("frontmatter: {}", e)))?;
                Ok(format!("+++\n{}+++\n\n", body))
            }
        }
    }
}
