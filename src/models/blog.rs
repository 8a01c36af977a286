use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlogType {
    Local,
    Hugo,
    Jekyll,
}

impl BlogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlogType::Local => "local",
            BlogType::Hugo => "hugo",
            BlogType::Jekyll => "jekyll",
        }
    }
}

impl fmt::Display for BlogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for BlogType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BlogType::Local),
            "hugo" => Ok(BlogType::Hugo),
            "jekyll" => Ok(BlogType::Jekyll),
            other => Err(AppError::Validation(format!("unknown blog type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontmatterFormat {
    #[default]
    Yaml,
    Toml,
}

impl FromStr for FrontmatterFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(FrontmatterFormat::Yaml),
            "toml" => Ok(FrontmatterFormat::Toml),
            other => Err(AppError::Validation(format!(
                "unknown frontmatter format: {}",
                other
            ))),
        }
    }
}

/// Per-blog settings, supplied as JSON on `blog add`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlogConfig {
    /// Root directory of the blog (tilde is expanded).
    pub path: String,
    /// Hugo content directory relative to `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<String>,
    /// Jekyll/local posts directory relative to `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontmatter_format: Option<FrontmatterFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl BlogConfig {
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let config: BlogConfig = serde_json::from_str(json)
            .map_err(|e| AppError::Validation(format!("malformed blog config JSON: {}", e)))?;
        if config.path.trim().is_empty() {
            return Err(AppError::Validation(
                "blog config requires a non-empty \"path\"".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn root(&self) -> PathBuf {
        expand_tilde(&self.path)
    }

    pub fn extension(&self) -> &str {
        self.extension
            .as_deref()
            .map(|e| e.trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .unwrap_or("md")
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blog {
    pub id: i64,
    pub name: String,
    pub blog_type: BlogType,
    pub config: BlogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBlogLink {
    pub topic_id: i64,
    pub blog_id: i64,
    pub category: Option<String>,
    pub slug_prefix: Option<String>,
}
