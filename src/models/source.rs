use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Kind of upstream a source is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Rss,
    Web,
    /// Accepted so sources can be registered ahead of time; not fetchable yet.
    Youtube,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Rss => "rss",
            SourceType::Web => "web",
            SourceType::Youtube => "youtube",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" | "atom" => Ok(SourceType::Rss),
            "web" => Ok(SourceType::Web),
            "youtube" => Ok(SourceType::Youtube),
            other => Err(AppError::UnsupportedSourceType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub topic_id: i64,
    pub url: String,
    pub source_type: SourceType,
    /// Free-form per-source options supplied as JSON on `source add`.
    pub config: Option<serde_json::Value>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl Source {
    /// Upper bound on entries taken from one fetch, from the `max_entries` option.
    pub fn max_entries(&self) -> Option<usize> {
        self.config
            .as_ref()
            .and_then(|c| c.get("max_entries"))
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
    }
}
