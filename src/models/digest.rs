use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Article, Topic};

/// Period a digest covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    /// Rolling 30 days ending at generation time, not a calendar month.
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    pub fn span(&self) -> Duration {
        match self {
            Frequency::Daily => Duration::days(1),
            Frequency::Weekly => Duration::days(7),
            Frequency::Monthly => Duration::days(30),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(AppError::Validation(format!("unknown period type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestStatus {
    #[default]
    Draft,
    Published,
}

impl DigestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestStatus::Draft => "draft",
            DigestStatus::Published => "published",
        }
    }
}

impl FromStr for DigestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DigestStatus::Draft),
            "published" => Ok(DigestStatus::Published),
            other => Err(AppError::Store(format!("unknown digest status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub id: String,
    pub topic_id: i64,
    pub frequency: Frequency,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Ordered ascending by article timestamp.
    pub article_ids: Vec<i64>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
    pub status: DigestStatus,
    pub blog_name: Option<String>,
    pub published_path: Option<String>,
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        self.article_ids.is_empty()
    }
}

/// A digest resolved with its topic and articles, ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct DigestDocument {
    pub digest: Digest,
    pub topic: Topic,
    pub articles: Vec<Article>,
}

impl DigestDocument {
    pub fn title(&self) -> String {
        format!(
            "{} {} Digest",
            title_case(&self.topic.name),
            self.digest.frequency.title()
        )
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
