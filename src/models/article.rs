use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entry as produced by a fetcher, before identity is assigned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArticle {
    /// Feed GUID when the upstream provides one.
    pub guid: Option<String>,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_name: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub source_id: i64,
    pub topic_id: i64,
    pub external_id: String,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_name: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    /// `None` once the source that produced it has been removed.
    pub source_id: Option<i64>,
    pub topic_id: i64,
    pub external_id: String,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub source_name: Option<String>,
    pub tags: Vec<String>,
}

impl Article {
    /// Timestamp used for digest windows and ordering.
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.fetched_at)
    }
}
