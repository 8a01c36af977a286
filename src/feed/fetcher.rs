use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::config::FetchConfig;
use crate::error::{AppError, Result};
use crate::models::{RawArticle, Source, SourceType};

use super::rss::parse_feed;
use super::web::extract_page;

/// Retrieves raw entries for one source, newer than `since`.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source, since: DateTime<Utc>) -> Result<Vec<RawArticle>>;
}

/// Fetches sources over HTTP, dispatching on the source type.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::fetch(url, e))?;

        if !response.status().is_success() {
            return Err(AppError::fetch(url, format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| AppError::fetch(url, e))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_rss(&self, source: &Source, since: DateTime<Utc>) -> Result<Vec<RawArticle>> {
        let bytes = self.get_bytes(&source.url).await?;
        let articles = parse_feed(&bytes, &source.url, Some(since), source.max_entries())?;
        tracing::debug!("Parsed {} entries from {}", articles.len(), source.url);
        Ok(articles)
    }

    async fn fetch_web(&self, source: &Source, since: DateTime<Utc>) -> Result<Vec<RawArticle>> {
        let bytes = self.get_bytes(&source.url).await?;
        let html = String::from_utf8_lossy(&bytes);
        let article = extract_page(&html, &source.url);

        if matches!(article.published_at, Some(published) if published < since) {
            tracing::debug!("Page {} is older than the cutoff", source.url);
            return Ok(Vec::new());
        }
        Ok(vec![article])
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &Source, since: DateTime<Utc>) -> Result<Vec<RawArticle>> {
        match source.source_type {
            SourceType::Rss => self.fetch_rss(source, since).await,
            SourceType::Web => self.fetch_web(source, since).await,
            SourceType::Youtube => Err(AppError::UnsupportedSourceType(
                SourceType::Youtube.to_string(),
            )),
        }
    }
}
