use std::path::Path;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use url::Url;

use crate::config::Config;
use crate::db::Repository;
use crate::digest::{render, DigestGenerator, ExportFormat, PeriodRequest};
use crate::error::{AppError, Result};
use crate::feed::{dedupe, HttpFetcher, SourceFetcher};
use crate::models::{
    Blog, BlogConfig, BlogType, Digest, DigestDocument, Frequency, NewArticle, Source,
    SourceType, Topic, TopicBlogLink,
};
use crate::publish::{PublishResult, Publisher, SlugPrefix};

const RECENT_DIGESTS: usize = 5;

/// Everything `topic info` shows.
#[derive(Debug)]
pub struct TopicInfo {
    pub topic: Topic,
    pub sources: Vec<Source>,
    pub blog: Option<(TopicBlogLink, Blog)>,
    pub article_count: i64,
    pub recent_digests: Vec<Digest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchCounts {
    /// Entries returned by the source after the cutoff.
    pub fetched: usize,
    /// Entries actually stored.
    pub new: usize,
}

#[derive(Debug)]
pub struct SourceFetchReport {
    pub source_id: i64,
    pub url: String,
    pub result: Result<FetchCounts>,
}

/// Per-source outcome of a fetch run. Failed sources do not stop the others.
#[derive(Debug)]
pub struct FetchReport {
    pub topic: String,
    pub sources: Vec<SourceFetchReport>,
}

impl FetchReport {
    pub fn new_articles(&self) -> usize {
        self.sources
            .iter()
            .filter_map(|s| s.result.as_ref().ok())
            .map(|c| c.new)
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.sources.iter().filter(|s| s.result.is_err()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0
    }
}

pub struct App<'a> {
    config: &'a Config,
    repository: Repository,
    fetcher: Box<dyn SourceFetcher>,
    tz: Tz,
}

impl<'a> App<'a> {
    pub async fn new(config: &'a Config) -> Result<Self> {
        let repository = Repository::open(&config.database_location()?).await?;
        let fetcher = HttpFetcher::new(&config.fetch)?;
        Self::with_parts(config, repository, Box::new(fetcher))
    }

    pub fn with_parts(
        config: &'a Config,
        repository: Repository,
        fetcher: Box<dyn SourceFetcher>,
    ) -> Result<Self> {
        Ok(Self {
            tz: config.timezone()?,
            config,
            repository,
            fetcher,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    // Stored timestamps have second precision.
    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }

    async fn require_topic(&self, name: &str) -> Result<Topic> {
        self.repository
            .get_topic_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("topic '{}'", name.trim())))
    }

    async fn require_blog(&self, name: &str) -> Result<Blog> {
        self.repository
            .get_blog_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("blog '{}'", name.trim())))
    }

    // Topics

    pub async fn add_topic(&self, name: &str, description: Option<String>) -> Result<Topic> {
        let topic = self.repository.create_topic(name, description).await?;
        tracing::info!("Created topic {}", topic.name);
        Ok(topic)
    }

    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        self.repository.list_topics().await
    }

    pub async fn remove_topic(&self, name: &str, force: bool) -> Result<()> {
        let topic = self.require_topic(name).await?;
        self.repository.delete_topic(topic.id, force).await?;
        tracing::info!("Removed topic {}", topic.name);
        Ok(())
    }

    pub async fn topic_info(&self, name: &str) -> Result<TopicInfo> {
        let topic = self.require_topic(name).await?;
        let sources = self.repository.list_sources(topic.id).await?;
        let blog = self.repository.get_blog_link(topic.id).await?;
        let article_count = self.repository.count_articles(topic.id).await?;
        let recent_digests = self.repository.list_digests(topic.id, RECENT_DIGESTS).await?;

        Ok(TopicInfo {
            topic,
            sources,
            blog,
            article_count,
            recent_digests,
        })
    }

    // Sources

    pub async fn add_source(
        &self,
        topic: &str,
        url: &str,
        source_type: &str,
        config: Option<&str>,
    ) -> Result<Source> {
        let source_type: SourceType = source_type.parse()?;
        let topic = self.require_topic(topic).await?;

        let url = url.trim();
        let parsed =
            Url::parse(url).map_err(|e| AppError::Validation(format!("invalid URL {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "source URL must be http or https: {}",
                url
            )));
        }

        let config = config
            .map(|raw| {
                serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
                    AppError::Validation(format!("malformed source config JSON: {}", e))
                })
            })
            .transpose()?;
        if matches!(&config, Some(value) if !value.is_object()) {
            return Err(AppError::Validation(
                "source config must be a JSON object".to_string(),
            ));
        }

        let source = self
            .repository
            .create_source(topic.id, url, source_type, config)
            .await?;
        tracing::info!("Added {} source {} to {}", source.source_type, source.url, topic.name);
        Ok(source)
    }

    pub async fn list_sources(&self, topic: &str) -> Result<Vec<Source>> {
        let topic = self.require_topic(topic).await?;
        self.repository.list_sources(topic.id).await
    }

    pub async fn remove_source(&self, id: i64) -> Result<()> {
        if !self.repository.delete_source(id).await? {
            return Err(AppError::NotFound(format!("source {}", id)));
        }
        Ok(())
    }

    // Blogs

    pub async fn add_blog(&self, name: &str, blog_type: &str, config: Option<&str>) -> Result<Blog> {
        let blog_type: BlogType = blog_type.parse()?;
        let config = BlogConfig::from_json(config.unwrap_or("{}"))?;
        let blog = self.repository.create_blog(name, blog_type, config).await?;
        tracing::info!("Added {} blog {}", blog.blog_type.as_str(), blog.name);
        Ok(blog)
    }

    pub async fn list_blogs(&self) -> Result<Vec<Blog>> {
        self.repository.list_blogs().await
    }

    pub async fn link_blog(
        &self,
        topic: &str,
        blog: &str,
        category: Option<String>,
        slug_prefix: Option<String>,
    ) -> Result<TopicBlogLink> {
        let topic = self.require_topic(topic).await?;
        let blog = self.require_blog(blog).await?;
        SlugPrefix::parse(slug_prefix.as_deref()).map_err(|e| match e {
            AppError::Publish(msg) => AppError::Validation(msg),
            other => other,
        })?;

        let link = TopicBlogLink {
            topic_id: topic.id,
            blog_id: blog.id,
            category,
            slug_prefix,
        };
        self.repository.link_blog(link.clone()).await?;
        tracing::info!("Linked topic {} to blog {}", topic.name, blog.name);
        Ok(link)
    }

    pub async fn unlink_blog(&self, topic: &str) -> Result<()> {
        let topic = self.require_topic(topic).await?;
        if !self.repository.unlink_blog(topic.id).await? {
            return Err(AppError::NotFound(format!(
                "blog link for topic '{}'",
                topic.name
            )));
        }
        Ok(())
    }

    // Fetch

    /// Fetch every source of a topic and store the entries not seen before.
    /// `days` overrides each source's incremental cutoff.
    pub async fn fetch_topic(&self, topic: &str, days: Option<i64>) -> Result<FetchReport> {
        if let Some(days) = days {
            if days <= 0 {
                return Err(AppError::Validation(format!(
                    "days must be positive, got {}",
                    days
                )));
            }
        }

        let topic = self.require_topic(topic).await?;
        let sources = self.repository.list_sources(topic.id).await?;
        let now = Self::now();
        let topic_ref = &topic;

        let mut reports: Vec<SourceFetchReport> = stream::iter(sources)
            .map(|source| async move {
                let since = self.cutoff(&source, days, now);
                let result = self.fetch_source(topic_ref, &source, since, now).await;
                if let Err(e) = &result {
                    tracing::warn!("Source {} failed: {}", source.url, e);
                }
                SourceFetchReport {
                    source_id: source.id,
                    url: source.url,
                    result,
                }
            })
            .buffer_unordered(self.config.fetch.concurrency.max(1))
            .collect()
            .await;
        reports.sort_by_key(|r| r.source_id);

        let report = FetchReport {
            topic: topic.name,
            sources: reports,
        };
        tracing::info!(
            "Fetched {}: {} new articles, {} failed sources",
            report.topic,
            report.new_articles(),
            report.failures()
        );
        Ok(report)
    }

    fn cutoff(&self, source: &Source, days: Option<i64>, now: DateTime<Utc>) -> DateTime<Utc> {
        match days {
            Some(days) => now - Duration::days(days),
            None => source
                .last_fetched_at
                .unwrap_or_else(|| now - Duration::days(self.config.fetch.default_days)),
        }
    }

    async fn fetch_source(
        &self,
        topic: &Topic,
        source: &Source,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<FetchCounts> {
        let mut entries = self.fetcher.fetch(source, since).await?;
        entries.retain(|entry| entry.published_at.map_or(true, |at| at >= since));
        let fetched = entries.len();

        let existing = self.repository.existing_external_ids(source.id).await?;
        let articles: Vec<NewArticle> =
            dedupe(entries, &existing, self.config.fetch.identity_fallback)
                .into_iter()
                .map(|(external_id, raw)| NewArticle {
                    source_id: source.id,
                    topic_id: topic.id,
                    external_id,
                    title: raw.title,
                    url: raw.url,
                    author: raw.author,
                    summary: raw.summary,
                    content: raw.content,
                    published_at: raw.published_at,
                    source_name: raw.source_name,
                    tags: raw.tags,
                })
                .collect();

        let new = self.repository.save_articles(source.id, articles, now).await?;
        tracing::info!("Stored {} of {} articles from {}", new, fetched, source.url);
        Ok(FetchCounts { fetched, new })
    }

    // Digests

    pub async fn generate(
        &self,
        topic: &str,
        frequency: Option<Frequency>,
        days: Option<i64>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<DigestDocument> {
        let topic = self.require_topic(topic).await?;
        let request = PeriodRequest {
            frequency: frequency.unwrap_or(self.config.digests.default_frequency),
            from,
            to,
            days,
        };
        DigestGenerator::new(&self.repository, &self.config.digests)
            .generate(&topic, request, Self::now())
            .await
    }

    pub async fn history(&self, topic: &str, limit: usize) -> Result<Vec<Digest>> {
        let topic = self.require_topic(topic).await?;
        self.repository.list_digests(topic.id, limit).await
    }

    pub async fn load_document(&self, id: &str) -> Result<DigestDocument> {
        let digest = self.repository.get_digest(id).await?;
        let topic = self
            .repository
            .get_topic(digest.topic_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("topic {}", digest.topic_id)))?;
        let articles = self.repository.articles_for_digest(&digest.id).await?;

        Ok(DigestDocument {
            digest,
            topic,
            articles,
        })
    }

    pub fn render(&self, doc: &DigestDocument, format: ExportFormat) -> Result<String> {
        render(doc, format, &self.config.digests.whatsapp, self.tz)
    }

    pub async fn view(&self, id: &str, format: ExportFormat) -> Result<String> {
        let doc = self.load_document(id).await?;
        self.render(&doc, format)
    }

    /// Render a stored digest, writing it to `output` when given.
    pub async fn export(
        &self,
        id: &str,
        format: ExportFormat,
        output: Option<&Path>,
    ) -> Result<String> {
        let rendered = self.view(id, format).await?;
        if let Some(path) = output {
            std::fs::write(path, &rendered)?;
            tracing::info!("Exported digest {} to {}", id, path.display());
        }
        Ok(rendered)
    }

    /// Publish to the named blog, or the topic's linked blog. Link settings
    /// apply only when the chosen blog is the linked one. A post file that
    /// belongs to another digest is never overwritten.
    pub async fn publish(
        &self,
        id: &str,
        blog: Option<&str>,
        dry_run: bool,
    ) -> Result<PublishResult> {
        let doc = self.load_document(id).await?;
        let linked = self.repository.get_blog_link(doc.topic.id).await?;

        let (blog, link) = match blog {
            Some(name) => {
                let blog = self.require_blog(name).await?;
                let link = linked
                    .filter(|(_, linked_blog)| linked_blog.id == blog.id)
                    .map(|(link, _)| link);
                (blog, link)
            }
            None => match linked {
                Some((link, blog)) => (blog, Some(link)),
                None => {
                    return Err(AppError::NotFound(format!(
                        "blog linked to topic '{}'",
                        doc.topic.name
                    )))
                }
            },
        };

        let publisher = Publisher::new(&self.config.digests.blog_template, self.tz);
        let (path, _) = publisher.render_post(&doc, &blog, link.as_ref())?;
        if let Some(other) = self
            .repository
            .digest_published_to(&path.to_string_lossy(), &doc.digest.id)
            .await?
        {
            return Err(AppError::Publish(format!(
                "{} already holds digest {}",
                path.display(),
                other
            )));
        }

        let result = publisher.publish(&doc, &blog, link.as_ref(), dry_run)?;

        if result.written {
            self.repository
                .mark_digest_published(&doc.digest.id, &blog.name, &result.path.to_string_lossy())
                .await?;
        }
        Ok(result)
    }
}
