use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::config::DatabaseLocation;
use crate::error::{AppError, Result};
use crate::models::{
    Article, Blog, BlogConfig, BlogType, Digest, DigestStatus, NewArticle, Source, SourceType,
    Topic, TopicBlogLink,
};
use crate::util::{parse_datetime, to_db_timestamp};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "a.id, a.source_id, a.topic_id, a.external_id, a.title, a.url, \
     a.author, a.summary, a.content, a.published_at, a.fetched_at, a.source_name, a.tags";

const DIGEST_COLUMNS: &str = "id, topic_id, frequency, period_start, period_end, summary, \
     generated_at, status, blog_name, published_path";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn open(location: &DatabaseLocation) -> Result<Self> {
        let conn = match location {
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path).await?
            }
            DatabaseLocation::Memory => Connection::open_in_memory().await?,
        };

        conn.call(|conn| {
            // Concurrent CLI processes wait on each other's write locks.
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::open(&DatabaseLocation::Memory).await
    }

    // Topic operations

    pub async fn create_topic(&self, name: &str, description: Option<String>) -> Result<Topic> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("topic name must not be empty".to_string()));
        }
        let topic = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO topics (name, description) VALUES (?1, ?2)",
                    params![name, description],
                )
                .map_err(|e| duplicate_or(e, format!("topic '{}'", name)))?;
                Ok(Topic {
                    id: conn.last_insert_rowid(),
                    name,
                    description,
                })
            })
            .await?;
        Ok(topic)
    }

    pub async fn get_topic_by_name(&self, name: &str) -> Result<Option<Topic>> {
        let name = name.trim().to_string();
        let topic = self
            .conn
            .call(move |conn| {
                let topic = conn
                    .query_row(
                        "SELECT id, name, description FROM topics WHERE name = ?1",
                        params![name],
                        topic_from_row,
                    )
                    .optional()?;
                Ok(topic)
            })
            .await?;
        Ok(topic)
    }

    pub async fn get_topic(&self, id: i64) -> Result<Option<Topic>> {
        let topic = self
            .conn
            .call(move |conn| {
                let topic = conn
                    .query_row(
                        "SELECT id, name, description FROM topics WHERE id = ?1",
                        params![id],
                        topic_from_row,
                    )
                    .optional()?;
                Ok(topic)
            })
            .await?;
        Ok(topic)
    }

    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        let topics = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, description FROM topics ORDER BY name")?;
                let topics = stmt
                    .query_map([], topic_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(topics)
            })
            .await?;
        Ok(topics)
    }

    /// Remove a topic with its sources, articles and blog link. Topics that
    /// digests still reference are only removed with `force`, which drops
    /// those digests as well.
    pub async fn delete_topic(&self, id: i64, force: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let digests: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM digests WHERE topic_id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                if digests > 0 && !force {
                    return Err(domain_error(AppError::Validation(format!(
                        "topic is referenced by {} digest(s); use --force to remove them too",
                        digests
                    ))));
                }
                tx.execute("DELETE FROM digests WHERE topic_id = ?1", params![id])?;
                tx.execute("DELETE FROM articles WHERE topic_id = ?1", params![id])?;
                tx.execute("DELETE FROM topics WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Source operations

    pub async fn create_source(
        &self,
        topic_id: i64,
        url: &str,
        source_type: SourceType,
        config: Option<serde_json::Value>,
    ) -> Result<Source> {
        let url = url.trim().to_string();
        let config_json = config.as_ref().map(serde_json::to_string).transpose()?;
        let source = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sources (topic_id, url, source_type, config) VALUES (?1, ?2, ?3, ?4)",
                    params![topic_id, url, source_type.as_str(), config_json],
                )
                .map_err(|e| duplicate_or(e, format!("source {}", url)))?;
                Ok(Source {
                    id: conn.last_insert_rowid(),
                    topic_id,
                    url,
                    source_type,
                    config,
                    last_fetched_at: None,
                })
            })
            .await?;
        Ok(source)
    }

    pub async fn list_sources(&self, topic_id: i64) -> Result<Vec<Source>> {
        let sources = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, topic_id, url, source_type, config, last_fetched_at
                     FROM sources WHERE topic_id = ?1 ORDER BY id",
                )?;
                let sources = stmt
                    .query_map(params![topic_id], source_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(sources)
            })
            .await?;
        Ok(sources)
    }

    /// Returns false when no such source exists. Stored articles are kept.
    pub async fn delete_source(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM sources WHERE id = ?1", params![id])?;
                Ok(n > 0)
            })
            .await?;
        Ok(deleted)
    }

    // Article operations

    pub async fn existing_external_ids(&self, source_id: i64) -> Result<HashSet<String>> {
        let ids = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT external_id FROM articles WHERE source_id = ?1")?;
                let ids = stmt
                    .query_map(params![source_id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<HashSet<_>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    /// Append articles for one source and stamp its fetch time, atomically.
    /// Existing `(source, external_id)` rows are never overwritten. Returns
    /// the number of rows actually inserted.
    pub async fn save_articles(
        &self,
        source_id: i64,
        articles: Vec<NewArticle>,
        fetched_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut rows = Vec::with_capacity(articles.len());
        for article in articles {
            let tags = if article.tags.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&article.tags)?)
            };
            rows.push((article, tags));
        }
        let fetched = to_db_timestamp(&fetched_at);

        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare(
                        r#"INSERT INTO articles
                               (source_id, topic_id, external_id, title, url, author, summary,
                                content, published_at, fetched_at, source_name, tags)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                           ON CONFLICT(source_id, external_id) DO NOTHING"#,
                    )?;
                    for (article, tags) in &rows {
                        inserted += stmt.execute(params![
                            source_id,
                            article.topic_id,
                            article.external_id,
                            article.title,
                            article.url,
                            article.author,
                            article.summary,
                            article.content,
                            article.published_at.as_ref().map(to_db_timestamp),
                            fetched,
                            article.source_name,
                            tags,
                        ])?;
                    }
                }
                tx.execute(
                    "UPDATE sources SET last_fetched_at = ?1 WHERE id = ?2",
                    params![fetched, source_id],
                )?;
                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }

    /// Articles of a topic whose published (else fetched) timestamp falls in
    /// `[from, to]`, oldest first.
    pub async fn articles_in_range(
        &self,
        topic_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Article>> {
        let from = to_db_timestamp(&from);
        let to = to_db_timestamp(&to);
        let articles = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {} FROM articles a
                     WHERE a.topic_id = ?1
                       AND COALESCE(a.published_at, a.fetched_at) BETWEEN ?2 AND ?3
                     ORDER BY COALESCE(a.published_at, a.fetched_at) ASC, a.id ASC",
                    ARTICLE_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(params![topic_id, from, to], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn articles_for_digest(&self, digest_id: &str) -> Result<Vec<Article>> {
        let digest_id = digest_id.to_string();
        let articles = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {} FROM digest_articles da
                     JOIN articles a ON a.id = da.article_id
                     WHERE da.digest_id = ?1
                     ORDER BY da.position",
                    ARTICLE_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(params![digest_id], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn count_articles(&self, topic_id: i64) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM articles WHERE topic_id = ?1",
                    params![topic_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    // Blog operations

    pub async fn create_blog(
        &self,
        name: &str,
        blog_type: BlogType,
        config: BlogConfig,
    ) -> Result<Blog> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("blog name must not be empty".to_string()));
        }
        let config_json = serde_json::to_string(&config)?;
        let blog = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO blogs (name, blog_type, config) VALUES (?1, ?2, ?3)",
                    params![name, blog_type.as_str(), config_json],
                )
                .map_err(|e| duplicate_or(e, format!("blog '{}'", name)))?;
                Ok(Blog {
                    id: conn.last_insert_rowid(),
                    name,
                    blog_type,
                    config,
                })
            })
            .await?;
        Ok(blog)
    }

    pub async fn list_blogs(&self) -> Result<Vec<Blog>> {
        let blogs = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, blog_type, config FROM blogs ORDER BY name")?;
                let blogs = stmt
                    .query_map([], blog_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(blogs)
            })
            .await?;
        Ok(blogs)
    }

    pub async fn get_blog_by_name(&self, name: &str) -> Result<Option<Blog>> {
        let name = name.trim().to_string();
        let blog = self
            .conn
            .call(move |conn| {
                let blog = conn
                    .query_row(
                        "SELECT id, name, blog_type, config FROM blogs WHERE name = ?1",
                        params![name],
                        blog_from_row,
                    )
                    .optional()?;
                Ok(blog)
            })
            .await?;
        Ok(blog)
    }

    pub async fn link_blog(&self, link: TopicBlogLink) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO topic_blogs (topic_id, blog_id, category, slug_prefix)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![link.topic_id, link.blog_id, link.category, link.slug_prefix],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        domain_error(AppError::Validation(
                            "topic is already linked to a blog; unlink it first".to_string(),
                        ))
                    } else {
                        e.into()
                    }
                })?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn unlink_blog(&self, topic_id: i64) -> Result<bool> {
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM topic_blogs WHERE topic_id = ?1",
                    params![topic_id],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    pub async fn get_blog_link(&self, topic_id: i64) -> Result<Option<(TopicBlogLink, Blog)>> {
        let link = self
            .conn
            .call(move |conn| {
                let link = conn
                    .query_row(
                        "SELECT tb.topic_id, tb.blog_id, tb.category, tb.slug_prefix,
                                b.id, b.name, b.blog_type, b.config
                         FROM topic_blogs tb
                         JOIN blogs b ON b.id = tb.blog_id
                         WHERE tb.topic_id = ?1",
                        params![topic_id],
                        |row| {
                            let link = TopicBlogLink {
                                topic_id: row.get(0)?,
                                blog_id: row.get(1)?,
                                category: row.get(2)?,
                                slug_prefix: row.get(3)?,
                            };
                            let blog = Blog {
                                id: row.get(4)?,
                                name: row.get(5)?,
                                blog_type: parse_column(row, 6)?,
                                config: json_column(row, 7)?,
                            };
                            Ok((link, blog))
                        },
                    )
                    .optional()?;
                Ok(link)
            })
            .await?;
        Ok(link)
    }

    // Digest operations

    /// Persist a digest with its ordered article references. Every
    /// referenced article must belong to the digest's topic.
    pub async fn save_digest(&self, digest: &Digest) -> Result<()> {
        if digest.period_start > digest.period_end {
            return Err(AppError::Validation(
                "digest period start must not be after its end".to_string(),
            ));
        }
        let digest = digest.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO digests (id, topic_id, frequency, period_start, period_end,
                                          summary, generated_at, status, blog_name, published_path)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        digest.id,
                        digest.topic_id,
                        digest.frequency.as_str(),
                        to_db_timestamp(&digest.period_start),
                        to_db_timestamp(&digest.period_end),
                        digest.summary,
                        to_db_timestamp(&digest.generated_at),
                        digest.status.as_str(),
                        digest.blog_name,
                        digest.published_path,
                    ],
                )?;
                {
                    let mut owner = tx.prepare("SELECT topic_id FROM articles WHERE id = ?1")?;
                    let mut insert = tx.prepare(
                        "INSERT INTO digest_articles (digest_id, article_id, position)
                         VALUES (?1, ?2, ?3)",
                    )?;
                    for (position, article_id) in digest.article_ids.iter().enumerate() {
                        let topic_id: Option<i64> = owner
                            .query_row(params![article_id], |row| row.get(0))
                            .optional()?;
                        if topic_id != Some(digest.topic_id) {
                            return Err(domain_error(AppError::Validation(format!(
                                "article {} does not belong to the digest's topic",
                                article_id
                            ))));
                        }
                        insert.execute(params![digest.id, article_id, position as i64])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_digest(&self, id: &str) -> Result<Digest> {
        let id = id.trim().to_string();
        let lookup = id.clone();
        let digest = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {} FROM digests WHERE id = ?1", DIGEST_COLUMNS);
                let digest = conn
                    .query_row(&sql, params![lookup], digest_from_row)
                    .optional()?;
                match digest {
                    Some(mut digest) => {
                        digest.article_ids = digest_article_ids(conn, &digest.id)?;
                        Ok(Some(digest))
                    }
                    None => Ok(None),
                }
            })
            .await?;
        digest.ok_or_else(|| AppError::NotFound(format!("digest {}", id)))
    }

    /// Most recent first.
    pub async fn list_digests(&self, topic_id: i64, limit: usize) -> Result<Vec<Digest>> {
        let digests = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {} FROM digests WHERE topic_id = ?1
                     ORDER BY generated_at DESC, rowid DESC LIMIT ?2",
                    DIGEST_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut digests = stmt
                    .query_map(params![topic_id, limit as i64], digest_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                for digest in &mut digests {
                    digest.article_ids = digest_article_ids(conn, &digest.id)?;
                }
                Ok(digests)
            })
            .await?;
        Ok(digests)
    }

    /// Id of a digest other than `id` already published to `path`.
    pub async fn digest_published_to(&self, path: &str, id: &str) -> Result<Option<String>> {
        let path = path.to_string();
        let id = id.to_string();
        let other = self
            .conn
            .call(move |conn| {
                let other = conn
                    .query_row(
                        "SELECT id FROM digests WHERE published_path = ?1 AND id != ?2 LIMIT 1",
                        params![path, id],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(other)
            })
            .await?;
        Ok(other)
    }

    pub async fn mark_digest_published(
        &self,
        id: &str,
        blog_name: &str,
        published_path: &str,
    ) -> Result<()> {
        let id = id.to_string();
        let lookup = id.clone();
        let blog_name = blog_name.to_string();
        let published_path = published_path.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE digests SET status = 'published', blog_name = ?1, published_path = ?2
                     WHERE id = ?3",
                    params![blog_name, published_path, lookup],
                )?;
                Ok(n)
            })
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("digest {}", id)));
        }
        Ok(())
    }
}

fn domain_error(e: AppError) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(e))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn duplicate_or(e: rusqlite::Error, what: String) -> tokio_rusqlite::Error {
    if is_unique_violation(&e) {
        domain_error(AppError::DuplicateName(what))
    } else {
        e.into()
    }
}

fn digest_article_ids(conn: &rusqlite::Connection, digest_id: &str) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT article_id FROM digest_articles WHERE digest_id = ?1 ORDER BY position",
    )?;
    let ids = stmt
        .query_map(params![digest_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_column<T: FromStr<Err = AppError>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_datetime(&text).ok_or_else(|| {
        conversion_error(idx, AppError::Store(format!("invalid timestamp: {}", text)))
    })
}

fn optional_timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| parse_datetime(&s)))
}

fn topic_from_row(row: &Row) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        url: row.get(2)?,
        source_type: parse_column(row, 3)?,
        config: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| serde_json::from_str(&s).ok()),
        last_fetched_at: optional_timestamp_column(row, 5)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        source_id: row.get(1)?,
        topic_id: row.get(2)?,
        external_id: row.get(3)?,
        title: row.get(4)?,
        url: row.get(5)?,
        author: row.get(6)?,
        summary: row.get(7)?,
        content: row.get(8)?,
        published_at: optional_timestamp_column(row, 9)?,
        fetched_at: timestamp_column(row, 10)?,
        source_name: row.get(11)?,
        tags: row
            .get::<_, Option<String>>(12)?
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
    })
}

fn blog_from_row(row: &Row) -> rusqlite::Result<Blog> {
    Ok(Blog {
        id: row.get(0)?,
        name: row.get(1)?,
        blog_type: parse_column(row, 2)?,
        config: json_column(row, 3)?,
    })
}

fn digest_from_row(row: &Row) -> rusqlite::Result<Digest> {
    Ok(Digest {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        frequency: parse_column(row, 2)?,
        period_start: timestamp_column(row, 3)?,
        period_end: timestamp_column(row, 4)?,
        summary: row.get(5)?,
        generated_at: timestamp_column(row, 6)?,
        status: parse_column::<DigestStatus>(row, 7)?,
        blog_name: row.get(8)?,
        published_path: row.get(9)?,
        article_ids: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::models::Frequency;

    fn new_article(source: &Source, external_id: &str, published: DateTime<Utc>) -> NewArticle {
        NewArticle {
            source_id: source.id,
            topic_id: source.topic_id,
            external_id: external_id.to_string(),
            title: format!("Article {}", external_id),
            url: format!("https://example.com/{}", external_id),
            author: None,
            summary: None,
            content: None,
            published_at: Some(published),
            source_name: Some("Example".to_string()),
            tags: vec!["rust".to_string()],
        }
    }

    async fn setup() -> (Repository, Topic, Source) {
        let repo = Repository::open_in_memory().await.unwrap();
        let topic = repo.create_topic("news", Some("World news".into())).await.unwrap();
        let source = repo
            .create_source(topic.id, "https://example.com/feed", SourceType::Rss, None)
            .await
            .unwrap();
        (repo, topic, source)
    }

    #[tokio::test]
    async fn test_create_and_get_topic() {
        let (repo, topic, _) = setup().await;
        let found = repo.get_topic_by_name("news").await.unwrap().unwrap();
        assert_eq!(found, topic);
        assert_eq!(found.description.as_deref(), Some("World news"));
        assert!(repo.get_topic_by_name("sports").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_topic_name() {
        let (repo, _, _) = setup().await;
        let err = repo.create_topic("news", None).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn test_save_articles_is_append_only() {
        let (repo, _, source) = setup().await;
        let now = Utc::now();
        let first = new_article(&source, "a", now);
        let mut changed = new_article(&source, "a", now);
        changed.title = "Rewritten".to_string();

        assert_eq!(repo.save_articles(source.id, vec![first], now).await.unwrap(), 1);
        assert_eq!(repo.save_articles(source.id, vec![changed], now).await.unwrap(), 0);

        let articles = repo
            .articles_in_range(source.topic_id, now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Article a");
        assert_eq!(articles[0].tags, vec!["rust".to_string()]);
    }

    #[tokio::test]
    async fn test_save_articles_stamps_last_fetched() {
        let (repo, topic, source) = setup().await;
        let fetched = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        repo.save_articles(source.id, vec![], fetched).await.unwrap();
        let sources = repo.list_sources(topic.id).await.unwrap();
        assert_eq!(sources[0].last_fetched_at, Some(fetched));
    }

    #[tokio::test]
    async fn test_articles_in_range_ordered_ascending() {
        let (repo, topic, source) = setup().await;
        let base = Utc.with_ymd_and_hms(2026, 10, 10, 12, 0, 0).unwrap();
        let articles = vec![
            new_article(&source, "late", base + Duration::days(3)),
            new_article(&source, "early", base),
            new_article(&source, "outside", base - Duration::days(30)),
        ];
        repo.save_articles(source.id, articles, base + Duration::days(4))
            .await
            .unwrap();

        let found = repo
            .articles_in_range(topic.id, base - Duration::days(1), base + Duration::days(5))
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|a| a.external_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_deleting_source_keeps_articles() {
        let (repo, topic, source) = setup().await;
        let now = Utc::now();
        repo.save_articles(source.id, vec![new_article(&source, "a", now)], now)
            .await
            .unwrap();
        assert!(repo.delete_source(source.id).await.unwrap());
        assert!(!repo.delete_source(source.id).await.unwrap());
        assert_eq!(repo.count_articles(topic.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_topic_rejected_when_digests_exist() {
        let (repo, topic, _) = setup().await;
        let now = Utc::now();
        let digest = Digest {
            id: "d1".to_string(),
            topic_id: topic.id,
            frequency: Frequency::Weekly,
            period_start: now - Duration::days(7),
            period_end: now,
            article_ids: vec![],
            summary: String::new(),
            generated_at: now,
            status: DigestStatus::Draft,
            blog_name: None,
            published_path: None,
        };
        repo.save_digest(&digest).await.unwrap();

        let err = repo.delete_topic(topic.id, false).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        repo.delete_topic(topic.id, true).await.unwrap();
        assert!(repo.get_topic(topic.id).await.unwrap().is_none());
        assert!(matches!(repo.get_digest("d1").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_digest_rejects_foreign_articles() {
        let (repo, topic, _) = setup().await;
        let other = repo.create_topic("sports", None).await.unwrap();
        let other_source = repo
            .create_source(other.id, "https://example.org/feed", SourceType::Rss, None)
            .await
            .unwrap();
        let now = Utc::now();
        repo.save_articles(other_source.id, vec![new_article(&other_source, "x", now)], now)
            .await
            .unwrap();
        let foreign = repo
            .articles_in_range(other.id, now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap();

        let digest = Digest {
            id: "d2".to_string(),
            topic_id: topic.id,
            frequency: Frequency::Daily,
            period_start: now - Duration::days(1),
            period_end: now,
            article_ids: vec![foreign[0].id],
            summary: String::new(),
            generated_at: now,
            status: DigestStatus::Draft,
            blog_name: None,
            published_path: None,
        };
        let err = repo.save_digest(&digest).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(matches!(repo.get_digest("d2").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_single_blog_link_per_topic() {
        let (repo, topic, _) = setup().await;
        let config = BlogConfig {
            path: "/tmp/blog".to_string(),
            ..Default::default()
        };
        let a = repo.create_blog("a", BlogType::Hugo, config.clone()).await.unwrap();
        let b = repo.create_blog("b", BlogType::Local, config).await.unwrap();

        let link = |blog_id| TopicBlogLink {
            topic_id: topic.id,
            blog_id,
            category: Some("news".to_string()),
            slug_prefix: None,
        };
        repo.link_blog(link(a.id)).await.unwrap();
        let err = repo.link_blog(link(b.id)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let (found, blog) = repo.get_blog_link(topic.id).await.unwrap().unwrap();
        assert_eq!(blog.name, "a");
        assert_eq!(found.category.as_deref(), Some("news"));

        assert!(repo.unlink_blog(topic.id).await.unwrap());
        assert!(repo.get_blog_link(topic.id).await.unwrap().is_none());
        repo.link_blog(link(b.id)).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_blog_name() {
        let (repo, _, _) = setup().await;
        let config = BlogConfig {
            path: "/tmp/blog".to_string(),
            ..Default::default()
        };
        repo.create_blog("main", BlogType::Jekyll, config.clone()).await.unwrap();
        let err = repo.create_blog("main", BlogType::Jekyll, config).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn test_digest_published_to_ignores_itself() {
        let (repo, topic, _) = setup().await;
        let now = Utc::now();
        for id in ["first", "second"] {
            let digest = Digest {
                id: id.to_string(),
                topic_id: topic.id,
                frequency: Frequency::Weekly,
                period_start: now - Duration::days(7),
                period_end: now,
                article_ids: vec![],
                summary: String::new(),
                generated_at: now,
                status: DigestStatus::Draft,
                blog_name: None,
                published_path: None,
            };
            repo.save_digest(&digest).await.unwrap();
        }
        repo.mark_digest_published("first", "blog", "/tmp/post.md")
            .await
            .unwrap();

        assert_eq!(
            repo.digest_published_to("/tmp/post.md", "second").await.unwrap(),
            Some("first".to_string())
        );
        assert!(repo
            .digest_published_to("/tmp/post.md", "first")
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .digest_published_to("/tmp/other.md", "second")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_published_missing_digest() {
        let (repo, _, _) = setup().await;
        let err = repo
            .mark_digest_published("missing", "blog", "/tmp/x.md")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
