use std::collections::HashMap;

use chrono::{DateTime, Duration, SubsecRound, Timelike, Utc};

use crate::config::DigestConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Article, Digest, DigestDocument, DigestStatus, Frequency, Topic};

/// What period a digest should cover. Unset bounds are derived from the
/// frequency (or `days`) relative to now.
#[derive(Debug, Clone, Copy)]
pub struct PeriodRequest {
    pub frequency: Frequency,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub days: Option<i64>,
}

impl PeriodRequest {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            from: None,
            to: None,
            days: None,
        }
    }

    pub fn bounds(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let span = match self.days {
            Some(days) if days <= 0 => {
                return Err(AppError::Validation(format!(
                    "days must be positive, got {}",
                    days
                )))
            }
            Some(days) => Duration::days(days),
            None => self.frequency.span(),
        };

        let to = self.to.unwrap_or(now);
        let from = self.from.unwrap_or(to - span);
        // Stored timestamps have whole seconds, so shrink the window to them.
        let from = if from.nanosecond() > 0 {
            from.trunc_subsecs(0) + Duration::seconds(1)
        } else {
            from
        };
        let to = to.trunc_subsecs(0);
        if from > to {
            return Err(AppError::Validation(format!(
                "period start {} is after period end {}",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        Ok((from, to))
    }
}

pub struct DigestGenerator<'a> {
    repository: &'a Repository,
    config: &'a DigestConfig,
}

impl<'a> DigestGenerator<'a> {
    pub fn new(repository: &'a Repository, config: &'a DigestConfig) -> Self {
        Self { repository, config }
    }

    /// Select the topic's articles in the requested period and persist a
    /// draft digest. An empty period produces an empty digest.
    pub async fn generate(
        &self,
        topic: &Topic,
        request: PeriodRequest,
        now: DateTime<Utc>,
    ) -> Result<DigestDocument> {
        let (from, to) = request.bounds(now)?;

        let articles = self.repository.articles_in_range(topic.id, from, to).await?;
        let found = articles.len();
        let articles = keep_most_recent(articles, self.config.max_articles_per_digest);
        if articles.len() < found {
            tracing::info!(
                "Truncated digest for {} from {} to {} articles",
                topic.name,
                found,
                articles.len()
            );
        }

        let digest = Digest {
            id: uuid::Uuid::new_v4().to_string(),
            topic_id: topic.id,
            frequency: request.frequency,
            period_start: from,
            period_end: to,
            article_ids: articles.iter().map(|a| a.id).collect(),
            summary: summarize(&articles),
            generated_at: now,
            status: DigestStatus::Draft,
            blog_name: None,
            published_path: None,
        };
        self.repository.save_digest(&digest).await?;
        if digest.is_empty() {
            tracing::info!("No articles for {} in the requested period", topic.name);
        }
        tracing::info!(
            "Generated {} digest {} for {} with {} articles",
            digest.frequency,
            digest.id,
            topic.name,
            articles.len()
        );

        Ok(DigestDocument {
            digest,
            topic: topic.clone(),
            articles,
        })
    }
}

/// Keep the newest `max` of an ascending list, preserving order. Zero keeps all.
pub fn keep_most_recent(mut articles: Vec<Article>, max: usize) -> Vec<Article> {
    if max > 0 && articles.len() > max {
        let excess = articles.len() - max;
        articles.drain(..excess);
    }
    articles
}

/// One-line description of what a digest contains.
pub fn summarize(articles: &[Article]) -> String {
    if articles.is_empty() {
        return "No articles to summarize.".to_string();
    }

    let mut by_source: HashMap<&str, usize> = HashMap::new();
    for article in articles {
        let source = article.source_name.as_deref().unwrap_or("Unknown");
        *by_source.entry(source).or_default() += 1;
    }
    let mut counts: Vec<(&str, usize)> = by_source.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut parts: Vec<String> = counts
        .iter()
        .take(3)
        .map(|(source, count)| format!("{} from {}", count, source))
        .collect();
    if counts.len() > 3 {
        parts.push(format!("and {} more", counts.len() - 3));
    }

    format!(
        "Tracked {} article{}: {}",
        articles.len(),
        if articles.len() == 1 { "" } else { "s" },
        parts.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(id: i64, source: Option<&str>) -> Article {
        let at = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap() + Duration::hours(id);
        Article {
            id,
            source_id: Some(1),
            topic_id: 1,
            external_id: id.to_string(),
            title: format!("Article {}", id),
            url: format!("https://example.com/{}", id),
            author: None,
            summary: None,
            content: None,
            published_at: Some(at),
            fetched_at: at,
            source_name: source.map(str::to_string),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_default_bounds_follow_frequency() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let (from, to) = PeriodRequest::new(Frequency::Weekly).bounds(now).unwrap();
        assert_eq!(to, now);
        assert_eq!(from, now - Duration::days(7));

        let (from, _) = PeriodRequest::new(Frequency::Monthly).bounds(now).unwrap();
        assert_eq!(from, now - Duration::days(30));

        let (from, _) = PeriodRequest::new(Frequency::Daily).bounds(now).unwrap();
        assert_eq!(from, now - Duration::days(1));
    }

    #[test]
    fn test_days_override_and_explicit_bounds() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let mut request = PeriodRequest::new(Frequency::Weekly);
        request.days = Some(3);
        let (from, _) = request.bounds(now).unwrap();
        assert_eq!(from, now - Duration::days(3));

        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 9, 30, 0, 0, 0).unwrap();
        let request = PeriodRequest {
            frequency: Frequency::Monthly,
            from: Some(start),
            to: Some(end),
            days: None,
        };
        assert_eq!(request.bounds(now).unwrap(), (start, end));
    }

    #[test]
    fn test_fractional_bounds_round_inward() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 10, 17, 15, 50, 31).unwrap();
        let request = PeriodRequest {
            frequency: Frequency::Daily,
            from: Some(start + Duration::milliseconds(500)),
            to: Some(now + Duration::milliseconds(750)),
            days: None,
        };
        let (from, to) = request.bounds(now).unwrap();
        assert_eq!(from, start + Duration::seconds(1));
        assert_eq!(to, now);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let now = Utc::now();
        let request = PeriodRequest {
            frequency: Frequency::Weekly,
            from: Some(now),
            to: Some(now - Duration::days(1)),
            days: None,
        };
        assert!(matches!(request.bounds(now), Err(AppError::Validation(_))));

        let mut request = PeriodRequest::new(Frequency::Daily);
        request.days = Some(0);
        assert!(matches!(request.bounds(now), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_keep_most_recent() {
        let articles: Vec<Article> = (1..=5).map(|i| article(i, None)).collect();
        let kept = keep_most_recent(articles.clone(), 2);
        assert_eq!(kept.iter().map(|a| a.id).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(keep_most_recent(articles, 0).len(), 5);
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(&[]), "No articles to summarize.");
        assert_eq!(
            summarize(&[article(1, Some("Example"))]),
            "Tracked 1 article: 1 from Example"
        );

        let articles = vec![
            article(1, Some("A")),
            article(2, Some("B")),
            article(3, Some("B")),
            article(4, Some("C")),
            article(5, Some("D")),
            article(6, None),
        ];
        assert_eq!(
            summarize(&articles),
            "Tracked 6 articles: 2 from B, 1 from A, 1 from C, and 2 more"
        );
    }
}
