use chrono::{DateTime, Utc};
use feed_rs::parser;

use crate::error::{AppError, Result};
use crate::models::RawArticle;

/// Parse an RSS/Atom document into entries published at or after `since`.
/// Entries without any date are kept.
pub fn parse_feed(
    bytes: &[u8],
    url: &str,
    since: Option<DateTime<Utc>>,
    max_entries: Option<usize>,
) -> Result<Vec<RawArticle>> {
    // Items without a <guid> get an empty id instead of a generated one, so
    // the configured identity fallback decides their identifier.
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)
        .map_err(|e| AppError::fetch(url, e))?;
    let source_name = feed.title.map(|t| t.content);

    let articles = feed
        .entries
        .into_iter()
        .map(|entry| {
            // Try content first, then fall back to summary
            let summary_html = entry.summary.as_ref().map(|s| s.content.clone());
            let content_html = entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .or_else(|| summary_html.clone());

            RawArticle {
                guid: Some(entry.id).filter(|id| !id.trim().is_empty()),
                title: entry
                    .title
                    .map(|t| normalize_whitespace(&t.content))
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "Untitled".to_string()),
                url: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                author: entry.authors.first().map(|a| a.name.clone()),
                summary: summary_html.as_deref().and_then(html_to_text),
                content: content_html.as_deref().and_then(html_to_text),
                published_at: entry.published.or(entry.updated),
                source_name: source_name.clone(),
                tags: entry.categories.into_iter().map(|c| c.term).collect(),
            }
        })
        .filter(|article| match (since, article.published_at) {
            (Some(since), Some(published)) => published >= since,
            _ => true,
        })
        .take(max_entries.unwrap_or(usize::MAX))
        .collect();

    Ok(articles)
}

/// Collapse runs of whitespace, including newlines, to single spaces.
pub(crate) fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn html_to_text(html: &str) -> Option<String> {
    let text = html2text::from_read(html.as_bytes(), 100).ok()?;
    let cleaned = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::feed::{external_id, IdentityFallback};

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://example.com</link>
    <description>News</description>
    <item>
      <title>Fresh story</title>
      <link>https://example.com/fresh</link>
      <guid>https://example.com/fresh</guid>
      <pubDate>Mon, 12 Oct 2026 08:00:00 GMT</pubDate>
      <description>&lt;p&gt;Something &lt;b&gt;happened&lt;/b&gt;&lt;/p&gt;</description>
      <category>world</category>
      <author>reporter@example.com (Reporter)</author>
    </item>
    <item>
      <title>Old story</title>
      <link>https://example.com/old</link>
      <guid>https://example.com/old</guid>
      <pubDate>Tue, 01 Sep 2026 08:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Undated story</title>
      <link>https://example.com/undated</link>
      <guid>undated-1</guid>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_entries() {
        let articles = parse_feed(SAMPLE.as_bytes(), "https://example.com/feed", None, None).unwrap();
        assert_eq!(articles.len(), 3);

        let fresh = &articles[0];
        assert_eq!(fresh.title, "Fresh story");
        assert_eq!(fresh.url, "https://example.com/fresh");
        assert_eq!(fresh.guid.as_deref(), Some("https://example.com/fresh"));
        assert_eq!(fresh.source_name.as_deref(), Some("Example News"));
        assert_eq!(fresh.tags, vec!["world".to_string()]);
        assert_eq!(
            fresh.published_at,
            Some(Utc.with_ymd_and_hms(2026, 10, 12, 8, 0, 0).unwrap())
        );
        let summary = fresh.summary.as_deref().unwrap();
        assert!(summary.contains("happened"));
        assert!(!summary.contains("<b>"));
    }

    #[test]
    fn test_since_filter_keeps_undated() {
        let since = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let articles =
            parse_feed(SAMPLE.as_bytes(), "https://example.com/feed", Some(since), None).unwrap();
        let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Fresh story", "Undated story"]);
    }

    #[test]
    fn test_max_entries() {
        let articles =
            parse_feed(SAMPLE.as_bytes(), "https://example.com/feed", None, Some(1)).unwrap();
        assert_eq!(articles.len(), 1);
    }

    const NO_GUIDS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Bare</title>
    <item>
      <title>Linked story</title>
      <link>https://example.com/linked</link>
      <pubDate>Mon, 12 Oct 2026 08:00:00 GMT</pubDate>
    </item>
    <item>
      <description>Nothing but a description</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_items_without_guid_have_stable_ids() {
        let parse = || parse_feed(NO_GUIDS.as_bytes(), "https://example.com/feed", None, None).unwrap();
        let first = parse();
        let second = parse();
        assert!(first.iter().all(|a| a.guid.is_none()));

        for fallback in [IdentityFallback::Link, IdentityFallback::ContentHash] {
            let ids: Vec<String> = first.iter().map(|a| external_id(a, fallback)).collect();
            let again: Vec<String> = second.iter().map(|a| external_id(a, fallback)).collect();
            assert_eq!(ids, again);
        }
    }

    #[test]
    fn test_identity_fallback_applies_to_rss_items() {
        let articles =
            parse_feed(NO_GUIDS.as_bytes(), "https://example.com/feed", None, None).unwrap();
        let linked = &articles[0];
        assert_eq!(
            external_id(linked, IdentityFallback::Link),
            "https://example.com/linked"
        );
        let hashed = external_id(linked, IdentityFallback::ContentHash);
        assert!(hashed.starts_with("sha256:"));
    }

    #[test]
    fn test_invalid_feed_is_fetch_error() {
        let err = parse_feed(b"not a feed", "https://example.com/feed", None, None).unwrap_err();
        assert!(matches!(err, AppError::Fetch { url, .. } if url == "https://example.com/feed"));
    }
}
