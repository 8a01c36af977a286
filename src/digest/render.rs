use std::fmt::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::WhatsAppConfig;
use crate::error::{AppError, Result};
use crate::models::{Article, DigestDocument};
use crate::util::truncate_chars;

const ARTICLES_HEADING: &str = "## Articles";
const TOP_STORIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Markdown,
    Whatsapp,
    Json,
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "whatsapp" | "text" => Ok(ExportFormat::Whatsapp),
            "json" => Ok(ExportFormat::Json),
            other => Err(AppError::Validation(format!("unknown export format: {}", other))),
        }
    }
}

pub fn render(
    doc: &DigestDocument,
    format: ExportFormat,
    whatsapp: &WhatsAppConfig,
    tz: Tz,
) -> Result<String> {
    match format {
        ExportFormat::Markdown => Ok(render_markdown(doc, tz)),
        ExportFormat::Whatsapp => Ok(render_whatsapp(doc, whatsapp, tz)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(doc)?),
    }
}

fn local(dt: &DateTime<Utc>, tz: Tz, fmt: &str) -> String {
    dt.with_timezone(&tz).format(fmt).to_string()
}

/// Most recent first, at most three.
fn top_stories(articles: &[Article]) -> impl Iterator<Item = &Article> {
    articles.iter().rev().take(TOP_STORIES)
}

pub fn render_markdown(doc: &DigestDocument, tz: Tz) -> String {
    let digest = &doc.digest;
    let mut md = String::new();

    let _ = writeln!(md, "# {}\n", doc.title());
    let _ = writeln!(
        md,
        "*{} – {} · {} article{}*\n",
        local(&digest.period_start, tz, "%b %d, %Y"),
        local(&digest.period_end, tz, "%b %d, %Y"),
        doc.articles.len(),
        if doc.articles.len() == 1 { "" } else { "s" }
    );

    md.push_str("## Summary\n\n");
    let _ = writeln!(md, "{}\n", digest.summary);

    if doc.articles.len() >= TOP_STORIES {
        md.push_str("## Top Stories\n\n");
        for (i, article) in top_stories(&doc.articles).enumerate() {
            match &article.source_name {
                Some(source) => {
                    let _ = writeln!(md, "{}. {} ({})", i + 1, article.title, source);
                }
                None => {
                    let _ = writeln!(md, "{}. {}", i + 1, article.title);
                }
            }
        }
        md.push('\n');
    }

    let _ = writeln!(md, "{}\n", ARTICLES_HEADING);
    if doc.articles.is_empty() {
        md.push_str("_No articles in this period._\n");
        return md;
    }

    for article in &doc.articles {
        let _ = writeln!(
            md,
            "### [{}]({})\n",
            escape_link_text(&article.title),
            link_target(&article.url)
        );

        let mut meta = Vec::new();
        if let Some(published) = &article.published_at {
            meta.push(format!("*Published*: {}", local(published, tz, "%B %d, %Y")));
        }
        if let Some(source) = &article.source_name {
            meta.push(format!("*Source*: {}", source));
        }
        if let Some(author) = &article.author {
            meta.push(format!("*Author*: {}", author));
        }
        if !meta.is_empty() {
            let _ = writeln!(md, "{}\n", meta.join(" · "));
        }

        if let Some(summary) = &article.summary {
            for line in truncate_chars(summary, 280).lines() {
                let _ = writeln!(md, "> {}", line);
            }
            md.push('\n');
        }
    }

    md
}

pub fn render_whatsapp(doc: &DigestDocument, options: &WhatsAppConfig, tz: Tz) -> String {
    let digest = &doc.digest;
    let mut lines: Vec<String> = Vec::new();

    let period = format!(
        "{} – {}",
        local(&digest.period_start, tz, "%b %d"),
        local(&digest.period_end, tz, "%b %d")
    );
    let emoji = |e: &str| if options.emoji_header { format!("{} ", e) } else { String::new() };

    lines.push(format!("{}*{} — {}*", emoji("📊"), doc.title(), period));
    lines.push(String::new());
    lines.push(format!("*{} articles tracked*", doc.articles.len()));
    lines.push(String::new());

    if doc.articles.is_empty() {
        lines.push("_No articles in this period._".to_string());
        return lines.join("\n");
    }

    if doc.articles.len() >= TOP_STORIES {
        lines.push(format!("*{}Top Stories*", emoji("🔥")));
        for (i, article) in top_stories(&doc.articles).enumerate() {
            let title = if options.brief {
                truncate_chars(&article.title, 60)
            } else {
                article.title.clone()
            };
            match &article.source_name {
                Some(source) => lines.push(format!("{}. {} ({})", i + 1, title, source)),
                None => lines.push(format!("{}. {}", i + 1, title)),
            }
        }
        lines.push(String::new());
    }

    lines.push(format!("*{}Articles ({})*", emoji("📄"), doc.articles.len()));
    for (i, article) in doc.articles.iter().enumerate() {
        let date = format!(" — {}", local(&article.effective_at(), tz, "%b %d"));
        lines.push(format!("{}. *{}*{}", i + 1, article.title, date));

        if let Some(summary) = &article.summary {
            let snippet = summary.split_whitespace().collect::<Vec<_>>().join(" ");
            let snippet = if options.brief {
                truncate_chars(&snippet, 100)
            } else {
                snippet
            };
            lines.push(format!("   → {}", snippet));
        }

        if options.show_urls && !article.url.is_empty() {
            lines.push(format!("   {}", article.url));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `<...>` link destination; spaces are allowed there, brackets are escaped.
fn link_target(url: &str) -> String {
    let mut out = String::with_capacity(url.len() + 2);
    out.push('<');
    for c in url.chars() {
        if matches!(c, '\\' | '<' | '>') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('>');
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            _ => out.push(c),
        }
    }
    out
}

/// Recover `(title, link)` pairs from the article list of a markdown digest.
pub fn parse_markdown_articles(markdown: &str) -> Vec<(String, String)> {
    let mut in_articles = false;
    let mut articles = Vec::new();

    for line in markdown.lines() {
        if line.starts_with("## ") {
            in_articles = line.trim_end() == ARTICLES_HEADING;
            continue;
        }
        if !in_articles {
            continue;
        }
        if let Some(rest) = line.strip_prefix("### [") {
            if let Some(entry) = parse_link_heading(rest) {
                articles.push(entry);
            }
        }
    }

    articles
}

fn parse_link_heading(rest: &str) -> Option<(String, String)> {
    let mut title = String::new();
    let mut chars = rest.char_indices();
    let mut close = None;
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => title.push(chars.next()?.1),
            ']' => {
                close = Some(i);
                break;
            }
            _ => title.push(c),
        }
    }
    let target = rest[close? + 1..].trim_end().strip_prefix("(<")?.strip_suffix(">)")?;
    Some((title, unescape(target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::models::{Digest, DigestStatus, Frequency, Topic};

    fn article(id: i64, title: &str, day: u32) -> Article {
        let at = Utc.with_ymd_and_hms(2026, 10, day, 8, 0, 0).unwrap();
        Article {
            id,
            source_id: Some(1),
            topic_id: 1,
            external_id: id.to_string(),
            title: title.to_string(),
            url: format!("https://example.com/{}", id),
            author: Some("Reporter".to_string()),
            summary: Some("A summary of what happened in some detail.".to_string()),
            content: None,
            published_at: Some(at),
            fetched_at: at,
            source_name: Some("Example News".to_string()),
            tags: Vec::new(),
        }
    }

    fn document(articles: Vec<Article>) -> DigestDocument {
        DigestDocument {
            digest: Digest {
                id: "d1".to_string(),
                topic_id: 1,
                frequency: Frequency::Weekly,
                period_start: Utc.with_ymd_and_hms(2026, 10, 11, 0, 0, 0).unwrap(),
                period_end: Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap(),
                article_ids: articles.iter().map(|a| a.id).collect(),
                summary: "Tracked some articles".to_string(),
                generated_at: Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap(),
                status: DigestStatus::Draft,
                blog_name: None,
                published_path: None,
            },
            topic: Topic {
                id: 1,
                name: "news".to_string(),
                description: None,
            },
            articles,
        }
    }

    #[test]
    fn test_markdown_round_trip() {
        let doc = document(vec![
            article(1, "First [draft] story", 12),
            article(2, "Back\\slash", 13),
            article(3, "Third", 14),
        ]);
        let md = render_markdown(&doc, Tz::UTC);
        assert!(md.starts_with("# News Weekly Digest\n"));
        assert!(md.contains("## Top Stories"));

        let parsed = parse_markdown_articles(&md);
        let expected: Vec<(String, String)> = doc
            .articles
            .iter()
            .map(|a| (a.title.clone(), a.url.clone()))
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_link_targets_round_trip_unencoded() {
        let mut spaced = article(1, "Spaced", 12);
        spaced.url = "https://example.com/a b".to_string();
        let mut bracketed = article(2, "Bracketed", 13);
        bracketed.url = "https://example.com/q?x=<1>&p=\\d".to_string();
        let doc = document(vec![spaced, bracketed]);

        let md = render_markdown(&doc, Tz::UTC);
        assert!(md.contains("(<https://example.com/a b>)"));
        let urls: Vec<String> = parse_markdown_articles(&md)
            .into_iter()
            .map(|(_, url)| url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/a b".to_string(),
                "https://example.com/q?x=<1>&p=\\d".to_string()
            ]
        );
    }

    #[test]
    fn test_markdown_empty_digest() {
        let md = render_markdown(&document(vec![]), Tz::UTC);
        assert!(md.contains("_No articles in this period._"));
        assert!(!md.contains("## Top Stories"));
        assert!(parse_markdown_articles(&md).is_empty());
    }

    #[test]
    fn test_whatsapp_options() {
        let doc = document(vec![
            article(1, &"x".repeat(80), 12),
            article(2, "Two", 13),
            article(3, "Three", 14),
        ]);
        let full = render_whatsapp(&doc, &WhatsAppConfig::default(), Tz::UTC);
        assert!(full.starts_with("📊 *News Weekly Digest — Oct 11 – Oct 18*"));
        assert!(full.contains("*🔥 Top Stories*"));
        assert!(full.contains("https://example.com/2"));
        assert!(full.contains(&format!("{}…", "x".repeat(60))));

        let plain = WhatsAppConfig {
            brief: false,
            show_urls: false,
            emoji_header: false,
        };
        let text = render_whatsapp(&doc, &plain, Tz::UTC);
        assert!(text.starts_with("*News Weekly Digest"));
        assert!(!text.contains("https://example.com/2"));
        assert!(!text.contains('📊'));
    }

    #[test]
    fn test_whatsapp_undated_article_uses_fetch_date() {
        let mut undated = article(1, "Undated", 12);
        undated.published_at = None;
        undated.fetched_at = Utc.with_ymd_and_hms(2026, 10, 15, 8, 0, 0).unwrap();
        let doc = document(vec![undated]);
        let text = render_whatsapp(&doc, &WhatsAppConfig::default(), Tz::UTC);
        assert!(text.contains("1. *Undated* — Oct 15"));
    }

    #[test]
    fn test_dates_use_timezone() {
        let doc = document(vec![]);
        let tz: Tz = "Asia/Kolkata".parse().unwrap();
        let text = render_whatsapp(&doc, &WhatsAppConfig::default(), tz);
        // 2026-10-18T00:00Z is 05:30 the same day in Kolkata.
        assert!(text.contains("Oct 11 – Oct 18"));
        let tz: Tz = "America/New_York".parse().unwrap();
        let text = render_whatsapp(&doc, &WhatsAppConfig::default(), tz);
        assert!(text.contains("Oct 10 – Oct 17"));
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_json_render() {
        let doc = document(vec![article(1, "One", 12)]);
        let json = render(&doc, ExportFormat::Json, &WhatsAppConfig::default(), Tz::UTC).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["digest"]["id"], "d1");
        assert_eq!(value["articles"][0]["title"], "One");
    }
}
