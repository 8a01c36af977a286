use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::RawArticle;
use crate::util::parse_datetime;

use super::rss::{html_to_text, normalize_whitespace};

/// Turn a fetched page into a single article. The page URL is its identity.
pub fn extract_page(html: &str, url: &str) -> RawArticle {
    let meta = |names: &[&str]| names.iter().find_map(|name| meta_content(html, name));

    let title = meta(&["og:title"])
        .or_else(|| title_tag(html))
        .map(|t| normalize_whitespace(&t))
        .unwrap_or_else(|| url.to_string());
    let published_at = meta(&["article:published_time", "published_time", "date"])
        .and_then(|s| parse_published(&s));
    let site_name = meta(&["og:site_name"]).or_else(|| {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    });

    RawArticle {
        guid: None,
        title,
        url: url.to_string(),
        author: meta(&["author", "article:author"]),
        summary: meta(&["description", "og:description"]),
        content: main_text(html),
        published_at,
        source_name: site_name,
        tags: Vec::new(),
    }
}

/// Value of `<meta name|property="..." content="...">`, in either attribute order.
fn meta_content(html: &str, name: &str) -> Option<String> {
    let name = regex::escape(name);
    let patterns = [
        format!(
            r#"(?is)<meta[^>]+(?:name|property)\s*=\s*["']{}["'][^>]*content\s*=\s*["']([^"']*)["']"#,
            name
        ),
        format!(
            r#"(?is)<meta[^>]+content\s*=\s*["']([^"']*)["'][^>]*(?:name|property)\s*=\s*["']{}["']"#,
            name
        ),
    ];
    patterns.iter().find_map(|pattern| {
        let re = Regex::new(pattern).ok()?;
        let value = re.captures(html)?.get(1)?.as_str().trim();
        if value.is_empty() {
            None
        } else {
            Some(decode_entities(value))
        }
    })
}

fn title_tag(html: &str) -> Option<String> {
    let re = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?;
    let title = re.captures(html)?.get(1)?.as_str().trim();
    if title.is_empty() {
        None
    } else {
        Some(decode_entities(title))
    }
}

/// Text of the `<article>` element when present, else of the whole page.
fn main_text(html: &str) -> Option<String> {
    let article = Regex::new(r"(?is)<article[^>]*>.*?</article>")
        .ok()
        .and_then(|re| re.find(html).map(|m| m.as_str()));
    let text = html_to_text(article.unwrap_or(html))?;
    let cleaned = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn parse_published(s: &str) -> Option<DateTime<Utc>> {
    parse_datetime(s).or_else(|| {
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}
