use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::RawArticle;
use crate::util::{stable_hash, to_db_timestamp};

/// How an identifier is derived for entries that carry no feed GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityFallback {
    /// The entry link, or a hash of title and date when the link is empty.
    #[default]
    Link,
    /// Always a hash of title and date, so tracking parameters or mirrors
    /// of the same story collapse into one record.
    ContentHash,
}

/// Stable identifier of an entry within its source.
pub fn external_id(raw: &RawArticle, fallback: IdentityFallback) -> String {
    if let Some(guid) = raw.guid.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        return guid.to_string();
    }

    let url = raw.url.trim();
    if fallback == IdentityFallback::Link && !url.is_empty() {
        return url.to_string();
    }

    let published = raw
        .published_at
        .as_ref()
        .map(to_db_timestamp)
        .unwrap_or_default();
    format!("sha256:{}", stable_hash(&[raw.title.trim(), &published]))
}

/// Keep only entries whose identifier is neither already stored nor seen
/// earlier in the same batch. The first occurrence wins.
pub fn dedupe(
    candidates: Vec<RawArticle>,
    existing: &HashSet<String>,
    fallback: IdentityFallback,
) -> Vec<(String, RawArticle)> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter_map(|raw| {
            let id = external_id(&raw, fallback);
            if existing.contains(&id) || !seen.insert(id.clone()) {
                tracing::debug!("Skipping known entry {}", id);
                None
            } else {
                Some((id, raw))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn raw(guid: Option<&str>, title: &str, url: &str) -> RawArticle {
        RawArticle {
            guid: guid.map(str::to_string),
            title: title.to_string(),
            url: url.to_string(),
            published_at: Some(Utc.with_ymd_and_hms(2026, 10, 12, 8, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_guid_preferred() {
        let entry = raw(Some("urn:1"), "Title", "https://example.com/a");
        assert_eq!(external_id(&entry, IdentityFallback::Link), "urn:1");
        assert_eq!(external_id(&entry, IdentityFallback::ContentHash), "urn:1");
    }

    #[test]
    fn test_link_fallback() {
        let entry = raw(Some("  "), "Title", "https://example.com/a");
        assert_eq!(
            external_id(&entry, IdentityFallback::Link),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_content_hash_ignores_url() {
        let a = raw(None, "Title", "https://example.com/a?utm=1");
        let b = raw(None, "Title", "https://example.com/a?utm=2");
        let id_a = external_id(&a, IdentityFallback::ContentHash);
        assert!(id_a.starts_with("sha256:"));
        assert_eq!(id_a, external_id(&b, IdentityFallback::ContentHash));
    }

    #[test]
    fn test_missing_link_hashes_title_and_date() {
        let entry = raw(None, "Title", "");
        let id = external_id(&entry, IdentityFallback::Link);
        assert_eq!(id, external_id(&entry.clone(), IdentityFallback::Link));
        assert!(id.starts_with("sha256:"));
    }

    #[test]
    fn test_dedupe_against_existing_and_batch() {
        let existing: HashSet<String> = ["urn:1".to_string()].into_iter().collect();
        let candidates = vec![
            raw(Some("urn:1"), "Old", "https://example.com/1"),
            raw(Some("urn:2"), "First", "https://example.com/2"),
            raw(Some("urn:2"), "Second", "https://example.com/2b"),
            raw(Some("urn:3"), "Third", "https://example.com/3"),
        ];
        let fresh = dedupe(candidates, &existing, IdentityFallback::Link);
        let titles: Vec<&str> = fresh.iter().map(|(_, a)| a.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Third"]);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let candidates = vec![
            raw(Some("urn:1"), "One", "https://example.com/1"),
            raw(Some("urn:2"), "Two", "https://example.com/2"),
        ];
        let first = dedupe(candidates.clone(), &HashSet::new(), IdentityFallback::Link);
        let stored: HashSet<String> = first.into_iter().map(|(id, _)| id).collect();
        assert!(dedupe(candidates, &stored, IdentityFallback::Link).is_empty());
    }
}
