//! Data models shared by every stage of the monitor.
//!
//! - [`ArticleStub`]: one listing entry, later enriched with body text
//! - [`SentLedger`]: the in-memory idempotency ledger of delivered links
//! - [`LedgerRecord`]: the on-disk shape of the ledger
//! - [`DigestMessage`]: the rendered notification for a single run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A news item discovered on the listing page.
///
/// `url` is the canonical identifier (session suffix already stripped) and
/// is the key used for deduplication and for the sent ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleStub {
    /// Canonical detail page URL.
    pub url: String,
    /// Headline as shown on the listing.
    pub title: String,
    /// Publication time, when the listing exposes one.
    pub publish_time: Option<DateTime<Utc>>,
    /// Body text. `None` until the content fetcher has run; an empty string
    /// afterwards means extraction failed.
    pub content: Option<String>,
}

impl ArticleStub {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            publish_time: None,
            content: None,
        }
    }

    pub fn with_publish_time(mut self, publish_time: DateTime<Utc>) -> Self {
        self.publish_time = Some(publish_time);
        self
    }

    #[cfg(test)]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Text searched by the keyword filter: title, then body when present.
    pub fn searchable_text(&self) -> String {
        match self.content.as_deref() {
            Some(content) if !content.is_empty() => format!("{} {}", self.title, content),
            _ => self.title.clone(),
        }
    }
}

/// Links that have already been delivered in a digest.
#[derive(Debug, Clone, PartialEq)]
pub struct SentLedger {
    sent: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
}

impl Default for SentLedger {
    fn default() -> Self {
        Self {
            sent: BTreeSet::new(),
            last_updated: Utc::now(),
        }
    }
}

impl SentLedger {
    pub fn contains(&self, url: &str) -> bool {
        self.sent.contains(url)
    }

    /// Returns `true` when the link was not yet present.
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        let added = self.sent.insert(url.into());
        if added {
            self.last_updated = Utc::now();
        }
        added
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

impl From<LedgerRecord> for SentLedger {
    fn from(record: LedgerRecord) -> Self {
        Self {
            sent: record.sent_urls.into_iter().collect(),
            last_updated: record.last_updated,
        }
    }
}

/// Persisted form of [`SentLedger`].
#[derive(Debug, Deserialize, Serialize)]
pub struct LedgerRecord {
    #[serde(default)]
    pub sent_urls: Vec<String>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl From<&SentLedger> for LedgerRecord {
    fn from(ledger: &SentLedger) -> Self {
        Self {
            sent_urls: ledger.sent.iter().cloned().collect(),
            last_updated: ledger.last_updated,
        }
    }
}

/// A rendered digest, ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestMessage {
    pub subject: String,
    pub plain_body: String,
    pub rich_body: String,
    pub items: Vec<ArticleStub>,
}

impl DigestMessage {
    /// Links carried by this digest, in presentation order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_searchable_text_without_content() {
        let stub = ArticleStub::new("https://example.com/a", "Title");
        assert_eq!(stub.searchable_text(), "Title");

        let stub = stub.with_content("");
        assert_eq!(stub.searchable_text(), "Title");
    }

    #[test]
    fn test_searchable_text_with_content() {
        let stub = ArticleStub::new("https://example.com/a", "Title").with_content("Body text");
        assert_eq!(stub.searchable_text(), "Title Body text");
    }

    #[test]
    fn test_ledger_insert_is_idempotent() {
        let mut ledger = SentLedger::default();
        assert!(ledger.insert("https://example.com/a"));
        assert!(!ledger.insert("https://example.com/a"));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains("https://example.com/a"));
    }

    #[test]
    fn test_ledger_record_deserialization() {
        let json = r#"{
            "sent_urls": ["https://example.com/a", "https://example.com/b"],
            "last_updated": "2025-05-06T08:00:00Z"
        }"#;

        let record: LedgerRecord = serde_json::from_str(json).unwrap();
        let ledger = SentLedger::from(record);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("https://example.com/b"));
    }

    #[test]
    fn test_ledger_record_tolerates_missing_fields() {
        let record: LedgerRecord = serde_json::from_str("{}").unwrap();
        assert!(record.sent_urls.is_empty());
    }
}
