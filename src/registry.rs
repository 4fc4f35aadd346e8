//! Capacity-bounded, URL-keyed catalog of discovered streams.
//!
//! Records are created once per distinct URL and never modified. Once the
//! registry is full, further inserts are rejected rather than evicting
//! older entries.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::StreamKind;
use crate::title::{derive_title, DEFAULT_TITLE_MAX_LEN};

/// Default registry capacity.
pub const DEFAULT_MAX_STREAMS: usize = 100;

/// Which observation point first reported a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// Intercepted fetch-style call.
    Fetch,
    /// Intercepted XHR `open`.
    Xhr,
    /// Incremental scan of inserted DOM nodes.
    Mutation,
    /// Media element lifecycle event.
    MediaEvent,
    /// Periodic full-document sweep.
    Sweep,
    /// Direct insert by the embedder.
    Manual,
}

impl DiscoverySource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Xhr => "xhr",
            Self::Mutation => "mutation",
            Self::MediaEvent => "media_event",
            Self::Sweep => "sweep",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub id: Uuid,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: StreamKind,
    /// Short display title derived from the URL.
    pub title: String,
    pub discovered_at: DateTime<Utc>,
    pub source: DiscoverySource,
}

/// Why an insert was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectReason {
    /// The URL is already catalogued.
    Duplicate,
    /// The registry holds `max_streams` records.
    Capacity,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => f.write_str("duplicate"),
            Self::Capacity => f.write_str("capacity"),
        }
    }
}

/// Result of [`StreamRegistry::insert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(StreamRecord),
    Rejected(RejectReason),
}

impl InsertOutcome {
    #[must_use]
    pub fn inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    #[must_use]
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Inserted(_) => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }

    #[must_use]
    pub fn record(&self) -> Option<&StreamRecord> {
        match self {
            Self::Inserted(record) => Some(record),
            Self::Rejected(_) => None,
        }
    }
}

/// Insertion-ordered URL → [`StreamRecord`] map with a hard size cap
#[derive(Debug, Clone)]
pub struct StreamRegistry {
    records: Vec<StreamRecord>,
    index: HashMap<String, usize>,
    max_streams: usize,
    title_max_len: usize,
}

impl StreamRegistry {
    /// Registry holding at most `max_streams` records.
    #[must_use]
    pub fn new(max_streams: usize) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            max_streams,
            title_max_len: DEFAULT_TITLE_MAX_LEN,
        }
    }

    /// Set the maximum derived-title length.
    #[must_use]
    pub fn with_title_max_len(mut self, title_max_len: usize) -> Self {
        self.title_max_len = title_max_len;
        self
    }

    /// Insert a classified URL as a manual discovery.
    pub fn insert(&mut self, url: &str, kind: StreamKind) -> InsertOutcome {
        self.insert_from(url, kind, DiscoverySource::Manual)
    }

    /// Insert a classified URL reported by `source`.
    ///
    /// Duplicates are checked before capacity, so re-reporting a known URL
    /// on a full registry still reads as a duplicate.
    pub fn insert_from(
        &mut self,
        url: &str,
        kind: StreamKind,
        source: DiscoverySource,
    ) -> InsertOutcome {
        if self.index.contains_key(url) {
            return InsertOutcome::Rejected(RejectReason::Duplicate);
        }
        if self.records.len() >= self.max_streams {
            return InsertOutcome::Rejected(RejectReason::Capacity);
        }

        let record = StreamRecord {
            id: Uuid::new_v4(),
            url: url.to_string(),
            kind,
            title: derive_title(url, self.title_max_len),
            discovered_at: Utc::now(),
            source,
        };

        self.index.insert(record.url.clone(), self.records.len());
        self.records.push(record.clone());
        InsertOutcome::Inserted(record)
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&StreamRecord> {
        self.index.get(url).map(|&position| &self.records[position])
    }

    /// Records in insertion order. Call again to restart.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &StreamRecord> + '_ {
        self.records.iter()
    }

    /// Records whose URL, type or title contains `keyword` (case-insensitive).
    pub fn search<'a>(&'a self, keyword: &str) -> impl Iterator<Item = &'a StreamRecord> + 'a {
        let needle = keyword.to_lowercase();
        self.records.iter().filter(move |record| {
            record.url.to_lowercase().contains(&needle)
                || record.kind.as_str().contains(&needle)
                || record.title.to_lowercase().contains(&needle)
        })
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_streams
    }

    #[must_use]
    pub fn max_streams(&self) -> usize {
        self.max_streams
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STREAMS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_is_a_no_op() {
        let mut registry = StreamRegistry::default();
        let first = registry.insert("https://a/video.mp4", StreamKind::Video);
        assert!(first.inserted());
        let original = registry.get("https://a/video.mp4").unwrap().clone();

        let second = registry.insert("https://a/video.mp4", StreamKind::Video);
        assert!(!second.inserted());
        assert_eq!(second.reason(), Some(RejectReason::Duplicate));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("https://a/video.mp4"), Some(&original));
    }

    #[test]
    fn capacity_rejects_without_evicting() {
        let mut registry = StreamRegistry::new(2);
        assert!(registry.insert("https://a/1.mp4", StreamKind::Video).inserted());
        assert!(registry.insert("https://a/2.m3u8", StreamKind::M3u8).inserted());
        let third = registry.insert("https://a/3.mp4", StreamKind::Video);

        assert_eq!(third.reason(), Some(RejectReason::Capacity));
        assert_eq!(registry.len(), 2);
        assert!(registry.is_full());
        let urls: Vec<&str> = registry.list().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/1.mp4", "https://a/2.m3u8"]);
    }

    #[test]
    fn duplicate_reported_before_capacity() {
        let mut registry = StreamRegistry::new(1);
        registry.insert("https://a/1.mp4", StreamKind::Video);
        let outcome = registry.insert("https://a/1.mp4", StreamKind::Video);
        assert_eq!(outcome.reason(), Some(RejectReason::Duplicate));
    }

    #[test]
    fn list_is_restartable_and_ordered() {
        let mut registry = StreamRegistry::default();
        registry.insert("https://a/b.m3u8", StreamKind::M3u8);
        registry.insert("https://a/a.mp4", StreamKind::Video);

        let first: Vec<_> = registry.list().cloned().collect();
        let second: Vec<_> = registry.list().cloned().collect();
        assert_eq!(first, second);
        assert_eq!(first[0].url, "https://a/b.m3u8");
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn records_carry_title_and_source() {
        let mut registry = StreamRegistry::default();
        let outcome = registry.insert_from(
            "https://cdn.test/live/news_hd.m3u8",
            StreamKind::M3u8,
            DiscoverySource::Fetch,
        );
        let record = outcome.record().unwrap();
        assert_eq!(record.title, "News Hd");
        assert_eq!(record.source, DiscoverySource::Fetch);
    }

    #[test]
    fn clear_empties_everything() {
        let mut registry = StreamRegistry::new(1);
        registry.insert("https://a/1.mp4", StreamKind::Video);
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.contains("https://a/1.mp4"));
        assert!(registry.insert("https://a/2.mp4", StreamKind::Video).inserted());
    }

    #[test]
    fn search_matches_url_type_and_title() {
        let mut registry = StreamRegistry::default();
        registry.insert("https://cdn.test/show.m3u8", StreamKind::M3u8);
        registry.insert("https://cdn.test/clip.mp4", StreamKind::Video);

        assert_eq!(registry.search("CLIP").count(), 1);
        assert_eq!(registry.search("m3u8").count(), 1);
        assert_eq!(registry.search("video").count(), 1);
        assert_eq!(registry.search("cdn.test").count(), 2);
    }

    #[test]
    fn record_serializes_kind_as_type() {
        let mut registry = StreamRegistry::default();
        let outcome = registry.insert("https://a/x.mpd", StreamKind::Dash);
        let json = serde_json::to_value(outcome.record().unwrap()).unwrap();
        assert_eq!(json["type"], "dash");
        assert_eq!(json["source"], "manual");
    }
}
