//! Read-only cache queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{CacheEntry, EntryStatus};
use crate::protocol::ContentType;

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuerySort {
    Newest,
    Oldest,
    HighestQuality,
    MostAccessed,
    Largest,
    Smallest,
}

/// Filter over cache entries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheQuery {
    pub content_hash: Option<String>,
    pub source_callsign: Option<String>,
    pub content_type: Option<ContentType>,
    pub min_snr: Option<f64>,
    /// Inclusive bounds on `discovered_at`
    pub discovered_after: Option<DateTime<Utc>>,
    pub discovered_before: Option<DateTime<Utc>>,
    /// Also return expired or corrupted entries still awaiting cleanup
    pub include_invalid: bool,
    pub sort: Option<QuerySort>,
    pub limit: Option<usize>,
}

impl CacheQuery {
    pub fn by_hash(hash: impl Into<String>) -> Self {
        Self {
            content_hash: Some(hash.into()),
            ..Self::default()
        }
    }

    pub fn by_callsign(callsign: impl Into<String>) -> Self {
        Self {
            source_callsign: Some(callsign.into()),
            ..Self::default()
        }
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn min_snr(mut self, snr: f64) -> Self {
        self.min_snr = Some(snr);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.discovered_after = Some(from);
        self.discovered_before = Some(to);
        self
    }

    pub fn sort(mut self, sort: QuerySort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &CacheEntry) -> bool {
        if !self.include_invalid && entry.status != EntryStatus::Valid {
            return false;
        }
        if let Some(hash) = &self.content_hash {
            if !entry.content_hash.eq_ignore_ascii_case(hash) {
                return false;
            }
        }
        if let Some(cs) = &self.source_callsign {
            if !entry.source_callsign.eq_ignore_ascii_case(cs) {
                return false;
            }
        }
        if let Some(ct) = self.content_type {
            if entry.metadata.content_type != ct {
                return false;
            }
        }
        if let Some(min) = self.min_snr {
            if entry.signal_quality.snr < min {
                return false;
            }
        }
        if let Some(after) = self.discovered_after {
            if entry.discovered_at < after {
                return false;
            }
        }
        if let Some(before) = self.discovered_before {
            if entry.discovered_at > before {
                return false;
            }
        }
        true
    }

    /// Filter, sort and truncate; entries are cloned out
    pub(crate) fn apply<'a, I>(&self, entries: I) -> Vec<CacheEntry>
    where
        I: IntoIterator<Item = &'a CacheEntry>,
    {
        let mut hits: Vec<&CacheEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();

        // Chunk id as the final key keeps results stable across HashMap order
        match self.sort {
            Some(QuerySort::Newest) => hits.sort_by(|a, b| {
                b.discovered_at.cmp(&a.discovered_at).then_with(|| a.chunk_id.cmp(&b.chunk_id))
            }),
            Some(QuerySort::Oldest) => hits.sort_by(|a, b| {
                a.discovered_at.cmp(&b.discovered_at).then_with(|| a.chunk_id.cmp(&b.chunk_id))
            }),
            Some(QuerySort::HighestQuality) => hits.sort_by(|a, b| {
                b.signal_quality
                    .score()
                    .total_cmp(&a.signal_quality.score())
                    .then_with(|| a.chunk_id.cmp(&b.chunk_id))
            }),
            Some(QuerySort::MostAccessed) => hits.sort_by(|a, b| {
                b.access_count.cmp(&a.access_count).then_with(|| a.chunk_id.cmp(&b.chunk_id))
            }),
            Some(QuerySort::Largest) => {
                hits.sort_by(|a, b| b.size().cmp(&a.size()).then_with(|| a.chunk_id.cmp(&b.chunk_id)))
            }
            Some(QuerySort::Smallest) => {
                hits.sort_by(|a, b| a.size().cmp(&b.size()).then_with(|| a.chunk_id.cmp(&b.chunk_id)))
            }
            None => hits.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id)),
        }

        let limit = self.limit.unwrap_or(usize::MAX);
        hits.into_iter().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::tests::{quality, sample_entry};
    use chrono::Duration;

    fn entries() -> Vec<CacheEntry> {
        let now = Utc::now();
        let mut a = sample_entry("a", 100);
        a.discovered_at = now - Duration::hours(3);
        a.signal_quality = quality(25.0);
        a.access_count = 1;

        let mut b = sample_entry("b", 10);
        b.source_callsign = "K2ABC".into();
        b.metadata.content_type = ContentType::Text;
        b.discovered_at = now - Duration::hours(1);
        b.signal_quality = quality(8.0);
        b.access_count = 7;

        let mut c = sample_entry("c", 50);
        c.discovered_at = now - Duration::hours(2);
        c.status = EntryStatus::Expired;
        vec![a, b, c]
    }

    fn ids(results: &[CacheEntry]) -> Vec<&str> {
        results.iter().map(|e| e.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_filters() {
        let all = entries();
        assert_eq!(ids(&CacheQuery::default().apply(&all)), vec!["a", "b"]);
        assert_eq!(ids(&CacheQuery::by_callsign("k2abc").apply(&all)), vec!["b"]);
        assert_eq!(
            ids(&CacheQuery::default().content_type(ContentType::Binary).apply(&all)),
            vec!["a"]
        );
        assert_eq!(ids(&CacheQuery::default().min_snr(10.0).apply(&all)), vec!["a"]);

        let hash = all[1].content_hash.clone();
        let by_hash = CacheQuery::by_hash(hash).apply(&all);
        assert_eq!(ids(&by_hash), vec!["b"]);
    }

    #[test]
    fn test_time_range_and_invalid() {
        let all = entries();
        let now = Utc::now();
        let q = CacheQuery {
            include_invalid: true,
            ..CacheQuery::default()
        }
        .between(now - Duration::minutes(150), now);
        assert_eq!(ids(&q.apply(&all)), vec!["b", "c"]);
    }

    #[test]
    fn test_sorting_and_limit() {
        let all = entries();
        let q = |s| CacheQuery::default().sort(s);
        assert_eq!(ids(&q(QuerySort::Newest).apply(&all)), vec!["b", "a"]);
        assert_eq!(ids(&q(QuerySort::Oldest).apply(&all)), vec!["a", "b"]);
        assert_eq!(ids(&q(QuerySort::HighestQuality).apply(&all)), vec!["a", "b"]);
        assert_eq!(ids(&q(QuerySort::MostAccessed).apply(&all)), vec!["b", "a"]);
        assert_eq!(ids(&q(QuerySort::Largest).apply(&all)), vec!["a", "b"]);
        assert_eq!(ids(&q(QuerySort::Smallest).apply(&all)), vec!["b", "a"]);
        assert_eq!(ids(&q(QuerySort::Largest).limit(1).apply(&all)), vec!["a"]);
    }
}
