//! Eviction policies and priority scoring

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{CacheEntry, TrustLevel};
use crate::error::DiscoveryError;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Which entry goes first when space is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Lowest priority score first, ties by least recent access
    #[default]
    Priority,
    /// Least recently used first
    Lru,
    /// Soonest expiry first
    Ttl,
    /// Largest payload first
    SizeFirst,
}

impl FromStr for EvictionPolicy {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(Self::Priority),
            "lru" => Ok(Self::Lru),
            "ttl" => Ok(Self::Ttl),
            "size" | "size_first" | "size-first" => Ok(Self::SizeFirst),
            other => Err(DiscoveryError::Validation(format!(
                "unknown eviction policy '{}'",
                other
            ))),
        }
    }
}

/// Constants of the priority score. Defaults are the field-tested values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    /// Multiplier on `ln(max(1, access_count))`
    pub access_log_weight: f64,
    /// Accesses within this many hours earn a recency bonus
    pub recency_window_hours: f64,
    pub recency_points_per_hour: f64,
    pub high_snr_threshold: f64,
    pub high_snr_bonus: f64,
    pub medium_snr_threshold: f64,
    pub medium_snr_bonus: f64,
    pub high_trust_bonus: f64,
    pub medium_trust_bonus: f64,
    pub http_bonus: f64,
    pub size_penalty_per_mb: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            access_log_weight: 10.0,
            recency_window_hours: 24.0,
            recency_points_per_hour: 2.0,
            high_snr_threshold: 15.0,
            high_snr_bonus: 20.0,
            medium_snr_threshold: 10.0,
            medium_snr_bonus: 10.0,
            high_trust_bonus: 15.0,
            medium_trust_bonus: 10.0,
            http_bonus: 10.0,
            size_penalty_per_mb: 5.0,
        }
    }
}

/// Retention score of an entry; higher survives longer. Never negative.
pub fn priority_score(entry: &CacheEntry, now: DateTime<Utc>, w: &PriorityWeights) -> f64 {
    let access = w.access_log_weight * (entry.access_count.max(1) as f64).ln();

    let hours_since_access =
        ((now - entry.last_accessed).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
    let recency = (w.recency_window_hours - hours_since_access).max(0.0) * w.recency_points_per_hour;

    let snr = entry.signal_quality.snr;
    let quality = if snr > w.high_snr_threshold {
        w.high_snr_bonus
    } else if snr > w.medium_snr_threshold {
        w.medium_snr_bonus
    } else {
        0.0
    };

    let trust = match entry.verification.trust_level {
        TrustLevel::High => w.high_trust_bonus,
        TrustLevel::Medium => w.medium_trust_bonus,
        TrustLevel::Low | TrustLevel::Untrusted => 0.0,
    };

    let content = if entry.is_http() { w.http_bonus } else { 0.0 };

    let size_penalty = w.size_penalty_per_mb * (entry.size() as f64 / BYTES_PER_MB);

    (access + recency + quality + trust + content - size_penalty).max(0.0)
}

/// An entry considered for eviction, with its position in LRU order
/// (lower = touched longer ago)
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub entry: &'a CacheEntry,
    pub lru_tick: u64,
}

impl EvictionPolicy {
    /// Pick the entry to evict next, if any
    pub fn select_victim<'a, I>(&self, candidates: I, now: DateTime<Utc>, weights: &PriorityWeights) -> Option<&'a CacheEntry>
    where
        I: IntoIterator<Item = Candidate<'a>>,
    {
        let iter = candidates.into_iter();
        let victim = match self {
            EvictionPolicy::Priority => iter
                .map(|c| (priority_score(c.entry, now, weights), c))
                .min_by(|(sa, a), (sb, b)| sa.total_cmp(sb).then_with(|| least_recent_first(a, b)))
                .map(|(_, c)| c),
            EvictionPolicy::Lru => iter.min_by(|a, b| a.lru_tick.cmp(&b.lru_tick)),
            EvictionPolicy::Ttl => iter.min_by(|a, b| {
                a.entry
                    .expires_at
                    .cmp(&b.entry.expires_at)
                    .then(a.lru_tick.cmp(&b.lru_tick))
            }),
            EvictionPolicy::SizeFirst => iter.min_by(|a, b| match b.entry.size().cmp(&a.entry.size()) {
                Ordering::Equal => a.lru_tick.cmp(&b.lru_tick),
                other => other,
            }),
        };

        victim.map(|c| c.entry)
    }
}

fn least_recent_first(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.entry
        .last_accessed
        .cmp(&b.entry.last_accessed)
        .then(a.lru_tick.cmp(&b.lru_tick))
}
