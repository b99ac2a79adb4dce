//! A bounded, concurrently shared cache of discovered chunks
//!
//! Mutations (`insert`, `remove`, `clear`, `cleanup` and the access update
//! inside `get`) take the write lock; `query` and `statistics` take the read
//! lock. Eviction triggered by an insert runs inside the same write section,
//! so the size and entry-count limits hold whenever the lock is released.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, EntryStatus};
use super::policy::{Candidate, EvictionPolicy, PriorityWeights};
use super::query::CacheQuery;
use crate::error::{DiscoveryError, Result};
use crate::events::EventBus;

/// Limits and policy for one cache instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_size_bytes: usize,
    pub max_entries: usize,
    /// TTL given to entries created from decoded transmissions
    pub default_ttl: Duration,
    /// Entries older than this are removed by cleanup
    pub max_age: Duration,
    /// Idle entries with fewer than `min_access_count` hits are removed
    /// by cleanup after this long
    pub max_idle_time: Duration,
    pub min_access_count: u64,
    pub eviction_policy: EvictionPolicy,
    /// Payloads above this many bytes are counted as compression candidates
    pub compression_threshold: usize,
    /// Re-hash payloads on every `get`
    pub verify_on_access: bool,
    /// Upper bound on entries removed by one cleanup pass
    pub cleanup_batch_size: usize,
    pub priority_weights: PriorityWeights,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 50 * 1024 * 1024,
            max_entries: 10_000,
            default_ttl: Duration::from_secs(24 * 3600),
            max_age: Duration::from_secs(7 * 24 * 3600),
            max_idle_time: Duration::from_secs(48 * 3600),
            min_access_count: 2,
            eviction_policy: EvictionPolicy::Priority,
            compression_threshold: 1024,
            verify_on_access: false,
            cleanup_batch_size: 1000,
            priority_weights: PriorityWeights::default(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size_bytes == 0 {
            return Err(DiscoveryError::Validation("max_size_bytes must be > 0".into()));
        }
        if self.max_entries == 0 {
            return Err(DiscoveryError::Validation("max_entries must be > 0".into()));
        }
        if self.default_ttl.is_zero() {
            return Err(DiscoveryError::Validation("default_ttl must be > 0".into()));
        }
        if self.cleanup_batch_size == 0 {
            return Err(DiscoveryError::Validation("cleanup_batch_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvictionReason {
    Capacity,
    Expired,
    MaxAge,
    Idle,
    Corrupted,
    VerificationFailed,
    Explicit,
    Cleared,
    Replaced,
}

/// Notifications raised by cache operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEvent {
    EntryAdded {
        cache_id: String,
        chunk_id: String,
        size: usize,
    },
    EntryAccessed {
        cache_id: String,
        chunk_id: String,
        access_count: u64,
    },
    EntryEvicted {
        cache_id: String,
        chunk_id: String,
        reason: EvictionReason,
    },
    CacheFull {
        cache_id: String,
        required_bytes: usize,
        current_size: usize,
        entries: usize,
    },
    CleanupPerformed {
        cache_id: String,
        removed: usize,
        duration_ms: u64,
    },
}

/// Result of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub scanned: usize,
    pub removed: usize,
    pub freed_bytes: usize,
    pub by_reason: BTreeMap<EvictionReason, usize>,
}

/// Point-in-time view of cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub entries: usize,
    pub current_size: usize,
    pub max_size_bytes: usize,
    /// current_size / max_size_bytes
    pub utilization: f64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub inserts: u64,
    pub rejected_inserts: u64,
    pub evictions: u64,
    pub evictions_by_reason: BTreeMap<EvictionReason, u64>,
    pub cleanups: u64,
    pub corruptions_detected: u64,
    pub compression_candidates: usize,
    pub avg_insert_us: f64,
    pub avg_get_us: f64,
    pub avg_query_us: f64,
    pub avg_cleanup_us: f64,
}

impl std::fmt::Display for CacheStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries, {}/{} bytes ({:.1}%) | hit rate {:.1}% ({} hits, {} misses) | {} evictions | {} rejected",
            self.entries,
            self.current_size,
            self.max_size_bytes,
            self.utilization * 100.0,
            self.hit_rate * 100.0,
            self.hits,
            self.misses,
            self.evictions,
            self.rejected_inserts
        )
    }
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    lru_tick: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    inserts: u64,
    rejected_inserts: u64,
    evictions: BTreeMap<EvictionReason, u64>,
    cleanups: u64,
    corruptions: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Slot>,
    /// lru_tick -> chunk id, oldest first
    lru: BTreeMap<u64, String>,
    next_tick: u64,
    current_size: usize,
    counters: Counters,
}

impl CacheState {
    fn touch_tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove_slot(&mut self, chunk_id: &str, reason: EvictionReason) -> Option<CacheEntry> {
        let slot = self.entries.remove(chunk_id)?;
        self.lru.remove(&slot.lru_tick);
        self.current_size -= slot.entry.size();
        *self.counters.evictions.entry(reason).or_insert(0) += 1;
        Some(slot.entry)
    }
}

/// Running mean of operation latencies
#[derive(Debug, Default, Clone, Copy)]
struct RunningAverage {
    count: u64,
    mean: f64,
}

impl RunningAverage {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        let us = elapsed.as_secs_f64() * 1e6;
        self.mean += (us - self.mean) / self.count as f64;
    }
}

#[derive(Debug, Default)]
struct Timings {
    insert: RunningAverage,
    get: RunningAverage,
    query: RunningAverage,
    cleanup: RunningAverage,
}

/// One named cache
pub struct CacheInstance {
    id: String,
    config: CacheConfig,
    state: RwLock<CacheState>,
    timings: Mutex<Timings>,
    events: Arc<EventBus<CacheEvent>>,
}

impl CacheInstance {
    pub fn new(id: impl Into<String>, config: CacheConfig, events: Arc<EventBus<CacheEvent>>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: id.into(),
            config,
            state: RwLock::new(CacheState::default()),
            timings: Mutex::new(Timings::default()),
            events,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Add an entry, evicting others if needed.
    ///
    /// Invalid entries are rejected with `Validation` and an entry larger
    /// than the whole cache with `Capacity`; in both cases nothing changes.
    /// An existing entry with the same chunk id is replaced.
    pub fn insert(&self, entry: CacheEntry) -> Result<()> {
        let started = Instant::now();
        let result = self.insert_inner(entry);
        self.timings.lock().insert.record(started.elapsed());
        result
    }

    fn insert_inner(&self, entry: CacheEntry) -> Result<()> {
        if let Err(e) = entry.validate() {
            self.state.write().counters.rejected_inserts += 1;
            return Err(e);
        }

        let size = entry.size();
        if size > self.config.max_size_bytes {
            self.state.write().counters.rejected_inserts += 1;
            return Err(DiscoveryError::Capacity(format!(
                "entry {} is {} bytes, cache holds at most {}",
                entry.chunk_id, size, self.config.max_size_bytes
            )));
        }

        let mut state = self.state.write();

        if state.entries.contains_key(&entry.chunk_id) {
            state.remove_slot(&entry.chunk_id, EvictionReason::Replaced);
            self.emit_evicted(&entry.chunk_id, EvictionReason::Replaced);
        }

        let over = |s: &CacheState| {
            s.current_size + size > self.config.max_size_bytes || s.entries.len() >= self.config.max_entries
        };

        if over(&state) {
            warn!(
                "[Cache {}] full ({} bytes, {} entries), evicting for {} bytes",
                self.id,
                state.current_size,
                state.entries.len(),
                size
            );
            self.events.emit(CacheEvent::CacheFull {
                cache_id: self.id.clone(),
                required_bytes: size,
                current_size: state.current_size,
                entries: state.entries.len(),
            });

            let now = Utc::now();
            while over(&state) {
                let victim = self
                    .config
                    .eviction_policy
                    .select_victim(
                        state.entries.values().map(|s| Candidate {
                            entry: &s.entry,
                            lru_tick: s.lru_tick,
                        }),
                        now,
                        &self.config.priority_weights,
                    )
                    .map(|e| e.chunk_id.clone());

                match victim {
                    Some(chunk_id) => {
                        state.remove_slot(&chunk_id, EvictionReason::Capacity);
                        debug!("[Cache {}] evicted {} for capacity", self.id, chunk_id);
                        self.emit_evicted(&chunk_id, EvictionReason::Capacity);
                    }
                    None => {
                        state.counters.rejected_inserts += 1;
                        return Err(DiscoveryError::Capacity(format!(
                            "no eviction candidates left for {} bytes",
                            size
                        )));
                    }
                }
            }
        }

        let tick = state.touch_tick();
        let chunk_id = entry.chunk_id.clone();
        state.lru.insert(tick, chunk_id.clone());
        state.current_size += size;
        state.entries.insert(chunk_id.clone(), Slot { entry, lru_tick: tick });
        state.counters.inserts += 1;

        self.events.emit(CacheEvent::EntryAdded {
            cache_id: self.id.clone(),
            chunk_id,
            size,
        });
        Ok(())
    }

    /// Fetch an entry and mark it used.
    ///
    /// Misses, expired entries and corrupted entries all count as misses.
    pub fn get(&self, chunk_id: &str) -> Result<CacheEntry> {
        let started = Instant::now();
        let result = self.get_inner(chunk_id);
        self.timings.lock().get.record(started.elapsed());
        result
    }

    fn get_inner(&self, chunk_id: &str) -> Result<CacheEntry> {
        let mut state = self.state.write();
        let now = Utc::now();
        let verify = self.config.verify_on_access;

        let outcome = match state.entries.get_mut(chunk_id) {
            None => Err(DiscoveryError::not_found("chunk", chunk_id)),
            Some(slot) => {
                if slot.entry.status == EntryStatus::Valid && slot.entry.is_expired_at(now) {
                    slot.entry.status = EntryStatus::Expired;
                }
                if verify && slot.entry.status == EntryStatus::Valid {
                    if let Err(reason) = slot.entry.check_integrity() {
                        slot.entry.status = EntryStatus::Corrupted;
                        warn!("[Cache {}] entry {} corrupted: {}", self.id, chunk_id, reason);
                    }
                }
                match slot.entry.status {
                    EntryStatus::Valid => {
                        slot.entry.last_accessed = now;
                        slot.entry.access_count += 1;
                        Ok(slot.lru_tick)
                    }
                    EntryStatus::Corrupted | EntryStatus::VerificationFailed => Err(DiscoveryError::Corruption {
                        chunk_id: chunk_id.to_string(),
                        reason: format!("entry status {:?}", slot.entry.status),
                    }),
                    _ => Err(DiscoveryError::not_found("chunk", chunk_id)),
                }
            }
        };

        match outcome {
            Ok(old_tick) => {
                let tick = state.touch_tick();
                state.lru.remove(&old_tick);
                state.lru.insert(tick, chunk_id.to_string());
                state.counters.hits += 1;

                let entry = match state.entries.get_mut(chunk_id) {
                    Some(slot) => {
                        slot.lru_tick = tick;
                        slot.entry.clone()
                    }
                    None => return Err(DiscoveryError::not_found("chunk", chunk_id)),
                };
                self.events.emit(CacheEvent::EntryAccessed {
                    cache_id: self.id.clone(),
                    chunk_id: chunk_id.to_string(),
                    access_count: entry.access_count,
                });
                Ok(entry)
            }
            Err(e) => {
                state.counters.misses += 1;
                if matches!(e, DiscoveryError::Corruption { .. }) {
                    state.counters.corruptions += 1;
                }
                Err(e)
            }
        }
    }

    /// Read-only filtered scan; never touches access metadata
    pub fn query(&self, query: &CacheQuery) -> Vec<CacheEntry> {
        let started = Instant::now();
        let results = {
            let state = self.state.read();
            query.apply(state.entries.values().map(|s| &s.entry))
        };
        self.timings.lock().query.record(started.elapsed());
        results
    }

    /// Remove one entry
    pub fn remove(&self, chunk_id: &str) -> Result<CacheEntry> {
        let removed = self.state.write().remove_slot(chunk_id, EvictionReason::Explicit);
        match removed {
            Some(entry) => {
                self.emit_evicted(chunk_id, EvictionReason::Explicit);
                Ok(entry)
            }
            None => Err(DiscoveryError::not_found("chunk", chunk_id)),
        }
    }

    /// Remove everything; returns the number of entries dropped
    pub fn clear(&self) -> usize {
        let ids: Vec<String> = {
            let mut state = self.state.write();
            let ids: Vec<String> = state.entries.keys().cloned().collect();
            for id in &ids {
                state.remove_slot(id, EvictionReason::Cleared);
            }
            ids
        };
        for id in &ids {
            self.emit_evicted(id, EvictionReason::Cleared);
        }
        info!("[Cache {}] cleared {} entries", self.id, ids.len());
        ids.len()
    }

    /// Evict corrupted, expired, aged-out and idle entries in one pass
    pub fn cleanup(&self) -> CleanupReport {
        let started = Instant::now();
        let now = Utc::now();
        let max_age = to_chrono(self.config.max_age);
        let max_idle = to_chrono(self.config.max_idle_time);

        let mut report = CleanupReport::default();
        let mut removed_ids = Vec::new();
        {
            let mut state = self.state.write();
            report.scanned = state.entries.len();

            let victims: Vec<(String, EvictionReason)> = state
                .entries
                .values()
                .filter_map(|slot| {
                    cleanup_reason(&slot.entry, now, max_age, max_idle, self.config.min_access_count)
                        .map(|r| (slot.entry.chunk_id.clone(), r))
                })
                .take(self.config.cleanup_batch_size)
                .collect();

            for (chunk_id, reason) in victims {
                if let Some(entry) = state.remove_slot(&chunk_id, reason) {
                    report.removed += 1;
                    report.freed_bytes += entry.size();
                    *report.by_reason.entry(reason).or_insert(0) += 1;
                    removed_ids.push((chunk_id, reason));
                }
            }
            state.counters.cleanups += 1;
        }

        for (chunk_id, reason) in &removed_ids {
            self.emit_evicted(chunk_id, *reason);
        }

        let elapsed = started.elapsed();
        self.timings.lock().cleanup.record(elapsed);
        self.events.emit(CacheEvent::CleanupPerformed {
            cache_id: self.id.clone(),
            removed: report.removed,
            duration_ms: elapsed.as_millis() as u64,
        });

        if report.removed > 0 {
            info!(
                "[Cache {}] cleanup removed {} of {} entries ({} bytes)",
                self.id, report.removed, report.scanned, report.freed_bytes
            );
        }
        report
    }

    /// Re-hash a stored payload. A mismatch marks the entry CORRUPTED so
    /// the next cleanup removes it.
    pub fn verify(&self, chunk_id: &str) -> Result<()> {
        let mut state = self.state.write();
        let slot = state
            .entries
            .get_mut(chunk_id)
            .ok_or_else(|| DiscoveryError::not_found("chunk", chunk_id))?;

        match slot.entry.check_integrity() {
            Ok(()) => Ok(()),
            Err(reason) => {
                slot.entry.status = EntryStatus::Corrupted;
                state.counters.corruptions += 1;
                warn!("[Cache {}] entry {} corrupted: {}", self.id, chunk_id, reason);
                Err(DiscoveryError::Corruption {
                    chunk_id: chunk_id.to_string(),
                    reason,
                })
            }
        }
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.state.read().entries.contains_key(chunk_id)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_size(&self) -> usize {
        self.state.read().current_size
    }

    pub fn statistics(&self) -> CacheStatistics {
        let timings = {
            let t = self.timings.lock();
            (t.insert.mean, t.get.mean, t.query.mean, t.cleanup.mean)
        };
        let state = self.state.read();
        let c = &state.counters;
        let lookups = c.hits + c.misses;

        CacheStatistics {
            entries: state.entries.len(),
            current_size: state.current_size,
            max_size_bytes: self.config.max_size_bytes,
            utilization: state.current_size as f64 / self.config.max_size_bytes as f64,
            hits: c.hits,
            misses: c.misses,
            hit_rate: if lookups > 0 { c.hits as f64 / lookups as f64 } else { 0.0 },
            inserts: c.inserts,
            rejected_inserts: c.rejected_inserts,
            evictions: c.evictions.values().sum(),
            evictions_by_reason: c.evictions.clone(),
            cleanups: c.cleanups,
            corruptions_detected: c.corruptions,
            compression_candidates: state
                .entries
                .values()
                .filter(|s| s.entry.size() > self.config.compression_threshold)
                .count(),
            avg_insert_us: timings.0,
            avg_get_us: timings.1,
            avg_query_us: timings.2,
            avg_cleanup_us: timings.3,
        }
    }

    /// Chunk ids from least to most recently used
    pub fn lru_order(&self) -> Vec<String> {
        self.state.read().lru.values().cloned().collect()
    }

    fn emit_evicted(&self, chunk_id: &str, reason: EvictionReason) {
        self.events.emit(CacheEvent::EntryEvicted {
            cache_id: self.id.clone(),
            chunk_id: chunk_id.to_string(),
            reason,
        });
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

fn cleanup_reason(
    entry: &CacheEntry,
    now: DateTime<Utc>,
    max_age: chrono::Duration,
    max_idle: chrono::Duration,
    min_access_count: u64,
) -> Option<EvictionReason> {
    match entry.status {
        EntryStatus::Corrupted => return Some(EvictionReason::Corrupted),
        EntryStatus::VerificationFailed => return Some(EvictionReason::VerificationFailed),
        EntryStatus::Expired | EntryStatus::Evicted => return Some(EvictionReason::Expired),
        EntryStatus::Valid => {}
    }
    if entry.is_expired_at(now) {
        return Some(EvictionReason::Expired);
    }
    if now - entry.discovered_at > max_age {
        return Some(EvictionReason::MaxAge);
    }
    if now - entry.last_accessed > max_idle && entry.access_count < min_access_count {
        return Some(EvictionReason::Idle);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::tests::sample_entry;
    use crate::cache::query::QuerySort;

    fn cache(max_size: usize, max_entries: usize) -> CacheInstance {
        let config = CacheConfig {
            max_size_bytes: max_size,
            max_entries,
            ..CacheConfig::default()
        };
        CacheInstance::new("test", config, Arc::new(EventBus::default())).unwrap()
    }

    #[test]
    fn test_size_invariant_under_pressure() {
        let cache = cache(1024, 4);
        for i in 0..5 {
            cache.insert(sample_entry(&format!("chunk-{}", i), 300)).unwrap();
            assert!(cache.current_size() <= 1024);
            assert!(cache.len() <= 4);
            let listed: usize = cache.query(&CacheQuery::default()).iter().map(|e| e.size()).sum();
            assert_eq!(listed, cache.current_size());
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.contains("chunk-4"));
    }

    #[test]
    fn test_entry_count_limit() {
        let cache = cache(1_000_000, 2);
        for i in 0..4 {
            cache.insert(sample_entry(&format!("c{}", i), 10)).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.statistics().evictions_by_reason.get(&EvictionReason::Capacity), Some(&2));
    }

    #[test]
    fn test_oversized_entry_rejected_without_mutation() {
        let cache = cache(1024, 4);
        cache.insert(sample_entry("keep", 100)).unwrap();
        let err = cache.insert(sample_entry("huge", 2048)).unwrap_err();
        assert!(matches!(err, DiscoveryError::Capacity(_)));
        assert!(cache.contains("keep"));
        assert_eq!(cache.current_size(), 100);
    }

    #[test]
    fn test_invalid_entry_rejected() {
        let cache = cache(1024, 4);
        let mut bad = sample_entry("bad", 10);
        bad.payload.push(1);
        assert!(matches!(cache.insert(bad), Err(DiscoveryError::Validation(_))));
        assert!(cache.is_empty());
        assert_eq!(cache.statistics().rejected_inserts, 1);
    }

    #[test]
    fn test_get_updates_access_and_hit_rate() {
        let cache = cache(4096, 10);
        cache.insert(sample_entry("a", 10)).unwrap();
        cache.insert(sample_entry("b", 10)).unwrap();
        assert_eq!(cache.lru_order(), vec!["a", "b"]);

        let entry = cache.get("a").unwrap();
        assert_eq!(entry.access_count, 1);
        assert_eq!(cache.lru_order(), vec!["b", "a"]);

        assert!(matches!(cache.get("zzz"), Err(DiscoveryError::NotFound { .. })));
        let stats = cache.statistics();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_query_does_not_touch_access() {
        let cache = cache(4096, 10);
        cache.insert(sample_entry("a", 10)).unwrap();
        let before = cache.query(&CacheQuery::default())[0].clone();
        let _ = cache.query(&CacheQuery::default().sort(QuerySort::MostAccessed));
        let after = cache.query(&CacheQuery::default())[0].clone();
        assert_eq!(before.access_count, after.access_count);
        assert_eq!(before.last_accessed, after.last_accessed);
        assert_eq!(cache.statistics().hits, 0);
    }

    #[test]
    fn test_cleanup_removes_expired_regardless_of_access() {
        let cache = cache(4096, 10);
        let now = Utc::now();
        let mut stale = sample_entry("stale", 10);
        stale.discovered_at = now - chrono::Duration::hours(1);
        stale.expires_at = now - chrono::Duration::seconds(1);
        stale.access_count = 1_000;
        cache.insert(stale).unwrap();
        cache.insert(sample_entry("fresh", 10)).unwrap();

        let report = cache.cleanup();
        assert_eq!(report.removed, 1);
        assert_eq!(report.by_reason.get(&EvictionReason::Expired), Some(&1));
        assert!(!cache.contains("stale"));
        assert!(cache.contains("fresh"));
    }

    #[test]
    fn test_cleanup_idle_and_aged() {
        let config = CacheConfig {
            max_idle_time: Duration::from_secs(3600),
            max_age: Duration::from_secs(10 * 3600),
            min_access_count: 2,
            ..CacheConfig::default()
        };
        let cache = CacheInstance::new("t", config, Arc::new(EventBus::default())).unwrap();
        let now = Utc::now();

        let mut idle = sample_entry("idle", 10);
        idle.discovered_at = now - chrono::Duration::hours(3);
        idle.last_accessed = now - chrono::Duration::hours(2);
        let mut popular = idle.clone();
        popular.chunk_id = "popular".into();
        popular.access_count = 5;
        let mut ancient = sample_entry("ancient", 10);
        ancient.discovered_at = now - chrono::Duration::hours(11);
        ancient.access_count = 50;
        ancient.last_accessed = now;

        for e in [idle, popular, ancient] {
            cache.insert(e).unwrap();
        }
        let report = cache.cleanup();
        assert_eq!(report.by_reason.get(&EvictionReason::Idle), Some(&1));
        assert_eq!(report.by_reason.get(&EvictionReason::MaxAge), Some(&1));
        assert!(cache.contains("popular"));
    }

    #[test]
    fn test_corruption_marked_then_cleaned() {
        let cache = cache(4096, 10);
        cache.insert(sample_entry("a", 10)).unwrap();
        {
            let mut state = cache.state.write();
            state.entries.get_mut("a").unwrap().entry.payload[0] ^= 0xFF;
        }
        assert!(matches!(cache.verify("a"), Err(DiscoveryError::Corruption { .. })));
        // Kept for diagnosis until cleanup
        assert!(cache.contains("a"));
        assert!(matches!(cache.get("a"), Err(DiscoveryError::Corruption { .. })));

        let report = cache.cleanup();
        assert_eq!(report.by_reason.get(&EvictionReason::Corrupted), Some(&1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_verify_on_access() {
        let config = CacheConfig {
            verify_on_access: true,
            ..CacheConfig::default()
        };
        let cache = CacheInstance::new("t", config, Arc::new(EventBus::default())).unwrap();
        cache.insert(sample_entry("a", 10)).unwrap();
        cache.state.write().entries.get_mut("a").unwrap().entry.payload[3] ^= 1;
        assert!(matches!(cache.get("a"), Err(DiscoveryError::Corruption { .. })));
        assert_eq!(cache.statistics().corruptions_detected, 1);
    }

    #[test]
    fn test_replace_same_chunk() {
        let cache = cache(4096, 10);
        cache.insert(sample_entry("a", 10)).unwrap();
        cache.insert(sample_entry("a", 30)).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 30);
    }

    #[test]
    fn test_remove_and_clear_emit_events() {
        let bus = Arc::new(EventBus::default());
        let cache = CacheInstance::new("ev", CacheConfig::default(), bus.clone()).unwrap();
        let mut sub = bus.subscribe();

        cache.insert(sample_entry("a", 10)).unwrap();
        cache.insert(sample_entry("b", 10)).unwrap();
        cache.remove("a").unwrap();
        assert!(cache.remove("a").is_err());
        assert_eq!(cache.clear(), 1);

        let mut evicted = Vec::new();
        while let Some(ev) = sub.try_recv() {
            if let CacheEvent::EntryEvicted { chunk_id, reason, .. } = ev {
                evicted.push((chunk_id, reason));
            }
        }
        assert_eq!(
            evicted,
            vec![
                ("a".to_string(), EvictionReason::Explicit),
                ("b".to_string(), EvictionReason::Cleared)
            ]
        );
        assert_eq!(cache.current_size(), 0);
    }

    #[test]
    fn test_cache_full_event() {
        let bus = Arc::new(EventBus::default());
        let config = CacheConfig {
            max_size_bytes: 100,
            max_entries: 10,
            ..CacheConfig::default()
        };
        let cache = CacheInstance::new("full", config, bus.clone()).unwrap();
        let mut sub = bus.subscribe();
        cache.insert(sample_entry("a", 60)).unwrap();
        cache.insert(sample_entry("b", 60)).unwrap();

        let events: Vec<CacheEvent> = std::iter::from_fn(|| sub.try_recv()).collect();
        assert!(events.iter().any(|e| matches!(e, CacheEvent::CacheFull { required_bytes: 60, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, CacheEvent::EntryEvicted { chunk_id, .. } if chunk_id == "a")));
    }

    #[test]
    fn test_concurrent_inserts_hold_invariant() {
        let cache = Arc::new(cache(2048, 8));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.insert(sample_entry(&format!("t{}-{}", t, i), 200)).unwrap();
                        assert!(cache.current_size() <= 2048);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 8);
        assert!(cache.current_size() <= 2048);
    }
}
