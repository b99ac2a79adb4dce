//! Named cache instances owned by the station context

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::entry::CacheEntry;
use super::instance::{CacheConfig, CacheEvent, CacheInstance, CacheStatistics, CleanupReport};
use super::query::CacheQuery;
use crate::error::{DiscoveryError, Result};
use crate::events::{EventBus, Subscription};

/// All cache instances of one station, sharing one event bus
pub struct CacheRegistry {
    caches: RwLock<BTreeMap<String, Arc<CacheInstance>>>,
    events: Arc<EventBus<CacheEvent>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            caches: RwLock::new(BTreeMap::new()),
            events: Arc::new(EventBus::default()),
        }
    }

    /// Create a cache; an existing id is a `Conflict`
    pub fn create(&self, id: &str, config: CacheConfig) -> Result<Arc<CacheInstance>> {
        let mut caches = self.caches.write();
        if caches.contains_key(id) {
            return Err(DiscoveryError::Conflict(format!("cache '{}' already exists", id)));
        }
        let instance = Arc::new(CacheInstance::new(id, config, self.events.clone())?);
        caches.insert(id.to_string(), instance.clone());
        info!(
            "[Cache {}] created ({} bytes, {} entries, {:?})",
            id,
            instance.config().max_size_bytes,
            instance.config().max_entries,
            instance.config().eviction_policy
        );
        Ok(instance)
    }

    pub fn get(&self, id: &str) -> Result<Arc<CacheInstance>> {
        self.caches
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DiscoveryError::not_found("cache", id))
    }

    /// Drop a cache and everything in it
    pub fn remove(&self, id: &str) -> Result<()> {
        let removed = self.caches.write().remove(id);
        match removed {
            Some(cache) => {
                cache.clear();
                info!("[Cache {}] removed", id);
                Ok(())
            }
            None => Err(DiscoveryError::not_found("cache", id)),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// Events from every cache in the registry
    pub fn subscribe(&self) -> Subscription<CacheEvent> {
        self.events.subscribe()
    }

    pub fn insert(&self, cache_id: &str, entry: CacheEntry) -> Result<()> {
        self.get(cache_id)?.insert(entry)
    }

    pub fn get_entry(&self, cache_id: &str, chunk_id: &str) -> Result<CacheEntry> {
        self.get(cache_id)?.get(chunk_id)
    }

    pub fn query(&self, cache_id: &str, query: &CacheQuery) -> Result<Vec<CacheEntry>> {
        Ok(self.get(cache_id)?.query(query))
    }

    pub fn remove_entry(&self, cache_id: &str, chunk_id: &str) -> Result<CacheEntry> {
        self.get(cache_id)?.remove(chunk_id)
    }

    pub fn clear(&self, cache_id: &str) -> Result<usize> {
        Ok(self.get(cache_id)?.clear())
    }

    pub fn cleanup(&self, cache_id: &str) -> Result<CleanupReport> {
        Ok(self.get(cache_id)?.cleanup())
    }

    /// Run cleanup on every cache; used by the periodic sweep
    pub fn cleanup_all(&self) -> Vec<(String, CleanupReport)> {
        // Snapshot so a slow sweep does not hold the registry lock
        let caches: Vec<Arc<CacheInstance>> = self.caches.read().values().cloned().collect();
        caches
            .into_iter()
            .map(|c| (c.id().to_string(), c.cleanup()))
            .collect()
    }

    pub fn statistics(&self) -> Vec<(String, CacheStatistics)> {
        self.caches
            .read()
            .iter()
            .map(|(id, c)| (id.clone(), c.statistics()))
            .collect()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
