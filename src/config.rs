//! Configuration loaded from environment variables

use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheConfig, EvictionPolicy};
use crate::decoder::DecoderPoolConfig;
use crate::error::{DiscoveryError, Result};
use crate::monitor::{AllocationOptions, AllocationStrategy, PrimaryDeviceStrategy};
use crate::protocol::is_valid_callsign;

/// Cache created by the station for decoded content
pub const DEFAULT_CACHE_ID: &str = "discovered";

/// Station configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StationConfig {
    /// Operator callsign, used in logs
    pub station_callsign: String,

    /// Limits of the discovery cache
    pub cache: CacheConfig,

    /// Period of the cache cleanup sweep
    pub cache_cleanup_interval: Duration,

    /// Decode worker pool sizing
    pub decoder_pool: DecoderPoolConfig,

    /// Default sampling rate for monitoring sessions
    pub monitor_update_rate_hz: f64,

    /// How watch lists are spread across devices
    pub allocation: AllocationOptions,

    /// Interval between statistics log lines
    pub stats_report_interval: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_callsign: "N0CALL".to_string(),
            cache: CacheConfig::default(),
            cache_cleanup_interval: Duration::from_secs(300),
            decoder_pool: DecoderPoolConfig::default(),
            monitor_update_rate_hz: 10.0,
            allocation: AllocationOptions::default(),
            stats_report_interval: Duration::from_secs(10),
        }
    }
}

impl StationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cache = &defaults.cache;

        Self {
            station_callsign: std::env::var("STATION_CALLSIGN")
                .map(|s| s.trim().to_ascii_uppercase())
                .unwrap_or_else(|_| defaults.station_callsign.clone()),

            cache: CacheConfig {
                max_size_bytes: env_or("CACHE_MAX_BYTES", cache.max_size_bytes),
                max_entries: env_or("CACHE_MAX_ENTRIES", cache.max_entries),
                default_ttl: env_secs("CACHE_DEFAULT_TTL_SECS", cache.default_ttl),
                max_age: env_secs("CACHE_MAX_AGE_SECS", cache.max_age),
                max_idle_time: env_secs("CACHE_MAX_IDLE_SECS", cache.max_idle_time),
                min_access_count: env_or("CACHE_MIN_ACCESS_COUNT", cache.min_access_count),
                eviction_policy: env_or::<EvictionPolicy>("CACHE_EVICTION_POLICY", cache.eviction_policy),
                compression_threshold: env_or("CACHE_COMPRESSION_THRESHOLD", cache.compression_threshold),
                ..cache.clone()
            },

            cache_cleanup_interval: env_secs("CACHE_CLEANUP_INTERVAL_SECS", defaults.cache_cleanup_interval),

            decoder_pool: DecoderPoolConfig {
                max_workers: env_or("DECODER_MAX_WORKERS", defaults.decoder_pool.max_workers),
                queue_capacity: env_or("DECODER_QUEUE_CAPACITY", defaults.decoder_pool.queue_capacity),
            },

            monitor_update_rate_hz: env_or("MONITOR_UPDATE_RATE_HZ", defaults.monitor_update_rate_hz),

            allocation: AllocationOptions {
                strategy: env_or::<AllocationStrategy>("ALLOCATION_STRATEGY", defaults.allocation.strategy),
                primary: env_or::<PrimaryDeviceStrategy>("PRIMARY_DEVICE_STRATEGY", defaults.allocation.primary),
                redundancy_enabled: defaults.allocation.redundancy_enabled,
                critical_frequency_redundancy: env_or(
                    "CRITICAL_REDUNDANCY",
                    defaults.allocation.critical_frequency_redundancy,
                ),
            },

            stats_report_interval: env_secs("STATS_REPORT_INTERVAL_SECS", defaults.stats_report_interval),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_callsign(&self.station_callsign) {
            return Err(DiscoveryError::Validation(format!(
                "invalid station callsign '{}'",
                self.station_callsign
            )));
        }
        self.cache.validate()?;
        if self.decoder_pool.max_workers == 0 || self.decoder_pool.queue_capacity == 0 {
            return Err(DiscoveryError::Validation(
                "decoder pool needs workers and queue capacity".into(),
            ));
        }
        if !(self.monitor_update_rate_hz > 0.0) {
            return Err(DiscoveryError::Validation("monitor update rate must be > 0".into()));
        }
        if self.cache_cleanup_interval.is_zero() || self.stats_report_interval.is_zero() {
            return Err(DiscoveryError::Validation("intervals must be > 0".into()));
        }
        Ok(())
    }
}

/// Parse `key` or fall back to `default` when unset or malformed
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
