//! Auto-discovery cache of decoded content chunks

pub mod entry;
pub mod instance;
pub mod policy;
pub mod query;
pub mod registry;

pub use entry::{
    hash_payload, CacheEntry, ContentMetadata, EntryStatus, SignalQuality, TrustLevel, VerificationInfo,
};
pub use instance::{CacheConfig, CacheEvent, CacheInstance, CacheStatistics, CleanupReport, EvictionReason};
pub use policy::{priority_score, EvictionPolicy, PriorityWeights};
pub use query::{CacheQuery, QuerySort};
pub use registry::CacheRegistry;
