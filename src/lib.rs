//! Radio Discovery - spectrum monitoring and content discovery for
//! amateur-radio relay stations
//!
//! Frames from SDR devices are scanned for signals, in-range signals are
//! decoded into content chunks, and decoded chunks land in a bounded,
//! priority-aware cache that other station software queries.

pub mod cache;
pub mod config;
pub mod context;
pub mod decoder;
pub mod device;
pub mod error;
pub mod events;
pub mod monitor;
pub mod protocol;
pub mod scheduler;
pub mod sdr;

pub use cache::{CacheEntry, CacheInstance, CacheQuery, CacheRegistry};
pub use config::StationConfig;
pub use context::StationContext;
pub use decoder::{DecodedTransmission, DecodingConfig, SignalDecoder};
pub use device::{DeviceCapabilities, DeviceRegistry, SpectrumSource};
pub use error::{DiscoveryError, Result};
pub use monitor::{MonitoringConfiguration, MonitoringCoordinator};
pub use sdr::{SignalPeak, SpectrumFrame};
