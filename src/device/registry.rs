//! Connected devices and their per-device counters

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;

use super::capabilities::DeviceInfo;
use super::source::SpectrumSource;
use crate::error::{DiscoveryError, Result};

/// Statistics for a single device
#[derive(Debug, Default)]
pub struct DeviceStats {
    pub frames_acquired: AtomicU64,
    pub acquisition_errors: AtomicU64,
    pub peaks_detected: AtomicU64,
    pub decodes_submitted: AtomicU64,
}

impl DeviceStats {
    pub fn record_frame(&self, peaks: usize) {
        self.frames_acquired.fetch_add(1, Ordering::Relaxed);
        self.peaks_detected.fetch_add(peaks as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.acquisition_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode(&self) {
        self.decodes_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_frames(&self) -> u64 {
        self.frames_acquired.load(Ordering::Relaxed)
    }

    pub fn get_errors(&self) -> u64 {
        self.acquisition_errors.load(Ordering::Relaxed)
    }

    pub fn get_peaks(&self) -> u64 {
        self.peaks_detected.load(Ordering::Relaxed)
    }

    pub fn get_decodes(&self) -> u64 {
        self.decodes_submitted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for DeviceStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} peaks, {} decodes, {} errors",
            self.get_frames(),
            self.get_peaks(),
            self.get_decodes(),
            self.get_errors()
        )
    }
}

struct DeviceState {
    source: Arc<dyn SpectrumSource>,
    info: DeviceInfo,
    stats: Arc<DeviceStats>,
}

/// Devices known to the station, keyed by device id
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<String, DeviceState>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: Arc<dyn SpectrumSource>) -> Result<DeviceInfo> {
        let id = source.device_id().to_string();
        let mut devices = self.devices.write();
        if devices.contains_key(&id) {
            return Err(DiscoveryError::Conflict(format!("device {} already registered", id)));
        }
        let info = DeviceInfo::new(id.clone(), source.capabilities().clone());
        info!(
            "Device {} registered: {:.0}..{:.0} Hz, max span {:.0} Hz",
            id, info.capabilities.min_frequency, info.capabilities.max_frequency, info.capabilities.max_bandwidth
        );
        devices.insert(
            id,
            DeviceState {
                source,
                info: info.clone(),
                stats: Arc::new(DeviceStats::default()),
            },
        );
        Ok(info)
    }

    pub fn unregister(&self, device_id: &str) -> Result<()> {
        self.devices
            .write()
            .remove(device_id)
            .map(|_| info!("Device {} unregistered", device_id))
            .ok_or_else(|| DiscoveryError::not_found("device", device_id))
    }

    pub fn source(&self, device_id: &str) -> Result<Arc<dyn SpectrumSource>> {
        self.devices
            .read()
            .get(device_id)
            .map(|d| d.source.clone())
            .ok_or_else(|| DiscoveryError::not_found("device", device_id))
    }

    pub fn stats(&self, device_id: &str) -> Result<Arc<DeviceStats>> {
        self.devices
            .read()
            .get(device_id)
            .map(|d| d.stats.clone())
            .ok_or_else(|| DiscoveryError::not_found("device", device_id))
    }

    pub fn info(&self, device_id: &str) -> Result<DeviceInfo> {
        self.devices
            .read()
            .get(device_id)
            .map(|d| d.info.clone())
            .ok_or_else(|| DiscoveryError::not_found("device", device_id))
    }

    /// All devices in id order
    pub fn list(&self) -> Vec<DeviceInfo> {
        self.devices.read().values().map(|d| d.info.clone()).collect()
    }

    pub fn connected(&self) -> Vec<DeviceInfo> {
        self.devices
            .read()
            .values()
            .filter(|d| d.info.connected)
            .map(|d| d.info.clone())
            .collect()
    }

    /// Record a successful frame and the noise floor it reported
    pub fn mark_seen(&self, device_id: &str, noise_floor: f64) {
        if let Some(d) = self.devices.write().get_mut(device_id) {
            d.info.last_seen = Utc::now();
            d.info.noise_floor = noise_floor;
            d.info.connected = true;
        }
    }

    pub fn set_connected(&self, device_id: &str, connected: bool) -> Result<()> {
        let mut devices = self.devices.write();
        let d = devices
            .get_mut(device_id)
            .ok_or_else(|| DiscoveryError::not_found("device", device_id))?;
        d.info.connected = connected;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}
