//! Device capability envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, Result};

/// What a receiver can be tuned to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Hz
    pub min_frequency: f64,
    /// Hz
    pub max_frequency: f64,
    /// Widest instantaneous span in Hz
    pub max_bandwidth: f64,
    pub sample_rates: Vec<f64>,
    /// (min, max) dB
    pub gain_range: (f64, f64),
}

impl DeviceCapabilities {
    /// RTL2832U + R820T2 envelope
    pub fn rtl_sdr() -> Self {
        Self {
            min_frequency: 24_000_000.0,
            max_frequency: 1_766_000_000.0,
            max_bandwidth: 2_400_000.0,
            sample_rates: vec![1_024_000.0, 2_048_000.0, 2_400_000.0],
            gain_range: (0.0, 49.6),
        }
    }

    /// Direct-sampling HF receiver
    pub fn hf() -> Self {
        Self {
            min_frequency: 500_000.0,
            max_frequency: 30_000_000.0,
            max_bandwidth: 192_000.0,
            sample_rates: vec![48_000.0, 96_000.0, 192_000.0],
            gain_range: (0.0, 40.0),
        }
    }

    /// Whether `[center - bandwidth/2, center + bandwidth/2]` fits the envelope
    pub fn can_host(&self, center_frequency: f64, bandwidth: f64) -> bool {
        bandwidth > 0.0
            && bandwidth <= self.max_bandwidth
            && center_frequency - bandwidth / 2.0 >= self.min_frequency
            && center_frequency + bandwidth / 2.0 <= self.max_frequency
    }

    /// Like [`can_host`](Self::can_host) but reports why not
    pub fn check(&self, device_id: &str, center_frequency: f64, bandwidth: f64) -> Result<()> {
        if bandwidth > self.max_bandwidth {
            return Err(DiscoveryError::DeviceCapability(format!(
                "{}: bandwidth {:.0} Hz exceeds {:.0} Hz",
                device_id, bandwidth, self.max_bandwidth
            )));
        }
        if !self.can_host(center_frequency, bandwidth) {
            return Err(DiscoveryError::DeviceCapability(format!(
                "{}: {:.0} Hz +/- {:.0} Hz outside {:.0}..{:.0} Hz",
                device_id,
                center_frequency,
                bandwidth / 2.0,
                self.min_frequency,
                self.max_frequency
            )));
        }
        Ok(())
    }
}

/// Registered device as seen by the allocator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub capabilities: DeviceCapabilities,
    pub connected: bool,
    /// Last reported noise floor (dB)
    pub noise_floor: f64,
    pub last_seen: DateTime<Utc>,
}

impl DeviceInfo {
    pub fn new(device_id: impl Into<String>, capabilities: DeviceCapabilities) -> Self {
        Self {
            device_id: device_id.into(),
            capabilities,
            connected: true,
            noise_floor: 0.0,
            last_seen: Utc::now(),
        }
    }
}
