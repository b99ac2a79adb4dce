//! Watch-list configuration consumed by monitoring sessions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decoder::DecodingConfig;
use crate::error::{DiscoveryError, Result};

/// Lowest priority that requires [`FrequencyPurpose::Emergency`]
pub const EMERGENCY_PRIORITY_MIN: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrequencyPurpose {
    Emergency,
    ContentDiscovery,
    MeshCoordination,
    Beacon,
    General,
}

impl FrequencyPurpose {
    pub fn is_critical(&self) -> bool {
        matches!(self, FrequencyPurpose::Emergency)
    }
}

/// One watched slice of spectrum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    /// Hz
    pub center_frequency: f64,
    /// Hz
    pub bandwidth: f64,
    pub purpose: FrequencyPurpose,
    /// 1..=10
    pub priority: u8,
    pub decoding_enabled: bool,
}

impl FrequencyRange {
    pub fn new(center_frequency: f64, bandwidth: f64, purpose: FrequencyPurpose, priority: u8) -> Self {
        Self {
            center_frequency,
            bandwidth,
            purpose,
            priority,
            decoding_enabled: true,
        }
    }

    pub fn start(&self) -> f64 {
        self.center_frequency - self.bandwidth / 2.0
    }

    pub fn end(&self) -> f64 {
        self.center_frequency + self.bandwidth / 2.0
    }

    /// Inclusive at both edges
    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.start() && frequency <= self.end()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.center_frequency > 0.0) || !(self.bandwidth > 0.0) {
            return Err(DiscoveryError::Validation(format!(
                "range {:.0} Hz / {:.0} Hz: frequency and bandwidth must be > 0",
                self.center_frequency, self.bandwidth
            )));
        }
        if !(1..=10).contains(&self.priority) {
            return Err(DiscoveryError::Validation(format!(
                "range {:.0} Hz: priority {} outside 1..=10",
                self.center_frequency, self.priority
            )));
        }
        if self.priority >= EMERGENCY_PRIORITY_MIN && self.purpose != FrequencyPurpose::Emergency {
            return Err(DiscoveryError::Validation(format!(
                "range {:.0} Hz: priority {} is reserved for emergency traffic",
                self.center_frequency, self.priority
            )));
        }
        Ok(())
    }
}

/// Operator-defined watch list for one monitoring session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfiguration {
    pub id: String,
    pub name: String,
    pub frequency_ranges: Vec<FrequencyRange>,
    /// Device this configuration is pinned to, if any
    pub assigned_device: Option<String>,
    /// Sampling ticks per second
    pub update_rate_hz: f64,
    /// Peak threshold above the noise floor (dB)
    pub threshold_db: f64,
    pub noise_floor_percentile: f64,
    /// Peaks kept in the session history
    pub history_size: usize,
    /// Failed acquisitions in a row before the session errors out
    pub max_consecutive_errors: u32,
    pub acquisition_timeout: Duration,
    /// Minimum gap between decode attempts on the same track
    pub decode_cooldown: Duration,
    pub decoding: DecodingConfig,
}

impl MonitoringConfiguration {
    pub fn new(id: impl Into<String>, frequency_ranges: Vec<FrequencyRange>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            frequency_ranges,
            assigned_device: None,
            update_rate_hz: 10.0,
            threshold_db: 10.0,
            noise_floor_percentile: 20.0,
            history_size: 1000,
            max_consecutive_errors: 5,
            acquisition_timeout: Duration::from_secs(2),
            decode_cooldown: Duration::from_secs(5),
            decoding: DecodingConfig::default(),
        }
    }

    pub fn with_cache(mut self, cache_id: impl Into<String>) -> Self {
        self.decoding.cache_id = Some(cache_id.into());
        self
    }

    /// Highest priority among the ranges
    pub fn priority(&self) -> u8 {
        self.frequency_ranges.iter().map(|r| r.priority).max().unwrap_or(0)
    }

    pub fn is_critical(&self) -> bool {
        self.frequency_ranges.iter().any(|r| r.purpose.is_critical())
    }

    /// Tuning window covering every range: (center, bandwidth) in Hz
    pub fn span(&self) -> (f64, f64) {
        let start = self.frequency_ranges.iter().map(|r| r.start()).fold(f64::INFINITY, f64::min);
        let end = self
            .frequency_ranges
            .iter()
            .map(|r| r.end())
            .fold(f64::NEG_INFINITY, f64::max);
        if !start.is_finite() || !end.is_finite() {
            return (0.0, 0.0);
        }
        ((start + end) / 2.0, end - start)
    }

    /// First range containing `frequency`
    pub fn range_for(&self, frequency: f64) -> Option<&FrequencyRange> {
        self.frequency_ranges.iter().find(|r| r.contains(frequency))
    }

    /// True when any range containing `frequency` has decoding enabled
    pub fn decodes_at(&self, frequency: f64) -> bool {
        self.frequency_ranges
            .iter()
            .any(|r| r.contains(frequency) && r.decoding_enabled)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_rate_hz)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(DiscoveryError::Validation("configuration id is empty".into()));
        }
        if self.frequency_ranges.is_empty() {
            return Err(DiscoveryError::Validation(format!(
                "configuration {} has no frequency ranges",
                self.id
            )));
        }
        for range in &self.frequency_ranges {
            range.validate()?;
        }
        if !(self.update_rate_hz > 0.0 && self.update_rate_hz <= 1000.0) {
            return Err(DiscoveryError::Validation(format!(
                "configuration {}: update_rate_hz must be within (0, 1000]",
                self.id
            )));
        }
        if !(0.0..=100.0).contains(&self.noise_floor_percentile) {
            return Err(DiscoveryError::Validation(format!(
                "configuration {}: noise_floor_percentile must be within 0..=100",
                self.id
            )));
        }
        if self.history_size == 0 || self.max_consecutive_errors == 0 {
            return Err(DiscoveryError::Validation(format!(
                "configuration {}: history_size and max_consecutive_errors must be > 0",
                self.id
            )));
        }
        self.decoding.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_priority_requires_emergency() {
        let ok = FrequencyRange::new(14_300_000.0, 6_000.0, FrequencyPurpose::Emergency, 9);
        assert!(ok.validate().is_ok());
        let bad = FrequencyRange::new(14_085_000.0, 10_000.0, FrequencyPurpose::ContentDiscovery, 8);
        assert!(matches!(bad.validate(), Err(DiscoveryError::Validation(_))));
        let zero = FrequencyRange::new(14_085_000.0, 10_000.0, FrequencyPurpose::General, 0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_span_covers_all_ranges() {
        let config = MonitoringConfiguration::new(
            "20m",
            vec![
                FrequencyRange::new(14_080_000.0, 4_000.0, FrequencyPurpose::ContentDiscovery, 5),
                FrequencyRange::new(14_090_000.0, 4_000.0, FrequencyPurpose::Beacon, 3),
            ],
        );
        let (center, bw) = config.span();
        assert_eq!(center, 14_085_000.0);
        assert_eq!(bw, 14_000.0);
        assert_eq!(config.priority(), 5);
        assert!(!config.is_critical());
        assert!(config.range_for(14_081_000.0).is_some());
        assert!(config.range_for(14_085_000.0).is_none());
    }

    #[test]
    fn test_overlapping_ranges_decode_regardless_of_order() {
        let mut listen_only = FrequencyRange::new(14_085_000.0, 10_000.0, FrequencyPurpose::General, 3);
        listen_only.decoding_enabled = false;
        let content = FrequencyRange::new(14_086_000.0, 2_000.0, FrequencyPurpose::ContentDiscovery, 5);

        let config = MonitoringConfiguration::new("20m", vec![listen_only.clone(), content.clone()]);
        assert!(config.decodes_at(14_086_000.0));
        assert!(!config.decodes_at(14_082_000.0));
        assert!(!config.decodes_at(14_095_000.0));

        let reversed = MonitoringConfiguration::new("20m", vec![content, listen_only]);
        assert!(reversed.decodes_at(14_086_000.0));
        assert!(!reversed.decodes_at(14_082_000.0));
    }

    #[test]
    fn test_configuration_validation() {
        let mut config = MonitoringConfiguration::new(
            "20m",
            vec![FrequencyRange::new(14_085_000.0, 10_000.0, FrequencyPurpose::General, 5)],
        );
        assert!(config.validate().is_ok());
        config.update_rate_hz = 0.0;
        assert!(config.validate().is_err());
        config.update_rate_hz = 10.0;
        config.frequency_ranges.clear();
        assert!(config.validate().is_err());
    }
}
