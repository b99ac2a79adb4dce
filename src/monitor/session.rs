//! Monitoring session state and statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::MonitoringConfiguration;
use super::tracker::SignalTracker;
use crate::error::{DiscoveryError, Result};

/// Upper bound on simultaneously tracked signals per session
pub const MAX_TRACKS_PER_SESSION: usize = 512;

/// Width of one confidence histogram bucket
const CONFIDENCE_BUCKETS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitoringStatus {
    Initializing,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
}

impl MonitoringStatus {
    pub fn can_transition_to(&self, next: MonitoringStatus) -> bool {
        use MonitoringStatus::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Error) => true,
            (Initializing, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Stopping, Stopped) => true,
            (Stopping, _) => false,
            (_, Stopping) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoringStatus::Initializing => "INITIALIZING",
            MonitoringStatus::Running => "RUNNING",
            MonitoringStatus::Paused => "PAUSED",
            MonitoringStatus::Stopping => "STOPPING",
            MonitoringStatus::Stopped => "STOPPED",
            MonitoringStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for MonitoringStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running counters for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatistics {
    pub frames_processed: u64,
    pub acquisition_errors: u64,
    pub consecutive_errors: u32,
    pub peaks_detected: u64,
    pub peaks_in_range: u64,
    pub new_tracks: u64,
    pub decodes_started: u64,
    pub decodes_rejected: u64,
    /// Running mean tick processing time (ms)
    pub avg_processing_ms: f64,
    /// In-range peaks per processed frame
    pub detection_rate: f64,
    /// In-range peak confidences in 0.2-wide buckets
    pub confidence_histogram: [u64; CONFIDENCE_BUCKETS],
    pub last_noise_floor: Option<f64>,
    pub last_frame_at: Option<DateTime<Utc>>,
}

impl MonitoringStatistics {
    pub fn record_frame(
        &mut self,
        processing_ms: f64,
        peaks_detected: usize,
        confidences: &[f64],
        new_tracks: usize,
        noise_floor: f64,
    ) {
        self.frames_processed += 1;
        self.consecutive_errors = 0;
        self.peaks_detected += peaks_detected as u64;
        self.peaks_in_range += confidences.len() as u64;
        self.new_tracks += new_tracks as u64;
        self.avg_processing_ms += (processing_ms - self.avg_processing_ms) / self.frames_processed as f64;
        self.detection_rate = self.peaks_in_range as f64 / self.frames_processed as f64;
        for &c in confidences {
            let bucket = ((c.clamp(0.0, 1.0) * CONFIDENCE_BUCKETS as f64) as usize).min(CONFIDENCE_BUCKETS - 1);
            self.confidence_histogram[bucket] += 1;
        }
        self.last_noise_floor = Some(noise_floor);
        self.last_frame_at = Some(Utc::now());
    }

    /// Returns the consecutive error count after this failure
    pub fn record_error(&mut self) -> u32 {
        self.acquisition_errors += 1;
        self.consecutive_errors += 1;
        self.consecutive_errors
    }
}

impl std::fmt::Display for MonitoringStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} peaks ({} in range, {:.2}/frame), {} tracks, {} decodes ({} rejected), {} errors, {:.2} ms/frame",
            self.frames_processed,
            self.peaks_detected,
            self.peaks_in_range,
            self.detection_rate,
            self.new_tracks,
            self.decodes_started,
            self.decodes_rejected,
            self.acquisition_errors,
            self.avg_processing_ms
        )
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSessionInfo {
    pub id: String,
    pub device_id: String,
    pub config_id: String,
    pub status: MonitoringStatus,
    pub statistics: MonitoringStatistics,
    pub started_at: DateTime<Utc>,
}

/// Live association of one device with one configuration
pub struct MonitoringSession {
    pub id: String,
    pub device_id: String,
    pub config: MonitoringConfiguration,
    pub status: MonitoringStatus,
    pub statistics: MonitoringStatistics,
    pub tracker: SignalTracker,
    pub started_at: DateTime<Utc>,
}

impl MonitoringSession {
    pub fn new(device_id: impl Into<String>, config: MonitoringConfiguration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            device_id: device_id.into(),
            tracker: SignalTracker::new(config.history_size, MAX_TRACKS_PER_SESSION),
            config,
            status: MonitoringStatus::Initializing,
            statistics: MonitoringStatistics::default(),
            started_at: Utc::now(),
        }
    }

    pub fn transition(&mut self, next: MonitoringStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DiscoveryError::InvalidState(format!(
                "session {}: {} -> {} not allowed",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn info(&self) -> MonitoringSessionInfo {
        MonitoringSessionInfo {
            id: self.id.clone(),
            device_id: self.device_id.clone(),
            config_id: self.config.id.clone(),
            status: self.status,
            statistics: self.statistics.clone(),
            started_at: self.started_at,
        }
    }
}
