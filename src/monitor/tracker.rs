//! Signal tracking across frames
//!
//! Peaks are produced fresh every frame. The tracker folds them into
//! long-lived tracks so a station that drifts a few Hz between frames is
//! still recognised as the same signal.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::sdr::{SignalPeak, SignalType};

/// Track age before removal
const TRACK_TIMEOUT_SECS: u64 = 60;

/// Rounding used for new track keys (Hz)
const TRACK_FREQ_STEP: f64 = 100.0;
const TRACK_BW_STEP: f64 = 50.0;

/// Smallest match window, for single-bin carriers (Hz)
const MIN_MATCH_HZ: f64 = 25.0;

/// Aggregated state of one signal
#[derive(Debug, Clone, Serialize)]
pub struct SignalTrack {
    pub tracking_id: String,
    /// Latest centre frequency (Hz)
    pub frequency: f64,
    /// Frequency when the track started (Hz)
    pub initial_frequency: f64,
    pub bandwidth: f64,
    pub signal_type: SignalType,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub detections: u64,
    pub peak_snr: f64,
    /// Running mean SNR (dB)
    pub avg_snr: f64,
    pub last_power: f64,
    pub confidence: f64,
    pub decode_attempts: u64,
    #[serde(skip)]
    last_update: Instant,
    #[serde(skip)]
    last_decode: Option<Instant>,
}

impl SignalTrack {
    fn new(tracking_id: String, peak: &SignalPeak) -> Self {
        let now = Utc::now();
        Self {
            tracking_id,
            frequency: peak.frequency,
            initial_frequency: peak.frequency,
            bandwidth: peak.bandwidth,
            signal_type: peak.signal_type,
            first_seen: now,
            last_seen: now,
            detections: 1,
            peak_snr: peak.snr,
            avg_snr: peak.snr,
            last_power: peak.power,
            confidence: peak.confidence,
            decode_attempts: 0,
            last_update: Instant::now(),
            last_decode: None,
        }
    }

    fn update(&mut self, peak: &SignalPeak) {
        self.detections += 1;
        self.frequency = peak.frequency;
        self.bandwidth = peak.bandwidth;
        self.signal_type = peak.signal_type;
        self.last_seen = Utc::now();
        self.last_update = Instant::now();
        self.peak_snr = self.peak_snr.max(peak.snr);
        self.avg_snr += (peak.snr - self.avg_snr) / self.detections as f64;
        self.last_power = peak.power;
        self.confidence = peak.confidence;
    }

    /// Accumulated drift since the track started (Hz)
    pub fn drift(&self) -> f64 {
        self.frequency - self.initial_frequency
    }

    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_update.elapsed() > timeout
    }

    fn matches(&self, peak: &SignalPeak) -> bool {
        (self.frequency - peak.frequency).abs() <= peak.bandwidth.max(MIN_MATCH_HZ)
    }
}

/// Result of folding one peak into the tracker
#[derive(Debug, Clone, PartialEq)]
pub struct TrackUpdate {
    pub tracking_id: String,
    pub is_new: bool,
    pub detections: u64,
}

/// Tracks plus a bounded history of raw peaks
pub struct SignalTracker {
    tracks: HashMap<String, SignalTrack>,
    history: VecDeque<SignalPeak>,
    history_size: usize,
    max_tracks: usize,
    timeout: Duration,
    last_cleanup: Instant,
}

impl SignalTracker {
    pub fn new(history_size: usize, max_tracks: usize) -> Self {
        Self {
            tracks: HashMap::new(),
            history: VecDeque::with_capacity(history_size.min(4096)),
            history_size: history_size.max(1),
            max_tracks: max_tracks.max(1),
            timeout: Duration::from_secs(TRACK_TIMEOUT_SECS),
            last_cleanup: Instant::now(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fold a peak into the closest live track, or start a new one
    pub fn update(&mut self, peak: &SignalPeak) -> TrackUpdate {
        self.history.push_back(peak.clone());
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }

        let timeout = self.timeout;
        let matched = self
            .tracks
            .values()
            .filter(|t| !t.is_stale(timeout) && t.matches(peak))
            .min_by(|a, b| {
                let da = (a.frequency - peak.frequency).abs();
                let db = (b.frequency - peak.frequency).abs();
                da.total_cmp(&db).then_with(|| a.tracking_id.cmp(&b.tracking_id))
            })
            .map(|t| t.tracking_id.clone())
            .or_else(|| {
                let key = peak.tracking_id(TRACK_FREQ_STEP, TRACK_BW_STEP);
                let live = self.tracks.get(&key).map_or(false, |t| !t.is_stale(timeout));
                live.then_some(key)
            });

        if let Some(id) = matched {
            if let Some(track) = self.tracks.get_mut(&id) {
                track.update(peak);
                return TrackUpdate {
                    tracking_id: id,
                    is_new: false,
                    detections: track.detections,
                };
            }
        }

        let id = peak.tracking_id(TRACK_FREQ_STEP, TRACK_BW_STEP);
        if self.tracks.len() >= self.max_tracks && !self.tracks.contains_key(&id) {
            self.cleanup_stale();
            if self.tracks.len() >= self.max_tracks {
                self.evict_oldest();
            }
        }
        info!(
            "New signal {} at {:.0} Hz ({}, SNR {:.1} dB)",
            id, peak.frequency, peak.signal_type, peak.snr
        );
        self.tracks.insert(id.clone(), SignalTrack::new(id.clone(), peak));

        if self.last_cleanup.elapsed() > Duration::from_secs(30) {
            self.cleanup_stale();
            self.last_cleanup = Instant::now();
        }

        TrackUpdate {
            tracking_id: id,
            is_new: true,
            detections: 1,
        }
    }

    /// False while the track is inside `cooldown` of its last decode attempt
    pub fn should_decode(&self, tracking_id: &str, cooldown: Duration) -> bool {
        self.tracks
            .get(tracking_id)
            .and_then(|t| t.last_decode)
            .map_or(true, |at| at.elapsed() >= cooldown)
    }

    pub fn record_decode_attempt(&mut self, tracking_id: &str) {
        if let Some(track) = self.tracks.get_mut(tracking_id) {
            track.decode_attempts += 1;
            track.last_decode = Some(Instant::now());
        }
    }

    pub fn get(&self, tracking_id: &str) -> Option<&SignalTrack> {
        self.tracks.get(tracking_id)
    }

    /// Live tracks, lowest frequency first
    pub fn active(&self) -> Vec<SignalTrack> {
        let mut list: Vec<SignalTrack> = self
            .tracks
            .values()
            .filter(|t| !t.is_stale(self.timeout))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        list
    }

    /// Most recent peaks, oldest first
    pub fn history(&self) -> impl Iterator<Item = &SignalPeak> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn count(&self) -> usize {
        self.tracks.len()
    }

    /// Drop tracks not seen within the timeout; returns how many went
    pub fn cleanup_stale(&mut self) -> usize {
        let before = self.tracks.len();
        let timeout = self.timeout;
        self.tracks.retain(|_, track| !track.is_stale(timeout));
        let removed = before - self.tracks.len();
        if removed > 0 {
            debug!("Cleaned up {} stale tracks, {} remaining", removed, self.tracks.len());
        }
        removed
    }

    /// Drop the least recently updated track to make room
    fn evict_oldest(&mut self) {
        let oldest = self
            .tracks
            .values()
            .min_by(|a, b| {
                a.last_update
                    .cmp(&b.last_update)
                    .then_with(|| a.tracking_id.cmp(&b.tracking_id))
            })
            .map(|t| t.tracking_id.clone());
        if let Some(id) = oldest {
            debug!("Track limit {} reached, dropping {}", self.max_tracks, id);
            self.tracks.remove(&id);
        }
    }

    pub fn stats_summary(&self) -> TrackerStats {
        let active: Vec<&SignalTrack> = self.tracks.values().filter(|t| !t.is_stale(self.timeout)).collect();
        TrackerStats {
            total_tracks: self.tracks.len(),
            active_tracks: active.len(),
            total_detections: self.tracks.values().map(|t| t.detections).sum(),
            strongest_snr: active.iter().map(|t| t.peak_snr).fold(None, |acc: Option<f64>, s| {
                Some(acc.map_or(s, |a| a.max(s)))
            }),
        }
    }
}

/// Tracker statistics
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerStats {
    pub total_tracks: usize,
    pub active_tracks: usize,
    pub total_detections: u64,
    pub strongest_snr: Option<f64>,
}

impl std::fmt::Display for TrackerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Signals: {} total, {} active, {} detections",
            self.total_tracks, self.active_tracks, self.total_detections
        )?;
        if let Some(snr) = self.strongest_snr {
            write!(f, ", strongest {:.1} dB", snr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdr::QualityMetrics;

    fn peak(frequency: f64, snr: f64) -> SignalPeak {
        SignalPeak {
            frequency,
            power: -40.0 + snr,
            bandwidth: 50.0,
            snr,
            confidence: 0.5,
            signal_type: SignalType::Bpsk,
            fft_index: 0,
            quality: QualityMetrics {
                snr,
                rssi: -40.0 + snr,
                stability: 1.0,
            },
        }
    }

    #[test]
    fn test_drifting_peak_stays_on_one_track() {
        let mut tracker = SignalTracker::new(100, 64);
        let first = tracker.update(&peak(14_085_000.0, 12.0));
        assert!(first.is_new);

        let second = tracker.update(&peak(14_085_030.0, 16.0));
        assert!(!second.is_new);
        assert_eq!(second.tracking_id, first.tracking_id);
        assert_eq!(second.detections, 2);

        let track = tracker.get(&first.tracking_id).unwrap();
        assert_eq!(track.drift(), 30.0);
        assert_eq!(track.peak_snr, 16.0);
        assert_eq!(track.avg_snr, 14.0);
    }

    #[test]
    fn test_distant_peak_starts_new_track() {
        let mut tracker = SignalTracker::new(100, 64);
        tracker.update(&peak(14_085_000.0, 12.0));
        let other = tracker.update(&peak(14_087_000.0, 12.0));
        assert!(other.is_new);
        assert_eq!(tracker.count(), 2);

        let active = tracker.active();
        assert!(active[0].frequency < active[1].frequency);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = SignalTracker::new(3, 64);
        for k in 0..5 {
            tracker.update(&peak(14_085_000.0 + k as f64, 10.0));
        }
        assert_eq!(tracker.history_len(), 3);
        assert_eq!(tracker.history().next().unwrap().frequency, 14_085_002.0);
    }

    #[test]
    fn test_stale_tracks_removed() {
        let mut tracker = SignalTracker::new(10, 64).with_timeout(Duration::from_millis(1));
        tracker.update(&peak(14_085_000.0, 12.0));
        std::thread::sleep(Duration::from_millis(5));

        assert!(tracker.active().is_empty());
        // A stale track is not matched; the peak replaces it under the same key
        let again = tracker.update(&peak(14_085_000.0, 12.0));
        assert!(again.is_new);
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn test_track_limit_drops_least_recent() {
        let mut tracker = SignalTracker::new(10, 4);
        let mut ids = Vec::new();
        for k in 0..20 {
            ids.push(tracker.update(&peak(14_000_000.0 + k as f64 * 1_000.0, 12.0)).tracking_id);
            assert!(tracker.count() <= 4);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(tracker.count(), 4);
        for id in &ids[16..] {
            assert!(tracker.get(id).is_some());
        }
        assert!(tracker.get(&ids[0]).is_none());
    }

    #[test]
    fn test_full_tracker_still_updates_existing_track() {
        let mut tracker = SignalTracker::new(10, 2);
        let first = tracker.update(&peak(14_085_000.0, 12.0));
        tracker.update(&peak(14_090_000.0, 12.0));
        let again = tracker.update(&peak(14_085_010.0, 14.0));
        assert!(!again.is_new);
        assert_eq!(again.tracking_id, first.tracking_id);
        assert_eq!(tracker.count(), 2);
    }

    #[test]
    fn test_decode_cooldown() {
        let mut tracker = SignalTracker::new(10, 64);
        let id = tracker.update(&peak(14_085_000.0, 12.0)).tracking_id;
        assert!(tracker.should_decode(&id, Duration::from_secs(5)));
        tracker.record_decode_attempt(&id);
        assert!(!tracker.should_decode(&id, Duration::from_secs(5)));
        assert!(tracker.should_decode(&id, Duration::ZERO));
        assert_eq!(tracker.get(&id).unwrap().decode_attempts, 1);
    }

    #[test]
    fn test_stats_display() {
        let mut tracker = SignalTracker::new(10, 64);
        tracker.update(&peak(14_085_000.0, 12.0));
        let stats = tracker.stats_summary();
        assert_eq!(stats.active_tracks, 1);
        assert!(stats.to_string().contains("strongest 12.0 dB"));
    }
}
