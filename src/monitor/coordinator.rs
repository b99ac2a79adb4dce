//! Monitoring coordinator
//!
//! Owns one [`MonitoringSession`] per (device, configuration) pair. Each
//! running session samples its device on a [`ScheduledTask`]; every tick
//! runs the analyzer, keeps in-range peaks, updates tracking, then
//! statistics, and hands decodable peaks to the [`SignalDecoder`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::allocation::{allocate_frequencies, AllocationOptions, AllocationReport, DeviceAllocationPlan};
use super::config::MonitoringConfiguration;
use super::session::{MonitoringSession, MonitoringSessionInfo, MonitoringStatistics, MonitoringStatus};
use super::tracker::SignalTrack;
use crate::decoder::SignalDecoder;
use crate::device::{DeviceRegistry, SpectrumSource};
use crate::error::{DiscoveryError, Result};
use crate::events::{EventBus, Subscription};
use crate::scheduler::{ScheduledTask, TickControl};
use crate::sdr::{compute_noise_floor, detect_peaks, SignalPeak, SpectrumFrame};

/// Session lifecycle and spectrum notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MonitoringEvent {
    Started {
        session_id: String,
        device_id: String,
        config_id: String,
    },
    Stopped {
        session_id: String,
        statistics: MonitoringStatistics,
    },
    Paused {
        session_id: String,
    },
    Resumed {
        session_id: String,
    },
    SpectrumUpdated {
        session_id: String,
        timestamp: DateTime<Utc>,
        noise_floor: f64,
        peaks: Vec<SignalPeak>,
    },
    Error {
        session_id: String,
        message: String,
        consecutive_errors: u32,
    },
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub noise_floor: f64,
    pub peaks_detected: usize,
    pub peaks_in_range: usize,
    pub new_tracks: usize,
    /// Decoding session ids started by this tick
    pub decodes_started: Vec<String>,
    pub decodes_rejected: usize,
    pub processing_ms: f64,
}

struct SessionSlot {
    session: Arc<Mutex<MonitoringSession>>,
    task: Option<ScheduledTask>,
}

/// State shared with the sampling tasks
struct Shared {
    devices: Arc<DeviceRegistry>,
    decoder: Arc<SignalDecoder>,
    events: EventBus<MonitoringEvent>,
}

pub struct MonitoringCoordinator {
    shared: Arc<Shared>,
    sessions: Mutex<HashMap<String, SessionSlot>>,
    allocation: AllocationOptions,
}

impl MonitoringCoordinator {
    pub fn new(devices: Arc<DeviceRegistry>, decoder: Arc<SignalDecoder>, allocation: AllocationOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                devices,
                decoder,
                events: EventBus::default(),
            }),
            sessions: Mutex::new(HashMap::new()),
            allocation,
        }
    }

    pub fn devices(&self) -> &Arc<DeviceRegistry> {
        &self.shared.devices
    }

    pub fn subscribe(&self) -> Subscription<MonitoringEvent> {
        self.shared.events.subscribe()
    }

    /// Open a session for `device_id` and start its sampling loop.
    /// Must be called inside a tokio runtime.
    pub fn start_monitoring(&self, device_id: &str, config: MonitoringConfiguration) -> Result<String> {
        config.validate()?;
        let source = self.shared.devices.source(device_id)?;
        let (center, bandwidth) = config.span();
        source.capabilities().check(device_id, center, bandwidth)?;

        let mut sessions = self.sessions.lock();
        let duplicate = sessions.values().any(|slot| {
            let s = slot.session.lock();
            s.device_id == device_id && s.config.id == config.id
        });
        if duplicate {
            return Err(DiscoveryError::Conflict(format!(
                "{} is already monitoring {}",
                device_id, config.id
            )));
        }

        let mut session = MonitoringSession::new(device_id, config);
        session.transition(MonitoringStatus::Running)?;
        let id = session.id.clone();
        let config_id = session.config.id.clone();
        let period = session.config.tick_period();
        let session = Arc::new(Mutex::new(session));

        let task = {
            let shared = self.shared.clone();
            let session = session.clone();
            ScheduledTask::spawn(format!("monitor-{}", id), period, move || {
                let shared = shared.clone();
                let session = session.clone();
                let source = source.clone();
                async move { shared.tick(&session, source.as_ref()).await }
            })
        };

        sessions.insert(
            id.clone(),
            SessionSlot {
                session,
                task: Some(task),
            },
        );
        drop(sessions);

        info!(
            "Monitoring {} on {} ({:.0} Hz, {:.0} Hz span, {:.1} Hz updates)",
            config_id,
            device_id,
            center,
            bandwidth,
            1.0 / period.as_secs_f64()
        );
        self.shared.events.emit(MonitoringEvent::Started {
            session_id: id.clone(),
            device_id: device_id.to_string(),
            config_id,
        });
        Ok(id)
    }

    /// Stop the sampling loop and drop the session. No tick starts after
    /// this returns.
    pub async fn stop_monitoring(&self, session_id: &str) -> Result<MonitoringStatistics> {
        let mut slot = {
            let mut sessions = self.sessions.lock();
            let slot = sessions
                .get(session_id)
                .ok_or_else(|| DiscoveryError::not_found("monitoring session", session_id))?;
            slot.session.lock().transition(MonitoringStatus::Stopping)?;
            sessions
                .remove(session_id)
                .ok_or_else(|| DiscoveryError::not_found("monitoring session", session_id))?
        };

        if let Some(task) = slot.task.take() {
            task.shutdown().await;
        }

        let statistics = {
            let mut session = slot.session.lock();
            session.transition(MonitoringStatus::Stopped)?;
            info!("Monitoring {} stopped: {}", session.config.id, session.statistics);
            session.statistics.clone()
        };
        self.shared.events.emit(MonitoringEvent::Stopped {
            session_id: session_id.to_string(),
            statistics: statistics.clone(),
        });
        Ok(statistics)
    }

    pub fn pause_monitoring(&self, session_id: &str) -> Result<()> {
        self.with_session(session_id, |s| s.transition(MonitoringStatus::Paused))?;
        self.shared.events.emit(MonitoringEvent::Paused {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    pub fn resume_monitoring(&self, session_id: &str) -> Result<()> {
        self.with_session(session_id, |s| {
            if s.status != MonitoringStatus::Paused {
                return Err(DiscoveryError::InvalidState(format!(
                    "session {} is {}, not PAUSED",
                    s.id, s.status
                )));
            }
            s.transition(MonitoringStatus::Running)
        })?;
        self.shared.events.emit(MonitoringEvent::Resumed {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    /// Run one tick against a supplied frame
    pub fn ingest_frame(&self, session_id: &str, frame: SpectrumFrame) -> Result<TickReport> {
        let frame = Arc::new(frame);
        self.with_session(session_id, |s| {
            if s.status != MonitoringStatus::Running {
                return Err(DiscoveryError::InvalidState(format!(
                    "session {} is {}",
                    s.id, s.status
                )));
            }
            Ok(self.shared.process(s, frame))
        })
    }

    pub fn session_status(&self, session_id: &str) -> Result<MonitoringStatus> {
        self.with_session(session_id, |s| Ok(s.status))
    }

    pub fn session_statistics(&self, session_id: &str) -> Result<MonitoringStatistics> {
        self.with_session(session_id, |s| Ok(s.statistics.clone()))
    }

    pub fn tracked_signals(&self, session_id: &str) -> Result<Vec<SignalTrack>> {
        self.with_session(session_id, |s| Ok(s.tracker.active()))
    }

    pub fn active_sessions(&self) -> Vec<MonitoringSessionInfo> {
        let mut list: Vec<MonitoringSessionInfo> = self
            .sessions
            .lock()
            .values()
            .map(|slot| slot.session.lock().info())
            .collect();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Distribute `configs` over the registered devices
    pub fn allocate_frequencies(&self, configs: &[MonitoringConfiguration]) -> AllocationReport {
        let devices = self.shared.devices.list();
        let report = allocate_frequencies(configs, &devices, &self.allocation);
        info!(
            "Allocated {} configurations over {} devices ({} failed)",
            report.plan.total_assignments(),
            report.plan.assignments.len(),
            report.failures.len()
        );
        report
    }

    /// Start a session for every assignment in `plan`
    pub fn start_allocated(&self, plan: &DeviceAllocationPlan) -> Vec<Result<String>> {
        let mut started = Vec::new();
        for (device_id, configs) in &plan.assignments {
            for config in configs {
                let result = self.start_monitoring(device_id, config.clone());
                if let Err(e) = &result {
                    warn!("could not start {} on {}: {}", config.id, device_id, e);
                }
                started.push(result);
            }
        }
        started
    }

    /// Stop every session
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop_monitoring(&id).await {
                debug!("stopping {}: {}", id, e);
            }
        }
    }

    fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&mut MonitoringSession) -> Result<T>) -> Result<T> {
        let session = self
            .sessions
            .lock()
            .get(session_id)
            .map(|slot| slot.session.clone())
            .ok_or_else(|| DiscoveryError::not_found("monitoring session", session_id))?;
        let mut guard = session.lock();
        f(&mut guard)
    }
}

impl Shared {
    /// One scheduled tick: acquire, then process under the session lock
    async fn tick(&self, session: &Mutex<MonitoringSession>, source: &dyn SpectrumSource) -> TickControl {
        let (center, bandwidth, timeout) = {
            let s = session.lock();
            match s.status {
                MonitoringStatus::Running => {}
                MonitoringStatus::Initializing | MonitoringStatus::Paused => return TickControl::Continue,
                _ => return TickControl::Stop,
            }
            let (center, bandwidth) = s.config.span();
            (center, bandwidth, s.config.acquisition_timeout)
        };

        let acquired = match tokio::time::timeout(timeout, source.acquire_frame(center, bandwidth)).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Timeout(format!(
                "{}: no frame within {} ms",
                source.device_id(),
                timeout.as_millis()
            ))),
        };

        let mut s = session.lock();
        match s.status {
            MonitoringStatus::Running => {}
            MonitoringStatus::Paused => return TickControl::Continue,
            _ => return TickControl::Stop,
        }

        match acquired {
            Ok(frame) => {
                self.process(&mut s, Arc::new(frame));
                TickControl::Continue
            }
            Err(e) => self.record_failure(&mut s, e),
        }
    }

    fn record_failure(&self, s: &mut MonitoringSession, err: DiscoveryError) -> TickControl {
        let consecutive = s.statistics.record_error();
        if let Ok(stats) = self.devices.stats(&s.device_id) {
            stats.record_error();
        }
        warn!("{} acquisition failed ({} in a row): {}", s.device_id, consecutive, err);

        if consecutive < s.config.max_consecutive_errors {
            return TickControl::Continue;
        }
        error!(
            "Monitoring {} on {} entering ERROR after {} failures",
            s.config.id, s.device_id, consecutive
        );
        // Any live state may move to ERROR
        s.status = MonitoringStatus::Error;
        if let Err(e) = self.devices.set_connected(&s.device_id, false) {
            warn!("could not mark {} disconnected: {}", s.device_id, e);
        }
        self.events.emit(MonitoringEvent::Error {
            session_id: s.id.clone(),
            message: err.to_string(),
            consecutive_errors: consecutive,
        });
        TickControl::Stop
    }

    /// Analyze, filter, track, record statistics, then submit decodes
    fn process(&self, s: &mut MonitoringSession, frame: Arc<SpectrumFrame>) -> TickReport {
        let started = Instant::now();
        let config = &s.config;

        let noise_floor = compute_noise_floor(&frame.samples, config.noise_floor_percentile);
        let peaks = detect_peaks(
            &frame.samples,
            noise_floor,
            frame.center_frequency,
            frame.bandwidth,
            config.threshold_db,
        );
        let in_range: Vec<SignalPeak> = peaks
            .iter()
            .filter(|p| config.range_for(p.frequency).is_some())
            .cloned()
            .collect();

        let mut report = TickReport {
            noise_floor,
            peaks_detected: peaks.len(),
            peaks_in_range: in_range.len(),
            ..TickReport::default()
        };

        let mut decodable = Vec::new();
        for peak in &in_range {
            let update = s.tracker.update(peak);
            if update.is_new {
                report.new_tracks += 1;
            }
            if s.config.decodes_at(peak.frequency)
                && s.tracker.should_decode(&update.tracking_id, s.config.decode_cooldown)
            {
                decodable.push((update.tracking_id, peak));
            }
        }

        let confidences: Vec<f64> = in_range.iter().map(|p| p.confidence).collect();
        report.processing_ms = started.elapsed().as_secs_f64() * 1000.0;
        s.statistics
            .record_frame(report.processing_ms, peaks.len(), &confidences, report.new_tracks, noise_floor);

        let device_stats = self.devices.stats(&s.device_id).ok();
        for (tracking_id, peak) in decodable {
            match self.decoder.start_decoding(peak, frame.clone(), s.config.decoding.clone()) {
                Ok(decode_id) => {
                    debug!("decode {} started for {} at {:.0} Hz", decode_id, tracking_id, peak.frequency);
                    s.tracker.record_decode_attempt(&tracking_id);
                    s.statistics.decodes_started += 1;
                    if let Some(stats) = &device_stats {
                        stats.record_decode();
                    }
                    report.decodes_started.push(decode_id);
                }
                Err(e) => {
                    debug!("decode not started for {}: {}", tracking_id, e);
                    s.statistics.decodes_rejected += 1;
                    report.decodes_rejected += 1;
                }
            }
        }

        if let Some(stats) = &device_stats {
            stats.record_frame(peaks.len());
        }
        self.devices.mark_seen(&s.device_id, noise_floor);
        self.events.emit(MonitoringEvent::SpectrumUpdated {
            session_id: s.id.clone(),
            timestamp: frame.timestamp,
            noise_floor,
            peaks: in_range,
        });
        report
    }
}
