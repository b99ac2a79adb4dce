//! Station context: owns every long-lived component
//!
//! Construction wires the cache registry, device registry, decoder and
//! coordinator together; [`StationContext::shutdown`] tears them down in
//! reverse order.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::cache::CacheRegistry;
use crate::config::{StationConfig, DEFAULT_CACHE_ID};
use crate::decoder::SignalDecoder;
use crate::device::DeviceRegistry;
use crate::error::Result;
use crate::monitor::MonitoringCoordinator;
use crate::scheduler::{ScheduledTask, TickControl};

pub struct StationContext {
    config: StationConfig,
    caches: Arc<CacheRegistry>,
    devices: Arc<DeviceRegistry>,
    decoder: Arc<SignalDecoder>,
    coordinator: MonitoringCoordinator,
    background: Mutex<Vec<ScheduledTask>>,
}

impl StationContext {
    /// Build the component graph and create the default cache
    pub fn new(config: StationConfig) -> Result<Self> {
        config.validate()?;

        let caches = Arc::new(CacheRegistry::new());
        caches.create(DEFAULT_CACHE_ID, config.cache.clone())?;

        let devices = Arc::new(DeviceRegistry::new());
        let decoder = Arc::new(SignalDecoder::new(config.decoder_pool, Some(caches.clone()))?);
        let coordinator = MonitoringCoordinator::new(devices.clone(), decoder.clone(), config.allocation);

        info!(
            "Station {} ready: cache '{}' ({} bytes, {} entries, {:?} eviction)",
            config.station_callsign,
            DEFAULT_CACHE_ID,
            config.cache.max_size_bytes,
            config.cache.max_entries,
            config.cache.eviction_policy
        );

        Ok(Self {
            config,
            caches,
            devices,
            decoder,
            coordinator,
            background: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn caches(&self) -> &Arc<CacheRegistry> {
        &self.caches
    }

    pub fn devices(&self) -> &Arc<DeviceRegistry> {
        &self.devices
    }

    pub fn decoder(&self) -> &Arc<SignalDecoder> {
        &self.decoder
    }

    pub fn coordinator(&self) -> &MonitoringCoordinator {
        &self.coordinator
    }

    /// Start the periodic cache cleanup and statistics report.
    /// Must be called inside a tokio runtime.
    pub fn start_background(&self) {
        let mut tasks = self.background.lock();
        if !tasks.is_empty() {
            return;
        }

        let caches = self.caches.clone();
        tasks.push(ScheduledTask::spawn(
            "cache-cleanup",
            self.config.cache_cleanup_interval,
            move || {
                let caches = caches.clone();
                async move {
                    for (id, report) in caches.cleanup_all() {
                        if report.removed > 0 {
                            info!("[Cache] {}: cleanup removed {} entries ({} bytes)", id, report.removed, report.freed_bytes);
                        } else {
                            debug!("[Cache] {}: cleanup scanned {} entries", id, report.scanned);
                        }
                    }
                    TickControl::Continue
                }
            },
        ));

        let caches = self.caches.clone();
        let decoder = self.decoder.clone();
        let devices = self.devices.clone();
        tasks.push(ScheduledTask::spawn(
            "stats-report",
            self.config.stats_report_interval,
            move || {
                let caches = caches.clone();
                let decoder = decoder.clone();
                let devices = devices.clone();
                async move {
                    for (id, stats) in caches.statistics() {
                        info!("[Cache] {}: {}", id, stats);
                    }
                    info!("[Decoder] {}", decoder.statistics());
                    for device in devices.list() {
                        if let Ok(stats) = devices.stats(&device.device_id) {
                            info!("[Device] {}: {}", device.device_id, stats);
                        }
                    }
                    TickControl::Continue
                }
            },
        ));
    }

    /// Stop monitoring, background tasks and the decode pool
    pub async fn shutdown(&self) {
        info!("Shutting down station {}", self.config.station_callsign);
        self.coordinator.shutdown().await;

        let tasks: Vec<ScheduledTask> = self.background.lock().drain(..).collect();
        for task in tasks {
            task.shutdown().await;
        }

        // Joining worker threads blocks
        let decoder = self.decoder.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || decoder.shutdown()).await {
            debug!("decoder shutdown task failed: {}", e);
        }

        for (id, stats) in self.caches.statistics() {
            info!("[Cache] {} final: {}", id, stats);
        }
        info!("[Decoder] final: {}", self.decoder.statistics());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheQuery, EntryStatus};
    use crate::decoder::session::tests::beacon_bytes;
    use crate::decoder::DecodingEvent;
    use crate::device::{DeviceCapabilities, SyntheticSource, SyntheticTransmission};
    use crate::monitor::{FrequencyPurpose, FrequencyRange, MonitoringConfiguration, MonitoringStatus};
    use crate::sdr::SignalType;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_end_to_end_single_transmission_reaches_cache() {
        let station = StationContext::new(StationConfig::default()).unwrap();
        let source = Arc::new(SyntheticSource::new("hf-0", DeviceCapabilities::hf()));
        source.add_transmission(SyntheticTransmission {
            frequency: 14_085_000.0,
            snr_db: 18.0,
            signal_type: SignalType::Qpsk,
            frame_bytes: beacon_bytes(),
            symbol_rate: 1250.0,
        });
        station.devices().register(source.clone()).unwrap();

        let mut decodes = station.decoder().subscribe();
        let config = MonitoringConfiguration::new(
            "20m-content",
            vec![FrequencyRange::new(14_085_000.0, 10_000.0, FrequencyPurpose::ContentDiscovery, 5)],
        )
        .with_cache(DEFAULT_CACHE_ID);
        let session_id = station.coordinator().start_monitoring("hf-0", config).unwrap();
        assert_eq!(
            station.coordinator().session_status(&session_id).unwrap(),
            MonitoringStatus::Running
        );

        let mut completed = None;
        while let Some(event) = decodes.recv_timeout(Duration::from_secs(10)).await {
            match event {
                DecodingEvent::Completed { transmission, .. } => {
                    completed = Some(transmission);
                    break;
                }
                DecodingEvent::Failed { phase, message, .. } => panic!("decode failed in {}: {}", phase, message),
                _ => {}
            }
        }
        let transmission = completed.expect("no decode completed");
        assert_eq!(transmission.source_callsign, "W1AW");

        // Later ticks keep seeing the carrier but the track is cooling down
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(station.decoder().statistics().started, 1);

        let entries = station.caches().query(DEFAULT_CACHE_ID, &CacheQuery::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!((entries[0].signal_quality.snr - 18.0).abs() < 1e-3);
        assert_eq!(entries[0].status, EntryStatus::Valid);
        assert_eq!(entries[0].payload, b"QST de W1AW");

        station.shutdown().await;
        assert!(station.coordinator().active_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_background_tasks_start_once_and_stop() {
        let station = StationContext::new(StationConfig::default()).unwrap();
        station.start_background();
        station.start_background();
        assert_eq!(station.background.lock().len(), 2);
        station.shutdown().await;
        assert!(station.background.lock().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StationConfig {
            monitor_update_rate_hz: 0.0,
            ..StationConfig::default()
        };
        assert!(StationContext::new(config).is_err());
    }
}
