//! Radio Discovery station
//!
//! Registers demo receivers, allocates the watch list across them, runs the
//! sampling loops and keeps decoded content in the discovery cache until
//! Ctrl+C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radio_discovery::config::{StationConfig, DEFAULT_CACHE_ID};
use radio_discovery::decoder::DecodingEvent;
use radio_discovery::device::{DeviceCapabilities, SyntheticSource, SyntheticTransmission};
use radio_discovery::monitor::{FrequencyPurpose, FrequencyRange, MonitoringConfiguration};
use radio_discovery::protocol::{AirFrame, ContentType};
use radio_discovery::sdr::SignalType;
use radio_discovery::StationContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("radio_discovery=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("===========================================");
    info!("   Radio Discovery - content relay station");
    info!("===========================================");

    let config = StationConfig::from_env();
    info!("Configuration:");
    info!("  Callsign: {}", config.station_callsign);
    info!("  Cache: {} bytes / {} entries, {:?} eviction", config.cache.max_size_bytes, config.cache.max_entries, config.cache.eviction_policy);
    info!("  Decoder: {} workers, queue {}", config.decoder_pool.max_workers, config.decoder_pool.queue_capacity);
    info!("  Allocation: {:?} (primary by {:?})", config.allocation.strategy, config.allocation.primary);

    let station = StationContext::new(config.clone()).context("failed to build station")?;

    register_demo_devices(&station).context("failed to register devices")?;

    let report = station.coordinator().allocate_frequencies(&watch_list(&config));
    for failure in &report.failures {
        warn!("  {} not allocated: {}", failure.config_id, failure.reason);
    }
    let started = station
        .coordinator()
        .start_allocated(&report.plan)
        .into_iter()
        .filter(|r| r.is_ok())
        .count();
    info!("Started {} monitoring sessions", started);

    station.start_background();

    let mut decodes = station.decoder().subscribe();
    let event_logger = tokio::spawn(async move {
        while let Some(event) = decodes.recv().await {
            match event {
                DecodingEvent::Completed { transmission, elapsed_ms, .. } => info!(
                    "Decoded {:?} {:?} chunk from {} at {:.0} Hz ({} bytes, {} ms)",
                    transmission.verification.trust_level,
                    transmission.content_type,
                    transmission.source_callsign,
                    transmission.frequency,
                    transmission.payload.len(),
                    elapsed_ms
                ),
                DecodingEvent::Failed { session_id, phase, message, .. } => {
                    warn!("Decode {} failed in {}: {}", session_id, phase, message)
                }
                _ => {}
            }
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    station.shutdown().await;
    event_logger.abort();
    info!("Radio Discovery stopped");
    Ok(())
}

/// Two HF receivers and one VHF dongle with a few stations on the air
fn register_demo_devices(station: &StationContext) -> Result<()> {
    let beacon = AirFrame::new("W1AW", ContentType::Text, b"QST de W1AW: discovery net on 14.085".to_vec())
        .encode()
        .context("encode beacon")?;
    let page = AirFrame::new(
        "K2ABC-7",
        ContentType::HttpResponse,
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 12\r\n\r\nhello, mesh!".to_vec(),
    )
    .encode()
    .context("encode page")?;

    let hf0 = SyntheticSource::new("hf-0", DeviceCapabilities::hf()).with_noise_jitter(0.1);
    hf0.add_transmission(SyntheticTransmission {
        frequency: 14_085_000.0,
        snr_db: 18.0,
        signal_type: SignalType::Qpsk,
        frame_bytes: beacon,
        symbol_rate: 1250.0,
    });
    let hf1 = SyntheticSource::new("hf-1", DeviceCapabilities::hf()).with_noise_jitter(0.1);
    hf1.add_transmission(SyntheticTransmission {
        frequency: 7_101_000.0,
        snr_db: 22.0,
        signal_type: SignalType::Bpsk,
        frame_bytes: page,
        symbol_rate: 1250.0,
    });
    let rtl0 = SyntheticSource::new("rtl-0", DeviceCapabilities::rtl_sdr()).with_noise_jitter(0.1);

    for source in [hf0, hf1, rtl0] {
        station.devices().register(Arc::new(source))?;
    }
    Ok(())
}

fn watch_list(config: &StationConfig) -> Vec<MonitoringConfiguration> {
    let mut list = vec![
        MonitoringConfiguration::new(
            "20m-content",
            vec![FrequencyRange::new(14_085_000.0, 10_000.0, FrequencyPurpose::ContentDiscovery, 6)],
        ),
        MonitoringConfiguration::new(
            "40m-content",
            vec![FrequencyRange::new(7_100_000.0, 10_000.0, FrequencyPurpose::ContentDiscovery, 5)],
        ),
        MonitoringConfiguration::new(
            "20m-emcomm",
            vec![FrequencyRange::new(14_300_000.0, 6_000.0, FrequencyPurpose::Emergency, 9)],
        ),
        MonitoringConfiguration::new(
            "2m-aprs",
            vec![FrequencyRange::new(144_390_000.0, 20_000.0, FrequencyPurpose::MeshCoordination, 4)],
        ),
    ];
    for c in &mut list {
        c.update_rate_hz = config.monitor_update_rate_hz;
        c.decoding.cache_id = Some(DEFAULT_CACHE_ID.to_string());
    }
    list
}
