//! Signal decoder
//!
//! Turns a detected peak plus its spectrum frame into a
//! [`DecodedTransmission`] through eight ordered phases, on a bounded pool
//! of worker threads. Successful decodes are written to the configured
//! cache before the completion event goes out.

pub mod phases;
pub mod pool;
pub mod session;
pub mod types;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheRegistry, SignalQuality};
use crate::error::{DiscoveryError, Result};
use crate::events::{EventBus, Subscription};
use crate::sdr::{SignalPeak, SignalType, SpectrumFrame};

pub use pool::DecodePool;
pub use session::{trust_for, DecodeOutcome, DecodingSession, DecodingSessionInfo};
pub use types::{
    DecodedTransmission, DecodingConfig, DecodingPhase, DecodingProgress, DecodingQuality, DecodingStatus,
    DemodulationParams, FailedOperation, QualityThresholds,
};

/// Worker pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderPoolConfig {
    pub max_workers: usize,
    pub queue_capacity: usize,
}

impl Default for DecoderPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            queue_capacity: 64,
        }
    }
}

/// Decoder lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodingEvent {
    Started {
        session_id: String,
        frequency: f64,
        signal_type: SignalType,
    },
    Progress {
        session_id: String,
        phase: DecodingPhase,
        percentage: u8,
    },
    Completed {
        session_id: String,
        transmission: DecodedTransmission,
        completed_operations: Vec<DecodingPhase>,
        elapsed_ms: u64,
    },
    Failed {
        session_id: String,
        phase: DecodingPhase,
        message: String,
        completed_operations: Vec<DecodingPhase>,
    },
    Cancelled {
        session_id: String,
        completed_operations: Vec<DecodingPhase>,
    },
}

/// Counters (atomic for thread-safe access)
#[derive(Debug, Default)]
struct DecoderStats {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
    rejected_quality: AtomicU64,
    rejected_queue: AtomicU64,
    cache_inserts: AtomicU64,
    cache_insert_errors: AtomicU64,
    total_decode_ms: AtomicU64,
}

/// Snapshot of decoder counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecoderStatistics {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub rejected_quality: u64,
    pub rejected_queue: u64,
    pub cache_inserts: u64,
    pub cache_insert_errors: u64,
    pub active: usize,
    pub avg_decode_ms: f64,
}

impl std::fmt::Display for DecoderStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} started, {} completed, {} failed ({} timed out), {} cancelled | rejected: {} quality, {} queue | {} active | avg {:.1} ms",
            self.started,
            self.completed,
            self.failed,
            self.timed_out,
            self.cancelled,
            self.rejected_quality,
            self.rejected_queue,
            self.active,
            self.avg_decode_ms
        )
    }
}

struct LiveSession {
    info: DecodingSessionInfo,
    cancel: Arc<AtomicBool>,
}

struct DecoderInner {
    sessions: Mutex<HashMap<String, LiveSession>>,
    stats: DecoderStats,
    events: EventBus<DecodingEvent>,
    caches: Option<Arc<CacheRegistry>>,
}

/// Owns live decode sessions and the worker pool
pub struct SignalDecoder {
    inner: Arc<DecoderInner>,
    pool: Mutex<Option<DecodePool>>,
}

impl SignalDecoder {
    pub fn new(pool: DecoderPoolConfig, caches: Option<Arc<CacheRegistry>>) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(DecoderInner {
                sessions: Mutex::new(HashMap::new()),
                stats: DecoderStats::default(),
                events: EventBus::default(),
                caches,
            }),
            pool: Mutex::new(Some(DecodePool::new(pool.max_workers, pool.queue_capacity)?)),
        })
    }

    /// Validate the peak and queue a decode. Peaks below the quality
    /// thresholds are rejected with `Quality` and no session is created.
    pub fn start_decoding(&self, peak: &SignalPeak, frame: Arc<SpectrumFrame>, config: DecodingConfig) -> Result<String> {
        config.validate()?;
        if let Err(e) = check_quality(peak, &config) {
            self.inner.stats.rejected_quality.fetch_add(1, Ordering::Relaxed);
            debug!("decode rejected at {:.0} Hz: {}", peak.frequency, e);
            return Err(e);
        }

        let session = DecodingSession::new(peak.clone(), frame, config);
        let id = session.id.clone();
        self.inner.sessions.lock().insert(
            id.clone(),
            LiveSession {
                info: session.info(),
                cancel: session.cancel_handle(),
            },
        );

        let inner = self.inner.clone();
        let submitted = match self.pool.lock().as_ref() {
            Some(pool) => pool.submit(move || run_session(inner, session)),
            None => Err(DiscoveryError::InvalidState("decoder is shut down".into())),
        };

        if let Err(e) = submitted {
            self.inner.sessions.lock().remove(&id);
            self.inner.stats.rejected_queue.fetch_add(1, Ordering::Relaxed);
            warn!("decode of {:.0} Hz not queued: {}", peak.frequency, e);
            return Err(e);
        }

        self.inner.stats.started.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Ask a live session to stop at its next phase boundary
    pub fn cancel_decoding(&self, session_id: &str) -> Result<()> {
        let sessions = self.inner.sessions.lock();
        let live = sessions
            .get(session_id)
            .ok_or_else(|| DiscoveryError::not_found("decoding session", session_id))?;
        live.cancel.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Snapshot of a live session
    pub fn session(&self, session_id: &str) -> Result<DecodingSessionInfo> {
        self.inner
            .sessions
            .lock()
            .get(session_id)
            .map(|s| s.info.clone())
            .ok_or_else(|| DiscoveryError::not_found("decoding session", session_id))
    }

    pub fn active_sessions(&self) -> Vec<DecodingSessionInfo> {
        let mut list: Vec<DecodingSessionInfo> =
            self.inner.sessions.lock().values().map(|s| s.info.clone()).collect();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        list
    }

    pub fn subscribe(&self) -> Subscription<DecodingEvent> {
        self.inner.events.subscribe()
    }

    pub fn statistics(&self) -> DecoderStatistics {
        let s = &self.inner.stats;
        let completed = s.completed.load(Ordering::Relaxed);
        DecoderStatistics {
            started: s.started.load(Ordering::Relaxed),
            completed,
            failed: s.failed.load(Ordering::Relaxed),
            cancelled: s.cancelled.load(Ordering::Relaxed),
            timed_out: s.timed_out.load(Ordering::Relaxed),
            rejected_quality: s.rejected_quality.load(Ordering::Relaxed),
            rejected_queue: s.rejected_queue.load(Ordering::Relaxed),
            cache_inserts: s.cache_inserts.load(Ordering::Relaxed),
            cache_insert_errors: s.cache_insert_errors.load(Ordering::Relaxed),
            active: self.inner.sessions.lock().len(),
            avg_decode_ms: if completed > 0 {
                s.total_decode_ms.load(Ordering::Relaxed) as f64 / completed as f64
            } else {
                0.0
            },
        }
    }

    /// Stop accepting work and wait for queued decodes to finish
    pub fn shutdown(&self) {
        let pool = self.pool.lock().take();
        if let Some(mut pool) = pool {
            for live in self.inner.sessions.lock().values() {
                live.cancel.store(true, Ordering::SeqCst);
            }
            pool.shutdown();
        }
    }
}

fn check_quality(peak: &SignalPeak, config: &DecodingConfig) -> Result<()> {
    let t = &config.quality_thresholds;
    if peak.snr < t.minimum_snr {
        return Err(DiscoveryError::Quality(format!(
            "SNR {:.1} dB below {:.1} dB",
            peak.snr, t.minimum_snr
        )));
    }
    if peak.power < t.minimum_power {
        return Err(DiscoveryError::Quality(format!(
            "power {:.1} dB below {:.1} dB",
            peak.power, t.minimum_power
        )));
    }
    if peak.confidence < t.minimum_confidence {
        return Err(DiscoveryError::Quality(format!(
            "confidence {:.2} below {:.2}",
            peak.confidence, t.minimum_confidence
        )));
    }
    Ok(())
}

/// Worker-side body of one decode
fn run_session(inner: Arc<DecoderInner>, mut session: DecodingSession) {
    let id = session.id.clone();
    inner.events.emit(DecodingEvent::Started {
        session_id: id.clone(),
        frequency: session.peak.frequency,
        signal_type: session.peak.signal_type,
    });

    let outcome = session.run(|s| {
        if let Some(live) = inner.sessions.lock().get_mut(&s.id) {
            live.info = s.info();
        }
        if let Some(phase) = s.progress.completed_operations.last() {
            inner.events.emit(DecodingEvent::Progress {
                session_id: s.id.clone(),
                phase: *phase,
                percentage: s.progress.percentage,
            });
        }
    });

    let elapsed_ms = session.elapsed().as_millis() as u64;
    let completed_operations = session.progress.completed_operations.clone();
    inner.sessions.lock().remove(&id);
    let stats = &inner.stats;

    match outcome {
        DecodeOutcome::Completed(transmission) => {
            stats.completed.fetch_add(1, Ordering::Relaxed);
            stats.total_decode_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
            info!(
                "Decoded {:?} from {} on {:.0} Hz ({} bytes, {} ms)",
                transmission.content_type,
                transmission.source_callsign,
                transmission.frequency,
                transmission.payload.len(),
                elapsed_ms
            );

            if let (Some(caches), Some(cache_id)) = (&inner.caches, &session.config.cache_id) {
                match store_transmission(caches, cache_id, &session.peak, &transmission) {
                    Ok(()) => {
                        stats.cache_inserts.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        stats.cache_insert_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("cache insert for {} failed: {}", transmission.id, e);
                    }
                }
            }

            inner.events.emit(DecodingEvent::Completed {
                session_id: id,
                transmission,
                completed_operations,
                elapsed_ms,
            });
        }
        DecodeOutcome::Failed {
            phase,
            message,
            timed_out,
        } => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            if timed_out {
                stats.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            inner.events.emit(DecodingEvent::Failed {
                session_id: id,
                phase,
                message,
                completed_operations,
            });
        }
        DecodeOutcome::Cancelled => {
            stats.cancelled.fetch_add(1, Ordering::Relaxed);
            inner.events.emit(DecodingEvent::Cancelled {
                session_id: id,
                completed_operations,
            });
        }
    }
}

/// Cache entry for a decoded transmission; chunk id is the payload hash
pub fn cache_entry_for(
    peak: &SignalPeak,
    transmission: &DecodedTransmission,
    ttl: std::time::Duration,
) -> CacheEntry {
    let quality = SignalQuality {
        snr: peak.snr,
        rssi: peak.quality.rssi,
        confidence: peak.confidence,
        stability: peak.quality.stability,
        frequency: peak.frequency,
    };
    let mut entry = CacheEntry::new(
        transmission.payload_hash.clone(),
        transmission.source_callsign.clone(),
        transmission.content_type,
        transmission.payload.clone(),
        quality,
        ttl,
    );
    entry.verification = transmission.verification;
    entry
}

fn store_transmission(
    caches: &CacheRegistry,
    cache_id: &str,
    peak: &SignalPeak,
    transmission: &DecodedTransmission,
) -> Result<()> {
    let cache = caches.get(cache_id)?;
    let entry = cache_entry_for(peak, transmission, cache.config().default_ttl);
    cache.insert(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheQuery, EntryStatus};
    use crate::decoder::session::tests::{beacon_bytes, qpsk_frame};
    use std::time::Duration;

    fn decoder_with_cache() -> (SignalDecoder, Arc<CacheRegistry>) {
        let caches = Arc::new(CacheRegistry::new());
        caches.create("main", CacheConfig::default()).unwrap();
        let decoder = SignalDecoder::new(DecoderPoolConfig::default(), Some(caches.clone())).unwrap();
        (decoder, caches)
    }

    fn cached_config() -> DecodingConfig {
        DecodingConfig {
            cache_id: Some("main".into()),
            ..DecodingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_decode_inserts_into_cache_before_completed() {
        let (decoder, caches) = decoder_with_cache();
        let mut events = decoder.subscribe();
        let (peak, frame) = qpsk_frame(18.0, &beacon_bytes());

        let id = decoder.start_decoding(&peak, frame, cached_config()).unwrap();

        let mut completed = None;
        while let Some(event) = events.recv_timeout(Duration::from_secs(10)).await {
            if let DecodingEvent::Completed { session_id, transmission, .. } = event {
                assert_eq!(session_id, id);
                completed = Some(transmission);
                break;
            }
        }
        let transmission = completed.expect("decode did not complete");

        let entries = caches.query("main", &CacheQuery::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chunk_id, transmission.payload_hash);
        assert_eq!(entries[0].status, EntryStatus::Valid);
        assert!(decoder.session(&id).is_err());

        let stats = decoder.statistics();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cache_inserts, 1);
        decoder.shutdown();
    }

    #[test]
    fn test_quality_rejection_creates_no_session() {
        let (decoder, _) = decoder_with_cache();
        let (mut peak, frame) = qpsk_frame(18.0, &beacon_bytes());
        peak.snr = 3.0;

        let err = decoder.start_decoding(&peak, frame, cached_config()).unwrap_err();
        assert!(matches!(err, DiscoveryError::Quality(_)));
        assert!(decoder.active_sessions().is_empty());
        assert_eq!(decoder.statistics().rejected_quality, 1);
        assert_eq!(decoder.statistics().started, 0);
        decoder.shutdown();
    }

    #[tokio::test]
    async fn test_failure_event_reports_phase() {
        let (decoder, caches) = decoder_with_cache();
        let mut events = decoder.subscribe();
        let (peak, frame) = qpsk_frame(18.0, &[0xA5; 24]);
        decoder.start_decoding(&peak, frame, cached_config()).unwrap();

        let mut failed = None;
        while let Some(event) = events.recv_timeout(Duration::from_secs(10)).await {
            if let DecodingEvent::Failed { phase, completed_operations, .. } = event {
                failed = Some((phase, completed_operations));
                break;
            }
        }
        let (phase, done) = failed.expect("no failure event");
        assert_eq!(phase, DecodingPhase::Synchronization);
        assert_eq!(done, DecodingPhase::ALL[..3].to_vec());
        assert!(caches.get("main").unwrap().is_empty());
        assert_eq!(decoder.statistics().failed, 1);
        decoder.shutdown();
    }

    #[test]
    fn test_unknown_session() {
        let (decoder, _) = decoder_with_cache();
        assert!(matches!(
            decoder.cancel_decoding("nope"),
            Err(DiscoveryError::NotFound { .. })
        ));
        decoder.shutdown();
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let (decoder, _) = decoder_with_cache();
        decoder.shutdown();
        let (peak, frame) = qpsk_frame(18.0, &beacon_bytes());
        assert!(matches!(
            decoder.start_decoding(&peak, frame, cached_config()),
            Err(DiscoveryError::InvalidState(_))
        ));
        assert_eq!(decoder.statistics().rejected_queue, 1);
    }
}
