//! One decode attempt and its phase state machine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::phases::{self, IntermediateResults};
use super::types::{
    DecodedTransmission, DecodingConfig, DecodingPhase, DecodingProgress, DecodingQuality, DecodingStatus,
    FailedOperation,
};
use crate::cache::{hash_payload, TrustLevel, VerificationInfo};
use crate::sdr::{SignalPeak, SpectrumFrame};

/// SNR at or above which an uncorrected frame earns HIGH trust
pub const HIGH_TRUST_MIN_SNR: f64 = 15.0;

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Completed(DecodedTransmission),
    Failed {
        phase: DecodingPhase,
        message: String,
        timed_out: bool,
    },
    Cancelled,
}

/// Serializable view of a session without its sample buffers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodingSessionInfo {
    pub id: String,
    pub peak: SignalPeak,
    pub status: DecodingStatus,
    pub progress: DecodingProgress,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// A single decode attempt. Intermediate buffers live only as long as the
/// attempt.
pub struct DecodingSession {
    pub id: String,
    pub peak: SignalPeak,
    pub frame: Arc<SpectrumFrame>,
    pub config: DecodingConfig,
    pub status: DecodingStatus,
    pub progress: DecodingProgress,
    pub intermediate: IntermediateResults,
    pub started_at: DateTime<Utc>,
    pub(crate) started: Instant,
    cancel: Arc<AtomicBool>,
}

impl DecodingSession {
    pub fn new(peak: SignalPeak, frame: Arc<SpectrumFrame>, config: DecodingConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            peak,
            frame,
            config,
            status: DecodingStatus::Initializing,
            progress: DecodingProgress::default(),
            intermediate: IntermediateResults::default(),
            started_at: Utc::now(),
            started: Instant::now(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag observed at the next phase boundary
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn info(&self) -> DecodingSessionInfo {
        DecodingSessionInfo {
            id: self.id.clone(),
            peak: self.peak.clone(),
            status: self.status,
            progress: self.progress.clone(),
            started_at: self.started_at,
            elapsed_ms: self.elapsed().as_millis() as u64,
        }
    }

    /// Drive every phase in order. `on_phase` sees the session after each
    /// completed phase.
    pub fn run(&mut self, mut on_phase: impl FnMut(&DecodingSession)) -> DecodeOutcome {
        for phase in DecodingPhase::ALL {
            if self.cancel.load(Ordering::SeqCst) {
                return self.cancelled();
            }
            if self.elapsed() > self.config.max_decoding_time {
                return self.timed_out(phase);
            }

            self.status = phase.status();
            self.progress.current_phase = Some(phase);
            debug!("decode {} entering {}", self.id, phase);

            let step = match phase {
                DecodingPhase::ContentExtraction => self.extract_content().map(Some),
                _ => self.run_phase(phase).map(|_| None),
            };

            match step {
                Ok(transmission) => {
                    self.progress.completed_operations.push(phase);
                    self.progress.percentage = phase.percentage();
                    on_phase(self);

                    if let Some(transmission) = transmission {
                        // Completion is still subject to the overall deadline
                        if self.elapsed() > self.config.max_decoding_time {
                            return self.timed_out(phase);
                        }
                        self.status = DecodingStatus::Completed;
                        self.progress.current_phase = None;
                        self.intermediate = IntermediateResults::default();
                        return DecodeOutcome::Completed(transmission);
                    }
                }
                Err(message) => return self.fail(phase, message, false),
            }
        }

        // ALL always ends with ContentExtraction
        self.fail(DecodingPhase::ContentExtraction, "no transmission produced".into(), false)
    }

    fn run_phase(&mut self, phase: DecodingPhase) -> phases::PhaseResult<()> {
        let signal_type = self.peak.signal_type;
        let params = self.config.demodulation;
        let ir = &mut self.intermediate;

        match phase {
            DecodingPhase::SignalConditioning => {
                let meta = &self.frame.metadata;
                let baseband = meta
                    .baseband
                    .as_deref()
                    .ok_or_else(|| "frame carries no baseband capture".to_string())?;
                let sps = phases::samples_per_symbol(meta.sample_rate, params.symbol_rate);
                let offset = self.peak.frequency - self.frame.center_frequency;
                ir.conditioned = Some(phases::condition(
                    baseband,
                    offset,
                    meta.sample_rate,
                    sps,
                    signal_type.is_phase_keyed(),
                )?);
            }
            DecodingPhase::Demodulation => {
                let cond = ir.conditioned.as_ref().ok_or_else(|| missing("conditioned signal"))?;
                ir.demodulated = Some(phases::demodulate(cond, signal_type)?);
            }
            DecodingPhase::SymbolRecovery => {
                let demod = ir.demodulated.as_ref().ok_or_else(|| missing("soft symbols"))?;
                ir.symbols = Some(phases::recover_symbols(demod, signal_type, &params)?);
            }
            DecodingPhase::Synchronization => {
                let demod = ir.demodulated.as_ref().ok_or_else(|| missing("soft symbols"))?;
                let symbols = ir.symbols.as_ref().ok_or_else(|| missing("bit decisions"))?;
                ir.sync = Some(phases::synchronize(demod, symbols, signal_type, params.max_sync_errors)?);
            }
            DecodingPhase::FrameDetection => {
                let sync = ir.sync.as_ref().ok_or_else(|| missing("sync result"))?;
                ir.frame = Some(phases::detect_frame(sync)?);
            }
            DecodingPhase::ErrorCorrection => {
                let sync = ir.sync.as_ref().ok_or_else(|| missing("sync result"))?;
                let frame = ir.frame.as_ref().ok_or_else(|| missing("frame boundaries"))?;
                ir.correction = Some(phases::correct_errors(sync, frame, &params)?);
            }
            DecodingPhase::ProtocolAnalysis => {
                let fixed = ir.correction.as_ref().ok_or_else(|| missing("corrected frame"))?;
                ir.protocol = Some(phases::analyze_protocol(&fixed.body)?);
            }
            DecodingPhase::ContentExtraction => {}
        }
        Ok(())
    }

    fn extract_content(&mut self) -> phases::PhaseResult<DecodedTransmission> {
        let ir = &self.intermediate;
        let protocol = ir.protocol.as_ref().ok_or_else(|| missing("protocol analysis"))?;
        let correction = ir.correction.as_ref().ok_or_else(|| missing("corrected frame"))?;
        let demod = ir.demodulated.as_ref().ok_or_else(|| missing("soft symbols"))?;
        let symbols = ir.symbols.as_ref().ok_or_else(|| missing("bit decisions"))?;
        let sync = ir.sync.as_ref().ok_or_else(|| missing("sync result"))?;

        let corrected = correction.corrected_bits.len() as u32;
        let frame = &protocol.frame;

        Ok(DecodedTransmission {
            id: Uuid::new_v4().to_string(),
            source_callsign: frame.callsign.clone(),
            frequency: self.peak.frequency,
            timestamp: self.frame.timestamp,
            content_type: frame.content_type,
            payload_hash: hash_payload(&frame.payload),
            payload: frame.payload.clone(),
            verification: VerificationInfo {
                signature_verified: false,
                checksum_verified: true,
                trust_level: trust_for(true, corrected, self.peak.snr),
            },
            quality: DecodingQuality {
                bit_error_rate: corrected as f64 / correction.frame_bits.max(1) as f64,
                symbol_error_rate: symbols.symbol_error_rate,
                corrected_errors: corrected,
                estimated_snr: demod.estimated_snr,
                evm: demod.evm,
                sync_errors: sync.errors,
            },
            peak_snr: self.peak.snr,
        })
    }

    fn fail(&mut self, phase: DecodingPhase, message: String, timed_out: bool) -> DecodeOutcome {
        warn!("decode {} failed in {}: {}", self.id, phase, message);
        self.status = DecodingStatus::Failed;
        self.progress.failed_operations.push(FailedOperation {
            phase,
            message: message.clone(),
        });
        self.intermediate = IntermediateResults::default();
        DecodeOutcome::Failed {
            phase,
            message,
            timed_out,
        }
    }

    fn timed_out(&mut self, phase: DecodingPhase) -> DecodeOutcome {
        let limit = self.config.max_decoding_time.as_millis();
        self.fail(phase, format!("decode exceeded {} ms", limit), true)
    }

    fn cancelled(&mut self) -> DecodeOutcome {
        debug!("decode {} cancelled", self.id);
        self.status = DecodingStatus::Cancelled;
        self.intermediate = IntermediateResults::default();
        DecodeOutcome::Cancelled
    }
}

/// HIGH: CRC passed untouched at good SNR; MEDIUM: CRC passed; LOW otherwise
pub fn trust_for(checksum_ok: bool, corrected_bits: u32, snr: f64) -> TrustLevel {
    match (checksum_ok, corrected_bits) {
        (true, 0) if snr >= HIGH_TRUST_MIN_SNR => TrustLevel::High,
        (true, _) => TrustLevel::Medium,
        (false, _) => TrustLevel::Low,
    }
}

fn missing(what: &str) -> String {
    format!("{} unavailable", what)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::{AirFrame, ContentType};
    use crate::sdr::{compute_noise_floor, detect_peaks, FrameSynth, SignalType};

    /// QPSK transmission on bin 512 of a 10 kHz frame at 14.085 MHz
    pub(crate) fn qpsk_frame(snr: f64, frame_bytes: &[u8]) -> (SignalPeak, Arc<SpectrumFrame>) {
        let frame = FrameSynth::new("test-sdr", 14_085_000.0, 10_000.0, 1024)
            .with_transmission(512, snr, SignalType::Qpsk, frame_bytes, 1250.0)
            .build();
        let nf = compute_noise_floor(&frame.samples, 20.0);
        let peak = detect_peaks(&frame.samples, nf, frame.center_frequency, frame.bandwidth, 10.0)
            .into_iter()
            .next()
            .unwrap();
        (peak, Arc::new(frame))
    }

    pub(crate) fn beacon_bytes() -> Vec<u8> {
        AirFrame::new("W1AW", ContentType::Text, b"QST de W1AW".to_vec())
            .encode()
            .unwrap()
    }

    #[test]
    fn test_full_decode() {
        let (peak, frame) = qpsk_frame(18.0, &beacon_bytes());
        assert_eq!(peak.signal_type, SignalType::Qpsk);

        let mut session = DecodingSession::new(peak, frame, DecodingConfig::default());
        let mut seen = Vec::new();
        let outcome = session.run(|s| seen.push(s.progress.percentage));

        let tx = match outcome {
            DecodeOutcome::Completed(tx) => tx,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(tx.source_callsign, "W1AW");
        assert_eq!(tx.payload, b"QST de W1AW");
        assert_eq!(tx.payload_hash, hash_payload(b"QST de W1AW"));
        assert_eq!(tx.verification.trust_level, TrustLevel::High);
        assert_eq!(seen, vec![10, 25, 40, 55, 70, 80, 90, 100]);
        assert_eq!(session.status, DecodingStatus::Completed);
        assert_eq!(session.progress.completed_operations, DecodingPhase::ALL.to_vec());
        assert!(session.intermediate.conditioned.is_none());
    }

    #[test]
    fn test_completed_operations_prefix_on_failure() {
        // A burst without a sync word stops at Synchronization
        let (peak, frame) = qpsk_frame(18.0, &[0xA5; 24]);
        let mut session = DecodingSession::new(peak, frame, DecodingConfig::default());
        let outcome = session.run(|_| {});

        assert!(matches!(
            outcome,
            DecodeOutcome::Failed {
                phase: DecodingPhase::Synchronization,
                timed_out: false,
                ..
            }
        ));
        assert_eq!(session.progress.completed_operations, DecodingPhase::ALL[..3].to_vec());
        assert_eq!(session.progress.failed_operations.len(), 1);
        assert_eq!(session.status, DecodingStatus::Failed);
        assert!(session.intermediate.demodulated.is_none());
    }

    #[test]
    fn test_missing_baseband_fails_first_phase() {
        let (peak, frame) = qpsk_frame(18.0, &beacon_bytes());
        let mut bare = (*frame).clone();
        bare.metadata.baseband = None;
        let mut session = DecodingSession::new(peak, Arc::new(bare), DecodingConfig::default());
        assert!(matches!(
            session.run(|_| {}),
            DecodeOutcome::Failed {
                phase: DecodingPhase::SignalConditioning,
                ..
            }
        ));
        assert!(session.progress.completed_operations.is_empty());
    }

    #[test]
    fn test_timeout_forces_failure() {
        let (peak, frame) = qpsk_frame(18.0, &beacon_bytes());
        let mut session = DecodingSession::new(peak, frame, DecodingConfig::default());
        if let Some(past) = Instant::now().checked_sub(Duration::from_millis(30_001)) {
            session.started = past;
        } else {
            session.config.max_decoding_time = Duration::from_nanos(1);
            std::thread::sleep(Duration::from_millis(2));
        }

        match session.run(|_| {}) {
            DecodeOutcome::Failed { timed_out, .. } => assert!(timed_out),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(session.status, DecodingStatus::Failed);
    }

    #[test]
    fn test_cancel_observed_at_phase_boundary() {
        let (peak, frame) = qpsk_frame(18.0, &beacon_bytes());
        let mut session = DecodingSession::new(peak, frame, DecodingConfig::default());
        let cancel = session.cancel_handle();

        let outcome = session.run(|s| {
            if s.progress.percentage == 40 {
                cancel.store(true, Ordering::SeqCst);
            }
        });
        assert_eq!(outcome, DecodeOutcome::Cancelled);
        assert_eq!(session.status, DecodingStatus::Cancelled);
        assert_eq!(session.progress.completed_operations, DecodingPhase::ALL[..3].to_vec());
    }

    #[test]
    fn test_trust_levels() {
        assert_eq!(trust_for(true, 0, 18.0), TrustLevel::High);
        assert_eq!(trust_for(true, 0, 12.0), TrustLevel::Medium);
        assert_eq!(trust_for(true, 2, 30.0), TrustLevel::Medium);
        assert_eq!(trust_for(false, 0, 30.0), TrustLevel::Low);
    }
}
