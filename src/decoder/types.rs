//! Decoder configuration, phases and results

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::VerificationInfo;
use crate::error::{DiscoveryError, Result};
use crate::protocol::ContentType;

/// Ordered decode sub-phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DecodingPhase {
    SignalConditioning,
    Demodulation,
    SymbolRecovery,
    Synchronization,
    FrameDetection,
    ErrorCorrection,
    ProtocolAnalysis,
    ContentExtraction,
}

impl DecodingPhase {
    pub const ALL: [DecodingPhase; 8] = [
        DecodingPhase::SignalConditioning,
        DecodingPhase::Demodulation,
        DecodingPhase::SymbolRecovery,
        DecodingPhase::Synchronization,
        DecodingPhase::FrameDetection,
        DecodingPhase::ErrorCorrection,
        DecodingPhase::ProtocolAnalysis,
        DecodingPhase::ContentExtraction,
    ];

    /// Progress after this phase completes
    pub fn percentage(&self) -> u8 {
        match self {
            DecodingPhase::SignalConditioning => 10,
            DecodingPhase::Demodulation => 25,
            DecodingPhase::SymbolRecovery => 40,
            DecodingPhase::Synchronization => 55,
            DecodingPhase::FrameDetection => 70,
            DecodingPhase::ErrorCorrection => 80,
            DecodingPhase::ProtocolAnalysis => 90,
            DecodingPhase::ContentExtraction => 100,
        }
    }

    /// Coarse session status while this phase runs
    pub fn status(&self) -> DecodingStatus {
        match self {
            DecodingPhase::SignalConditioning => DecodingStatus::Preprocessing,
            DecodingPhase::Demodulation | DecodingPhase::SymbolRecovery => DecodingStatus::Demodulating,
            DecodingPhase::Synchronization | DecodingPhase::FrameDetection => DecodingStatus::Synchronizing,
            DecodingPhase::ErrorCorrection | DecodingPhase::ProtocolAnalysis => DecodingStatus::Decoding,
            DecodingPhase::ContentExtraction => DecodingStatus::PostProcessing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecodingPhase::SignalConditioning => "SignalConditioning",
            DecodingPhase::Demodulation => "Demodulation",
            DecodingPhase::SymbolRecovery => "SymbolRecovery",
            DecodingPhase::Synchronization => "Synchronization",
            DecodingPhase::FrameDetection => "FrameDetection",
            DecodingPhase::ErrorCorrection => "ErrorCorrection",
            DecodingPhase::ProtocolAnalysis => "ProtocolAnalysis",
            DecodingPhase::ContentExtraction => "ContentExtraction",
        }
    }
}

impl std::fmt::Display for DecodingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecodingStatus {
    Initializing,
    Preprocessing,
    Demodulating,
    Synchronizing,
    Decoding,
    PostProcessing,
    Completed,
    Failed,
    Cancelled,
}

impl DecodingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DecodingStatus::Completed | DecodingStatus::Failed | DecodingStatus::Cancelled
        )
    }
}

/// Minimum peak quality before a decode is attempted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// dB
    pub minimum_snr: f64,
    /// dB
    pub minimum_power: f64,
    pub minimum_confidence: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            minimum_snr: 6.0,
            minimum_power: -120.0,
            minimum_confidence: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemodulationParams {
    /// Symbols per second
    pub symbol_rate: f64,
    /// Bit errors tolerated in the sync word
    pub max_sync_errors: u32,
    /// Decisions below this confidence count as symbol errors
    pub constellation_confidence: f64,
    /// Lowest-confidence bits tried as single-bit corrections
    pub max_single_flips: usize,
    /// Lowest-confidence bits whose pairs are tried as two-bit corrections
    pub max_pair_candidates: usize,
}

impl Default for DemodulationParams {
    fn default() -> Self {
        Self {
            symbol_rate: 1250.0,
            max_sync_errors: 2,
            constellation_confidence: 0.5,
            max_single_flips: 64,
            max_pair_candidates: 24,
        }
    }
}

/// Per-decode settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodingConfig {
    pub quality_thresholds: QualityThresholds,
    pub demodulation: DemodulationParams,
    pub max_decoding_time: Duration,
    /// Cache receiving successful decodes
    pub cache_id: Option<String>,
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self {
            quality_thresholds: QualityThresholds::default(),
            demodulation: DemodulationParams::default(),
            max_decoding_time: Duration::from_millis(30_000),
            cache_id: None,
        }
    }
}

impl DecodingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.demodulation.symbol_rate > 0.0) {
            return Err(DiscoveryError::Validation("symbol_rate must be > 0".into()));
        }
        if self.max_decoding_time.is_zero() {
            return Err(DiscoveryError::Validation("max_decoding_time must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.demodulation.constellation_confidence) {
            return Err(DiscoveryError::Validation(
                "constellation_confidence must be within 0..=1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodingProgress {
    pub current_phase: Option<DecodingPhase>,
    pub percentage: u8,
    pub completed_operations: Vec<DecodingPhase>,
    pub failed_operations: Vec<FailedOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedOperation {
    pub phase: DecodingPhase,
    pub message: String,
}

/// Decode quality measured along the way
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodingQuality {
    pub bit_error_rate: f64,
    pub symbol_error_rate: f64,
    pub corrected_errors: u32,
    /// SNR estimated from constellation error (dB)
    pub estimated_snr: f64,
    /// RMS error vector magnitude, 0..
    pub evm: f64,
    pub sync_errors: u32,
}

/// A successfully decoded transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedTransmission {
    pub id: String,
    pub source_callsign: String,
    /// Hz
    pub frequency: f64,
    pub timestamp: DateTime<Utc>,
    pub content_type: ContentType,
    pub payload: Vec<u8>,
    /// Hex SHA-256 of `payload`
    pub payload_hash: String,
    pub verification: VerificationInfo,
    pub quality: DecodingQuality,
    /// SNR of the detected peak (dB)
    pub peak_snr: f64,
}
