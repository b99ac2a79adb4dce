//! Cache entry model and validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DiscoveryError, Result};
use crate::protocol::{is_valid_callsign, ContentType};

/// Weight of normalised SNR in [`SignalQuality::score`]
pub const QUALITY_WEIGHT_SNR: f64 = 0.3;
/// Weight of detection confidence in [`SignalQuality::score`]
pub const QUALITY_WEIGHT_CONFIDENCE: f64 = 0.3;
/// Weight of spectral stability in [`SignalQuality::score`]
pub const QUALITY_WEIGHT_STABILITY: f64 = 0.2;
/// Weight of normalised RSSI in [`SignalQuality::score`]
pub const QUALITY_WEIGHT_RSSI: f64 = 0.2;

/// SNR at which the SNR component saturates
const SNR_FULL_SCALE_DB: f64 = 30.0;
/// RSSI range mapped onto 0..=1
const RSSI_FLOOR_DB: f64 = -120.0;
const RSSI_CEILING_DB: f64 = 0.0;

/// Lifecycle state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    Valid,
    Expired,
    Corrupted,
    VerificationFailed,
    Evicted,
}

/// How far a chunk's origin is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustLevel {
    Untrusted,
    Low,
    Medium,
    High,
}

/// Radio conditions when the chunk was captured
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalQuality {
    /// dB
    pub snr: f64,
    /// dB
    pub rssi: f64,
    pub confidence: f64,
    pub stability: f64,
    /// Hz
    pub frequency: f64,
}

impl SignalQuality {
    /// Weighted 0..=1 quality mix of SNR, confidence, stability and RSSI
    pub fn score(&self) -> f64 {
        let snr = (self.snr / SNR_FULL_SCALE_DB).clamp(0.0, 1.0);
        let rssi = ((self.rssi - RSSI_FLOOR_DB) / (RSSI_CEILING_DB - RSSI_FLOOR_DB)).clamp(0.0, 1.0);
        QUALITY_WEIGHT_SNR * snr
            + QUALITY_WEIGHT_CONFIDENCE * self.confidence.clamp(0.0, 1.0)
            + QUALITY_WEIGHT_STABILITY * self.stability.clamp(0.0, 1.0)
            + QUALITY_WEIGHT_RSSI * rssi
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub content_type: ContentType,
    /// Must equal the payload length
    pub content_length: usize,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationInfo {
    pub signature_verified: bool,
    pub checksum_verified: bool,
    pub trust_level: TrustLevel,
}

/// One discovered chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub chunk_id: String,
    /// Hex SHA-256 of `payload`
    pub content_hash: String,
    pub source_callsign: String,
    pub discovered_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub payload: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub signal_quality: SignalQuality,
    pub metadata: ContentMetadata,
    pub verification: VerificationInfo,
    pub status: EntryStatus,
}

impl CacheEntry {
    /// Build a valid entry discovered now, expiring after `ttl`
    pub fn new(
        chunk_id: impl Into<String>,
        source_callsign: impl Into<String>,
        content_type: ContentType,
        payload: Vec<u8>,
        signal_quality: SignalQuality,
        ttl: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        Self {
            chunk_id: chunk_id.into(),
            content_hash: hash_payload(&payload),
            source_callsign: source_callsign.into(),
            discovered_at: now,
            last_accessed: now,
            access_count: 0,
            metadata: ContentMetadata {
                content_type,
                content_length: payload.len(),
                title: None,
                tags: Vec::new(),
            },
            payload,
            expires_at: now + ttl,
            signal_quality,
            verification: VerificationInfo {
                signature_verified: false,
                checksum_verified: true,
                trust_level: TrustLevel::Low,
            },
            status: EntryStatus::Valid,
        }
    }

    pub fn with_trust(mut self, trust_level: TrustLevel) -> Self {
        self.verification.trust_level = trust_level;
        self
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_http(&self) -> bool {
        self.metadata.content_type.is_http()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Structural checks performed before an insert touches the cache
    pub fn validate(&self) -> Result<()> {
        if self.chunk_id.trim().is_empty() {
            return Err(DiscoveryError::Validation("chunk id is empty".into()));
        }
        if !is_valid_callsign(&self.source_callsign) {
            return Err(DiscoveryError::Validation(format!(
                "invalid source callsign '{}'",
                self.source_callsign
            )));
        }
        if self.expires_at <= self.discovered_at {
            return Err(DiscoveryError::Validation(format!(
                "entry {} expires before it was discovered",
                self.chunk_id
            )));
        }
        if self.status != EntryStatus::Valid {
            return Err(DiscoveryError::Validation(format!(
                "entry {} has status {:?}",
                self.chunk_id, self.status
            )));
        }
        self.check_integrity()
            .map_err(|reason| DiscoveryError::Validation(format!("entry {}: {}", self.chunk_id, reason)))
    }

    /// Length and hash consistency of the stored payload
    pub fn check_integrity(&self) -> std::result::Result<(), String> {
        if self.payload.len() != self.metadata.content_length {
            return Err(format!(
                "payload is {} bytes, metadata says {}",
                self.payload.len(),
                self.metadata.content_length
            ));
        }
        if !self.content_hash.eq_ignore_ascii_case(&hash_payload(&self.payload)) {
            return Err("content hash does not match payload".to_string());
        }
        Ok(())
    }
}

/// Hex SHA-256 of a payload
pub fn hash_payload(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    pub(crate) fn quality(snr: f64) -> SignalQuality {
        SignalQuality {
            snr,
            rssi: -60.0,
            confidence: 0.5,
            stability: 0.9,
            frequency: 14_085_000.0,
        }
    }

    pub(crate) fn sample_entry(id: &str, size: usize) -> CacheEntry {
        CacheEntry::new(
            id,
            "W1AW",
            ContentType::Binary,
            vec![0x5A; size],
            quality(12.0),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_new_entry_is_valid() {
        let entry = sample_entry("a", 100);
        assert!(entry.validate().is_ok());
        assert_eq!(entry.size(), 100);
        assert_eq!(entry.content_hash.len(), 64);
    }

    #[test]
    fn test_hash_mismatch_rejected() {
        let mut entry = sample_entry("a", 10);
        entry.payload[0] ^= 0xFF;
        assert!(matches!(entry.validate(), Err(DiscoveryError::Validation(_))));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut entry = sample_entry("a", 10);
        entry.metadata.content_length = 11;
        assert!(entry.check_integrity().is_err());
    }

    #[test]
    fn test_expiry_before_discovery_rejected() {
        let mut entry = sample_entry("a", 10);
        entry.expires_at = entry.discovered_at;
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_bad_callsign_rejected() {
        let mut entry = sample_entry("a", 10);
        entry.source_callsign = "nocall".into();
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_quality_score_weights() {
        let perfect = SignalQuality {
            snr: 40.0,
            rssi: 10.0,
            confidence: 1.0,
            stability: 1.0,
            frequency: 0.0,
        };
        assert!((perfect.score() - 1.0).abs() < 1e-9);
        assert!(quality(20.0).score() > quality(5.0).score());
    }
}
