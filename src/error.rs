//! Error taxonomy shared by the analyzer, decoder, cache and coordinator

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors raised by the discovery core.
///
/// Precondition failures (`Validation`, `Quality`, `DeviceCapability`,
/// `NotFound`) are returned before any state is touched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DiscoveryError {
    /// Malformed configuration or cache entry
    #[error("validation failed: {0}")]
    Validation(String),

    /// Cache could not free enough space for an insert
    #[error("cache capacity exceeded: {0}")]
    Capacity(String),

    /// Signal below the configured quality thresholds
    #[error("signal below quality threshold: {0}")]
    Quality(String),

    /// A decode phase failed
    #[error("decode failed in {phase}: {message}")]
    DecodeFailure { phase: String, message: String },

    /// Requested frequency/bandwidth lies outside a device envelope
    #[error("device capability: {0}")]
    DeviceCapability(String),

    /// Stored payload no longer matches its hash or declared length
    #[error("corrupted entry {chunk_id}: {reason}")]
    Corruption { chunk_id: String, reason: String },

    /// Unknown session, cache or device id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Resource already exists (e.g. duplicate monitoring session)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation not allowed in the current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Decode worker queue is saturated
    #[error("decode queue full ({0} pending)")]
    QueueFull(usize),

    /// Frame acquisition or similar wait exceeded its limit
    #[error("timed out: {0}")]
    Timeout(String),

    /// Spectrum source reported an I/O failure
    #[error("device error: {0}")]
    Device(String),
}

impl DiscoveryError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn decode(phase: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::DecodeFailure {
            phase: phase.to_string(),
            message: message.into(),
        }
    }

    /// Short machine-readable tag, used for error counters
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Capacity(_) => "capacity",
            Self::Quality(_) => "quality",
            Self::DecodeFailure { .. } => "decode",
            Self::DeviceCapability(_) => "device_capability",
            Self::Corruption { .. } => "corruption",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidState(_) => "invalid_state",
            Self::QueueFull(_) => "queue_full",
            Self::Timeout(_) => "timeout",
            Self::Device(_) => "device",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_decode_failure() {
        let err = DiscoveryError::decode("Synchronization", "sync word not found");
        assert_eq!(
            err.to_string(),
            "decode failed in Synchronization: sync word not found"
        );
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_not_found() {
        let err = DiscoveryError::not_found("cache", "main");
        assert_eq!(err.to_string(), "cache not found: main");
    }
}
