//! Spectrum sources
//!
//! The coordinator never talks to hardware directly; it pulls frames from a
//! [`SpectrumSource`]. [`SyntheticSource`] stands in for a receiver in tests
//! and in the demo station.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::capabilities::DeviceCapabilities;
use crate::error::{DiscoveryError, Result};
use crate::sdr::{FrameSynth, SignalType, SpectrumFrame};

/// Anything that can hand out spectrum frames for a tuned window
#[async_trait]
pub trait SpectrumSource: Send + Sync {
    fn device_id(&self) -> &str;

    fn capabilities(&self) -> &DeviceCapabilities;

    /// Tune to `center_frequency` with `bandwidth` span and return one frame
    async fn acquire_frame(&self, center_frequency: f64, bandwidth: f64) -> Result<SpectrumFrame>;
}

/// A transmission the synthetic source puts on the air
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTransmission {
    /// Hz
    pub frequency: f64,
    pub snr_db: f64,
    pub signal_type: SignalType,
    /// Encoded air frame; empty for a carrier without data
    pub frame_bytes: Vec<u8>,
    pub symbol_rate: f64,
}

/// Deterministic receiver built on [`FrameSynth`]
pub struct SyntheticSource {
    device_id: String,
    capabilities: DeviceCapabilities,
    fft_size: usize,
    noise_level: f32,
    noise_jitter: f32,
    transmissions: Mutex<Vec<SyntheticTransmission>>,
    frames: AtomicU32,
    failures_pending: AtomicU32,
    connected: AtomicBool,
}

impl SyntheticSource {
    pub fn new(device_id: impl Into<String>, capabilities: DeviceCapabilities) -> Self {
        Self {
            device_id: device_id.into(),
            capabilities,
            fft_size: 1024,
            noise_level: 0.01,
            noise_jitter: 0.0,
            transmissions: Mutex::new(Vec::new()),
            frames: AtomicU32::new(0),
            failures_pending: AtomicU32::new(0),
            connected: AtomicBool::new(true),
        }
    }

    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size.max(16);
        self
    }

    /// Relative per-bin noise variation (0 = flat floor)
    pub fn with_noise_jitter(mut self, jitter: f32) -> Self {
        self.noise_jitter = jitter;
        self
    }

    pub fn add_transmission(&self, transmission: SyntheticTransmission) {
        self.transmissions.lock().push(transmission);
    }

    pub fn clear_transmissions(&self) {
        self.transmissions.lock().clear();
    }

    /// Make the next `count` acquisitions fail
    pub fn fail_next(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn frames_served(&self) -> u32 {
        self.frames.load(Ordering::Relaxed)
    }

    fn take_failure(&self) -> bool {
        self.failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SpectrumSource for SyntheticSource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    async fn acquire_frame(&self, center_frequency: f64, bandwidth: f64) -> Result<SpectrumFrame> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Device(format!("{} disconnected", self.device_id)));
        }
        if self.take_failure() {
            return Err(DiscoveryError::Device(format!("{}: transfer failed", self.device_id)));
        }
        self.capabilities.check(&self.device_id, center_frequency, bandwidth)?;

        let seq = self.frames.fetch_add(1, Ordering::Relaxed);
        let mut synth = FrameSynth::new(&self.device_id, center_frequency, bandwidth, self.fft_size)
            .noise_level(self.noise_level)
            .noise_jitter(self.noise_jitter, 0x9E37_79B9 ^ seq.wrapping_add(1));

        let low = center_frequency - bandwidth / 2.0;
        let high = center_frequency + bandwidth / 2.0;
        let mut has_burst = false;
        for tx in self.transmissions.lock().iter() {
            if tx.frequency < low || tx.frequency >= high {
                continue;
            }
            let bin = synth.bin_for(tx.frequency);
            // One baseband capture per frame; extra carriers show up in the
            // spectrum only
            synth = if !has_burst && !tx.frame_bytes.is_empty() {
                has_burst = true;
                synth.with_transmission(bin, tx.snr_db, tx.signal_type, &tx.frame_bytes, tx.symbol_rate)
            } else {
                synth.with_signal(bin, tx.snr_db, tx.signal_type)
            };
        }

        trace!("{} frame {} at {:.0} Hz", self.device_id, seq, center_frequency);
        Ok(synth.build())
    }
}
