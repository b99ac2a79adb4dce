//! Spectrum frame and peak types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// One complex baseband sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Iq {
    pub i: f32,
    pub q: f32,
}

impl Iq {
    pub const ZERO: Iq = Iq { i: 0.0, q: 0.0 };

    pub fn new(i: f32, q: f32) -> Self {
        Self { i, q }
    }

    /// Unit phasor at `phase` radians
    pub fn from_phase(phase: f64) -> Self {
        Self {
            i: phase.cos() as f32,
            q: phase.sin() as f32,
        }
    }

    pub fn norm_sqr(self) -> f32 {
        self.i * self.i + self.q * self.q
    }

    pub fn norm(self) -> f32 {
        self.norm_sqr().sqrt()
    }

    pub fn scale(self, k: f32) -> Self {
        Self {
            i: self.i * k,
            q: self.q * k,
        }
    }
}

impl Add for Iq {
    type Output = Iq;
    fn add(self, rhs: Iq) -> Iq {
        Iq::new(self.i + rhs.i, self.q + rhs.q)
    }
}

impl Sub for Iq {
    type Output = Iq;
    fn sub(self, rhs: Iq) -> Iq {
        Iq::new(self.i - rhs.i, self.q - rhs.q)
    }
}

impl Mul for Iq {
    type Output = Iq;
    fn mul(self, rhs: Iq) -> Iq {
        Iq::new(
            self.i * rhs.i - self.q * rhs.q,
            self.i * rhs.q + self.q * rhs.i,
        )
    }
}

/// FFT window applied by the device before producing the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hann,
    Hamming,
    Blackman,
    BlackmanHarris,
}

/// Acquisition parameters attached to a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub fft_size: usize,
    pub window: WindowFunction,
    /// Resolution bandwidth in Hz
    pub resolution_bandwidth: f64,
    /// Complex sample rate of the baseband capture in Hz
    pub sample_rate: f64,
    /// Time-domain capture centred on the frame's center frequency, if the
    /// device provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseband: Option<Vec<Iq>>,
}

/// One FFT magnitude frame from a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    pub device_id: String,
    /// Center frequency in Hz
    pub center_frequency: f64,
    /// Span in Hz
    pub bandwidth: f64,
    pub timestamp: DateTime<Utc>,
    /// Linear magnitudes, lowest frequency first
    pub samples: Vec<f32>,
    /// Noise floor reported by the device (dB)
    pub noise_floor: f64,
    pub metadata: FrameMetadata,
}

impl SpectrumFrame {
    /// Width of one FFT bin in Hz
    pub fn bin_width(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.bandwidth / self.samples.len() as f64
        }
    }

    /// Frequency of bin `index` in Hz
    pub fn bin_frequency(&self, index: usize) -> f64 {
        bin_frequency(self.center_frequency, self.bandwidth, self.samples.len(), index)
    }

    pub fn start_frequency(&self) -> f64 {
        self.center_frequency - self.bandwidth / 2.0
    }

    pub fn end_frequency(&self) -> f64 {
        self.center_frequency + self.bandwidth / 2.0
    }
}

/// Frequency of bin `index` in a frame of `bins` covering `bandwidth` Hz
pub fn bin_frequency(center: f64, bandwidth: f64, bins: usize, index: usize) -> f64 {
    if bins == 0 {
        return center;
    }
    center - bandwidth / 2.0 + index as f64 * (bandwidth / bins as f64)
}

/// Modulation class inferred from spectral shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Cw,
    Bpsk,
    Qpsk,
    Fm,
    Ssb,
    Digital,
    Unknown,
}

impl SignalType {
    /// Number of constellation points the decoder slices against
    pub fn constellation_order(&self) -> usize {
        match self {
            SignalType::Qpsk => 4,
            _ => 2,
        }
    }

    pub fn bits_per_symbol(&self) -> usize {
        match self {
            SignalType::Qpsk => 2,
            _ => 1,
        }
    }

    /// Phase-keyed constellations have a rotation ambiguity
    pub fn is_phase_keyed(&self) -> bool {
        matches!(self, SignalType::Bpsk | SignalType::Qpsk)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Cw => "CW",
            SignalType::Bpsk => "BPSK",
            SignalType::Qpsk => "QPSK",
            SignalType::Fm => "FM",
            SignalType::Ssb => "SSB",
            SignalType::Digital => "DIGITAL",
            SignalType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-peak quality measurements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub snr: f64,
    /// Received strength in dB
    pub rssi: f64,
    /// Spectral symmetry, 0..=1
    pub stability: f64,
}

/// A detected signal in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPeak {
    /// Hz
    pub frequency: f64,
    /// dB
    pub power: f64,
    /// Estimated -3 dB bandwidth in Hz
    pub bandwidth: f64,
    pub snr: f64,
    /// 0..=1
    pub confidence: f64,
    pub signal_type: SignalType,
    pub fft_index: usize,
    pub quality: QualityMetrics,
}

impl SignalPeak {
    /// Track key: frequency rounded to `freq_step` Hz, bandwidth rounded to
    /// `bw_step` Hz, and modulation class. Slightly drifting peaks share it.
    pub fn tracking_id(&self, freq_step: f64, bw_step: f64) -> String {
        let f = (self.frequency / freq_step.max(1.0)).round() * freq_step.max(1.0);
        let bw = (self.bandwidth / bw_step.max(1.0)).round() * bw_step.max(1.0);
        format!("{:.0}-{:.0}-{}", f, bw, self.signal_type)
    }
}
