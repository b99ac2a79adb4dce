//! Deterministic signal synthesis
//!
//! Builds spectrum frames with shaped signals and matching baseband bursts.
//! Used by the demo devices and throughout the tests.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use chrono::Utc;

use super::types::{FrameMetadata, Iq, SignalType, SpectrumFrame, WindowFunction};
use crate::protocol::bytes_to_bits;

/// Alternating bits sent ahead of every burst
pub const PREAMBLE: [u8; 2] = [0x55, 0x55];

/// Idle samples before the burst starts
const LEAD_IN_SAMPLES: usize = 5;

/// Relative spectral shape of each modulation class, peak at the listed index
fn shape(signal_type: SignalType) -> (&'static [f32], usize) {
    match signal_type {
        SignalType::Cw => (&[1.0], 0),
        SignalType::Bpsk => (&[0.85, 1.0, 0.85], 1),
        SignalType::Qpsk => (&[0.8, 0.9, 1.0, 0.9, 0.8], 2),
        SignalType::Digital => (&[0.75, 0.8, 0.85, 0.9, 0.95, 1.0, 0.95, 0.9, 0.85, 0.8, 0.75], 5),
        SignalType::Fm => (&[0.75, 1.0, 0.95, 0.9, 0.85, 0.8, 0.78, 0.76, 0.74, 0.72], 1),
        SignalType::Ssb | SignalType::Unknown => (&[1.0, 0.9, 0.8, 0.75], 0),
    }
}

/// xorshift32; enough randomness for noise texture
#[derive(Debug, Clone)]
pub struct Jitter {
    state: u32,
}

impl Jitter {
    pub fn new(seed: u32) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in `[-1, 1)`
    pub fn next_signed(&mut self) -> f32 {
        (self.next_u32() as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
    }
}

/// Frame builder
#[derive(Debug, Clone)]
pub struct FrameSynth {
    device_id: String,
    center_frequency: f64,
    bandwidth: f64,
    fft_size: usize,
    noise_level: f32,
    /// Relative noise variation per bin (0 = flat)
    noise_jitter: f32,
    samples: Vec<f32>,
    baseband: Option<Vec<Iq>>,
    jitter: Jitter,
}

impl FrameSynth {
    pub fn new(device_id: &str, center_frequency: f64, bandwidth: f64, fft_size: usize) -> Self {
        Self {
            device_id: device_id.to_string(),
            center_frequency,
            bandwidth,
            fft_size,
            noise_level: 0.01,
            noise_jitter: 0.0,
            samples: Vec::new(),
            baseband: None,
            jitter: Jitter::new(0x2545_F491),
        }
    }

    pub fn noise_level(mut self, level: f32) -> Self {
        self.noise_level = level;
        self
    }

    pub fn noise_jitter(mut self, jitter: f32, seed: u32) -> Self {
        self.noise_jitter = jitter;
        self.jitter = Jitter::new(seed);
        self
    }

    fn ensure_noise(&mut self) {
        if self.samples.len() == self.fft_size {
            return;
        }
        let (level, spread) = (self.noise_level, self.noise_jitter);
        let jitter = &mut self.jitter;
        let samples = (0..self.fft_size)
            .map(|_| level * (1.0 + spread * jitter.next_signed()))
            .collect();
        self.samples = samples;
    }

    /// Bin whose frequency is closest to `frequency`
    pub fn bin_for(&self, frequency: f64) -> usize {
        let bin_width = self.bandwidth / self.fft_size.max(1) as f64;
        let offset = frequency - (self.center_frequency - self.bandwidth / 2.0);
        ((offset / bin_width).round().max(0.0) as usize).min(self.fft_size.saturating_sub(1))
    }

    /// Add a signal of `signal_type` peaking at `bin`, `snr_db` above the
    /// noise level
    pub fn with_signal(mut self, bin: usize, snr_db: f64, signal_type: SignalType) -> Self {
        self.ensure_noise();
        let amplitude = self.noise_level as f64 * 10f64.powf(snr_db / 20.0);
        let (profile, peak_at) = shape(signal_type);
        for (k, &rel) in profile.iter().enumerate() {
            let idx = bin as isize + k as isize - peak_at as isize;
            if idx >= 0 && (idx as usize) < self.samples.len() {
                self.samples[idx as usize] = (amplitude * rel as f64) as f32;
            }
        }
        self
    }

    /// Add a signal and the baseband burst carrying `frame_bytes` on it
    pub fn with_transmission(
        mut self,
        bin: usize,
        snr_db: f64,
        signal_type: SignalType,
        frame_bytes: &[u8],
        symbol_rate: f64,
    ) -> Self {
        self = self.with_signal(bin, snr_db, signal_type);
        let sample_rate = self.bandwidth;
        let sps = (sample_rate / symbol_rate).round().max(1.0) as usize;
        let offset_hz = crate::sdr::types::bin_frequency(self.center_frequency, self.bandwidth, self.fft_size, bin)
            - self.center_frequency;

        let mut burst = modulate(frame_bytes, signal_type, sps, offset_hz, sample_rate);
        let noise = 10f64.powf(-snr_db / 20.0) as f32;
        for s in burst.iter_mut() {
            *s = *s + Iq::new(noise * self.jitter.next_signed(), noise * self.jitter.next_signed());
        }
        self.baseband = Some(burst);
        self
    }

    pub fn build(mut self) -> SpectrumFrame {
        self.ensure_noise();
        SpectrumFrame {
            device_id: self.device_id,
            center_frequency: self.center_frequency,
            bandwidth: self.bandwidth,
            timestamp: Utc::now(),
            samples: self.samples,
            noise_floor: 20.0 * (self.noise_level.max(1e-10) as f64).log10(),
            metadata: FrameMetadata {
                fft_size: self.fft_size,
                window: WindowFunction::Hann,
                resolution_bandwidth: self.bandwidth / self.fft_size.max(1) as f64,
                sample_rate: self.bandwidth,
                baseband: self.baseband,
            },
        }
    }
}

/// Modulate preamble + `frame_bytes` onto rectangular symbols of `sps`
/// samples, shifted `offset_hz` from the capture centre.
///
/// BPSK maps bit 1 to +1. QPSK sends bit pairs `(b0, b1)` as
/// `q = b0 ? -1 : 1`, `i = b1 ? -1 : 1` (Gray coded, scaled to unit power).
/// Every other class is on-off keyed.
pub fn modulate(frame_bytes: &[u8], signal_type: SignalType, sps: usize, offset_hz: f64, sample_rate: f64) -> Vec<Iq> {
    let mut bytes = PREAMBLE.to_vec();
    bytes.extend_from_slice(frame_bytes);
    let mut bits = bytes_to_bits(&bytes);
    // Trailing pad so the last real symbol is followed by a full symbol
    bits.extend_from_slice(&[0, 1, 0, 1]);

    let symbols: Vec<Iq> = match signal_type {
        SignalType::Bpsk => bits
            .iter()
            .map(|&b| if b == 1 { Iq::new(1.0, 0.0) } else { Iq::new(-1.0, 0.0) })
            .collect(),
        SignalType::Qpsk => {
            if bits.len() % 2 == 1 {
                bits.push(0);
            }
            let a = FRAC_1_SQRT_2 as f32;
            bits.chunks_exact(2)
                .map(|pair| {
                    let q = if pair[0] == 1 { -a } else { a };
                    let i = if pair[1] == 1 { -a } else { a };
                    Iq::new(i, q)
                })
                .collect()
        }
        _ => bits
            .iter()
            .map(|&b| if b == 1 { Iq::new(1.0, 0.0) } else { Iq::ZERO })
            .collect(),
    };

    let sps = sps.max(1);
    let mut out = vec![Iq::ZERO; LEAD_IN_SAMPLES];
    out.reserve(symbols.len() * sps + sps);
    for sym in symbols {
        for _ in 0..sps {
            out.push(sym);
        }
    }
    out.extend(std::iter::repeat(Iq::ZERO).take(sps));

    if offset_hz != 0.0 && sample_rate > 0.0 {
        let step = 2.0 * PI * offset_hz / sample_rate;
        for (n, s) in out.iter_mut().enumerate() {
            *s = *s * Iq::from_phase(step * n as f64);
        }
    }
    out
}
