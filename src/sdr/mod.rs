//! Spectrum frames, peak detection and signal synthesis

pub mod analyzer;
pub mod synth;
pub mod types;

pub use analyzer::{compute_noise_floor, confidence_from_snr, detect_peaks, from_db, to_db};
pub use synth::FrameSynth;
pub use types::{bin_frequency, FrameMetadata, Iq, QualityMetrics, SignalPeak, SignalType, SpectrumFrame, WindowFunction};
