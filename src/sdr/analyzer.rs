//! Spectrum peak detection and signal classification
//!
//! Pure functions over a frame's magnitude samples. Nothing here holds
//! state, so any number of sessions may call in concurrently.
//!
//! Magnitudes are linear amplitudes; dB values are `20 * log10(mag)`.

use std::f64::consts::SQRT_2;

use super::types::{bin_frequency, QualityMetrics, SignalPeak, SignalType};

/// Floor applied before taking logarithms
const MIN_MAGNITUDE: f64 = 1e-10;

/// Spectral symmetry at or above this counts as symmetric
const SYMMETRY_THRESHOLD: f64 = 0.8;

/// Widest symmetric peak (in bins) still classified as BPSK
const BPSK_MAX_BINS: usize = 3;

/// Widest symmetric peak (in bins) still classified as QPSK
const QPSK_MAX_BINS: usize = 8;

/// Narrowest asymmetric peak (in bins) classified as FM
const FM_MIN_BINS: usize = 6;

/// Linear magnitude to dB
pub fn to_db(linear: f64) -> f64 {
    20.0 * linear.max(MIN_MAGNITUDE).log10()
}

/// dB to linear magnitude
pub fn from_db(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Noise floor estimate: the `percentile` (0..=100) sample, in dB.
///
/// Sorting first makes the result independent of sample order.
pub fn compute_noise_floor(samples: &[f32], percentile: f64) -> f64 {
    if samples.is_empty() {
        return to_db(MIN_MAGNITUDE);
    }

    let mut sorted: Vec<f32> = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let p = percentile.clamp(0.0, 100.0) / 100.0;
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    to_db(sorted[idx.min(sorted.len() - 1)] as f64)
}

/// Find local maxima more than `threshold_db` above `noise_floor_db`.
///
/// Peaks come back strongest first.
pub fn detect_peaks(
    samples: &[f32],
    noise_floor_db: f64,
    center_freq: f64,
    bandwidth: f64,
    threshold_db: f64,
) -> Vec<SignalPeak> {
    let n = samples.len();
    if n < 3 {
        return Vec::new();
    }

    let threshold = from_db(noise_floor_db + threshold_db);
    let bin_width = bandwidth / n as f64;
    let mut peaks = Vec::new();

    for i in 1..n - 1 {
        let mag = samples[i] as f64;
        if !(samples[i] > samples[i - 1] && samples[i] > samples[i + 1]) || mag <= threshold {
            continue;
        }

        let (left, right) = half_power_extent(samples, i);
        let bins = right - left + 1;
        let symmetry = spectral_symmetry(samples, i, left, right);
        let signal_type = classify(bins, symmetry);

        let power = to_db(mag);
        let snr = power - noise_floor_db;

        peaks.push(SignalPeak {
            frequency: bin_frequency(center_freq, bandwidth, n, i),
            power,
            bandwidth: bins as f64 * bin_width,
            snr,
            confidence: confidence_from_snr(snr),
            signal_type,
            fft_index: i,
            quality: QualityMetrics {
                snr,
                rssi: power,
                stability: symmetry,
            },
        });
    }

    peaks.sort_by(|a, b| b.power.total_cmp(&a.power));
    peaks
}

/// Confidence grows linearly from 3 dB to 23 dB SNR
pub fn confidence_from_snr(snr: f64) -> f64 {
    ((snr - 3.0) / 20.0).clamp(0.0, 1.0)
}

/// Bins on each side of `peak` that stay at or above the -3 dB point.
/// Returns inclusive `(left, right)` indices.
fn half_power_extent(samples: &[f32], peak: usize) -> (usize, usize) {
    let half = samples[peak] as f64 / SQRT_2;

    let mut left = peak;
    while left > 0 && samples[left - 1] as f64 >= half {
        left -= 1;
    }

    let mut right = peak;
    while right + 1 < samples.len() && samples[right + 1] as f64 >= half {
        right += 1;
    }

    (left, right)
}

/// Mirror similarity around the peak, 1.0 = perfectly symmetric
fn spectral_symmetry(samples: &[f32], peak: usize, left: usize, right: usize) -> f64 {
    let reach = (peak - left).max(right - peak);
    if reach == 0 {
        return 1.0;
    }

    let mut diff = 0.0;
    let mut total = 0.0;
    for k in 1..=reach {
        let lo = if peak >= k { samples[peak - k] as f64 } else { 0.0 };
        let hi = samples.get(peak + k).map_or(0.0, |&s| s as f64);
        diff += (lo - hi).abs();
        total += lo + hi;
    }

    if total <= 0.0 {
        1.0
    } else {
        (1.0 - diff / total).clamp(0.0, 1.0)
    }
}

/// Map occupied bins and symmetry to a modulation class
fn classify(bins: usize, symmetry: f64) -> SignalType {
    if bins <= 1 {
        return SignalType::Cw;
    }

    if symmetry >= SYMMETRY_THRESHOLD {
        if bins <= BPSK_MAX_BINS {
            SignalType::Bpsk
        } else if bins <= QPSK_MAX_BINS {
            SignalType::Qpsk
        } else {
            SignalType::Digital
        }
    } else if bins >= FM_MIN_BINS {
        SignalType::Fm
    } else {
        SignalType::Ssb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(n: usize, level: f32) -> Vec<f32> {
        vec![level; n]
    }

    #[test]
    fn test_noise_floor_deterministic_and_order_independent() {
        let samples: Vec<f32> = (0..256).map(|i| 0.001 + (i % 17) as f32 * 0.0005).collect();
        let a = compute_noise_floor(&samples, 20.0);
        let b = compute_noise_floor(&samples, 20.0);
        assert_eq!(a, b);

        let mut reversed = samples.clone();
        reversed.reverse();
        let mut rotated = samples.clone();
        rotated.rotate_left(101);
        assert_eq!(compute_noise_floor(&reversed, 20.0), a);
        assert_eq!(compute_noise_floor(&rotated, 20.0), a);
    }

    #[test]
    fn test_noise_floor_flat() {
        let nf = compute_noise_floor(&flat(64, 0.01), 50.0);
        assert!((nf - (-40.0)).abs() < 1e-4);
    }

    #[test]
    fn test_single_tone_detection() {
        let mut samples = flat(1024, 0.01);
        samples[300] = 1.0; // 40 dB above the floor
        let nf = compute_noise_floor(&samples, 50.0);

        let peaks = detect_peaks(&samples, nf, 14_085_000.0, 10_000.0, 10.0);
        assert_eq!(peaks.len(), 1);

        let peak = &peaks[0];
        assert_eq!(peak.fft_index, 300);
        assert!((0.0..=1.0).contains(&peak.confidence));
        assert_eq!(peak.signal_type, SignalType::Cw);
        assert!((peak.snr - 40.0).abs() < 1e-3);
    }

    #[test]
    fn test_below_threshold_ignored() {
        let mut samples = flat(128, 0.01);
        samples[40] = 0.02; // ~6 dB
        let peaks = detect_peaks(&samples, to_db(0.01), 0.0, 1000.0, 10.0);
        assert!(peaks.is_empty());
    }

    #[test]
    fn test_peaks_sorted_by_power() {
        let mut samples = flat(256, 0.01);
        samples[50] = 0.5;
        samples[150] = 1.0;
        samples[200] = 0.2;
        let peaks = detect_peaks(&samples, to_db(0.01), 0.0, 2560.0, 10.0);
        let idx: Vec<usize> = peaks.iter().map(|p| p.fft_index).collect();
        assert_eq!(idx, vec![150, 50, 200]);
    }

    #[test]
    fn test_classification_by_shape() {
        let mut samples = flat(256, 0.01);
        // symmetric 5-bin hump
        for (k, v) in [0.8, 0.9, 1.0, 0.9, 0.8].iter().enumerate() {
            samples[60 + k] = *v;
        }
        // symmetric 3-bin hump
        for (k, v) in [0.85, 1.0, 0.85].iter().enumerate() {
            samples[120 + k] = *v;
        }
        // lopsided wide hump
        for (k, v) in [0.75, 1.0, 0.95, 0.9, 0.85, 0.8, 0.78, 0.76, 0.74, 0.72].iter().enumerate() {
            samples[180 + k] = *v;
        }

        let peaks = detect_peaks(&samples, to_db(0.01), 0.0, 2560.0, 10.0);
        let by_index = |i: usize| peaks.iter().find(|p| p.fft_index == i).map(|p| p.signal_type);
        assert_eq!(by_index(62), Some(SignalType::Qpsk));
        assert_eq!(by_index(121), Some(SignalType::Bpsk));
        assert_eq!(by_index(181), Some(SignalType::Fm));
    }

    #[test]
    fn test_bandwidth_estimate() {
        let mut samples = flat(1024, 0.01);
        for (k, v) in [0.8, 0.9, 1.0, 0.9, 0.8].iter().enumerate() {
            samples[510 + k] = *v;
        }
        let peaks = detect_peaks(&samples, to_db(0.01), 14_085_000.0, 10_240.0, 10.0);
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].bandwidth - 50.0).abs() < 1e-9);
        assert_eq!(peaks[0].frequency, 14_085_000.0);
    }

    #[test]
    fn test_short_input() {
        assert!(detect_peaks(&[1.0, 2.0], -40.0, 0.0, 1.0, 3.0).is_empty());
        assert!(compute_noise_floor(&[], 50.0) < -100.0);
    }
}
