//! The eight decode phases
//!
//! Each phase is a pure function of the previous phase's output. Errors are
//! plain messages; the session attaches the phase name.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use serde::{Deserialize, Serialize};

use super::types::DemodulationParams;
use crate::protocol::{
    bits_to_bytes, bytes_to_bits, check_crc16, parse_body, parse_http_message, AirFrame, ContentType, HttpMessage,
    LENGTH_FIELD_LEN, MAX_BODY_LEN, SYNC_WORD, SYNC_WORD_BITS,
};
use crate::sdr::{Iq, SignalType};

pub type PhaseResult<T> = std::result::Result<T, String>;

const CRC_BITS: usize = 16;

/// Fewest symbols worth demodulating: a sync word and a length field
const MIN_SYMBOLS: usize = SYNC_WORD_BITS + LENGTH_FIELD_LEN * 8;

/// Output of SIGNAL_CONDITIONING
#[derive(Debug, Clone)]
pub struct ConditionedSignal {
    pub samples: Vec<Iq>,
    pub samples_per_symbol: usize,
    /// RMS before normalisation
    pub input_rms: f64,
}

/// Output of DEMODULATION
#[derive(Debug, Clone)]
pub struct Demodulated {
    /// One soft symbol per symbol period, phase-corrected
    pub soft: Vec<Iq>,
    pub timing_offset: usize,
    /// Radians removed by carrier phase correction
    pub phase_correction: f64,
    /// Typical magnitude of an "on" symbol
    pub reference_amplitude: f64,
    pub evm: f64,
    pub estimated_snr: f64,
}

/// Output of SYMBOL_RECOVERY
#[derive(Debug, Clone)]
pub struct RecoveredSymbols {
    pub bits: Vec<u8>,
    pub confidences: Vec<f32>,
    pub symbol_error_rate: f64,
}

/// Output of SYNCHRONIZATION
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Constellation rotation (multiples of the symmetry angle) that matched
    pub rotation: usize,
    /// Bit index of the first sync bit
    pub position: usize,
    pub errors: u32,
    /// Bits and confidences under the matching rotation
    pub bits: Vec<u8>,
    pub confidences: Vec<f32>,
}

/// Output of FRAME_DETECTION; bit indices into [`SyncResult::bits`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBoundaries {
    pub sync_position: usize,
    pub body_start: usize,
    pub body_len: usize,
    pub crc_start: usize,
    pub end: usize,
}

/// Output of ERROR_CORRECTION
#[derive(Debug, Clone)]
pub struct CorrectionResult {
    pub body: Vec<u8>,
    pub crc: u16,
    /// Bit indices (relative to the body start) that were flipped
    pub corrected_bits: Vec<usize>,
    pub frame_bits: usize,
}

/// Output of PROTOCOL_ANALYSIS
#[derive(Debug, Clone)]
pub struct ProtocolInfo {
    pub frame: AirFrame,
    pub http: Option<HttpMessage>,
}

/// Everything a session has produced so far
#[derive(Debug, Clone, Default)]
pub struct IntermediateResults {
    pub conditioned: Option<ConditionedSignal>,
    pub demodulated: Option<Demodulated>,
    pub symbols: Option<RecoveredSymbols>,
    pub sync: Option<SyncResult>,
    pub frame: Option<FrameBoundaries>,
    pub correction: Option<CorrectionResult>,
    pub protocol: Option<ProtocolInfo>,
}

/// Samples per symbol for a capture rate and symbol rate
pub fn samples_per_symbol(sample_rate: f64, symbol_rate: f64) -> usize {
    if sample_rate <= 0.0 || symbol_rate <= 0.0 {
        return 0;
    }
    (sample_rate / symbol_rate).round() as usize
}

/// Mix to baseband, remove DC, low-pass over a quarter symbol and
/// normalise to unit RMS
pub fn condition(
    baseband: &[Iq],
    offset_hz: f64,
    sample_rate: f64,
    sps: usize,
    remove_dc: bool,
) -> PhaseResult<ConditionedSignal> {
    if sps < 2 {
        return Err(format!("{} samples per symbol is too few", sps));
    }
    if baseband.len() < sps * MIN_SYMBOLS {
        return Err(format!(
            "capture of {} samples is shorter than {} symbols",
            baseband.len(),
            MIN_SYMBOLS
        ));
    }

    let step = -2.0 * PI * offset_hz / sample_rate;
    let mut mixed: Vec<Iq> = baseband
        .iter()
        .enumerate()
        .map(|(n, &s)| if offset_hz == 0.0 { s } else { s * Iq::from_phase(step * n as f64) })
        .collect();

    if remove_dc {
        let (si, sq) = mixed
            .iter()
            .fold((0.0f64, 0.0f64), |(i, q), s| (i + s.i as f64, q + s.q as f64));
        let n = mixed.len() as f64;
        let dc = Iq::new((si / n) as f32, (sq / n) as f32);
        for s in mixed.iter_mut() {
            *s = *s - dc;
        }
    }

    let filtered = moving_average(&mixed, (sps / 4).max(1));

    let power = filtered.iter().map(|s| s.norm_sqr() as f64).sum::<f64>() / filtered.len() as f64;
    let rms = power.sqrt();
    if rms < 1e-9 {
        return Err("no signal energy in capture".to_string());
    }

    let scale = (1.0 / rms) as f32;
    Ok(ConditionedSignal {
        samples: filtered.into_iter().map(|s| s.scale(scale)).collect(),
        samples_per_symbol: sps,
        input_rms: rms,
    })
}

/// Causal boxcar filter of `len` taps
fn moving_average(samples: &[Iq], len: usize) -> Vec<Iq> {
    if len <= 1 {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(samples.len());
    let mut acc = (0.0f64, 0.0f64);
    for (n, s) in samples.iter().enumerate() {
        acc.0 += s.i as f64;
        acc.1 += s.q as f64;
        if n >= len {
            acc.0 -= samples[n - len].i as f64;
            acc.1 -= samples[n - len].q as f64;
        }
        let taps = (n + 1).min(len) as f64;
        out.push(Iq::new((acc.0 / taps) as f32, (acc.1 / taps) as f32));
    }
    out
}

/// Symbol timing, integrate-and-dump, carrier phase and EVM
pub fn demodulate(signal: &ConditionedSignal, signal_type: SignalType) -> PhaseResult<Demodulated> {
    let sps = signal.samples_per_symbol;
    let x = &signal.samples;
    if sps == 0 || x.len() < sps * MIN_SYMBOLS {
        return Err(format!("only {} samples in capture", x.len()));
    }

    let dump = |offset: usize, k: usize| -> Iq {
        let start = offset + k * sps;
        let (i, q) = x[start..start + sps]
            .iter()
            .fold((0.0f32, 0.0f32), |(i, q), s| (i + s.i, q + s.q));
        Iq::new(i / sps as f32, q / sps as f32)
    };

    // Symbol count shared by all offsets so energies are comparable
    let usable = (x.len() - (sps - 1)) / sps;
    let mut best_offset = 0;
    let mut best_energy = f64::MIN;
    for offset in 0..sps {
        let energy: f64 = (0..usable).map(|k| dump(offset, k).norm_sqr() as f64).sum();
        if energy > best_energy {
            best_energy = energy;
            best_offset = offset;
        }
    }

    let mut soft: Vec<Iq> = (0..usable).map(|k| dump(best_offset, k)).collect();

    let phase_correction = match signal_type {
        SignalType::Bpsk => {
            let acc = soft.iter().fold(Iq::ZERO, |acc, &s| acc + s * s);
            (acc.q as f64).atan2(acc.i as f64) / 2.0
        }
        SignalType::Qpsk => {
            // Points at 45 + k*90 degrees all map to 180 degrees under ^4
            let acc = soft.iter().fold(Iq::ZERO, |acc, &s| {
                let s2 = s * s;
                acc + s2 * s2
            });
            (-acc.q as f64).atan2(-acc.i as f64) / 4.0
        }
        _ => 0.0,
    };
    if phase_correction != 0.0 {
        let derotate = Iq::from_phase(-phase_correction);
        for s in soft.iter_mut() {
            *s = *s * derotate;
        }
    }

    let reference_amplitude = reference_amplitude(&soft, signal_type);
    if reference_amplitude < 1e-9 {
        return Err("constellation collapsed to zero".to_string());
    }

    // Idle gaps around a PSK burst carry no constellation point
    let inv = (1.0 / reference_amplitude) as f32;
    let errors: Vec<f64> = soft
        .iter()
        .map(|&s| s.scale(inv))
        .filter(|s| !signal_type.is_phase_keyed() || s.norm() >= 0.5)
        .map(|s| (s - nearest_point(s, signal_type)).norm_sqr() as f64)
        .collect();
    let evm = (errors.iter().sum::<f64>() / errors.len().max(1) as f64).sqrt();

    Ok(Demodulated {
        soft,
        timing_offset: best_offset,
        phase_correction,
        reference_amplitude,
        evm,
        estimated_snr: -20.0 * evm.max(1e-6).log10(),
    })
}

/// Magnitude of a full-scale symbol. PSK uses the median magnitude; on-off
/// keying averages the symbols in the upper half of the range.
fn reference_amplitude(soft: &[Iq], signal_type: SignalType) -> f64 {
    let mut mags: Vec<f64> = soft.iter().map(|s| s.norm() as f64).collect();
    if mags.is_empty() {
        return 0.0;
    }
    if signal_type.is_phase_keyed() {
        mags.sort_by(|a, b| a.total_cmp(b));
        return mags[mags.len() / 2];
    }
    let max = mags.iter().cloned().fold(0.0, f64::max);
    let on: Vec<f64> = mags.into_iter().filter(|&m| m >= max / 2.0).collect();
    on.iter().sum::<f64>() / on.len().max(1) as f64
}

/// Ideal point closest to a normalised soft symbol. On-off keying ignores
/// phase, so its "on" point sits on the symbol's own phase.
fn nearest_point(s: Iq, signal_type: SignalType) -> Iq {
    match signal_type {
        SignalType::Bpsk => Iq::new(if s.i >= 0.0 { 1.0 } else { -1.0 }, 0.0),
        SignalType::Qpsk => {
            let a = FRAC_1_SQRT_2 as f32;
            Iq::new(if s.i >= 0.0 { a } else { -a }, if s.q >= 0.0 { a } else { -a })
        }
        _ => {
            let mag = s.norm();
            if mag >= 0.5 {
                s.scale(1.0 / mag)
            } else {
                Iq::ZERO
            }
        }
    }
}

/// Hard decisions with per-bit confidence under a constellation rotation
pub fn slice(soft: &[Iq], signal_type: SignalType, rotation: usize, reference: f64) -> (Vec<u8>, Vec<f32>) {
    let bits_per_symbol = signal_type.bits_per_symbol();
    let mut bits = Vec::with_capacity(soft.len() * bits_per_symbol);
    let mut conf = Vec::with_capacity(soft.len() * bits_per_symbol);
    let inv = (1.0 / reference.max(1e-9)) as f32;

    for &raw in soft {
        let s = rotate(raw, signal_type, rotation).scale(inv);
        match signal_type {
            SignalType::Qpsk => {
                let a = FRAC_1_SQRT_2 as f32;
                bits.push(u8::from(s.q < 0.0));
                conf.push((s.q.abs() / a).min(1.0));
                bits.push(u8::from(s.i < 0.0));
                conf.push((s.i.abs() / a).min(1.0));
            }
            SignalType::Bpsk => {
                bits.push(u8::from(s.i >= 0.0));
                conf.push(s.i.abs().min(1.0));
            }
            _ => {
                let mag = s.norm();
                bits.push(u8::from(mag >= 0.5));
                conf.push(((mag - 0.5).abs() / 0.5).min(1.0));
            }
        }
    }
    (bits, conf)
}

fn rotation_count(signal_type: SignalType) -> usize {
    match signal_type {
        SignalType::Qpsk => 4,
        SignalType::Bpsk => 2,
        _ => 1,
    }
}

/// Rotate by `rotation` multiples of the constellation's symmetry angle
fn rotate(s: Iq, signal_type: SignalType, rotation: usize) -> Iq {
    match (signal_type, rotation % rotation_count(signal_type).max(1)) {
        (SignalType::Qpsk, 1) => Iq::new(-s.q, s.i),
        (SignalType::Qpsk, 2) | (SignalType::Bpsk, 1) => Iq::new(-s.i, -s.q),
        (SignalType::Qpsk, 3) => Iq::new(s.q, -s.i),
        _ => s,
    }
}

/// Hard decisions at the nominal rotation plus the symbol error rate
pub fn recover_symbols(
    demod: &Demodulated,
    signal_type: SignalType,
    params: &DemodulationParams,
) -> PhaseResult<RecoveredSymbols> {
    let (bits, confidences) = slice(&demod.soft, signal_type, 0, demod.reference_amplitude);
    if bits.len() < MIN_SYMBOLS {
        return Err(format!("only {} bits recovered", bits.len()));
    }

    let per_symbol = signal_type.bits_per_symbol();
    let threshold = params.constellation_confidence as f32;
    let symbols = confidences.len() / per_symbol;
    let errors = confidences
        .chunks(per_symbol)
        .filter(|c| c.iter().cloned().fold(f32::MAX, f32::min) < threshold)
        .count();

    Ok(RecoveredSymbols {
        bits,
        confidences,
        symbol_error_rate: errors as f64 / symbols.max(1) as f64,
    })
}

/// Search every rotation for the sync word; first best match wins
pub fn synchronize(
    demod: &Demodulated,
    symbols: &RecoveredSymbols,
    signal_type: SignalType,
    max_errors: u32,
) -> PhaseResult<SyncResult> {
    let sync_bits = bytes_to_bits(&SYNC_WORD.to_be_bytes());
    let mut best: Option<SyncResult> = None;

    for rotation in 0..rotation_count(signal_type) {
        let (bits, confidences) = if rotation == 0 {
            (symbols.bits.clone(), symbols.confidences.clone())
        } else {
            slice(&demod.soft, signal_type, rotation, demod.reference_amplitude)
        };
        if bits.len() < SYNC_WORD_BITS {
            continue;
        }

        let mut found: Option<(usize, u32)> = None;
        for position in 0..=bits.len() - SYNC_WORD_BITS {
            let errors = bits[position..position + SYNC_WORD_BITS]
                .iter()
                .zip(&sync_bits)
                .filter(|(a, b)| a != b)
                .count() as u32;
            if errors <= max_errors && found.map_or(true, |(_, e)| errors < e) {
                found = Some((position, errors));
                if errors == 0 {
                    break;
                }
            }
        }

        if let Some((position, errors)) = found {
            if best.as_ref().map_or(true, |b| errors < b.errors) {
                best = Some(SyncResult {
                    rotation,
                    position,
                    errors,
                    bits,
                    confidences,
                });
            }
            if errors == 0 {
                break;
            }
        }
    }

    best.ok_or_else(|| format!("sync word not found within {} bit errors", max_errors))
}

/// Read the length field and locate body and CRC
pub fn detect_frame(sync: &SyncResult) -> PhaseResult<FrameBoundaries> {
    let len_start = sync.position + SYNC_WORD_BITS;
    let body_start = len_start + LENGTH_FIELD_LEN * 8;
    if body_start > sync.bits.len() {
        return Err("length field truncated".to_string());
    }

    let len_bytes = bits_to_bytes(&sync.bits[len_start..body_start]);
    let body_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    if body_len == 0 || body_len > MAX_BODY_LEN {
        return Err(format!("invalid body length {}", body_len));
    }

    let crc_start = body_start + body_len * 8;
    let end = crc_start + CRC_BITS;
    if end > sync.bits.len() {
        return Err(format!(
            "frame truncated: need {} bits after sync, have {}",
            end - sync.position,
            sync.bits.len() - sync.position
        ));
    }

    Ok(FrameBoundaries {
        sync_position: sync.position,
        body_start,
        body_len,
        crc_start,
        end,
    })
}

fn split_frame(bits: &[u8], body_len: usize) -> (Vec<u8>, u16) {
    let body = bits_to_bytes(&bits[..body_len * 8]);
    let crc_bytes = bits_to_bytes(&bits[body_len * 8..]);
    (body, u16::from_be_bytes([crc_bytes[0], crc_bytes[1]]))
}

/// CRC check with bounded single- and two-bit repair, least confident bits
/// first
pub fn correct_errors(
    sync: &SyncResult,
    frame: &FrameBoundaries,
    params: &DemodulationParams,
) -> PhaseResult<CorrectionResult> {
    let mut bits = sync.bits[frame.body_start..frame.end].to_vec();
    let confidences = &sync.confidences[frame.body_start..frame.end];
    let frame_bits = bits.len();

    let (body, crc) = split_frame(&bits, frame.body_len);
    if check_crc16(&body, crc) {
        return Ok(CorrectionResult {
            body,
            crc,
            corrected_bits: Vec::new(),
            frame_bits,
        });
    }

    let mut order: Vec<usize> = (0..bits.len()).collect();
    order.sort_by(|&a, &b| confidences[a].total_cmp(&confidences[b]).then(a.cmp(&b)));

    for &i in order.iter().take(params.max_single_flips) {
        bits[i] ^= 1;
        let (body, crc) = split_frame(&bits, frame.body_len);
        if check_crc16(&body, crc) {
            return Ok(CorrectionResult {
                body,
                crc,
                corrected_bits: vec![i],
                frame_bits,
            });
        }
        bits[i] ^= 1;
    }

    let pairs = &order[..order.len().min(params.max_pair_candidates)];
    for (n, &i) in pairs.iter().enumerate() {
        for &j in &pairs[n + 1..] {
            bits[i] ^= 1;
            bits[j] ^= 1;
            let (body, crc) = split_frame(&bits, frame.body_len);
            if check_crc16(&body, crc) {
                let mut corrected = vec![i, j];
                corrected.sort_unstable();
                return Ok(CorrectionResult {
                    body,
                    crc,
                    corrected_bits: corrected,
                    frame_bits,
                });
            }
            bits[i] ^= 1;
            bits[j] ^= 1;
        }
    }

    Err(format!(
        "CRC mismatch not repairable with up to two bit flips ({} bits)",
        frame_bits
    ))
}

/// Parse the body header and validate HTTP payloads
pub fn analyze_protocol(body: &[u8]) -> PhaseResult<ProtocolInfo> {
    let frame = parse_body(body).map_err(|e| e.to_string())?;

    let http = if frame.content_type.is_http() {
        let message = parse_http_message(&frame.payload).map_err(|e| e.to_string())?;
        let expect_request = frame.content_type == ContentType::HttpRequest;
        if message.is_request() != expect_request {
            return Err(format!(
                "{:?} frame carries an HTTP {}",
                frame.content_type,
                if message.is_request() { "request" } else { "response" }
            ));
        }
        Some(message)
    } else {
        None
    };

    Ok(ProtocolInfo { frame, http })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdr::synth::modulate;

    const SPS: usize = 8;

    fn run_to_sync(burst: &[Iq], signal_type: SignalType) -> (Demodulated, RecoveredSymbols, SyncResult) {
        let params = DemodulationParams::default();
        let cond = condition(burst, 0.0, 10_000.0, SPS, signal_type.is_phase_keyed()).unwrap();
        let demod = demodulate(&cond, signal_type).unwrap();
        let symbols = recover_symbols(&demod, signal_type, &params).unwrap();
        let sync = synchronize(&demod, &symbols, signal_type, params.max_sync_errors).unwrap();
        (demod, symbols, sync)
    }

    fn frame_bytes() -> Vec<u8> {
        AirFrame::new("W1AW", ContentType::Text, b"CQ CQ DE W1AW".to_vec())
            .encode()
            .unwrap()
    }

    #[test]
    fn test_clean_qpsk_decodes() {
        let burst = modulate(&frame_bytes(), SignalType::Qpsk, SPS, 0.0, 10_000.0);
        let (demod, symbols, sync) = run_to_sync(&burst, SignalType::Qpsk);
        assert!(demod.estimated_snr > 15.0);
        // only the idle tail falls outside the confidence radius
        assert!(symbols.symbol_error_rate < 0.05);
        assert_eq!(sync.errors, 0);
        // two preamble bytes precede the sync word
        assert_eq!(sync.position, 16);

        let frame = detect_frame(&sync).unwrap();
        let fixed = correct_errors(&sync, &frame, &DemodulationParams::default()).unwrap();
        assert!(fixed.corrected_bits.is_empty());
        let info = analyze_protocol(&fixed.body).unwrap();
        assert_eq!(info.frame.callsign, "W1AW");
        assert_eq!(info.frame.payload, b"CQ CQ DE W1AW");
    }

    #[test]
    fn test_rotated_qpsk_found_by_sync_search() {
        let burst: Vec<Iq> = modulate(&frame_bytes(), SignalType::Qpsk, SPS, 0.0, 10_000.0)
            .into_iter()
            .map(|s| Iq::new(-s.q, s.i))
            .collect();
        let (_, _, sync) = run_to_sync(&burst, SignalType::Qpsk);
        assert_eq!(sync.errors, 0);
        assert_ne!(sync.rotation, 0);
    }

    #[test]
    fn test_bpsk_and_ook_with_offset() {
        for signal_type in [SignalType::Bpsk, SignalType::Cw] {
            let burst = modulate(&frame_bytes(), signal_type, SPS, 625.0, 10_000.0);
            let params = DemodulationParams::default();
            let cond = condition(&burst, 625.0, 10_000.0, SPS, signal_type.is_phase_keyed()).unwrap();
            let demod = demodulate(&cond, signal_type).unwrap();
            let symbols = recover_symbols(&demod, signal_type, &params).unwrap();
            let sync = synchronize(&demod, &symbols, signal_type, params.max_sync_errors).unwrap();
            let frame = detect_frame(&sync).unwrap();
            let fixed = correct_errors(&sync, &frame, &params).unwrap();
            assert!(analyze_protocol(&fixed.body).is_ok(), "{}", signal_type);
        }
    }

    #[test]
    fn test_single_and_double_bit_repair() {
        let burst = modulate(&frame_bytes(), SignalType::Bpsk, SPS, 0.0, 10_000.0);
        let (_, _, mut sync) = run_to_sync(&burst, SignalType::Bpsk);
        let frame = detect_frame(&sync).unwrap();
        let params = DemodulationParams::default();

        let a = frame.body_start + 37;
        let b = frame.body_start + 70;
        sync.bits[a] ^= 1;
        sync.confidences[a] = 0.05;
        let fixed = correct_errors(&sync, &frame, &params).unwrap();
        assert_eq!(fixed.corrected_bits, vec![37]);

        sync.bits[b] ^= 1;
        sync.confidences[b] = 0.1;
        let fixed = correct_errors(&sync, &frame, &params).unwrap();
        assert_eq!(fixed.corrected_bits, vec![37, 70]);
    }

    #[test]
    fn test_missing_sync_fails() {
        // Preamble and payload only, no sync word
        let burst = modulate(&[0xA5; 12], SignalType::Bpsk, SPS, 0.0, 10_000.0);
        let params = DemodulationParams::default();
        let cond = condition(&burst, 0.0, 10_000.0, SPS, true).unwrap();
        let demod = demodulate(&cond, SignalType::Bpsk).unwrap();
        let symbols = recover_symbols(&demod, SignalType::Bpsk, &params).unwrap();
        assert!(synchronize(&demod, &symbols, SignalType::Bpsk, 2).is_err());
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let mut raw = frame_bytes();
        raw.truncate(raw.len() - 6);
        let burst = modulate(&raw, SignalType::Bpsk, SPS, 0.0, 10_000.0);
        let (_, _, sync) = run_to_sync(&burst, SignalType::Bpsk);
        let err = detect_frame(&sync).unwrap_err();
        assert!(err.contains("truncated"));
    }

    #[test]
    fn test_short_capture_rejected() {
        let burst = vec![Iq::new(1.0, 0.0); 20];
        assert!(condition(&burst, 0.0, 10_000.0, SPS, true).is_err());
    }

    #[test]
    fn test_http_type_mismatch() {
        let body = AirFrame::new(
            "W1AW",
            ContentType::HttpRequest,
            b"HTTP/1.1 200 OK\r\n\r\n".to_vec(),
        )
        .encode_body();
        assert!(analyze_protocol(&body).is_err());

        let body = AirFrame::new("W1AW", ContentType::HttpRequest, b"GET / HTTP/1.1\r\n\r\n".to_vec()).encode_body();
        assert!(analyze_protocol(&body).unwrap().http.is_some());
    }
}
