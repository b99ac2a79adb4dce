//! Over-the-air frame format
//!
//! ```text
//! +------------+-----------+----------------------------------+--------+
//! | sync (32b) | len (16b) | body                             | crc16  |
//! +------------+-----------+----------------------------------+--------+
//! body = version | flags | content type | callsign len | callsign | payload
//! ```
//! All multi-byte fields are big-endian; bits go out MSB first.

mod callsign;
mod crc;
pub mod http;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use callsign::is_valid_callsign;
pub use crc::{check_crc16, compute_crc16};
pub use http::{parse_http_message, HttpMessage, StartLine};

/// Frame sync word (CCSDS attached sync marker)
pub const SYNC_WORD: u32 = 0x1ACF_FC1D;

pub const SYNC_WORD_BITS: usize = 32;

/// Length field size in bytes
pub const LENGTH_FIELD_LEN: usize = 2;

pub const CRC_LEN: usize = 2;

pub const FRAME_VERSION: u8 = 1;

/// Largest body the decoder accepts
pub const MAX_BODY_LEN: usize = 4096;

/// Fixed body header: version, flags, content type, callsign length
const BODY_HEADER_LEN: usize = 4;

/// `flags` bit: the transmission carries a signature
pub const FLAG_SIGNED: u8 = 0x01;

/// Air frame parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid frame length")]
    InvalidLength,
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid callsign '{0}'")]
    InvalidCallsign(String),
    #[error("unknown content type {0}")]
    UnknownContentType(u8),
    #[error("malformed HTTP frame: {0}")]
    MalformedHttp(String),
}

/// Content carried in a transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Binary,
    Text,
    HttpRequest,
    HttpResponse,
    Page,
    MeshCoordination,
    EmergencyBulletin,
}

impl ContentType {
    pub fn code(&self) -> u8 {
        match self {
            ContentType::Binary => 0,
            ContentType::Text => 1,
            ContentType::HttpRequest => 2,
            ContentType::HttpResponse => 3,
            ContentType::Page => 4,
            ContentType::MeshCoordination => 5,
            ContentType::EmergencyBulletin => 6,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            0 => ContentType::Binary,
            1 => ContentType::Text,
            2 => ContentType::HttpRequest,
            3 => ContentType::HttpResponse,
            4 => ContentType::Page,
            5 => ContentType::MeshCoordination,
            6 => ContentType::EmergencyBulletin,
            other => return Err(ProtocolError::UnknownContentType(other)),
        })
    }

    pub fn is_http(&self) -> bool {
        matches!(self, ContentType::HttpRequest | ContentType::HttpResponse)
    }
}

/// Decoded frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirFrame {
    pub version: u8,
    pub flags: u8,
    pub content_type: ContentType,
    pub callsign: String,
    pub payload: Vec<u8>,
}

impl AirFrame {
    pub fn new(callsign: &str, content_type: ContentType, payload: Vec<u8>) -> Self {
        Self {
            version: FRAME_VERSION,
            flags: 0,
            content_type,
            callsign: callsign.to_string(),
            payload,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.flags & FLAG_SIGNED != 0
    }

    /// Serialize the body (no sync, length or CRC)
    pub fn encode_body(&self) -> Vec<u8> {
        let cs = self.callsign.as_bytes();
        let mut body = Vec::with_capacity(BODY_HEADER_LEN + cs.len() + self.payload.len());
        body.push(self.version);
        body.push(self.flags);
        body.push(self.content_type.code());
        body.push(cs.len() as u8);
        body.extend_from_slice(cs);
        body.extend_from_slice(&self.payload);
        body
    }

    /// Full air frame: sync word, length, body, CRC
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if !is_valid_callsign(&self.callsign) {
            return Err(ProtocolError::InvalidCallsign(self.callsign.clone()));
        }
        let body = self.encode_body();
        if body.len() > MAX_BODY_LEN {
            return Err(ProtocolError::InvalidLength);
        }

        let mut out = Vec::with_capacity(4 + LENGTH_FIELD_LEN + body.len() + CRC_LEN);
        out.extend_from_slice(&SYNC_WORD.to_be_bytes());
        out.extend_from_slice(&(body.len() as u16).to_be_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&compute_crc16(&body).to_be_bytes());
        Ok(out)
    }
}

/// Parse a frame body; callsign and content type are validated
pub fn parse_body(body: &[u8]) -> Result<AirFrame, ProtocolError> {
    if body.len() < BODY_HEADER_LEN {
        return Err(ProtocolError::InvalidLength);
    }

    let version = body[0];
    if version != FRAME_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    let flags = body[1];
    let content_type = ContentType::from_code(body[2])?;
    let cs_len = body[3] as usize;

    let cs_end = BODY_HEADER_LEN + cs_len;
    if body.len() < cs_end {
        return Err(ProtocolError::InvalidLength);
    }
    let callsign = String::from_utf8_lossy(&body[BODY_HEADER_LEN..cs_end]).into_owned();
    if !is_valid_callsign(&callsign) {
        return Err(ProtocolError::InvalidCallsign(callsign));
    }

    Ok(AirFrame {
        version,
        flags,
        content_type,
        callsign,
        payload: body[cs_end..].to_vec(),
    })
}

/// Unpack MSB-first bits from bytes
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &b in bytes {
        for shift in (0..8).rev() {
            bits.push((b >> shift) & 1);
        }
    }
    bits
}

/// Pack MSB-first bits into bytes; a trailing partial byte is dropped
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | (bit & 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = AirFrame::new("W1AW", ContentType::Text, b"73".to_vec());
        let raw = frame.encode().unwrap();
        assert_eq!(&raw[..4], &[0x1A, 0xCF, 0xFC, 0x1D]);
        let len = u16::from_be_bytes([raw[4], raw[5]]) as usize;
        assert_eq!(len, 4 + 4 + 2);
        let body = &raw[6..6 + len];
        let crc = u16::from_be_bytes([raw[6 + len], raw[7 + len]]);
        assert!(check_crc16(body, crc));
        assert_eq!(parse_body(body).unwrap(), frame);
    }

    #[test]
    fn test_parse_body_rejects_bad_callsign() {
        let mut frame = AirFrame::new("W1AW", ContentType::Binary, vec![1, 2, 3]);
        frame.callsign = "bad call".to_string();
        let body = frame.encode_body();
        assert!(matches!(
            parse_body(&body),
            Err(ProtocolError::InvalidCallsign(_))
        ));
        assert!(frame.encode().is_err());
    }

    #[test]
    fn test_parse_body_rejects_unknown_type() {
        let mut body = AirFrame::new("K2ABC", ContentType::Binary, vec![]).encode_body();
        body[2] = 42;
        assert_eq!(parse_body(&body), Err(ProtocolError::UnknownContentType(42)));
    }

    #[test]
    fn test_bit_packing() {
        let bits = bytes_to_bits(&[0xA5, 0x01]);
        assert_eq!(&bits[..8], &[1, 0, 1, 0, 0, 1, 0, 1]);
        assert_eq!(bits_to_bytes(&bits), vec![0xA5, 0x01]);
    }
}
