//! CRC-16 checksum for air frames (CRC-16/CCITT-FALSE)

/// CCITT polynomial x^16 + x^12 + x^5 + 1
const CRC16_POLY: u16 = 0x1021;

const CRC16_INIT: u16 = 0xFFFF;

/// Compute CRC-16/CCITT-FALSE over `data`
pub fn compute_crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= (byte as u16) << 8;

        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// Check `data` against the big-endian CRC stored in `expected`
pub fn check_crc16(data: &[u8], expected: u16) -> bool {
    compute_crc16(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        // Standard check input for CRC-16/CCITT-FALSE
        assert_eq!(compute_crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_crc16_empty() {
        assert_eq!(compute_crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let data = b"CQ CQ DE W1AW".to_vec();
        let crc = compute_crc16(&data);
        let mut flipped = data.clone();
        flipped[3] ^= 0x10;
        assert!(check_crc16(&data, crc));
        assert!(!check_crc16(&flipped, crc));
    }
}
