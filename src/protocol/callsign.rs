//! Amateur callsign shape checks

/// Longest base callsign accepted (without SSID)
const MAX_BASE_LEN: usize = 8;

/// Highest SSID suffix (`-0` .. `-15`)
const MAX_SSID: u8 = 15;

/// Validate an amateur callsign with optional `-SSID`.
///
/// Accepted shape: a 1-3 character alphanumeric prefix, one digit, and a
/// 1-4 character suffix containing at least one letter, upper case only.
pub fn is_valid_callsign(callsign: &str) -> bool {
    let (base, ssid) = match callsign.split_once('-') {
        Some((b, s)) => (b, Some(s)),
        None => (callsign, None),
    };

    if let Some(ssid) = ssid {
        match ssid.parse::<u8>() {
            Ok(n) if n <= MAX_SSID && !ssid.starts_with('+') => {}
            _ => return false,
        }
    }

    let bytes = base.as_bytes();
    if bytes.len() < 3 || bytes.len() > MAX_BASE_LEN {
        return false;
    }
    if !bytes
        .iter()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return false;
    }

    // The separating digit may sit after a prefix of 1-3 characters
    (1..=3).any(|p| {
        p < bytes.len()
            && bytes[p].is_ascii_digit()
            && valid_suffix(&bytes[p + 1..])
    })
}

fn valid_suffix(suffix: &[u8]) -> bool {
    !suffix.is_empty() && suffix.len() <= 4 && suffix.iter().any(|b| b.is_ascii_uppercase())
}
