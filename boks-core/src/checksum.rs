//! Boks checksum algorithm
//!
//! Every frame ends with a single checksum byte: the sum of all preceding
//! bytes (opcode, length and payload) truncated to 8 bits.

use tracing::trace;

/// Calculate the 8-bit additive checksum over `data`
pub fn calculate(data: &[u8]) -> u8 {
    let sum = data
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b));

    trace!(len = data.len(), checksum = format!("0x{:02X}", sum), "Calculated checksum");

    sum
}

/// Verify a complete raw frame: the trailing byte must equal the checksum
/// of everything before it. Frames shorter than two bytes cannot carry a
/// checksum and never verify.
pub fn verify(raw: &[u8]) -> bool {
    if raw.len() < 2 {
        return false;
    }

    let (body, tail) = raw.split_at(raw.len() - 1);
    calculate(body) == tail[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty() {
        assert_eq!(calculate(&[]), 0);
    }

    #[test]
    fn test_checksum_known_frame() {
        // GET_LOGS_COUNT with empty payload: 0x07 0x00 -> checksum 0x07
        assert_eq!(calculate(&[0x07, 0x00]), 0x07);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(calculate(&[0xFF, 0x02]), 0x01);
        assert_eq!(calculate(&[0x80, 0x80]), 0x00);
    }

    #[test]
    fn test_verify_valid() {
        assert!(verify(&[0x07, 0x00, 0x07]));
    }

    #[test]
    fn test_verify_corrupted() {
        assert!(!verify(&[0x07, 0x00, 0x08]));
        assert!(!verify(&[0x07, 0x01, 0x07]));
    }

    #[test]
    fn test_verify_too_short() {
        assert!(!verify(&[]));
        assert!(!verify(&[0x07]));
    }
}
