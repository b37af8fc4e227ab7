//! Error types for boks-core

/// Result type alias for core protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame is too short to be valid
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        expected: u8,
        received: u8,
    },

    /// Payload does not fit the one-byte length field
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Declared payload length does not match the frame size
    #[error("Frame length mismatch: length byte says {declared}, frame carries {actual}")]
    LengthMismatch {
        declared: usize,
        actual: usize,
    },

    /// No master key configured for offline PIN derivation
    #[error("Master key required but not configured")]
    MasterKeyMissing,

    /// Master key text does not decode to exactly 32 bytes
    #[error("Master key invalid: expected 32 bytes of hex, got {detail}")]
    MasterKeyInvalid {
        detail: String,
    },

    /// A keypad code is not 6 characters of the Boks charset
    #[error("Invalid code format: {code:?}")]
    InvalidCodeFormat {
        code: String,
    },

    /// Configuration key is not exactly 8 ASCII characters
    #[error("Invalid configuration key length: expected 8 characters, got {actual}")]
    InvalidConfigKey {
        actual: usize,
    },

    /// NFC tag UID text is not valid hex
    #[error("Invalid NFC tag UID: {uid:?}")]
    InvalidTagUid {
        uid: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ChecksumMismatch { expected: 0x07, received: 0x08 };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0x07, received 0x08"
        );
    }
}
