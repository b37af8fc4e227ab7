//! Error types for the session layer

use boks_protocol::DeviceErrorKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Codec or key-material error
    #[error("Protocol error: {0}")]
    Core(#[from] boks_core::Error),

    /// Physical link fault; the only family the send loop retries
    #[error("Transport error: {0}")]
    Transport(#[from] boks_transport::Error),

    /// No correlated reply within the deadline. Deliberate "no answer"
    /// outcome, never retried.
    #[error("Timed out waiting for a response to 0x{opcode:02X}")]
    Timeout { opcode: u8 },

    /// Device rejected the config key
    #[error("Device rejected the operation as unauthorized")]
    Unauthorized,

    /// Operation needs a config key but none is configured
    #[error("A config key is required for this operation")]
    ConfigKeyRequired,

    /// Device rejected the opening code
    #[error("The device rejected the opening code")]
    CodeRejected,

    /// Device reported a protocol-level error
    #[error("Device error: {}", .0.as_str())]
    Device(DeviceErrorKind),

    /// Device answered an operation with its error opcode
    #[error("Operation failed: {operation}")]
    OperationFailed { operation: &'static str },

    /// Another caller is already using an exclusive resource (log sink)
    #[error("Busy: {0}")]
    Busy(&'static str),

    /// Malformed caller input, rejected before any I/O
    #[error("Invalid input: {0}")]
    Input(String),
}

impl Error {
    /// Whether the send loop may retry after a forced reset
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
