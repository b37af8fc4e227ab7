//! # boks-protocol
//!
//! Typed packet layer for the Boks protocol: downlink command encoding
//! ([`tx::Request`]), uplink notification decoding ([`rx::Response`])
//! and history log parsing ([`history::LogEntry`]).
//!
//! Framing, checksums and opcode tables live in `boks-core`; this crate
//! maps between frames and meaningful types.

pub mod history;
pub mod rx;
pub mod tx;

pub use history::{DiagnosticCode, LogDetail, LogEntry};
pub use rx::{DeviceErrorKind, Response};
pub use tx::Request;
