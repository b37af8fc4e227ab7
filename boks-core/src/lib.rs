//! # boks-core
//!
//! Core protocol implementation for Boks BLE parcel lockers.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame structure and encoding/decoding
//! - Checksum calculation
//! - Opcode definitions
//! - Offline PIN derivation
//! - Protocol constants

pub mod checksum;
pub mod constants;
pub mod error;
pub mod frame;
pub mod opcode;
pub mod pin;

pub use error::{Error, Result};
pub use frame::Frame;
pub use opcode::{CodeKind, CommandOpcode, ConfigType, HistoryEvent, NotificationOpcode};
pub use pin::{MasterKey, derive_pin};

/// Protocol version information
pub const PROTOCOL_VERSION: &str = "1.0";

/// Characters a Boks keypad code is made of
pub const CODE_CHARSET: &str = "0123456789AB";

/// Length of every keypad code
pub const CODE_LEN: usize = 6;

/// Length of the configuration key carried by privileged commands
pub const CONFIG_KEY_LEN: usize = 8;

/// Frame overhead: opcode + length + checksum
pub const FRAME_OVERHEAD: usize = 3;

/// Maximum payload carried by a single frame (length field is one byte)
pub const MAX_PAYLOAD_SIZE: usize = 255;
