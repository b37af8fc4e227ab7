//! Status types pushed to or returned by the session layer

use std::fmt;

/// Counts of codes currently stored on the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeCounts {
    pub master: u16,
    pub single_use: u16,
}

impl fmt::Display for CodeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "master={}, single_use={}", self.master, self.single_use)
    }
}

/// Outcome of an NFC scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfcScanStatus {
    /// A new tag was presented
    Found,

    /// The presented tag is already registered
    AlreadyExists,

    /// The device gave up waiting for a tag
    Timeout,
}

/// Result of an NFC scan: status plus the tag UID when one was read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfcScanResult {
    pub status: NfcScanStatus,
    pub uid: Option<String>,
}

/// State change pushed through the status callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The door opened or closed
    Door { open: bool },

    /// Battery reading refreshed
    Battery {
        level: u8,
        temperature: Option<i16>,
    },

    /// Device-reported stored-log count changed
    LogsCount { count: u16 },
}
