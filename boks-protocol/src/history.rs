//! History log entries
//!
//! Log frames share a common prefix: a 3-byte big-endian age in seconds,
//! followed by event-specific data. The age is converted to an absolute
//! timestamp at parse time; implausible ages (ten years or more) fall
//! back to the current time.

use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Duration, Utc};

use boks_core::constants::MAX_LOG_AGE_SECONDS;
use boks_core::opcode::PowerOffReason;
use boks_core::{CODE_CHARSET, HistoryEvent};

/// Known diagnostic error codes carried by an `ERROR` (0xA0) log entry
///
/// These map to faults of the MFRC630 NFC frontend.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DiagnosticCode {
    BufferOverflow = 0x03,
    Collision = 0x0B,
    Integrity = 0x13,
    NoTag = 0x15,
    Internal = 0xBC,
}

impl DiagnosticCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x03 => Some(Self::BufferOverflow),
            0x0B => Some(Self::Collision),
            0x13 => Some(Self::Integrity),
            0x15 => Some(Self::NoTag),
            0xBC => Some(Self::Internal),
            _ => None,
        }
    }

    /// Stable key identifying the error in events and logs
    pub fn key(self) -> &'static str {
        match self {
            Self::BufferOverflow => "diagnostic_error_buffer",
            Self::Collision => "diagnostic_error_collision",
            Self::Integrity => "diagnostic_error_integrity",
            Self::NoTag => "diagnostic_error_no_tag",
            Self::Internal => "diagnostic_error_bc",
        }
    }
}

/// Event-specific data attached to a log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDetail {
    /// No extra data beyond the event itself
    None,
    /// The keypad or BLE code that was used (or rejected)
    Code { code: String },
    /// Power-off reason; `raw` is kept for unknown codes
    PowerOff {
        reason: Option<PowerOffReason>,
        raw: u8,
    },
    /// Diagnostic error from the NFC frontend
    Diagnostic {
        code: Option<DiagnosticCode>,
        raw: u8,
    },
    /// NFC tag seen during an opening or a registration scan
    NfcTag { tag_type: u8, uid: String },
    /// Raw data attached to a block reset
    Reset { info: String },
}

/// One parsed history log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub event: HistoryEvent,
    /// Seconds elapsed between the event and its retrieval
    pub elapsed: u32,
    /// Absolute time of the event, reconstructed from `elapsed`
    pub timestamp: DateTime<Utc>,
    pub detail: LogDetail,
}

impl LogEntry {
    /// Parse a log entry from an event opcode and its frame payload
    ///
    /// Parsing is total: undersized payloads produce an entry with zero
    /// age and no detail.
    pub fn parse(event: HistoryEvent, payload: &[u8]) -> Self {
        let elapsed = if payload.len() >= 3 {
            BigEndian::read_u24(payload)
        } else {
            0
        };

        let now = Utc::now();
        let timestamp = if elapsed < MAX_LOG_AGE_SECONDS {
            now - Duration::seconds(elapsed as i64)
        } else {
            now
        };

        let rest = payload.get(3..).unwrap_or(&[]);
        let detail = Self::parse_detail(event, rest);

        Self {
            event,
            elapsed,
            timestamp,
            detail,
        }
    }

    fn parse_detail(event: HistoryEvent, rest: &[u8]) -> LogDetail {
        match event {
            HistoryEvent::CodeBleValid
            | HistoryEvent::CodeKeyValid
            | HistoryEvent::CodeBleInvalid
            | HistoryEvent::CodeKeyInvalid => {
                if rest.len() >= 6 {
                    LogDetail::Code {
                        code: decode_code(&rest[..6]),
                    }
                } else {
                    LogDetail::None
                }
            }
            HistoryEvent::PowerOff => {
                let raw = rest.first().copied().unwrap_or(0);
                LogDetail::PowerOff {
                    reason: PowerOffReason::try_from(raw).ok(),
                    raw,
                }
            }
            HistoryEvent::Error => {
                let raw = rest.first().copied().unwrap_or(0);
                LogDetail::Diagnostic {
                    code: DiagnosticCode::from_u8(raw),
                    raw,
                }
            }
            HistoryEvent::NfcOpening | HistoryEvent::NfcTagRegisteringScan => {
                // [Type(1)][UIDLen(1)][UID(N)]
                let tag_type = rest.first().copied().unwrap_or(0);
                let uid_len = rest.get(1).copied().unwrap_or(0) as usize;
                let uid = rest
                    .get(2..2 + uid_len)
                    .map(hex::encode_upper)
                    .unwrap_or_default();
                LogDetail::NfcTag { tag_type, uid }
            }
            HistoryEvent::BlockReset => {
                if rest.is_empty() {
                    LogDetail::None
                } else {
                    LogDetail::Reset {
                        info: hex::encode(rest),
                    }
                }
            }
            _ => LogDetail::None,
        }
    }

    /// Stable event-type string for this entry
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// Parsed fields as key/value pairs for event consumers
    pub fn extra_data(&self) -> BTreeMap<&'static str, String> {
        let mut data = BTreeMap::new();
        match &self.detail {
            LogDetail::None => {}
            LogDetail::Code { code } => {
                data.insert("code", code.clone());
            }
            LogDetail::PowerOff { reason, raw } => {
                data.insert("reason_code", raw.to_string());
                if let Some(reason) = reason {
                    data.insert("reason", format!("{reason:?}"));
                }
            }
            LogDetail::Diagnostic { code, raw } => {
                data.insert("error_code", raw.to_string());
                data.insert(
                    "error_description",
                    code.map(DiagnosticCode::key)
                        .unwrap_or("diagnostic_error_unknown")
                        .to_string(),
                );
            }
            LogDetail::NfcTag { tag_type, uid } => {
                data.insert("tag_type", tag_type.to_string());
                data.insert("tag_uid", uid.clone());
            }
            LogDetail::Reset { info } => {
                data.insert("reset_info", info.clone());
            }
        }
        data
    }
}

/// Decode a used code; falls back to hex when bytes are outside the
/// keypad charset
fn decode_code(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.chars().all(|c| CODE_CHARSET.contains(c)) {
        text.into_owned()
    } else {
        hex::encode_upper(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_log_entry_age() {
        // Age = 0x000258 = 600 seconds
        let entry = LogEntry::parse(HistoryEvent::DoorOpened, &[0x00, 0x02, 0x58]);

        assert_eq!(entry.elapsed, 600);
        let age = Utc::now() - entry.timestamp;
        assert!((age.num_seconds() - 600).abs() <= 1);
        assert_eq!(entry.detail, LogDetail::None);
    }

    #[test]
    fn test_log_entry_max_age() {
        // Maximum u24 age is still below the ten-year cutoff
        let entry = LogEntry::parse(HistoryEvent::DoorClosed, &[0xFF, 0xFF, 0xFF]);

        assert_eq!(entry.elapsed, 16_777_215);
        let age = Utc::now() - entry.timestamp;
        assert!(age.num_seconds() >= 16_777_214);
    }

    #[test]
    fn test_log_entry_short_payload() {
        let entry = LogEntry::parse(HistoryEvent::DoorOpened, &[0x01]);

        assert_eq!(entry.elapsed, 0);
        assert_eq!(entry.detail, LogDetail::None);
    }

    #[test]
    fn test_code_entry() {
        let mut payload = vec![0x00, 0x00, 0x05];
        payload.extend_from_slice(b"0123AB");
        let entry = LogEntry::parse(HistoryEvent::CodeKeyValid, &payload);

        assert_eq!(
            entry.detail,
            LogDetail::Code {
                code: "0123AB".into()
            }
        );
        assert_eq!(entry.extra_data().get("code"), Some(&"0123AB".to_string()));
    }

    #[test]
    fn test_code_entry_hex_fallback() {
        let mut payload = vec![0x00, 0x00, 0x00];
        payload.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
        let entry = LogEntry::parse(HistoryEvent::CodeBleInvalid, &payload);

        assert_eq!(
            entry.detail,
            LogDetail::Code {
                code: "DEADBEEF0001".into()
            }
        );
    }

    #[test]
    fn test_power_off_entry() {
        let entry = LogEntry::parse(HistoryEvent::PowerOff, &[0x00, 0x00, 0x10, 0x02]);

        assert_eq!(
            entry.detail,
            LogDetail::PowerOff {
                reason: Some(PowerOffReason::Watchdog),
                raw: 2
            }
        );
    }

    #[test]
    fn test_power_off_unknown_reason() {
        let entry = LogEntry::parse(HistoryEvent::PowerOff, &[0x00, 0x00, 0x00, 0x63]);

        assert_eq!(
            entry.detail,
            LogDetail::PowerOff {
                reason: None,
                raw: 0x63
            }
        );
    }

    #[test]
    fn test_diagnostic_entry() {
        let entry = LogEntry::parse(HistoryEvent::Error, &[0x00, 0x00, 0x00, 0xBC]);

        let data = entry.extra_data();
        assert_eq!(data.get("error_code"), Some(&"188".to_string()));
        assert_eq!(
            data.get("error_description"),
            Some(&"diagnostic_error_bc".to_string())
        );
    }

    #[test]
    fn test_nfc_opening_entry() {
        let payload = [0x00, 0x00, 0x01, 0x02, 0x04, 0x5A, 0x3E, 0xDA, 0xE0];
        let entry = LogEntry::parse(HistoryEvent::NfcOpening, &payload);

        assert_eq!(
            entry.detail,
            LogDetail::NfcTag {
                tag_type: 2,
                uid: "5A3EDAE0".into()
            }
        );
    }

    #[test]
    fn test_nfc_entry_truncated_uid() {
        // UID length claims 4 bytes but only 2 are present
        let payload = [0x00, 0x00, 0x01, 0x02, 0x04, 0x5A, 0x3E];
        let entry = LogEntry::parse(HistoryEvent::NfcOpening, &payload);

        assert_eq!(
            entry.detail,
            LogDetail::NfcTag {
                tag_type: 2,
                uid: String::new()
            }
        );
    }
}
