//! Uplink notification packets
//!
//! Raw frames arriving on the notify characteristic are classified into
//! a [`Response`] by a process-wide decoder table built once on first
//! use. Decoding is total: undersized payloads degrade to default field
//! values and unknown opcodes fall through to [`Response::Generic`], so
//! a hostile or buggy device can never panic the notification path.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use byteorder::{BigEndian, ByteOrder};
use tracing::trace;

use boks_core::{Frame, HistoryEvent, NotificationOpcode};
use boks_types::{CodeCounts, NfcScanResult, NfcScanStatus};

use crate::history::LogEntry;

/// Device-side error families reported over the notify characteristic
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// Frame arrived at the device with a bad checksum
    Crc,
    /// Command requires a config key the device did not accept
    Unauthorized,
    /// Malformed command payload
    BadRequest,
    /// Firmware does not implement the command
    NotSupported,
}

impl DeviceErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crc => "crc_error",
            Self::Unauthorized => "unauthorized",
            Self::BadRequest => "bad_request",
            Self::NotSupported => "not_supported",
        }
    }
}

/// Decoded uplink notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Code-management operation result (0x77 / 0x78)
    OperationResult { success: bool },

    /// Result of an opening-code validation (0x81 / 0x82)
    OpenCodeResult { valid: bool },

    /// Door state; `solicited` distinguishes the answer to
    /// ASK_DOOR_STATUS from a spontaneous push (0x84 / 0x85)
    DoorStatus { open: bool, solicited: bool },

    /// Stored code counts (0xC3)
    CodesCount(CodeCounts),

    /// Number of stored history entries (0x79)
    LogsCount { count: u16 },

    /// Code-generation batch outcome (0xC0 / 0xC1)
    CodeGeneration { success: bool },

    /// Configuration write acknowledged (0xC4)
    ConfigurationSet,

    /// NFC scan progress (0xC5 / 0xC6 / 0xC7)
    NfcScan(NfcScanResult),

    /// NFC tag registration acknowledged (0xC8)
    NfcTagRegistered,

    /// Device-reported protocol error (0x80, 0xE0..0xE2)
    DeviceError(DeviceErrorKind),

    /// History log entry, streamed or pushed live (0x86..0xA2)
    History(LogEntry),

    /// Opcode outside every known family
    Generic { opcode: u8 },
}

type Decoder = fn(u8, &[u8]) -> Response;

fn decoder_table() -> &'static HashMap<u8, Decoder> {
    static TABLE: OnceLock<HashMap<u8, Decoder>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table: HashMap<u8, Decoder> = HashMap::new();

        let notifications: &[(NotificationOpcode, Decoder)] = &[
            (NotificationOpcode::CodeOperationSuccess, decode_operation),
            (NotificationOpcode::CodeOperationError, decode_operation),
            (NotificationOpcode::NotifyLogsCount, decode_logs_count),
            (NotificationOpcode::ErrorCommandNotSupported, decode_error),
            (NotificationOpcode::ValidOpenCode, decode_open_code),
            (NotificationOpcode::InvalidOpenCode, decode_open_code),
            (NotificationOpcode::NotifyDoorStatus, decode_door_status),
            (NotificationOpcode::AnswerDoorStatus, decode_door_status),
            (
                NotificationOpcode::NotifyCodeGenerationSuccess,
                decode_code_generation,
            ),
            (
                NotificationOpcode::NotifyCodeGenerationError,
                decode_code_generation,
            ),
            (NotificationOpcode::NotifyCodesCount, decode_codes_count),
            (
                NotificationOpcode::NotifySetConfigurationSuccess,
                decode_configuration_set,
            ),
            (NotificationOpcode::NotifyNfcTagFound, decode_nfc_scan),
            (
                NotificationOpcode::ErrorNfcTagAlreadyExists,
                decode_nfc_scan,
            ),
            (NotificationOpcode::ErrorNfcScanTimeout, decode_nfc_scan),
            (
                NotificationOpcode::NotifyNfcTagRegistered,
                decode_tag_registered,
            ),
            (NotificationOpcode::ErrorCrc, decode_error),
            (NotificationOpcode::ErrorUnauthorized, decode_error),
            (NotificationOpcode::ErrorBadRequest, decode_error),
        ];
        for (opcode, decoder) in notifications {
            table.insert(*opcode as u8, *decoder);
        }

        for opcode in 0u8..=255 {
            if HistoryEvent::try_from(opcode).is_ok() {
                table.insert(opcode, decode_history);
            }
        }

        table
    })
}

impl Response {
    /// Classify a verified frame
    pub fn decode(frame: &Frame) -> Self {
        match decoder_table().get(&frame.opcode) {
            Some(decoder) => decoder(frame.opcode, &frame.payload),
            None => {
                trace!(opcode = format!("0x{:02X}", frame.opcode), "unknown opcode");
                Self::Generic {
                    opcode: frame.opcode,
                }
            }
        }
    }

    /// Stable event-type string for event consumers
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::OperationResult { .. } => "operation_result",
            Self::OpenCodeResult { .. } => "open_code_result",
            Self::DoorStatus { .. } => "door_status",
            Self::CodesCount(_) => "codes_count",
            Self::LogsCount { .. } => "logs_count",
            Self::CodeGeneration { .. } => "code_generation",
            Self::ConfigurationSet => "configuration_set",
            Self::NfcScan(_) => "nfc_scan",
            Self::NfcTagRegistered => "nfc_tag_registered",
            Self::DeviceError(_) => "device_error",
            Self::History(entry) => entry.event_type(),
            Self::Generic { .. } => "unknown",
        }
    }

    /// Parsed fields as key/value pairs, deterministic for a given payload
    pub fn extra_data(&self) -> BTreeMap<&'static str, String> {
        let mut data = BTreeMap::new();
        match self {
            Self::OperationResult { success } | Self::CodeGeneration { success } => {
                data.insert("success", success.to_string());
            }
            Self::OpenCodeResult { valid } => {
                data.insert("valid", valid.to_string());
            }
            Self::DoorStatus { open, .. } => {
                data.insert("is_open", open.to_string());
            }
            Self::CodesCount(counts) => {
                data.insert("master", counts.master.to_string());
                data.insert("single_use", counts.single_use.to_string());
            }
            Self::LogsCount { count } => {
                data.insert("count", count.to_string());
            }
            Self::NfcScan(result) => {
                let status = match result.status {
                    NfcScanStatus::Found => "found",
                    NfcScanStatus::AlreadyExists => "already_exists",
                    NfcScanStatus::Timeout => "timeout",
                };
                data.insert("status", status.to_string());
                if let Some(uid) = &result.uid {
                    data.insert("tag_uid", uid.clone());
                }
            }
            Self::DeviceError(kind) => {
                data.insert("error_type", kind.as_str().to_string());
            }
            Self::History(entry) => return entry.extra_data(),
            Self::ConfigurationSet | Self::NfcTagRegistered | Self::Generic { .. } => {}
        }
        data
    }

    /// True for notifications reporting a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::OperationResult { success: false }
                | Self::OpenCodeResult { valid: false }
                | Self::CodeGeneration { success: false }
                | Self::DeviceError(_)
        )
    }
}

fn decode_operation(opcode: u8, _payload: &[u8]) -> Response {
    Response::OperationResult {
        success: opcode == NotificationOpcode::CodeOperationSuccess as u8,
    }
}

fn decode_open_code(opcode: u8, _payload: &[u8]) -> Response {
    Response::OpenCodeResult {
        valid: opcode == NotificationOpcode::ValidOpenCode as u8,
    }
}

fn decode_door_status(opcode: u8, payload: &[u8]) -> Response {
    // Payload: [InvertedStatus][LiveStatus]
    Response::DoorStatus {
        open: payload.get(1).copied() == Some(1),
        solicited: opcode == NotificationOpcode::AnswerDoorStatus as u8,
    }
}

fn decode_logs_count(_opcode: u8, payload: &[u8]) -> Response {
    let count = if payload.len() >= 2 {
        BigEndian::read_u16(payload)
    } else {
        0
    };
    Response::LogsCount { count }
}

fn decode_codes_count(_opcode: u8, payload: &[u8]) -> Response {
    // Payload: [Master u16 BE][SingleUse u16 BE]
    let counts = if payload.len() >= 4 {
        CodeCounts {
            master: BigEndian::read_u16(&payload[0..2]),
            single_use: BigEndian::read_u16(&payload[2..4]),
        }
    } else {
        CodeCounts::default()
    };
    Response::CodesCount(counts)
}

fn decode_code_generation(opcode: u8, _payload: &[u8]) -> Response {
    Response::CodeGeneration {
        success: opcode == NotificationOpcode::NotifyCodeGenerationSuccess as u8,
    }
}

fn decode_configuration_set(_opcode: u8, _payload: &[u8]) -> Response {
    Response::ConfigurationSet
}

fn decode_nfc_scan(opcode: u8, payload: &[u8]) -> Response {
    let status = if opcode == NotificationOpcode::NotifyNfcTagFound as u8 {
        NfcScanStatus::Found
    } else if opcode == NotificationOpcode::ErrorNfcTagAlreadyExists as u8 {
        NfcScanStatus::AlreadyExists
    } else {
        NfcScanStatus::Timeout
    };

    // Payload for found/exists: [UIDLen(1)][UID(N)]; timeout is empty
    let uid = if status == NfcScanStatus::Timeout {
        None
    } else {
        let uid_len = payload.first().copied().unwrap_or(0) as usize;
        payload
            .get(1..1 + uid_len)
            .filter(|uid| !uid.is_empty())
            .map(hex::encode_upper)
    };

    Response::NfcScan(NfcScanResult { status, uid })
}

fn decode_tag_registered(_opcode: u8, _payload: &[u8]) -> Response {
    Response::NfcTagRegistered
}

fn decode_error(opcode: u8, _payload: &[u8]) -> Response {
    let kind = if opcode == NotificationOpcode::ErrorCrc as u8 {
        DeviceErrorKind::Crc
    } else if opcode == NotificationOpcode::ErrorUnauthorized as u8 {
        DeviceErrorKind::Unauthorized
    } else if opcode == NotificationOpcode::ErrorBadRequest as u8 {
        DeviceErrorKind::BadRequest
    } else {
        DeviceErrorKind::NotSupported
    };
    Response::DeviceError(kind)
}

fn decode_history(opcode: u8, payload: &[u8]) -> Response {
    match HistoryEvent::try_from(opcode) {
        Ok(event) => Response::History(LogEntry::parse(event, payload)),
        Err(opcode) => Response::Generic { opcode },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode(opcode: u8, payload: &[u8]) -> Response {
        Response::decode(&Frame::new(opcode, payload.to_vec()))
    }

    #[test]
    fn test_decode_operation_result() {
        assert_eq!(
            decode(0x77, &[]),
            Response::OperationResult { success: true }
        );
        assert_eq!(
            decode(0x78, &[]),
            Response::OperationResult { success: false }
        );
    }

    #[test]
    fn test_decode_door_status() {
        let response = decode(0x85, &[0x01, 0x00]);
        assert_eq!(
            response,
            Response::DoorStatus {
                open: false,
                solicited: true
            }
        );

        let response = decode(0x84, &[0x00, 0x01]);
        assert_eq!(
            response,
            Response::DoorStatus {
                open: true,
                solicited: false
            }
        );
    }

    #[test]
    fn test_decode_door_status_short_payload() {
        // One byte missing: treated as closed rather than an error
        assert_eq!(
            decode(0x84, &[0x01]),
            Response::DoorStatus {
                open: false,
                solicited: false
            }
        );
    }

    #[test]
    fn test_decode_logs_count() {
        assert_eq!(decode(0x79, &[0x01, 0x2C]), Response::LogsCount { count: 300 });
        assert_eq!(decode(0x79, &[]), Response::LogsCount { count: 0 });
    }

    #[test]
    fn test_decode_codes_count() {
        let response = decode(0xC3, &[0x00, 0x02, 0x00, 0x0A]);
        assert_eq!(
            response,
            Response::CodesCount(CodeCounts {
                master: 2,
                single_use: 10
            })
        );
    }

    #[test]
    fn test_decode_nfc_scan_found() {
        let response = decode(0xC5, &[0x04, 0x5A, 0x3E, 0xDA, 0xE0]);
        assert_eq!(
            response,
            Response::NfcScan(NfcScanResult {
                status: NfcScanStatus::Found,
                uid: Some("5A3EDAE0".into())
            })
        );
    }

    #[test]
    fn test_decode_nfc_scan_timeout() {
        let response = decode(0xC7, &[]);
        assert_eq!(
            response,
            Response::NfcScan(NfcScanResult {
                status: NfcScanStatus::Timeout,
                uid: None
            })
        );
    }

    #[test]
    fn test_decode_device_errors() {
        assert_eq!(
            decode(0xE0, &[]),
            Response::DeviceError(DeviceErrorKind::Crc)
        );
        assert_eq!(
            decode(0xE1, &[]),
            Response::DeviceError(DeviceErrorKind::Unauthorized)
        );
        assert_eq!(
            decode(0xE2, &[]),
            Response::DeviceError(DeviceErrorKind::BadRequest)
        );
        assert_eq!(
            decode(0x80, &[]),
            Response::DeviceError(DeviceErrorKind::NotSupported)
        );
    }

    #[test]
    fn test_decode_history_entry() {
        let response = decode(0x91, &[0x00, 0x00, 0x3C]);
        match response {
            Response::History(entry) => {
                assert_eq!(entry.event, HistoryEvent::DoorOpened);
                assert_eq!(entry.elapsed, 60);
            }
            other => panic!("expected history entry, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_opcode() {
        assert_eq!(decode(0x42, &[0x01]), Response::Generic { opcode: 0x42 });
    }

    #[test]
    fn test_event_types() {
        assert_eq!(decode(0x77, &[]).event_type(), "operation_result");
        assert_eq!(decode(0x84, &[0, 1]).event_type(), "door_status");
        assert_eq!(decode(0x91, &[0, 0, 0]).event_type(), "door_opened");
        assert_eq!(decode(0x42, &[]).event_type(), "unknown");
    }

    #[test]
    fn test_error_classification() {
        assert!(decode(0x78, &[]).is_error());
        assert!(decode(0x82, &[]).is_error());
        assert!(decode(0xE1, &[]).is_error());
        assert!(!decode(0x77, &[]).is_error());
        assert!(!decode(0x79, &[0, 5]).is_error());
    }
}
