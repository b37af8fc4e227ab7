//! Boks protocol opcode definitions
//!
//! The protocol splits its single opcode byte into three families:
//! downlink commands, uplink notifications, and history log events.
//! History events appear both in polled log batches and as live pushes.

use std::fmt;

/// Downlink command opcodes (host to device)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandOpcode {
    OpenDoor = 0x01,
    AskDoorStatus = 0x02,
    RequestLogs = 0x03,
    Reboot = 0x06,
    GetLogsCount = 0x07,
    TestBattery = 0x08,
    MasterCodeEdit = 0x09,
    SingleUseCodeToMulti = 0x0A,
    MultiCodeToSingleUse = 0x0B,
    DeleteMasterCode = 0x0C,
    DeleteSingleUseCode = 0x0D,
    DeleteMultiUseCode = 0x0E,
    ReactivateCode = 0x0F,
    GenerateCodes = 0x10,
    CreateMasterCode = 0x11,
    CreateSingleUseCode = 0x12,
    CreateMultiUseCode = 0x13,
    CountCodes = 0x14,
    GenerateCodesSupport = 0x15,
    SetConfiguration = 0x16,
    NfcScanStart = 0x17,
    RegisterNfcTag = 0x18,
    UnregisterNfcTag = 0x19,
}

/// Uplink notification opcodes (device to host)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NotificationOpcode {
    CodeOperationSuccess = 0x77,
    CodeOperationError = 0x78,
    NotifyLogsCount = 0x79,
    ErrorCommandNotSupported = 0x80,
    ValidOpenCode = 0x81,
    InvalidOpenCode = 0x82,
    NotifyDoorStatus = 0x84,
    AnswerDoorStatus = 0x85,
    NotifyCodeGenerationSuccess = 0xC0,
    NotifyCodeGenerationError = 0xC1,
    NotifyCodesCount = 0xC3,
    NotifySetConfigurationSuccess = 0xC4,
    NotifyNfcTagFound = 0xC5,
    ErrorNfcTagAlreadyExists = 0xC6,
    ErrorNfcScanTimeout = 0xC7,
    NotifyNfcTagRegistered = 0xC8,
    ErrorCrc = 0xE0,
    ErrorUnauthorized = 0xE1,
    ErrorBadRequest = 0xE2,
}

/// History log event opcodes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HistoryEvent {
    CodeBleValid = 0x86,
    CodeKeyValid = 0x87,
    CodeBleInvalid = 0x88,
    CodeKeyInvalid = 0x89,
    DoorClosed = 0x90,
    DoorOpened = 0x91,
    EndHistory = 0x92,
    HistoryErase = 0x93,
    PowerOff = 0x94,
    BlockReset = 0x95,
    PowerOn = 0x96,
    BleReboot = 0x97,
    ScaleContinuousMeasure = 0x98,
    NfcError = 0x99,
    Error = 0xA0,
    NfcOpening = 0xA1,
    NfcTagRegisteringScan = 0xA2,
}

/// Reason codes carried by a POWER_OFF history event
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerOffReason {
    PinReset = 1,
    Watchdog = 2,
    SoftReset = 3,
    Lockup = 4,
    PowerOn = 5,
    WakeupNfc = 6,
    WakeupSystemOff = 7,
    WakeupLpcomp = 8,
}

/// Configuration types accepted by SET_CONFIGURATION
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigType {
    ScanLaposteNfcTags = 0x01,
}

/// Kind of keypad code
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CodeKind {
    Master,
    SingleUse,
    MultiUse,
}

impl CodeKind {
    /// Label used by the PIN derivation message block
    pub fn label(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::SingleUse => "single-use",
            Self::MultiUse => "multi-use",
        }
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl CommandOpcode {
    /// Whether the payload for this command carries secrets that must be
    /// redacted from logs
    pub fn is_sensitive(self) -> bool {
        matches!(
            self,
            Self::OpenDoor
                | Self::MasterCodeEdit
                | Self::SingleUseCodeToMulti
                | Self::MultiCodeToSingleUse
                | Self::DeleteMasterCode
                | Self::DeleteSingleUseCode
                | Self::DeleteMultiUseCode
                | Self::ReactivateCode
                | Self::GenerateCodes
                | Self::CreateMasterCode
                | Self::CreateSingleUseCode
                | Self::CreateMultiUseCode
                | Self::SetConfiguration
                | Self::NfcScanStart
                | Self::RegisterNfcTag
                | Self::UnregisterNfcTag
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::OpenDoor => "OPEN_DOOR",
            Self::AskDoorStatus => "ASK_DOOR_STATUS",
            Self::RequestLogs => "REQUEST_LOGS",
            Self::Reboot => "REBOOT",
            Self::GetLogsCount => "GET_LOGS_COUNT",
            Self::TestBattery => "TEST_BATTERY",
            Self::MasterCodeEdit => "MASTER_CODE_EDIT",
            Self::SingleUseCodeToMulti => "SINGLE_USE_CODE_TO_MULTI",
            Self::MultiCodeToSingleUse => "MULTI_CODE_TO_SINGLE_USE",
            Self::DeleteMasterCode => "DELETE_MASTER_CODE",
            Self::DeleteSingleUseCode => "DELETE_SINGLE_USE_CODE",
            Self::DeleteMultiUseCode => "DELETE_MULTI_USE_CODE",
            Self::ReactivateCode => "REACTIVATE_CODE",
            Self::GenerateCodes => "GENERATE_CODES",
            Self::CreateMasterCode => "CREATE_MASTER_CODE",
            Self::CreateSingleUseCode => "CREATE_SINGLE_USE_CODE",
            Self::CreateMultiUseCode => "CREATE_MULTI_USE_CODE",
            Self::CountCodes => "COUNT_CODES",
            Self::GenerateCodesSupport => "GENERATE_CODES_SUPPORT",
            Self::SetConfiguration => "SET_CONFIGURATION",
            Self::NfcScanStart => "REGISTER_NFC_TAG_SCAN_START",
            Self::RegisterNfcTag => "REGISTER_NFC_TAG",
            Self::UnregisterNfcTag => "UNREGISTER_NFC_TAG",
        }
    }
}

impl NotificationOpcode {
    /// Whether this notification reports a device-side error condition
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::CodeOperationError
                | Self::ErrorCommandNotSupported
                | Self::InvalidOpenCode
                | Self::NotifyCodeGenerationError
                | Self::ErrorNfcTagAlreadyExists
                | Self::ErrorNfcScanTimeout
                | Self::ErrorCrc
                | Self::ErrorUnauthorized
                | Self::ErrorBadRequest
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CodeOperationSuccess => "CODE_OPERATION_SUCCESS",
            Self::CodeOperationError => "CODE_OPERATION_ERROR",
            Self::NotifyLogsCount => "NOTIFY_LOGS_COUNT",
            Self::ErrorCommandNotSupported => "ERROR_COMMAND_NOT_SUPPORTED",
            Self::ValidOpenCode => "VALID_OPEN_CODE",
            Self::InvalidOpenCode => "INVALID_OPEN_CODE",
            Self::NotifyDoorStatus => "NOTIFY_DOOR_STATUS",
            Self::AnswerDoorStatus => "ANSWER_DOOR_STATUS",
            Self::NotifyCodeGenerationSuccess => "NOTIFY_CODE_GENERATION_SUCCESS",
            Self::NotifyCodeGenerationError => "NOTIFY_CODE_GENERATION_ERROR",
            Self::NotifyCodesCount => "NOTIFY_CODES_COUNT",
            Self::NotifySetConfigurationSuccess => "NOTIFY_SET_CONFIGURATION_SUCCESS",
            Self::NotifyNfcTagFound => "NOTIFY_NFC_TAG_FOUND",
            Self::ErrorNfcTagAlreadyExists => "ERROR_NFC_TAG_ALREADY_EXISTS_SCAN",
            Self::ErrorNfcScanTimeout => "ERROR_NFC_SCAN_TIMEOUT",
            Self::NotifyNfcTagRegistered => "NOTIFY_NFC_TAG_REGISTERED",
            Self::ErrorCrc => "ERROR_CRC",
            Self::ErrorUnauthorized => "ERROR_UNAUTHORIZED",
            Self::ErrorBadRequest => "ERROR_BAD_REQUEST",
        }
    }
}

impl HistoryEvent {
    /// Event-type tag used in log entries and push events
    pub fn event_type(self) -> &'static str {
        match self {
            Self::CodeBleValid => "code_ble_valid",
            Self::CodeKeyValid => "code_key_valid",
            Self::CodeBleInvalid => "code_ble_invalid",
            Self::CodeKeyInvalid => "code_key_invalid",
            Self::DoorClosed => "door_closed",
            Self::DoorOpened => "door_opened",
            Self::EndHistory => "end_history",
            Self::HistoryErase => "history_erase",
            Self::PowerOff => "power_off",
            Self::BlockReset => "block_reset",
            Self::PowerOn => "power_on",
            Self::BleReboot => "ble_reboot",
            Self::ScaleContinuousMeasure => "scale_measure",
            Self::NfcError => "nfc_error_transaction",
            Self::Error => "error",
            Self::NfcOpening => "nfc_opening",
            Self::NfcTagRegisteringScan => "nfc_tag_registering",
        }
    }

    /// Events that mean the door just transitioned to open
    pub fn opens_door(self) -> bool {
        matches!(
            self,
            Self::DoorOpened | Self::CodeKeyValid | Self::CodeBleValid | Self::NfcOpening
        )
    }
}

macro_rules! impl_u8_conversions {
    ($ty:ty, [$($variant:ident),+ $(,)?]) => {
        impl From<$ty> for u8 {
            fn from(op: $ty) -> u8 {
                op as u8
            }
        }

        impl TryFrom<u8> for $ty {
            type Error = u8;

            fn try_from(value: u8) -> std::result::Result<Self, u8> {
                $(
                    if value == Self::$variant as u8 {
                        return Ok(Self::$variant);
                    }
                )+
                Err(value)
            }
        }
    };
}

impl_u8_conversions!(CommandOpcode, [
    OpenDoor, AskDoorStatus, RequestLogs, Reboot, GetLogsCount, TestBattery,
    MasterCodeEdit, SingleUseCodeToMulti, MultiCodeToSingleUse,
    DeleteMasterCode, DeleteSingleUseCode, DeleteMultiUseCode, ReactivateCode,
    GenerateCodes, CreateMasterCode, CreateSingleUseCode, CreateMultiUseCode,
    CountCodes, GenerateCodesSupport, SetConfiguration, NfcScanStart,
    RegisterNfcTag, UnregisterNfcTag,
]);

impl_u8_conversions!(NotificationOpcode, [
    CodeOperationSuccess, CodeOperationError, NotifyLogsCount,
    ErrorCommandNotSupported, ValidOpenCode, InvalidOpenCode,
    NotifyDoorStatus, AnswerDoorStatus, NotifyCodeGenerationSuccess,
    NotifyCodeGenerationError, NotifyCodesCount, NotifySetConfigurationSuccess,
    NotifyNfcTagFound, ErrorNfcTagAlreadyExists, ErrorNfcScanTimeout,
    NotifyNfcTagRegistered, ErrorCrc, ErrorUnauthorized, ErrorBadRequest,
]);

impl_u8_conversions!(HistoryEvent, [
    CodeBleValid, CodeKeyValid, CodeBleInvalid, CodeKeyInvalid, DoorClosed,
    DoorOpened, EndHistory, HistoryErase, PowerOff, BlockReset, PowerOn,
    BleReboot, ScaleContinuousMeasure, NfcError, Error, NfcOpening,
    NfcTagRegisteringScan,
]);

impl_u8_conversions!(PowerOffReason, [
    PinReset, Watchdog, SoftReset, Lockup, PowerOn, WakeupNfc,
    WakeupSystemOff, WakeupLpcomp,
]);

impl fmt::Display for CommandOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

impl fmt::Display for NotificationOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

impl fmt::Display for HistoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.event_type(), *self as u8)
    }
}
