//! Downlink command packets
//!
//! Every command the host can send is a [`Request`] variant. A request
//! knows its opcode, how to serialize its payload into a frame, and how
//! to describe itself for logs without leaking PINs, config keys or tag
//! UIDs.

use boks_core::{CommandOpcode, ConfigType, Frame};

/// Placeholder shown instead of a PIN in logs
const MASKED_PIN: &str = "******";

/// Placeholder shown instead of a config key in logs
const MASKED_KEY: &str = "********";

/// Command to send to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Open the door with a keypad code
    OpenDoor { pin: String },
    /// Ask for the current door status
    AskDoorStatus,
    /// Start streaming the history log
    RequestLogs,
    /// Reboot the device
    Reboot,
    /// Ask how many history entries are stored
    GetLogsCount,
    /// Trigger a battery measurement cycle
    TestBattery,
    /// Replace the master code stored at `index`
    EditMasterCode {
        config_key: String,
        index: u8,
        pin: String,
    },
    /// Convert a single-use code into a multi-use code
    ConvertToMultiUse { config_key: String, code: String },
    /// Convert a multi-use code back into a single-use code
    ConvertToSingleUse { config_key: String, code: String },
    /// Delete the master code stored at `index`
    DeleteMasterCode { config_key: String, index: u8 },
    /// Delete a single-use code by value
    DeleteSingleUseCode { config_key: String, code: String },
    /// Delete a multi-use code by value
    DeleteMultiUseCode { config_key: String, code: String },
    /// Reactivate a previously used single-use code
    ReactivateCode { config_key: String, code: String },
    /// Create a master code at `index`
    CreateMasterCode {
        config_key: String,
        index: u8,
        pin: String,
    },
    /// Create a single-use code
    CreateSingleUseCode { config_key: String, pin: String },
    /// Create a multi-use code
    CreateMultiUseCode { config_key: String, pin: String },
    /// Ask for the stored code counts
    CountCodes,
    /// Toggle a device configuration flag
    SetConfiguration {
        config_key: String,
        config: ConfigType,
        enabled: bool,
    },
    /// Put the device into NFC tag scanning mode
    NfcScanStart { config_key: String },
    /// Register an NFC tag UID in the whitelist
    RegisterNfcTag { config_key: String, uid: Vec<u8> },
    /// Remove an NFC tag UID from the whitelist
    UnregisterNfcTag { config_key: String, uid: Vec<u8> },
}

impl Request {
    /// Opcode this request is sent under
    pub fn opcode(&self) -> CommandOpcode {
        match self {
            Self::OpenDoor { .. } => CommandOpcode::OpenDoor,
            Self::AskDoorStatus => CommandOpcode::AskDoorStatus,
            Self::RequestLogs => CommandOpcode::RequestLogs,
            Self::Reboot => CommandOpcode::Reboot,
            Self::GetLogsCount => CommandOpcode::GetLogsCount,
            Self::TestBattery => CommandOpcode::TestBattery,
            Self::EditMasterCode { .. } => CommandOpcode::MasterCodeEdit,
            Self::ConvertToMultiUse { .. } => CommandOpcode::SingleUseCodeToMulti,
            Self::ConvertToSingleUse { .. } => CommandOpcode::MultiCodeToSingleUse,
            Self::DeleteMasterCode { .. } => CommandOpcode::DeleteMasterCode,
            Self::DeleteSingleUseCode { .. } => CommandOpcode::DeleteSingleUseCode,
            Self::DeleteMultiUseCode { .. } => CommandOpcode::DeleteMultiUseCode,
            Self::ReactivateCode { .. } => CommandOpcode::ReactivateCode,
            Self::CreateMasterCode { .. } => CommandOpcode::CreateMasterCode,
            Self::CreateSingleUseCode { .. } => CommandOpcode::CreateSingleUseCode,
            Self::CreateMultiUseCode { .. } => CommandOpcode::CreateMultiUseCode,
            Self::CountCodes => CommandOpcode::CountCodes,
            Self::SetConfiguration { .. } => CommandOpcode::SetConfiguration,
            Self::NfcScanStart { .. } => CommandOpcode::NfcScanStart,
            Self::RegisterNfcTag { .. } => CommandOpcode::RegisterNfcTag,
            Self::UnregisterNfcTag { .. } => CommandOpcode::UnregisterNfcTag,
        }
    }

    /// Serialize the request into a wire frame
    pub fn to_frame(&self) -> Frame {
        Frame::new(u8::from(self.opcode()), self.payload())
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Self::OpenDoor { pin } => pin.as_bytes().to_vec(),

            Self::AskDoorStatus
            | Self::RequestLogs
            | Self::Reboot
            | Self::GetLogsCount
            | Self::TestBattery
            | Self::CountCodes => Vec::new(),

            // [ConfigKey(8)][Index(1)][PIN(6)]
            Self::EditMasterCode {
                config_key,
                index,
                pin,
            }
            | Self::CreateMasterCode {
                config_key,
                index,
                pin,
            } => {
                let mut payload = config_key.as_bytes().to_vec();
                payload.push(*index);
                payload.extend_from_slice(pin.as_bytes());
                payload
            }

            // [ConfigKey(8)][Code(N)]
            Self::ConvertToMultiUse { config_key, code }
            | Self::ConvertToSingleUse { config_key, code }
            | Self::DeleteSingleUseCode { config_key, code }
            | Self::DeleteMultiUseCode { config_key, code }
            | Self::ReactivateCode { config_key, code }
            | Self::CreateSingleUseCode {
                config_key,
                pin: code,
            }
            | Self::CreateMultiUseCode {
                config_key,
                pin: code,
            } => {
                let mut payload = config_key.as_bytes().to_vec();
                payload.extend_from_slice(code.as_bytes());
                payload
            }

            // [ConfigKey(8)][Index(1)]
            Self::DeleteMasterCode { config_key, index } => {
                let mut payload = config_key.as_bytes().to_vec();
                payload.push(*index);
                payload
            }

            // [ConfigKey(8)][Type(1)][Value(1)]
            Self::SetConfiguration {
                config_key,
                config,
                enabled,
            } => {
                let mut payload = config_key.as_bytes().to_vec();
                payload.push(*config as u8);
                payload.push(u8::from(*enabled));
                payload
            }

            Self::NfcScanStart { config_key } => config_key.as_bytes().to_vec(),

            // [ConfigKey(8)][UIDLen(1)][UID(N)]
            Self::RegisterNfcTag { config_key, uid }
            | Self::UnregisterNfcTag { config_key, uid } => {
                let mut payload = config_key.as_bytes().to_vec();
                payload.push(uid.len() as u8);
                payload.extend_from_slice(uid);
                payload
            }
        }
    }

    /// Human-readable payload description with secrets masked
    pub fn describe(&self) -> String {
        match self {
            Self::OpenDoor { .. } => format!("PIN={MASKED_PIN}"),

            Self::AskDoorStatus
            | Self::RequestLogs
            | Self::Reboot
            | Self::GetLogsCount
            | Self::TestBattery
            | Self::CountCodes => String::new(),

            Self::EditMasterCode { index, .. } => {
                format!("Key={MASKED_KEY}, Index={index}, PIN={MASKED_PIN}")
            }
            Self::ConvertToMultiUse { .. } => {
                format!("Type=S->M, Key={MASKED_KEY}, Code={MASKED_PIN}")
            }
            Self::ConvertToSingleUse { .. } => {
                format!("Type=M->S, Key={MASKED_KEY}, Code={MASKED_PIN}")
            }
            Self::DeleteMasterCode { index, .. } => {
                format!("Key={MASKED_KEY}, Index={index}")
            }
            Self::DeleteSingleUseCode { .. } | Self::DeleteMultiUseCode { .. } => {
                format!("Key={MASKED_KEY}, Code={MASKED_PIN}")
            }
            Self::ReactivateCode { .. } => {
                format!("Key={MASKED_KEY}, Code={MASKED_PIN}")
            }
            Self::CreateMasterCode { index, .. } => {
                format!("Key={MASKED_KEY}, Index={index}, PIN={MASKED_PIN}")
            }
            Self::CreateSingleUseCode { .. } | Self::CreateMultiUseCode { .. } => {
                format!("Key={MASKED_KEY}, PIN={MASKED_PIN}")
            }
            Self::SetConfiguration {
                config, enabled, ..
            } => {
                format!("Key={MASKED_KEY}, Type={config:?}, Value={enabled}")
            }
            Self::NfcScanStart { .. } => format!("Key={MASKED_KEY}"),
            Self::RegisterNfcTag { uid, .. } | Self::UnregisterNfcTag { uid, .. } => {
                format!("Key={MASKED_KEY}, UID={}", mask_uid(uid))
            }
        }
    }
}

/// Mask an NFC UID for display (`5A3EDAE0` -> `5A...E0`)
pub fn mask_uid(uid: &[u8]) -> String {
    let hex = hex::encode_upper(uid);
    if hex.len() <= 4 {
        return "***".into();
    }
    format!("{}...{}", &hex[..2], &hex[hex.len() - 2..])
}
