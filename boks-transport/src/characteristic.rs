//! GATT characteristics used by the Boks services

use std::fmt;

/// Characteristics the protocol reads, writes or subscribes to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Command downlink (write without response)
    Command,

    /// Notification uplink
    Notify,

    /// Standard battery level (one byte, percent)
    BatteryLevel,

    /// Custom battery statistics payload
    BatteryStats,

    // Device-information service
    SystemId,
    ModelNumber,
    SerialNumber,
    FirmwareRevision,
    HardwareRevision,
    SoftwareRevision,
    ManufacturerName,
}

impl Characteristic {
    /// GATT UUID of this characteristic
    pub fn uuid(self) -> &'static str {
        match self {
            Self::Command => "a7630002-f491-4f21-95ea-846ba586e361",
            Self::Notify => "a7630003-f491-4f21-95ea-846ba586e361",
            Self::BatteryStats => "00000004-0000-1000-8000-00805f9b34fb",
            Self::BatteryLevel => "00002a19-0000-1000-8000-00805f9b34fb",
            Self::SystemId => "00002a23-0000-1000-8000-00805f9b34fb",
            Self::ModelNumber => "00002a24-0000-1000-8000-00805f9b34fb",
            Self::SerialNumber => "00002a25-0000-1000-8000-00805f9b34fb",
            Self::FirmwareRevision => "00002a26-0000-1000-8000-00805f9b34fb",
            Self::HardwareRevision => "00002a27-0000-1000-8000-00805f9b34fb",
            Self::SoftwareRevision => "00002a28-0000-1000-8000-00805f9b34fb",
            Self::ManufacturerName => "00002a29-0000-1000-8000-00805f9b34fb",
        }
    }
}

/// UUID of the primary Boks service
pub const SERVICE_UUID: &str = "a7630001-f491-4f21-95ea-846ba586e361";

/// UUID of the standard battery service
pub const BATTERY_SERVICE_UUID: &str = "0000180f-0000-1000-8000-00805f9b34fb";

/// UUID of the standard device-information service
pub const DEVICE_INFO_SERVICE_UUID: &str = "0000180a-0000-1000-8000-00805f9b34fb";

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.uuid())
    }
}
