//! Device information structures

use std::fmt;

/// Device information read from the GATT device-information service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// System identifier (hex-encoded)
    pub system_id: Option<String>,

    /// Device model number
    pub model_number: Option<String>,

    /// Serial number
    pub serial_number: Option<String>,

    /// Internal firmware revision (e.g. 10/125)
    pub firmware_revision: Option<String>,

    /// Hardware revision
    pub hardware_revision: Option<String>,

    /// Software revision (e.g. 4.2.0)
    pub software_revision: Option<String>,

    /// Manufacturer name
    pub manufacturer_name: Option<String>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Boks[SN: {}, SW: {}]",
            self.serial_number.as_deref().unwrap_or("?"),
            self.software_revision.as_deref().unwrap_or("?"),
        )
    }
}
