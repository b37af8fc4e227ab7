//! Type definitions for boks

pub mod battery;
pub mod device_info;
pub mod status;

pub use battery::BatteryStats;
pub use device_info::DeviceInfo;
pub use status::{CodeCounts, NfcScanResult, NfcScanStatus, StatusUpdate};
