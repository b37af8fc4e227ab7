//! # boks
//!
//! Unofficial Rust library for Boks BLE parcel lockers.
//!
//! ## Features
//!
//! - Type-safe frame codec with checksum verification
//! - Async/await session layer using Tokio
//! - Reference-counted connection sharing with deferred disconnect
//! - Offline PIN derivation from the locker's master key
//! - History log retrieval, NFC tag management, battery telemetry
//!
//! ## Quick Start
//!
//! ```no_run
//! use boks::BoksDevice;
//! # fn transport() -> Box<dyn boks_transport::Transport> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> boks::Result<()> {
//!     let device = BoksDevice::new(transport()).with_config_key("12345678")?;
//!
//!     device.connect().await?;
//!
//!     let code = device.create_pin_code(None, boks::CodeKind::SingleUse, 0).await?;
//!     println!("new single-use code: {code}");
//!
//!     device.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod router;

// Re-exports
pub use device::{BoksDevice, CodeId};
pub use error::{Error, Result};
pub use router::{Observer, ObserverId, StatusCallback};

// Re-export types
pub use boks_core::{CodeKind, ConfigType, Frame, HistoryEvent, MasterKey, derive_pin};
pub use boks_protocol::{LogEntry, Request, Response};
pub use boks_types::{
    BatteryStats, CodeCounts, DeviceInfo, NfcScanResult, NfcScanStatus, StatusUpdate,
};
