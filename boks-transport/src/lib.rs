//! Transport layer for the Boks protocol
//!
//! The session layer talks to the locker through two GATT characteristics:
//! commands are written to one, notifications arrive on the other. This
//! crate defines that boundary; the actual radio adapter (pairing, GATT
//! enumeration) is supplied by the embedding application.

pub mod characteristic;
pub mod error;
pub mod testing;

pub use characteristic::Characteristic;
pub use error::{Error, Result};

use std::sync::Arc;

use async_trait::async_trait;

/// Callback receiving raw notification frames from the device
pub type NotificationSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Transport trait over one physical link to one device
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the physical link
    async fn connect(&mut self) -> Result<()>;

    /// Tear down the physical link
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if the link is up
    fn is_connected(&self) -> bool;

    /// Write raw bytes to a characteristic
    async fn write(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<()>;

    /// Read the current value of a characteristic
    async fn read(&mut self, characteristic: Characteristic) -> Result<Vec<u8>>;

    /// Subscribe to the notify characteristic; `sink` is invoked for every
    /// value the device pushes
    async fn subscribe(&mut self, sink: NotificationSink) -> Result<()>;

    /// Address of the device this transport talks to
    fn peer(&self) -> String;
}
