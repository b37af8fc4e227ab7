//! Transport errors

use std::io;

use crate::Characteristic;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Link dropped unexpectedly")]
    LinkDropped,

    #[error("Write to {characteristic:?} failed: {detail}")]
    WriteFailed {
        characteristic: Characteristic,
        detail: String,
    },

    #[error("Read from {characteristic:?} failed: {detail}")]
    ReadFailed {
        characteristic: Characteristic,
        detail: String,
    },

    #[error("Notification subscription failed: {0}")]
    SubscribeFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
