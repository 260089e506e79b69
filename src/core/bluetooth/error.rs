//! Error types for the Bluetooth module

use thiserror::Error;

/// Failures reported by a radio backend
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Failed to start scan: {0}")]
    ScanFailed(String),

    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    #[error("Link is not connected")]
    NotConnected,

    #[error("GATT operation failed: {0}")]
    Gatt(String),

    #[error("Radio stack error: {0}")]
    Stack(String),
}

/// Rejections of characteristic use outside a live session
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("No session is ready")]
    NotReady,

    #[error("Handle belongs to session {handle}, live session is {live:?}")]
    StaleHandle { handle: u64, live: Option<u64> },

    #[error("Characteristic read failed: {0}")]
    ReadFailed(String),
}

/// Rejections of a connect request
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Connection already in progress")]
    ConnectionInProgress,

    #[error("A session is already established")]
    AlreadyConnected,
}
