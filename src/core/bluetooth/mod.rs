//! Bluetooth functionality for the heart-rate band client
//! This module handles scanning for the band, keeping one connection to it
//! alive and turning its notifications into readings.

mod bluest_radio;
mod connection;
mod constants;
mod error;
mod manager;
mod notification;
mod radio;
mod resolver;
mod retry;
mod scanner;
mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export types that should be publicly accessible
pub use bluest_radio::{BluestLink, BluestRadio};
pub use connection::ConnectionManager;
pub use constants::*; // Re-export all constants
pub use error::{ConnectError, RadioError, SessionError};
pub use manager::BluetoothManager;
pub use notification::NotificationForwarder;
pub use radio::{event_channel, EventReceiver, EventSender, Radio};
pub use resolver::{LinkLost, Resolution, ServiceResolver};
pub use retry::{CoarseTimer, RetryScheduler};
pub use scanner::{ScanCoordinator, ScanOutcome};
pub use types::{
    CharacteristicHandle, CharacteristicProperties, CharacteristicRole, ConnectionState,
    LinkId, RadioEvent, ScanParams, ScanResult, Session,
};
