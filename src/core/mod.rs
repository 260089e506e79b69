//! Core functionality for the heart-rate band client
//! This module contains the BLE connection lifecycle and the payload decoding

pub mod bluetooth;
pub mod heart_rate;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, ConnectionState};
pub use heart_rate::decode_heart_rate;
