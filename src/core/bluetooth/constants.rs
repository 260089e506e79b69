//! Constants used throughout the application
//! This module contains the GATT identifiers of the heart-rate band and the
//! default timing values of the connection lifecycle.

use uuid::Uuid;

/// The advertised name of the heart-rate band
pub const DEFAULT_TARGET_NAME: &str = "COOSPO HW807";

/// Standard Bluetooth Service UUIDs
pub const UUID_HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_HEART_RATE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Client Characteristic Configuration Descriptor
pub const UUID_CCCD: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Value written to the CCCD to enable notifications (0x0001, little-endian)
pub const CCCD_ENABLE_NOTIFY: [u8; 2] = 0x0001u16.to_le_bytes();

/// Scan interval in milliseconds
pub const DEFAULT_SCAN_INTERVAL_MS: u32 = 100;

/// Scan window in milliseconds
pub const DEFAULT_SCAN_WINDOW_MS: u32 = 99;

/// Scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 10;

/// Extra time a scan is given to report completion before it is abandoned
pub const SCAN_COMPLETION_GRACE_SECS: u64 = 5;

/// Delay before rescanning after a scan that found nothing
pub const DEFAULT_RESCAN_DELAY_SECS: u64 = 10;

/// Delay before reconnecting after a failed connect or a disconnect
pub const DEFAULT_RECONNECT_BACKOFF_SECS: u64 = 5;

/// Battery level poll interval in seconds
pub const DEFAULT_BATTERY_POLL_SECS: u64 = 10;

/// Reporter cadence in seconds
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;

/// Cooperative tick period in milliseconds
pub const DEFAULT_TICK_MS: u64 = 1000;
