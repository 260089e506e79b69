//! Heart-rate band monitor library
//! Keeps one BLE heart-rate band connected and exposes its latest readings.

// Module declarations
pub mod config;
pub mod core;
pub mod logging;
pub mod reporter;
pub mod state;
pub mod utils;
