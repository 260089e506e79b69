//! Application state management
//! This module holds the latest band readings shared between the connection
//! lifecycle (writer) and the reporter (reader).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::utils::now_millis;

/// Latest decoded readings of the band
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    /// Heart rate in bpm, `None` until the first notification
    pub heart_rate: Option<u16>,
    /// Battery level in percent, `None` until the first successful read
    pub battery_percent: Option<u8>,
    /// Advances by one on every accepted update, never goes back
    pub sequence: u64,
    /// Milliseconds since the Unix epoch of the last accepted update
    pub timestamp: u64,
}

/// Shared, cloneable handle on the current [`SensorReading`]
#[derive(Debug, Clone, Default)]
pub struct ReadingStore {
    inner: Arc<Mutex<SensorReading>>,
}

impl ReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_heart_rate(&self, bpm: u16) {
        let mut reading = self.lock();
        reading.heart_rate = Some(bpm);
        Self::advance(&mut reading);
    }

    pub fn record_battery(&self, percent: u8) {
        let mut reading = self.lock();
        reading.battery_percent = Some(percent);
        Self::advance(&mut reading);
    }

    /// Copy of the current reading for the reporter
    pub fn snapshot(&self) -> SensorReading {
        self.lock().clone()
    }

    fn advance(reading: &mut SensorReading) {
        reading.sequence += 1;
        reading.timestamp = now_millis();
    }

    fn lock(&self) -> MutexGuard<'_, SensorReading> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unknown() {
        let store = ReadingStore::new();
        let reading = store.snapshot();
        assert_eq!(reading.heart_rate, None);
        assert_eq!(reading.battery_percent, None);
        assert_eq!(reading.sequence, 0);
    }

    #[test]
    fn each_update_advances_sequence() {
        let store = ReadingStore::new();
        store.record_heart_rate(72);
        store.record_battery(88);
        store.record_heart_rate(75);

        let reading = store.snapshot();
        assert_eq!(reading.heart_rate, Some(75));
        assert_eq!(reading.battery_percent, Some(88));
        assert_eq!(reading.sequence, 3);
        assert!(reading.timestamp > 0);
    }

    #[test]
    fn clones_share_the_reading() {
        let writer = ReadingStore::new();
        let reader = writer.clone();
        writer.record_battery(50);
        assert_eq!(reader.snapshot().battery_percent, Some(50));
    }
}
