//! Downstream consumer of band readings

use async_trait::async_trait;
use log::info;
use serde::Serialize;

use crate::core::bluetooth::ConnectionState;
use crate::state::SensorReading;

/// Receives a reading snapshot on every report interval while the band is ready
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, reading: &SensorReading);
}

/// One `Status - HR, Battery` record
#[derive(Debug, Serialize)]
pub struct StatusRecord<'a> {
    pub state: ConnectionState,
    #[serde(flatten)]
    pub reading: &'a SensorReading,
}

impl<'a> StatusRecord<'a> {
    pub fn ready(reading: &'a SensorReading) -> Self {
        Self {
            state: ConnectionState::Ready,
            reading,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}

/// Writes the status summary to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

#[async_trait]
impl Reporter for LogReporter {
    async fn report(&self, reading: &SensorReading) {
        info!("Status - HR, Battery: {}", StatusRecord::ready(reading).to_json());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_record_is_flat_json() {
        let reading = SensorReading {
            heart_rate: Some(72),
            battery_percent: None,
            sequence: 4,
            timestamp: 1_700_000_000_000,
        };
        let value: serde_json::Value =
            serde_json::from_str(&StatusRecord::ready(&reading).to_json()).unwrap();

        assert_eq!(value["state"], "Ready");
        assert_eq!(value["heart_rate"], 72);
        assert!(value["battery_percent"].is_null());
        assert_eq!(value["sequence"], 4);
    }
}
