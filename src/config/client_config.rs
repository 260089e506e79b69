use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::bluetooth::{
    ScanParams, DEFAULT_BATTERY_POLL_SECS, DEFAULT_RECONNECT_BACKOFF_SECS,
    DEFAULT_REPORT_INTERVAL_SECS, DEFAULT_RESCAN_DELAY_SECS, DEFAULT_SCAN_DURATION_SECS,
    DEFAULT_SCAN_INTERVAL_MS, DEFAULT_SCAN_WINDOW_MS, DEFAULT_TARGET_NAME, DEFAULT_TICK_MS,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target_name must not be empty")]
    EmptyTargetName,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("scan window ({window} ms) must not exceed scan interval ({interval} ms)")]
    WindowExceedsInterval { window: u32, interval: u32 },
}

/// Settings of the band connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Exact advertised name of the band. Nothing else is used to match it.
    pub target_name: String,

    /// How long the radio listens within each scan interval.
    pub scan_window_ms: u32,

    /// Period of the scan window.
    pub scan_interval_ms: u32,

    /// Length of one discovery scan.
    pub scan_duration_secs: u64,

    /// Request scan responses from advertisers.
    pub active_scan: bool,

    /// Wait after a scan that did not find the band.
    pub rescan_delay_secs: u64,

    /// Wait after a failed connect or a lost connection.
    pub reconnect_backoff_secs: u64,

    /// Battery level read cadence while connected.
    pub battery_poll_secs: u64,

    /// Reporter cadence while connected.
    pub report_interval_secs: u64,

    /// Period of the cooperative tick loop.
    pub tick_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            target_name: DEFAULT_TARGET_NAME.to_string(),
            scan_window_ms: DEFAULT_SCAN_WINDOW_MS,
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            scan_duration_secs: DEFAULT_SCAN_DURATION_SECS,
            active_scan: true,
            rescan_delay_secs: DEFAULT_RESCAN_DELAY_SECS,
            reconnect_backoff_secs: DEFAULT_RECONNECT_BACKOFF_SECS,
            battery_poll_secs: DEFAULT_BATTERY_POLL_SECS,
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            tick_ms: DEFAULT_TICK_MS,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_name.trim().is_empty() {
            return Err(ConfigError::EmptyTargetName);
        }

        let durations = [
            ("scan_window_ms", u64::from(self.scan_window_ms)),
            ("scan_interval_ms", u64::from(self.scan_interval_ms)),
            ("scan_duration_secs", self.scan_duration_secs),
            ("rescan_delay_secs", self.rescan_delay_secs),
            ("reconnect_backoff_secs", self.reconnect_backoff_secs),
            ("battery_poll_secs", self.battery_poll_secs),
            ("report_interval_secs", self.report_interval_secs),
            ("tick_ms", self.tick_ms),
        ];
        if let Some(&(name, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroDuration(name));
        }

        if self.scan_window_ms > self.scan_interval_ms {
            return Err(ConfigError::WindowExceedsInterval {
                window: self.scan_window_ms,
                interval: self.scan_interval_ms,
            });
        }
        Ok(())
    }

    pub fn scan_params(&self) -> ScanParams {
        ScanParams {
            window_ms: self.scan_window_ms,
            interval_ms: self.scan_interval_ms,
            duration: Duration::from_secs(self.scan_duration_secs),
            active: self.active_scan,
        }
    }

    pub fn rescan_delay(&self) -> Duration {
        Duration::from_secs(self.rescan_delay_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn battery_poll(&self) -> Duration {
        Duration::from_secs(self.battery_poll_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.target_name, "COOSPO HW807");
        assert_eq!(config.scan_params().duration, Duration::from_secs(10));
    }

    #[test]
    fn rejects_empty_name() {
        let config = ClientConfig {
            target_name: "  ".into(),
            ..ClientConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyTargetName));
    }

    #[test]
    fn rejects_zero_backoff() {
        let config = ClientConfig {
            reconnect_backoff_secs: 0,
            ..ClientConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("reconnect_backoff_secs"))
        );
    }

    #[test]
    fn rejects_window_wider_than_interval() {
        let config = ClientConfig {
            scan_window_ms: 200,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WindowExceedsInterval { window: 200, interval: 100 })
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "target_name": "Polar H10 1234" }"#).unwrap();
        assert_eq!(config.target_name, "Polar H10 1234");
        assert_eq!(config.reconnect_backoff_secs, 5);
    }
}
