use std::time::{Duration, Instant};

use hrband_monitor_lib::config::client_config::ClientConfig;
use hrband_monitor_lib::config::{AppConfig, ConfigError};
use hrband_monitor_lib::core::bluetooth::{ConnectionState, RetryScheduler};
use hrband_monitor_lib::core::decode_heart_rate;
use hrband_monitor_lib::state::ReadingStore;

#[test]
fn decoded_samples_feed_the_store() {
    let store = ReadingStore::new();
    let payloads: [&[u8]; 5] = [
        &[0x00, 61],
        &[0x01],
        &[0x16, 62, 0x10, 0x02],
        &[0x01, 0xC8, 0x00],
        &[],
    ];

    for payload in payloads {
        if let Some(bpm) = decode_heart_rate(payload) {
            store.record_heart_rate(bpm);
        }
    }

    let reading = store.snapshot();
    assert_eq!(reading.heart_rate, Some(200));
    assert_eq!(reading.sequence, 3);
    assert_eq!(reading.battery_percent, None);
}

#[test]
fn default_config_drives_a_ten_second_rescan_and_five_second_backoff() {
    let config = AppConfig::default();
    assert_eq!(config.client.validate(), Ok(()));

    let mut retry = RetryScheduler::new(config.client.rescan_delay(), config.client.reconnect_backoff());
    let t0 = Instant::now();

    retry.arm_rescan(t0);
    assert!(!retry.may_scan(t0 + Duration::from_secs(9), false, false));
    assert!(retry.may_scan(t0 + Duration::from_secs(10), false, false));

    retry.on_scan_started();
    retry.arm_reconnect(t0);
    assert!(!retry.may_scan(t0 + Duration::from_secs(4), false, false));
    assert!(retry.may_scan(t0 + Duration::from_secs(5), false, false));
}

#[test]
fn zero_tick_is_rejected() {
    let config = ClientConfig {
        tick_ms: 0,
        ..ClientConfig::default()
    };
    assert_eq!(config.validate(), Err(ConfigError::ZeroDuration("tick_ms")));
}

#[test]
fn connection_state_serializes_by_variant_name() {
    assert_eq!(
        serde_json::to_string(&ConnectionState::ResolvingServices).unwrap(),
        "\"ResolvingServices\""
    );
    assert_eq!(ConnectionState::ResolvingServices.to_string(), "resolving-services");
}
