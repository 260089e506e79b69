use std::path::PathBuf;

use anyhow::Result;
use hrband_monitor_lib::config::{AppConfig, CONFIG_FILE_NAME};
use hrband_monitor_lib::core::bluetooth::{event_channel, BluestRadio, BluetoothManager};
use hrband_monitor_lib::logging;
use hrband_monitor_lib::reporter::LogReporter;
use log::{error, info};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    let config_exists = config_path.exists();
    let config = AppConfig::load_config(&config_path).await?;
    logging::setup_logging(&config.log_level);
    if !config_exists {
        if let Err(e) = config.save_config(&config_path).await {
            error!("Failed to write default config: {}", e);
        }
    }

    info!("Looking for band {:?}", config.client.target_name);

    let (events_tx, events_rx) = event_channel();
    let radio = BluestRadio::new(events_tx).await?;
    let manager = BluetoothManager::new(radio, events_rx, &config.client);

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt: {}", e);
            return;
        }
        info!("Interrupt received, shutting down...");
        ctrl_c_token.cancel();
    });

    manager.run(LogReporter, cancel_token).await
}
