//! Bluetooth manager for the heart-rate band
//! This module runs the connection lifecycle on a timer and feeds the reporter.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::client_config::ClientConfig;
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::radio::{EventReceiver, Radio};
use crate::core::bluetooth::types::ConnectionState;
use crate::reporter::Reporter;
use crate::state::ReadingStore;

/// Owns the connection lifecycle and the reporter task
pub struct BluetoothManager<R: Radio> {
    connection: ConnectionManager<R>,
    store: ReadingStore,
    tick: Duration,
    report_interval: Duration,
    state_tx: watch::Sender<ConnectionState>,
}

impl<R: Radio> BluetoothManager<R> {
    pub fn new(radio: R, events: EventReceiver<R::Peer>, config: &ClientConfig) -> Self {
        let store = ReadingStore::new();
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            connection: ConnectionManager::new(radio, events, config, store.clone()),
            store,
            tick: config.tick(),
            report_interval: config.report_interval(),
            state_tx,
        }
    }

    pub fn store(&self) -> ReadingStore {
        self.store.clone()
    }

    /// Follows every state change published by the tick loop
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Ticks the connection until `cancel_token` fires, then shuts it down
    pub async fn run<T: Reporter + 'static>(
        mut self,
        reporter: T,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        let reporter_handle = tokio::spawn(report_task(
            Arc::new(reporter),
            self.store.clone(),
            self.state_tx.subscribe(),
            self.report_interval,
            cancel_token.clone(),
        ));

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Band client started, tick every {} ms", self.tick.as_millis());

        loop {
            tokio::select! {
                now = ticker.tick() => {
                    self.connection.tick(now.into_std()).await;
                    self.state_tx.send_replace(self.connection.state());
                }
                _ = cancel_token.cancelled() => break,
            }
        }

        self.connection.shutdown().await;
        self.state_tx.send_replace(self.connection.state());

        if let Err(e) = reporter_handle.await {
            error!("Reporter task finished with an unexpected join error: {:?}", e);
        }
        info!("Band client stopped");
        Ok(())
    }
}

/// Reports the latest reading on every period while the band is ready
async fn report_task<T: Reporter>(
    reporter: Arc<T>,
    store: ReadingStore,
    state_rx: watch::Receiver<ConnectionState>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; report one period in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *state_rx.borrow() == ConnectionState::Ready {
                    reporter.report(&store.snapshot()).await;
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}
