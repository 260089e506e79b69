//! Discovery of the target band by exact advertised name

use log::{debug, error, info, warn};

use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::radio::Radio;
use crate::core::bluetooth::types::{ScanParams, ScanResult};

/// Outcome of feeding a stack event to the scanner
#[derive(Debug)]
pub enum ScanOutcome<P> {
    /// The target advertised; the scan has been stopped
    DeviceFound(ScanResult<P>),
    /// The scan ran to completion without a match
    ScanTimedOut,
}

pub struct ScanCoordinator {
    target_name: String,
    params: ScanParams,
    scanning: bool,
    scans_started: u64,
}

impl ScanCoordinator {
    pub fn new(target_name: impl Into<String>, params: ScanParams) -> Self {
        Self {
            target_name: target_name.into(),
            params,
            scanning: false,
            scans_started: 0,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Number of scans actually started since creation
    pub fn scans_started(&self) -> u64 {
        self.scans_started
    }

    /// Starts a discovery scan. Returns `Ok(false)` without touching the
    /// radio when a scan is already running.
    pub async fn start_scan<R: Radio>(&mut self, radio: &R) -> Result<bool, RadioError> {
        if self.scanning {
            debug!("Scan already in progress, ignoring start request");
            return Ok(false);
        }

        radio.clear_scan_results();
        info!(
            "Starting BLE scan for {:?} (window {} ms, interval {} ms, {} s)",
            self.target_name,
            self.params.window_ms,
            self.params.interval_ms,
            self.params.duration.as_secs()
        );
        radio.start_scan(&self.params).await?;
        self.scanning = true;
        self.scans_started += 1;
        Ok(true)
    }

    /// Checks one advertisement against the target name. The first match
    /// stops the scan; results arriving after that are ignored.
    pub async fn on_scan_result<R: Radio>(
        &mut self,
        radio: &R,
        result: ScanResult<R::Peer>,
    ) -> Option<ScanOutcome<R::Peer>> {
        if !self.scanning {
            return None;
        }

        debug!(
            "Found device - Name: {:?}, Address: {}, RSSI: {:?}",
            result.name, result.address, result.rssi
        );
        if !result.matches(&self.target_name) {
            return None;
        }

        info!(
            "Target device found: {} ({}, RSSI: {:?})",
            self.target_name, result.address, result.rssi
        );
        self.finish(radio).await;
        Some(ScanOutcome::DeviceFound(result))
    }

    /// Handles the end of the scan window
    pub async fn on_scan_complete<R: Radio>(&mut self, radio: &R) -> Option<ScanOutcome<R::Peer>> {
        if !self.scanning {
            return None;
        }

        info!("Scan finished without finding {:?}", self.target_name);
        self.scanning = false;
        radio.clear_scan_results();
        Some(ScanOutcome::ScanTimedOut)
    }

    /// Gives up on a scan the stack never reported as finished
    pub async fn force_timeout<R: Radio>(&mut self, radio: &R) -> Option<ScanOutcome<R::Peer>> {
        if !self.scanning {
            return None;
        }

        warn!("Scan for {:?} never reported completion, stopping it", self.target_name);
        self.finish(radio).await;
        Some(ScanOutcome::ScanTimedOut)
    }

    /// Stops a running scan, e.g. on shutdown
    pub async fn cancel<R: Radio>(&mut self, radio: &R) {
        if self.scanning {
            self.finish(radio).await;
        }
    }

    async fn finish<R: Radio>(&mut self, radio: &R) {
        self.scanning = false;
        if let Err(e) = radio.stop_scan().await {
            error!("Failed to stop scan: {}", e);
        }
        radio.clear_scan_results();
    }
}
