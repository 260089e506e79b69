//! Radio backend on top of the platform BLE stack via bluest

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, ConnectionEvent, Descriptor, Device, Service};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::notification::NotificationForwarder;
use crate::core::bluetooth::radio::{EventSender, Radio};
use crate::core::bluetooth::types::{
    CharacteristicProperties, LinkId, RadioEvent, ScanParams, ScanResult,
};

impl From<bluest::Error> for RadioError {
    fn from(e: bluest::Error) -> Self {
        RadioError::Stack(e.to_string())
    }
}

/// One connection attempt to a band.
///
/// Background tasks tied to the attempt stop when the token is cancelled,
/// which happens when the link is released.
#[derive(Clone)]
pub struct BluestLink {
    id: LinkId,
    device: Device,
    token: CancellationToken,
}

/// Devices sighted during the current scan, keyed by id; the value records
/// whether the sighting that was reported carried a name
type Sightings = Arc<Mutex<HashMap<String, bool>>>;

pub struct BluestRadio {
    adapter: Adapter,
    events: EventSender<Device>,
    sightings: Sightings,
    scan_token: Mutex<CancellationToken>,
    next_link: AtomicU64,
}

impl BluestRadio {
    /// Opens the default adapter and waits until it is powered
    pub async fn new(events: EventSender<Device>) -> Result<Self, RadioError> {
        let adapter = Adapter::default()
            .await
            .ok_or(RadioError::AdapterNotAvailable)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            events,
            sightings: Arc::new(Mutex::new(HashMap::new())),
            scan_token: Mutex::new(CancellationToken::new()),
            next_link: AtomicU64::new(1),
        })
    }

    fn replace_scan_token(&self) -> CancellationToken {
        let mut guard = self.scan_token.lock().unwrap_or_else(PoisonError::into_inner);
        guard.cancel();
        *guard = CancellationToken::new();
        guard.clone()
    }

    /// Scans until the duration runs out, the stream ends or the scan is
    /// cancelled. Every exit except cancellation reports `ScanComplete`.
    async fn internal_scan_task(
        adapter: Adapter,
        sightings: Sightings,
        events: EventSender<Device>,
        cancel_token: CancellationToken,
        params: ScanParams,
    ) -> Result<(), RadioError> {
        // A band held by the OS does not advertise
        info!("Checking for connected devices");
        match adapter.connected_devices().await {
            Ok(connected) => {
                for device in connected {
                    if !Self::emit_sighting(&sightings, &events, device, None, None) {
                        return Ok(());
                    }
                }
            }
            Err(e) => warn!("Failed to list connected devices: {}", e),
        }

        info!("Starting bluetooth scan");
        let mut scan_stream = adapter
            .scan(&[])
            .await
            .map_err(|e| RadioError::ScanFailed(e.to_string()))?;
        let deadline = tokio::time::sleep(params.duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    let Some(discovered) = result else {
                        info!("Bluetooth scan stream has ended.");
                        let _ = events.send(RadioEvent::ScanComplete);
                        break;
                    };
                    let name = discovered.adv_data.local_name;
                    if !Self::emit_sighting(&sightings, &events, discovered.device, name, discovered.rssi) {
                        break;
                    }
                }
                _ = &mut deadline => {
                    debug!("Scan duration elapsed");
                    let _ = events.send(RadioEvent::ScanComplete);
                    break;
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Queues a scan result unless it repeats an earlier sighting. Returns
    /// false once nobody is listening any more.
    fn emit_sighting(
        sightings: &Sightings,
        events: &EventSender<Device>,
        device: Device,
        advertised_name: Option<String>,
        rssi: Option<i16>,
    ) -> bool {
        let id = device.id().to_string();
        let name = advertised_name.or_else(|| device.name().ok());

        let report = {
            let mut seen = sightings.lock().unwrap_or_else(PoisonError::into_inner);
            should_report(&mut seen, &id, name.is_some())
        };
        if !report {
            return true;
        }

        let address = Self::extract_mac_address(&id).unwrap_or(id);
        debug!("Found device - Name: {:?}, Address: {}, RSSI: {:?}", name, address, rssi);
        let result = ScanResult {
            name,
            address,
            rssi,
            peer: device,
        };
        events.send(RadioEvent::ScanResult(result)).is_ok()
    }

    /// Forwards link up/down changes of `device` until `token` is cancelled
    async fn connection_events_task(
        adapter: Adapter,
        link: BluestLink,
        events: EventSender<Device>,
    ) {
        let mut stream = match adapter.device_connection_events(&link.device).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Connection events unavailable for {}: {}", link.device.id(), e);
                return;
            }
        };

        loop {
            tokio::select! {
                event = stream.next() => {
                    let event = match event {
                        Some(ConnectionEvent::Connected) => RadioEvent::Connected { link: link.id },
                        Some(ConnectionEvent::Disconnected) => RadioEvent::Disconnected { link: link.id },
                        None => break,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                _ = link.token.cancelled() => break,
            }
        }
    }

    fn extract_mac_address(device_id_str: &str) -> Option<String> {
        let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
        re.find_iter(device_id_str)
            .last()
            .map(|m| m.as_str().to_uppercase())
    }
}

/// A device is reported on its first sighting, and once more if that
/// sighting had no name and a later one does.
fn should_report(seen: &mut HashMap<String, bool>, id: &str, named: bool) -> bool {
    match seen.get_mut(id) {
        None => {
            seen.insert(id.to_string(), named);
            true
        }
        Some(reported_named) if named && !*reported_named => {
            *reported_named = true;
            true
        }
        Some(_) => false,
    }
}

#[async_trait]
impl Radio for BluestRadio {
    type Peer = Device;
    type Link = BluestLink;
    type Service = Service;
    type Characteristic = Characteristic;
    type Descriptor = Descriptor;

    async fn start_scan(&self, params: &ScanParams) -> Result<(), RadioError> {
        // Window, interval and active mode are chosen by the platform stack.
        debug!(
            "Requested scan window {} ms / interval {} ms, active: {}",
            params.window_ms, params.interval_ms, params.active
        );
        let cancel_token = self.replace_scan_token();

        let adapter = self.adapter.clone();
        let sightings = self.sightings.clone();
        let events = self.events.clone();
        let params = params.clone();
        tokio::spawn(async move {
            if let Err(e) =
                Self::internal_scan_task(adapter, sightings, events.clone(), cancel_token, params)
                    .await
            {
                error!("Scan task failed: {}", e);
                let _ = events.send(RadioEvent::ScanComplete);
            }
        });
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        info!("Stopping Bluetooth scan.");
        self.scan_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        Ok(())
    }

    fn clear_scan_results(&self) {
        self.sightings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    async fn create_link(&self, peer: &Device) -> Result<BluestLink, RadioError> {
        let link = BluestLink {
            id: LinkId(self.next_link.fetch_add(1, Ordering::Relaxed)),
            device: peer.clone(),
            token: CancellationToken::new(),
        };
        debug!("Created {} for {}", link.id, peer.id());
        tokio::spawn(Self::connection_events_task(
            self.adapter.clone(),
            link.clone(),
            self.events.clone(),
        ));
        Ok(link)
    }

    fn link_id(&self, link: &BluestLink) -> LinkId {
        link.id
    }

    async fn connect(&self, link: &BluestLink) -> Result<(), RadioError> {
        if link.device.is_connected().await {
            return Ok(());
        }
        self.adapter
            .connect_device(&link.device)
            .await
            .map_err(|e| RadioError::ConnectFailed(e.to_string()))
    }

    async fn disconnect(&self, link: &BluestLink) -> Result<(), RadioError> {
        if link.device.is_connected().await {
            info!("Disconnecting from device {}", link.device.id());
            self.adapter.disconnect_device(&link.device).await?;
        }
        Ok(())
    }

    async fn release_link(&self, link: BluestLink) {
        link.token.cancel();
    }

    async fn is_connected(&self, link: &BluestLink) -> bool {
        link.device.is_connected().await
    }

    async fn find_service(
        &self,
        link: &BluestLink,
        uuid: Uuid,
    ) -> Result<Option<Service>, RadioError> {
        let services = link.device.discover_services_with_uuid(uuid).await?;
        Ok(services.into_iter().next())
    }

    async fn find_characteristic(
        &self,
        service: &Service,
        uuid: Uuid,
    ) -> Result<Option<Characteristic>, RadioError> {
        let characteristics = service.discover_characteristics_with_uuid(uuid).await?;
        Ok(characteristics.into_iter().next())
    }

    async fn properties(
        &self,
        characteristic: &Characteristic,
    ) -> Result<CharacteristicProperties, RadioError> {
        let props = characteristic.properties().await?;
        Ok(CharacteristicProperties {
            read: props.read,
            notify: props.notify,
        })
    }

    async fn find_descriptor(
        &self,
        characteristic: &Characteristic,
        uuid: Uuid,
    ) -> Result<Option<Descriptor>, RadioError> {
        let descriptors = characteristic.discover_descriptors().await?;
        Ok(descriptors.into_iter().find(|d| d.uuid() == uuid))
    }

    async fn write_descriptor(&self, descriptor: &Descriptor, value: &[u8]) -> Result<(), RadioError> {
        // Some platforms reserve the CCCD. There the subscription made by
        // `listen` enables it, and `listen` fails if that is refused too.
        if let Err(e) = descriptor.write(value).await {
            debug!("Direct descriptor write refused, relying on subscription: {}", e);
        }
        Ok(())
    }

    async fn listen(&self, link: &BluestLink, characteristic: &Characteristic) -> Result<(), RadioError> {
        let forwarder = NotificationForwarder::new(link.id, self.events.clone());
        let subscribed = forwarder.spawn(characteristic.clone(), link.token.child_token());
        subscribed
            .await
            .unwrap_or_else(|_| Err(RadioError::Gatt("notification task ended before subscribing".into())))
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, RadioError> {
        Ok(characteristic.read().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_is_taken_from_platform_id() {
        assert_eq!(
            BluestRadio::extract_mac_address("hci0/dev_aa_bb/aa:bb:cc:dd:ee:ff"),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert_eq!(
            BluestRadio::extract_mac_address("BluetoothLE#BluetoothLE00:11:22:33:44:55-aa-bb-cc-dd-ee-0f"),
            Some("AA-BB-CC-DD-EE-0F".to_string())
        );
        assert_eq!(
            BluestRadio::extract_mac_address("6F9619FF-8B86-D011-B42D-00C04FC964FF"),
            None
        );
    }

    #[test]
    fn repeats_are_reported_only_when_a_name_appears() {
        let mut seen = HashMap::new();
        assert!(should_report(&mut seen, "band", false));
        assert!(!should_report(&mut seen, "band", false));
        // Scan response with the local name
        assert!(should_report(&mut seen, "band", true));
        assert!(!should_report(&mut seen, "band", true));
        assert!(!should_report(&mut seen, "band", false));
    }

    #[test]
    fn named_first_sighting_is_reported_once() {
        let mut seen = HashMap::new();
        assert!(should_report(&mut seen, "band", true));
        assert!(!should_report(&mut seen, "band", true));
        assert!(should_report(&mut seen, "speaker", false));

        seen.clear();
        assert!(should_report(&mut seen, "band", true));
    }
}
