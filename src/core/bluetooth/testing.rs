//! Scripted radio used by the state machine tests

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    UUID_BATTERY_LEVEL, UUID_BATTERY_SERVICE, UUID_CCCD, UUID_HEART_RATE_MEASUREMENT,
    UUID_HEART_RATE_SERVICE,
};
use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::radio::{EventSender, Radio};
use crate::core::bluetooth::types::{
    CharacteristicProperties, LinkId, RadioEvent, ScanParams, ScanResult,
};

pub(crate) type FakePeer = String;

#[derive(Debug, Clone)]
pub(crate) struct FakeCharacteristic {
    pub uuid: Uuid,
}

pub(crate) struct FakeService {
    uuid: Uuid,
}

pub(crate) struct FakeDescriptor {
    characteristic: Uuid,
}

#[derive(Debug, Clone)]
pub(crate) struct GattCharacteristic {
    pub uuid: Uuid,
    pub props: CharacteristicProperties,
    pub has_cccd: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

pub(crate) fn heart_rate_service() -> GattService {
    GattService {
        uuid: UUID_HEART_RATE_SERVICE,
        characteristics: vec![GattCharacteristic {
            uuid: UUID_HEART_RATE_MEASUREMENT,
            props: CharacteristicProperties {
                read: false,
                notify: true,
            },
            has_cccd: true,
        }],
    }
}

pub(crate) fn battery_service() -> GattService {
    GattService {
        uuid: UUID_BATTERY_SERVICE,
        characteristics: vec![GattCharacteristic {
            uuid: UUID_BATTERY_LEVEL,
            props: CharacteristicProperties {
                read: true,
                notify: false,
            },
            has_cccd: false,
        }],
    }
}

/// Everything the fake records or is told to do
#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub gatt: Vec<GattService>,
    /// The next N connect attempts are rejected
    pub connect_failures: usize,
    pub next_link: u64,
    pub open_links: HashSet<u64>,
    pub peak_open_links: usize,
    pub connected: Option<u64>,
    pub scans_started: usize,
    pub scan_running: bool,
    pub scan_stops: usize,
    pub result_clears: usize,
    /// Value returned by reads; `None` makes reads fail
    pub battery: Option<Vec<u8>>,
    pub reads: usize,
    pub cccd_writes: Vec<(Uuid, Vec<u8>)>,
    pub listening: Vec<Uuid>,
    pub disconnects: usize,
    pub drop_link_on_read: bool,
    pub drop_link_on_service_lookup: bool,
    /// Subscriptions are refused by the stack
    pub listen_fails: bool,
    /// Peers held by the OS, reported at scan start: (name, address)
    pub os_connected: Vec<(String, String)>,
}

pub(crate) struct FakeRadio {
    events: EventSender<FakePeer>,
    state: Mutex<FakeState>,
}

impl FakeRadio {
    pub fn new(events: EventSender<FakePeer>, gatt: Vec<GattService>) -> Self {
        Self {
            events,
            state: Mutex::new(FakeState {
                gatt,
                battery: Some(vec![88]),
                ..FakeState::default()
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn advertise(&self, name: Option<&str>, address: &str) {
        let result = ScanResult {
            name: name.map(str::to_string),
            address: address.to_string(),
            rssi: Some(-60),
            peer: address.to_string(),
        };
        let _ = self.events.send(RadioEvent::ScanResult(result));
    }

    /// A scan that ends without the scanner stopping it, and without the
    /// stack saying so
    pub fn lose_scan(&self) {
        self.state().scan_running = false;
    }

    pub fn finish_scan(&self) {
        self.state().scan_running = false;
        let _ = self.events.send(RadioEvent::ScanComplete);
    }

    /// The peripheral goes away and the stack reports it
    pub fn drop_link(&self) {
        let link = self.state().connected.take();
        if let Some(link) = link {
            self.report_disconnect(link);
        }
    }

    /// Queues a disconnect event for `link`, live or not
    pub fn report_disconnect(&self, link: u64) {
        let _ = self.events.send(RadioEvent::Disconnected { link: LinkId(link) });
    }

    /// The peripheral goes away without any event
    pub fn sever_silently(&self) {
        self.state().connected = None;
    }

    /// Notification on the currently connected link
    pub fn notify(&self, characteristic: Uuid, value: &[u8]) {
        let link = self.state().connected.unwrap_or_default();
        self.notify_from(link, characteristic, value);
    }

    pub fn notify_from(&self, link: u64, characteristic: Uuid, value: &[u8]) {
        let _ = self.events.send(RadioEvent::Notification {
            link: LinkId(link),
            characteristic,
            value: value.to_vec(),
        });
    }

    fn find_characteristic_entry(&self, uuid: Uuid) -> Option<GattCharacteristic> {
        self.state()
            .gatt
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
            .cloned()
    }
}

#[async_trait]
impl Radio for FakeRadio {
    type Peer = FakePeer;
    type Link = u64;
    type Service = FakeService;
    type Characteristic = FakeCharacteristic;
    type Descriptor = FakeDescriptor;

    async fn start_scan(&self, _params: &ScanParams) -> Result<(), RadioError> {
        let held = {
            let mut state = self.state();
            state.scans_started += 1;
            state.scan_running = true;
            state.os_connected.clone()
        };
        for (name, address) in held {
            self.advertise(Some(&name), &address);
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        let mut state = self.state();
        state.scan_running = false;
        state.scan_stops += 1;
        Ok(())
    }

    fn clear_scan_results(&self) {
        self.state().result_clears += 1;
    }

    async fn create_link(&self, _peer: &FakePeer) -> Result<u64, RadioError> {
        let mut state = self.state();
        state.next_link += 1;
        let id = state.next_link;
        state.open_links.insert(id);
        state.peak_open_links = state.peak_open_links.max(state.open_links.len());
        Ok(id)
    }

    fn link_id(&self, link: &u64) -> LinkId {
        LinkId(*link)
    }

    async fn connect(&self, link: &u64) -> Result<(), RadioError> {
        {
            let mut state = self.state();
            if !state.open_links.contains(link) {
                return Err(RadioError::NotConnected);
            }
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(RadioError::ConnectFailed("rejected by fake".into()));
            }
            state.connected = Some(*link);
        }
        let _ = self.events.send(RadioEvent::Connected { link: LinkId(*link) });
        Ok(())
    }

    async fn disconnect(&self, link: &u64) -> Result<(), RadioError> {
        let mut state = self.state();
        state.disconnects += 1;
        if state.connected == Some(*link) {
            state.connected = None;
        }
        Ok(())
    }

    async fn release_link(&self, link: u64) {
        let mut state = self.state();
        state.open_links.remove(&link);
        if state.connected == Some(link) {
            state.connected = None;
        }
    }

    async fn is_connected(&self, link: &u64) -> bool {
        self.state().connected == Some(*link)
    }

    async fn find_service(
        &self,
        link: &u64,
        uuid: Uuid,
    ) -> Result<Option<FakeService>, RadioError> {
        if self.state().drop_link_on_service_lookup {
            self.drop_link();
        }
        let state = self.state();
        if state.connected != Some(*link) {
            return Err(RadioError::NotConnected);
        }
        Ok(state
            .gatt
            .iter()
            .find(|s| s.uuid == uuid)
            .map(|s| FakeService { uuid: s.uuid }))
    }

    async fn find_characteristic(
        &self,
        service: &FakeService,
        uuid: Uuid,
    ) -> Result<Option<FakeCharacteristic>, RadioError> {
        let state = self.state();
        Ok(state
            .gatt
            .iter()
            .filter(|s| s.uuid == service.uuid)
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
            .map(|c| FakeCharacteristic { uuid: c.uuid }))
    }

    async fn properties(
        &self,
        characteristic: &FakeCharacteristic,
    ) -> Result<CharacteristicProperties, RadioError> {
        self.find_characteristic_entry(characteristic.uuid)
            .map(|c| c.props)
            .ok_or_else(|| RadioError::Gatt("unknown characteristic".into()))
    }

    async fn find_descriptor(
        &self,
        characteristic: &FakeCharacteristic,
        uuid: Uuid,
    ) -> Result<Option<FakeDescriptor>, RadioError> {
        let entry = self.find_characteristic_entry(characteristic.uuid);
        Ok(entry
            .filter(|c| uuid == UUID_CCCD && c.has_cccd)
            .map(|c| FakeDescriptor {
                characteristic: c.uuid,
            }))
    }

    async fn write_descriptor(
        &self,
        descriptor: &FakeDescriptor,
        value: &[u8],
    ) -> Result<(), RadioError> {
        self.state()
            .cccd_writes
            .push((descriptor.characteristic, value.to_vec()));
        Ok(())
    }

    async fn listen(
        &self,
        _link: &u64,
        characteristic: &FakeCharacteristic,
    ) -> Result<(), RadioError> {
        let mut state = self.state();
        if state.listen_fails {
            return Err(RadioError::Gatt("subscription refused".into()));
        }
        state.listening.push(characteristic.uuid);
        Ok(())
    }

    async fn read(&self, _characteristic: &FakeCharacteristic) -> Result<Vec<u8>, RadioError> {
        let drop_link = {
            let mut state = self.state();
            state.reads += 1;
            state.drop_link_on_read
        };
        if drop_link {
            self.drop_link();
            return Err(RadioError::NotConnected);
        }
        self.state()
            .battery
            .clone()
            .ok_or_else(|| RadioError::Gatt("read failed".into()))
    }
}
