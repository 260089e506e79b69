//! Radio stack abstraction
//! The connection lifecycle only talks to the radio through this trait, so it
//! can run against the bluest backend or a scripted stand-in.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::types::{CharacteristicProperties, LinkId, RadioEvent, ScanParams};

/// Sending half of the stack event queue, held by the radio backend
pub type EventSender<P> = mpsc::UnboundedSender<RadioEvent<P>>;

/// Receiving half of the stack event queue, drained by the tick loop
pub type EventReceiver<P> = mpsc::UnboundedReceiver<RadioEvent<P>>;

/// Creates the queue that carries stack events to the tick loop
pub fn event_channel<P>() -> (EventSender<P>, EventReceiver<P>) {
    mpsc::unbounded_channel()
}

/// Operations the connection lifecycle needs from a BLE central stack.
///
/// Scan results, scan completion, connection changes and notifications are
/// not returned from these calls; the backend pushes them onto its
/// [`EventSender`] as they happen.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Connectable reference carried by a scan result
    type Peer: Clone + Send + Sync + 'static;
    /// Handle of one connection attempt; must be given back via `release_link`
    type Link: Clone + Send + Sync + 'static;
    type Service: Send + Sync;
    type Characteristic: Clone + Send + Sync + 'static;
    type Descriptor: Send + Sync;

    /// Starts an active scan; results arrive as `RadioEvent::ScanResult`,
    /// followed by `RadioEvent::ScanComplete` when the duration runs out or
    /// the scan ends early for any reason other than `stop_scan`.
    ///
    /// Peers already connected at the OS level do not advertise; they are
    /// reported as scan results too.
    async fn start_scan(&self, params: &ScanParams) -> Result<(), RadioError>;

    async fn stop_scan(&self) -> Result<(), RadioError>;

    /// Drops whatever the backend buffered from previous scans
    fn clear_scan_results(&self);

    /// Allocates a link handle for `peer` without connecting it
    async fn create_link(&self, peer: &Self::Peer) -> Result<Self::Link, RadioError>;

    /// Identity carried by every event raised for `link`
    fn link_id(&self, link: &Self::Link) -> LinkId;

    async fn connect(&self, link: &Self::Link) -> Result<(), RadioError>;

    async fn disconnect(&self, link: &Self::Link) -> Result<(), RadioError>;

    /// Returns a link handle to the stack; the handle is dead afterwards
    async fn release_link(&self, link: Self::Link);

    async fn is_connected(&self, link: &Self::Link) -> bool;

    async fn find_service(
        &self,
        link: &Self::Link,
        uuid: Uuid,
    ) -> Result<Option<Self::Service>, RadioError>;

    async fn find_characteristic(
        &self,
        service: &Self::Service,
        uuid: Uuid,
    ) -> Result<Option<Self::Characteristic>, RadioError>;

    async fn properties(
        &self,
        characteristic: &Self::Characteristic,
    ) -> Result<CharacteristicProperties, RadioError>;

    async fn find_descriptor(
        &self,
        characteristic: &Self::Characteristic,
        uuid: Uuid,
    ) -> Result<Option<Self::Descriptor>, RadioError>;

    async fn write_descriptor(
        &self,
        descriptor: &Self::Descriptor,
        value: &[u8],
    ) -> Result<(), RadioError>;

    /// Subscribes to `characteristic` and forwards its notifications as
    /// `RadioEvent::Notification` until the link is released. Returns only
    /// once the subscription is in place; a refused subscription is an error.
    async fn listen(
        &self,
        link: &Self::Link,
        characteristic: &Self::Characteristic,
    ) -> Result<(), RadioError>;

    async fn read(&self, characteristic: &Self::Characteristic) -> Result<Vec<u8>, RadioError>;
}
