//! Notification forwarding for the band
//! Values pushed by the band are queued as stack events; decoding happens
//! later on the tick loop.

use bluest::Characteristic;
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::error::RadioError;
use crate::core::bluetooth::radio::EventSender;
use crate::core::bluetooth::types::{LinkId, RadioEvent};

/// Forwards one characteristic's notifications onto the event queue,
/// tagged with the link they arrived on
#[derive(Clone)]
pub struct NotificationForwarder<P> {
    link: LinkId,
    events: EventSender<P>,
}

impl<P: Send + 'static> NotificationForwarder<P> {
    pub fn new(link: LinkId, events: EventSender<P>) -> Self {
        Self { link, events }
    }

    /// Starts forwarding in the background until `token` is cancelled or
    /// the stream ends. The receiver resolves once the subscription is in
    /// place or has been refused.
    pub fn spawn(
        &self,
        characteristic: Characteristic,
        token: CancellationToken,
    ) -> oneshot::Receiver<Result<(), RadioError>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let link = self.link;
        let events = self.events.clone();
        tokio::spawn(async move {
            Self::process_notifications(characteristic, link, events, token, ready_tx).await;
        });
        ready_rx
    }

    async fn process_notifications(
        characteristic: Characteristic,
        link: LinkId,
        events: EventSender<P>,
        token: CancellationToken,
        ready_tx: oneshot::Sender<Result<(), RadioError>>,
    ) {
        let uuid = characteristic.uuid();
        info!("Listening for notifications on {} over {}...", uuid, link);

        let mut notification_stream = match characteristic.notify().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = ready_tx.send(Err(RadioError::Gatt(e.to_string())));
                return;
            }
        };
        let _ = ready_tx.send(Ok(()));

        loop {
            tokio::select! {
                result = notification_stream.next() => {
                    match result {
                        Some(Ok(value)) => {
                            debug!("Received notification from {}: {:02x?}", uuid, value);
                            let event = RadioEvent::Notification {
                                link,
                                characteristic: uuid,
                                value,
                            };
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
                _ = token.cancelled() => break,
            }
        }

        info!("Notification stream on {} ended", link);
    }
}
