//! Service and characteristic resolution for a freshly connected band
//! The battery and heart-rate branches are resolved independently; a gap in
//! one never aborts the other.

use log::{info, warn};
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    CCCD_ENABLE_NOTIFY, UUID_BATTERY_LEVEL, UUID_BATTERY_SERVICE, UUID_CCCD,
    UUID_HEART_RATE_MEASUREMENT, UUID_HEART_RATE_SERVICE,
};
use crate::core::bluetooth::radio::Radio;

/// What became usable on the link
#[derive(Debug)]
pub struct Resolution<C> {
    /// Readable battery level characteristic
    pub battery: Option<C>,
    /// Heart-rate measurement characteristic with notifications enabled
    pub heart_rate: Option<C>,
}

impl<C> Resolution<C> {
    pub fn is_usable(&self) -> bool {
        self.battery.is_some() || self.heart_rate.is_some()
    }
}

/// The link dropped while resolution was running; partial work is void.
#[derive(Debug, PartialEq, Eq)]
pub struct LinkLost;

#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceResolver;

impl ServiceResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves both capabilities on `link` and subscribes to heart rate.
    pub async fn resolve<R: Radio>(
        &self,
        radio: &R,
        link: &R::Link,
    ) -> Result<Resolution<R::Characteristic>, LinkLost> {
        info!("Resolving band services...");

        Self::ensure_connected(radio, link).await?;
        let battery = self.resolve_battery(radio, link).await;

        Self::ensure_connected(radio, link).await?;
        let heart_rate = self.resolve_heart_rate(radio, link).await;

        Self::ensure_connected(radio, link).await?;
        info!(
            "Resolution finished - battery: {}, heart rate: {}",
            battery.is_some(),
            heart_rate.is_some()
        );
        Ok(Resolution {
            battery,
            heart_rate,
        })
    }

    async fn resolve_battery<R: Radio>(&self, radio: &R, link: &R::Link) -> Option<R::Characteristic> {
        let characteristic =
            Self::lookup(radio, link, UUID_BATTERY_SERVICE, UUID_BATTERY_LEVEL, "Battery").await?;

        match radio.properties(&characteristic).await {
            Ok(props) if props.read => {
                info!("Battery characteristic found");
                Some(characteristic)
            }
            Ok(_) => {
                warn!("Battery characteristic is not readable");
                None
            }
            Err(e) => {
                warn!("Failed to query battery characteristic properties: {}", e);
                None
            }
        }
    }

    async fn resolve_heart_rate<R: Radio>(
        &self,
        radio: &R,
        link: &R::Link,
    ) -> Option<R::Characteristic> {
        let characteristic = Self::lookup(
            radio,
            link,
            UUID_HEART_RATE_SERVICE,
            UUID_HEART_RATE_MEASUREMENT,
            "Heart Rate",
        )
        .await?;

        match radio.properties(&characteristic).await {
            Ok(props) if props.notify => {}
            Ok(_) => {
                warn!("Heart Rate characteristic does not support notifications");
                return None;
            }
            Err(e) => {
                warn!("Failed to query Heart Rate characteristic properties: {}", e);
                return None;
            }
        }

        let cccd = match radio.find_descriptor(&characteristic, UUID_CCCD).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                warn!("Heart Rate configuration descriptor not found");
                return None;
            }
            Err(e) => {
                warn!("Failed to look up Heart Rate configuration descriptor: {}", e);
                return None;
            }
        };

        if let Err(e) = radio.write_descriptor(&cccd, &CCCD_ENABLE_NOTIFY).await {
            warn!("Failed to enable Heart Rate notifications: {}", e);
            return None;
        }
        if let Err(e) = radio.listen(link, &characteristic).await {
            warn!("Failed to listen for Heart Rate notifications: {}", e);
            return None;
        }

        info!("Subscribed to Heart Rate notifications");
        Some(characteristic)
    }

    /// Service then characteristic lookup; a miss at either level is logged
    async fn lookup<R: Radio>(
        radio: &R,
        link: &R::Link,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
        label: &str,
    ) -> Option<R::Characteristic> {
        let service = match radio.find_service(link, service_uuid).await {
            Ok(Some(service)) => service,
            Ok(None) => {
                warn!("{} service not found: {}", label, service_uuid);
                return None;
            }
            Err(e) => {
                warn!("{} service lookup failed: {}", label, e);
                return None;
            }
        };

        match radio.find_characteristic(&service, characteristic_uuid).await {
            Ok(Some(characteristic)) => Some(characteristic),
            Ok(None) => {
                warn!("{} characteristic not found: {}", label, characteristic_uuid);
                None
            }
            Err(e) => {
                warn!("{} characteristic lookup failed: {}", label, e);
                None
            }
        }
    }

    async fn ensure_connected<R: Radio>(radio: &R, link: &R::Link) -> Result<(), LinkLost> {
        if radio.is_connected(link).await {
            Ok(())
        } else {
            warn!("Link dropped during service resolution, abandoning it");
            Err(LinkLost)
        }
    }
}
