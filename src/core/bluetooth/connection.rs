//! Connection lifecycle of the heart-rate band
//! This module owns the single session with the band and moves it through
//! scan, connect, resolve and ready, re-entering idle after any failure.

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::client_config::ClientConfig;
use crate::core::bluetooth::constants::{SCAN_COMPLETION_GRACE_SECS, UUID_HEART_RATE_MEASUREMENT};
use crate::core::bluetooth::error::{ConnectError, RadioError, SessionError};
use crate::core::bluetooth::radio::{EventReceiver, Radio};
use crate::core::bluetooth::resolver::{LinkLost, Resolution, ServiceResolver};
use crate::core::bluetooth::retry::{CoarseTimer, RetryScheduler};
use crate::core::bluetooth::scanner::{ScanCoordinator, ScanOutcome};
use crate::core::bluetooth::types::{
    CharacteristicHandle, CharacteristicRole, ConnectionState, LinkId, RadioEvent, ScanResult,
    Session,
};
use crate::core::heart_rate::decode_heart_rate;
use crate::state::ReadingStore;

/// Connection manager for the band
///
/// All mutation goes through [`ConnectionManager::tick`] and the few explicit
/// commands below. Stack events are only queued by the radio; they are
/// applied here, in arrival order, when a tick drains the queue.
///
/// A link handle lives in exactly one slot at a time: `pending_link` while
/// connecting or resolving, the session once ready, `stale_link` after a
/// disconnect until it has been released.
pub struct ConnectionManager<R: Radio> {
    radio: R,
    events: EventReceiver<R::Peer>,
    state: ConnectionState,
    scanner: ScanCoordinator,
    resolver: ServiceResolver,
    retry: RetryScheduler,
    /// Fires when a running scan has overrun its duration plus a grace period
    scan_deadline: CoarseTimer,
    battery_poll: CoarseTimer,
    store: ReadingStore,
    target: Option<ScanResult<R::Peer>>,
    pending_link: Option<R::Link>,
    session: Option<Session<R::Link, R::Characteristic>>,
    stale_link: Option<R::Link>,
    next_session_id: u64,
}

impl<R: Radio> ConnectionManager<R> {
    pub fn new(
        radio: R,
        events: EventReceiver<R::Peer>,
        config: &ClientConfig,
        store: ReadingStore,
    ) -> Self {
        let scan_params = config.scan_params();
        let scan_deadline = scan_params.duration + Duration::from_secs(SCAN_COMPLETION_GRACE_SECS);
        Self {
            radio,
            events,
            state: ConnectionState::Idle,
            scanner: ScanCoordinator::new(config.target_name.clone(), scan_params),
            resolver: ServiceResolver::new(),
            retry: RetryScheduler::new(config.rescan_delay(), config.reconnect_backoff()),
            scan_deadline: CoarseTimer::new(scan_deadline),
            battery_poll: CoarseTimer::new(config.battery_poll()),
            store,
            target: None,
            pending_link: None,
            session: None,
            stale_link: None,
            next_session_id: 1,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    pub fn scanner(&self) -> &ScanCoordinator {
        &self.scanner
    }

    /// Id of the live session, if any
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(Session::id)
    }

    pub fn battery_handle(&self) -> Option<CharacteristicHandle<R::Characteristic>> {
        self.session.as_ref().and_then(|s| s.battery.clone())
    }

    pub fn heart_rate_handle(&self) -> Option<CharacteristicHandle<R::Characteristic>> {
        self.session.as_ref().and_then(|s| s.heart_rate.clone())
    }

    /// One cooperative step: apply queued events, run the work of the
    /// current state, apply what that work raised.
    pub async fn tick(&mut self, now: Instant) {
        self.drain_events(now).await;
        self.step(now).await;
        self.drain_events(now).await;

        if self.state == ConnectionState::Disconnected {
            self.release_stale_link().await;
            self.transition(ConnectionState::Idle);
        }
    }

    /// Starts a discovery scan unless one is running or a connect is outstanding
    pub async fn start_scan(&mut self, now: Instant) -> Result<bool, RadioError> {
        if !self
            .retry
            .may_scan(now, self.scanner.is_scanning(), self.connect_outstanding())
        {
            return Ok(false);
        }

        let started = self.scanner.start_scan(&self.radio).await?;
        if started {
            self.retry.on_scan_started();
            self.scan_deadline.arm(now);
            self.transition(ConnectionState::Scanning);
        }
        Ok(started)
    }

    /// Queues a connect attempt to `device` for the next tick
    pub fn request_connect(&mut self, device: ScanResult<R::Peer>) -> Result<(), ConnectError> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::ResolvingServices => {
                return Err(ConnectError::ConnectionInProgress);
            }
            ConnectionState::Ready => return Err(ConnectError::AlreadyConnected),
            _ => {}
        }
        if self.connect_outstanding() {
            return Err(ConnectError::ConnectionInProgress);
        }

        self.target = Some(device);
        self.transition(ConnectionState::Connecting);
        Ok(())
    }

    /// Reads a characteristic of the live session.
    ///
    /// Handles from a session that has since been torn down are rejected,
    /// whatever happened after it.
    pub async fn read_characteristic(
        &self,
        handle: &CharacteristicHandle<R::Characteristic>,
    ) -> Result<Vec<u8>, SessionError> {
        self.check_handle(handle)?;
        self.radio
            .read(&handle.inner)
            .await
            .map_err(|e| SessionError::ReadFailed(format!("{:?}: {}", handle.role(), e)))
    }

    /// Drops the session on request and backs off before scanning again
    pub async fn disconnect(&mut self, now: Instant) {
        info!("Disconnecting from band on request");
        let link = self.take_links();
        if let Some(link) = link {
            if let Err(e) = self.radio.disconnect(&link).await {
                error!("Failed to disconnect: {}", e);
            }
            self.radio.release_link(link).await;
        }
        self.release_stale_link().await;
        self.retry.arm_reconnect(now);
        self.transition(ConnectionState::Idle);
    }

    /// Stops scanning and releases every link; used when the process exits
    pub async fn shutdown(&mut self) {
        info!("Shutting down band connection");
        self.scanner.cancel(&self.radio).await;
        self.scan_deadline.disarm();
        if let Some(link) = self.take_links() {
            if self.radio.is_connected(&link).await {
                if let Err(e) = self.radio.disconnect(&link).await {
                    error!("Failed to disconnect: {}", e);
                }
            }
            self.radio.release_link(link).await;
        }
        self.release_stale_link().await;
        self.transition(ConnectionState::Idle);
    }

    async fn drain_events(&mut self, now: Instant) {
        while let Ok(event) = self.events.try_recv() {
            self.apply(event, now).await;
        }
    }

    async fn apply(&mut self, event: RadioEvent<R::Peer>, now: Instant) {
        match event {
            RadioEvent::ScanResult(result) => {
                if let Some(outcome) = self.scanner.on_scan_result(&self.radio, result).await {
                    self.on_scan_outcome(outcome, now);
                }
            }
            RadioEvent::ScanComplete => {
                if let Some(outcome) = self.scanner.on_scan_complete(&self.radio).await {
                    self.on_scan_outcome(outcome, now);
                }
            }
            RadioEvent::Connected { link } => debug!("Stack reports {} up", link),
            RadioEvent::Disconnected { link } => {
                if self.holds_link(link) {
                    self.on_link_lost(now);
                } else {
                    debug!("Ignoring disconnect of released {}", link);
                }
            }
            RadioEvent::Notification {
                link,
                characteristic,
                value,
            } => {
                if self.session_link_id() == Some(link) {
                    self.on_notification(characteristic, &value);
                } else {
                    debug!("Dropping notification from released {}", link);
                }
            }
        }
    }

    fn on_scan_outcome(&mut self, outcome: ScanOutcome<R::Peer>, now: Instant) {
        self.scan_deadline.disarm();
        match outcome {
            ScanOutcome::DeviceFound(device) => {
                if let Err(e) = self.request_connect(device) {
                    warn!("Ignoring discovered band: {}", e);
                }
            }
            ScanOutcome::ScanTimedOut => {
                if self.state != ConnectionState::Scanning {
                    return;
                }
                info!(
                    "Target device not found, retrying in {} seconds...",
                    self.retry.rescan_delay().as_secs()
                );
                self.retry.arm_rescan(now);
                self.transition(ConnectionState::Idle);
            }
        }
    }

    /// Disconnect from any state: the session goes first, everything else
    /// follows on this or the next tick.
    fn on_link_lost(&mut self, now: Instant) {
        if self.session.is_none() && self.pending_link.is_none() {
            debug!("Disconnect event with no link held, ignoring");
            return;
        }

        warn!("Disconnected from band (was {})", self.state);
        if let Some(link) = self.take_links() {
            self.stash_stale(link);
        }
        self.retry.arm_reconnect(now);
        self.transition(ConnectionState::Disconnected);
    }

    fn on_notification(&mut self, characteristic: Uuid, value: &[u8]) {
        if self.state != ConnectionState::Ready || characteristic != UUID_HEART_RATE_MEASUREMENT {
            debug!("Dropping notification from {} in state {}", characteristic, self.state);
            return;
        }
        if self.heart_rate_handle().is_none() {
            return;
        }

        match decode_heart_rate(value) {
            Some(bpm) => {
                debug!("Heart Rate: {} bpm", bpm);
                self.store.record_heart_rate(bpm);
            }
            None => debug!("Dropping malformed heart rate payload: {:02x?}", value),
        }
    }

    async fn step(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Idle => {
                if let Err(e) = self.start_scan(now).await {
                    error!("Failed to start scan: {}", e);
                    self.retry.arm_rescan(now);
                }
            }
            ConnectionState::Scanning => self.step_scanning(now).await,
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting => self.step_connect(now).await,
            ConnectionState::ResolvingServices => self.step_resolve(now).await,
            ConnectionState::Ready => self.step_ready(now).await,
        }
    }

    async fn step_scanning(&mut self, now: Instant) {
        if !self.scan_deadline.is_due(now) {
            return;
        }
        match self.scanner.force_timeout(&self.radio).await {
            Some(outcome) => self.on_scan_outcome(outcome, now),
            None => {
                self.scan_deadline.disarm();
                self.retry.arm_rescan(now);
                self.transition(ConnectionState::Idle);
            }
        }
    }

    async fn step_connect(&mut self, now: Instant) {
        let Some(target) = self.target.take() else {
            warn!("Connecting without a target, returning to idle");
            self.transition(ConnectionState::Idle);
            return;
        };

        self.scanner.cancel(&self.radio).await;
        self.scan_deadline.disarm();

        // A leftover handle from an earlier attempt must be gone before a new one exists.
        if let Some(link) = self.pending_link.take() {
            self.stash_stale(link);
        }
        self.release_stale_link().await;

        let link = match self.radio.create_link(&target.peer).await {
            Ok(link) => link,
            Err(e) => {
                error!("Failed to create link to {}: {}", target.address, e);
                self.retry.arm_reconnect(now);
                self.transition(ConnectionState::Idle);
                return;
            }
        };
        self.pending_link = Some(link.clone());

        info!("Initiating connection to {}...", target.address);
        match self.radio.connect(&link).await {
            Ok(()) => {
                info!("Connected to {}, resolving services on next tick", target.address);
                self.transition(ConnectionState::ResolvingServices);
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", target.address, e);
                if let Some(link) = self.pending_link.take() {
                    self.radio.release_link(link).await;
                }
                self.retry.arm_reconnect(now);
                self.transition(ConnectionState::Idle);
            }
        }
    }

    async fn step_resolve(&mut self, now: Instant) {
        let Some(link) = self.pending_link.clone() else {
            warn!("Resolving services without a link, returning to idle");
            self.transition(ConnectionState::Idle);
            return;
        };

        let result = self.resolver.resolve(&self.radio, &link).await;

        // A disconnect raised while resolving wins over whatever was found.
        self.drain_events(now).await;
        if self.state != ConnectionState::ResolvingServices {
            debug!("Session torn down during resolution, discarding result");
            return;
        }

        match result {
            Err(LinkLost) => self.on_link_lost(now),
            Ok(resolution) if resolution.is_usable() => self.establish_session(resolution, now),
            Ok(_) => {
                warn!("Neither battery nor heart rate is available, dropping connection");
                self.force_disconnect(now).await;
            }
        }
    }

    fn establish_session(&mut self, resolution: Resolution<R::Characteristic>, now: Instant) {
        let Some(link) = self.pending_link.take() else {
            return;
        };
        let id = self.next_session_id;
        self.next_session_id += 1;

        let battery = resolution.battery.map(|inner| CharacteristicHandle {
            session_id: id,
            role: CharacteristicRole::Battery,
            inner,
        });
        let heart_rate = resolution.heart_rate.map(|inner| CharacteristicHandle {
            session_id: id,
            role: CharacteristicRole::HeartRate,
            inner,
        });

        let session = Session {
            id,
            link,
            battery,
            heart_rate,
        };
        if session.has_battery() {
            self.battery_poll.expire(now);
        } else {
            self.battery_poll.disarm();
        }

        info!(
            "Session {} ready - battery: {}, heart rate: {}",
            id,
            session.has_battery(),
            session.has_heart_rate()
        );
        self.session = Some(session);
        self.transition(ConnectionState::Ready);
    }

    async fn force_disconnect(&mut self, now: Instant) {
        if let Some(link) = self.pending_link.take() {
            if let Err(e) = self.radio.disconnect(&link).await {
                error!("Failed to disconnect: {}", e);
            }
            self.radio.release_link(link).await;
        }
        self.retry.arm_reconnect(now);
        self.transition(ConnectionState::Idle);
    }

    async fn step_ready(&mut self, now: Instant) {
        let Some(link) = self.session.as_ref().map(|s| s.link.clone()) else {
            self.transition(ConnectionState::Idle);
            return;
        };

        if !self.radio.is_connected(&link).await {
            warn!("Connection lost unexpectedly");
            self.on_link_lost(now);
            return;
        }

        if !self.battery_poll.is_due(now) {
            return;
        }
        self.battery_poll.arm(now);

        let Some(handle) = self.battery_handle() else {
            return;
        };
        let result = self.read_characteristic(&handle).await;

        self.drain_events(now).await;
        if self.check_handle(&handle).is_err() {
            debug!("Session torn down during battery read, discarding result");
            return;
        }

        match result {
            Ok(value) => match value.first() {
                Some(&percent) => {
                    info!("Battery Level: {}%", percent);
                    self.store.record_battery(percent);
                }
                None => warn!("Empty battery read, keeping previous value"),
            },
            Err(e) => warn!("Battery read failed, keeping previous value: {}", e),
        }
    }

    fn check_handle(
        &self,
        handle: &CharacteristicHandle<R::Characteristic>,
    ) -> Result<(), SessionError> {
        let live = self.session_id();
        if self.state != ConnectionState::Ready || live.is_none() {
            return Err(SessionError::NotReady);
        }
        if live != Some(handle.session_id) {
            return Err(SessionError::StaleHandle {
                handle: handle.session_id,
                live,
            });
        }
        Ok(())
    }

    fn session_link_id(&self) -> Option<LinkId> {
        self.session.as_ref().map(|s| self.radio.link_id(&s.link))
    }

    /// True when `link` is the pending link or the session's link
    fn holds_link(&self, link: LinkId) -> bool {
        self.session_link_id() == Some(link)
            || self
                .pending_link
                .as_ref()
                .is_some_and(|pending| self.radio.link_id(pending) == link)
    }

    fn connect_outstanding(&self) -> bool {
        self.pending_link.is_some() || self.target.is_some()
    }

    /// Destroys the session and hands back whichever link was held
    fn take_links(&mut self) -> Option<R::Link> {
        self.target = None;
        self.battery_poll.disarm();
        self.session
            .take()
            .map(|s| s.link)
            .or_else(|| self.pending_link.take())
    }

    fn stash_stale(&mut self, link: R::Link) {
        debug_assert!(self.stale_link.is_none(), "stale link was not released");
        self.stale_link = Some(link);
    }

    async fn release_stale_link(&mut self) {
        if let Some(link) = self.stale_link.take() {
            debug!("Releasing stale link");
            self.radio.release_link(link).await;
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!("Connection state: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}
