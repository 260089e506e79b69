//! Defines shared data structures for the Bluetooth module.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

/// A single advertisement seen during a scan.
///
/// Ephemeral: produced by the scanner, consumed once by the connection
/// manager and then discarded.
#[derive(Debug, Clone)]
pub struct ScanResult<P> {
    /// The advertised name, if the advertisement carried one
    pub name: Option<String>,
    /// The address of the device (MAC address where the platform exposes it)
    pub address: String,
    /// The signal strength (RSSI) of the advertisement
    pub rssi: Option<i16>,
    /// Connectable reference to the device
    pub peer: P,
}

impl<P> ScanResult<P> {
    /// Returns true if the advertised name is exactly `target`
    pub fn matches(&self, target: &str) -> bool {
        self.name.as_deref() == Some(target)
    }
}

/// Parameters of one discovery scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanParams {
    pub window_ms: u32,
    pub interval_ms: u32,
    pub duration: Duration,
    pub active: bool,
}

/// Lifecycle state of the single managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    ResolvingServices,
    Ready,
    /// The session is gone and its link is waiting to be released.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::ResolvingServices => "resolving-services",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Identity of one link handle, unique for the lifetime of a radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Signals raised by the radio stack.
///
/// Senders only enqueue these; all work happens when the tick loop drains
/// the queue. Link events name the link they came from, so late events of a
/// released link can be told apart from those of the live one.
#[derive(Debug, Clone)]
pub enum RadioEvent<P> {
    ScanResult(ScanResult<P>),
    ScanComplete,
    Connected {
        link: LinkId,
    },
    Disconnected {
        link: LinkId,
    },
    Notification {
        link: LinkId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// Subset of GATT characteristic properties the resolver cares about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub notify: bool,
}

/// Which of the two band capabilities a characteristic serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicRole {
    Battery,
    HeartRate,
}

/// A characteristic handle tied to the session that resolved it.
///
/// Once that session is destroyed the handle is rejected by the
/// connection manager even if the underlying object is still alive.
#[derive(Debug, Clone)]
pub struct CharacteristicHandle<C> {
    pub(crate) session_id: u64,
    pub(crate) role: CharacteristicRole,
    pub(crate) inner: C,
}

impl<C> CharacteristicHandle<C> {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn role(&self) -> CharacteristicRole {
        self.role
    }
}

/// The live connection plus its resolved characteristics.
///
/// At most one exists at a time; it is built on a successful connect and
/// resolve and dropped as a whole on disconnect.
pub struct Session<L, C> {
    pub(crate) id: u64,
    /// The link handle, used for liveness checks and disconnecting.
    pub(crate) link: L,
    /// Battery level characteristic, readable.
    pub(crate) battery: Option<CharacteristicHandle<C>>,
    /// Heart-rate measurement characteristic, subscribed.
    pub(crate) heart_rate: Option<CharacteristicHandle<C>>,
}

impl<L, C> Session<L, C> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn has_battery(&self) -> bool {
        self.battery.is_some()
    }

    pub fn has_heart_rate(&self) -> bool {
        self.heart_rate.is_some()
    }
}
