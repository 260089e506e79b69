//! Fixed-delay retry gating
//! There is no give-up state: after every failure the scheduler only decides
//! *when* the next scan may start, never *whether*.

use std::time::{Duration, Instant};

/// One-shot coarse timer checked from the tick loop
#[derive(Debug, Clone)]
pub struct CoarseTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl CoarseTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fires `interval` after `now`
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    /// Fires on the next check
    pub fn expire(&mut self, now: Instant) {
        self.deadline = Some(now);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Armed and the deadline has been reached
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Armed and still waiting
    pub fn is_pending(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now < deadline)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .filter(|deadline| now < *deadline)
            .map(|deadline| deadline - now)
    }
}

/// Gates rescans behind the rescan delay and the reconnect backoff
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    rescan: CoarseTimer,
    reconnect: CoarseTimer,
}

impl RetryScheduler {
    pub fn new(rescan_delay: Duration, reconnect_backoff: Duration) -> Self {
        Self {
            rescan: CoarseTimer::new(rescan_delay),
            reconnect: CoarseTimer::new(reconnect_backoff),
        }
    }

    pub fn rescan_delay(&self) -> Duration {
        self.rescan.interval()
    }

    pub fn reconnect_backoff(&self) -> Duration {
        self.reconnect.interval()
    }

    /// After a scan that found nothing
    pub fn arm_rescan(&mut self, now: Instant) {
        self.rescan.arm(now);
    }

    /// After a failed connect, forced disconnect or dropped link
    pub fn arm_reconnect(&mut self, now: Instant) {
        self.reconnect.arm(now);
    }

    /// True when no timer is pending and neither a scan nor a connect is
    /// outstanding.
    pub fn may_scan(&self, now: Instant, scanning: bool, connecting: bool) -> bool {
        !scanning && !connecting && !self.rescan.is_pending(now) && !self.reconnect.is_pending(now)
    }

    /// Longest remaining wait before a scan is allowed
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match (self.rescan.remaining(now), self.reconnect.remaining(now)) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Clears both timers once a scan has actually started
    pub fn on_scan_started(&mut self) {
        self.rescan.disarm();
        self.reconnect.disarm();
    }
}
