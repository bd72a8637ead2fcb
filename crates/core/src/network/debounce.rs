//! Stability window over raw connectivity readings.
//!
//! A reading only becomes the reported status after it has held, unchanged,
//! for the whole window. A reading that reverts to the reported status before
//! the window closes is forgotten, so a short flap produces no event at all.

use std::time::{Duration, Instant};

use checksync_domain::{NetworkQuality, NetworkStatus};

/// Settled connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    BecameOnline { quality: NetworkQuality },
    BecameOffline,
    QualityChanged { from: NetworkQuality, to: NetworkQuality },
}

impl NetworkEvent {
    /// Transition from `from` to `to`, if they differ in a way anyone cares
    /// about.
    #[must_use]
    pub fn between(from: NetworkStatus, to: NetworkStatus) -> Option<Self> {
        match (from.is_online, to.is_online) {
            (false, true) => Some(Self::BecameOnline { quality: to.quality }),
            (true, false) => Some(Self::BecameOffline),
            (true, true) if from.quality != to.quality => {
                Some(Self::QualityChanged { from: from.quality, to: to.quality })
            }
            _ => None,
        }
    }
}

/// Pure debounce state machine; the caller supplies the time.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    reported: NetworkStatus,
    candidate: Option<(NetworkStatus, Instant)>,
}

impl Debouncer {
    #[must_use]
    pub fn new(window: Duration, reported: NetworkStatus) -> Self {
        Self { window, reported: normalize(reported), candidate: None }
    }

    /// Status last reported as settled.
    #[must_use]
    pub const fn reported(&self) -> NetworkStatus {
        self.reported
    }

    /// Feed a raw reading taken at `now`.
    pub fn observe(&mut self, status: NetworkStatus, now: Instant) {
        let status = normalize(status);
        if status == self.reported {
            self.candidate = None;
            return;
        }
        match self.candidate {
            Some((pending, _)) if pending == status => {}
            _ => self.candidate = Some((status, now)),
        }
    }

    /// When the current candidate settles, if there is one.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.candidate.map(|(_, since)| since + self.window)
    }

    /// Promote the candidate if its window has elapsed by `now`.
    pub fn settle(&mut self, now: Instant) -> Option<NetworkEvent> {
        let (status, since) = self.candidate?;
        if now.saturating_duration_since(since) < self.window {
            return None;
        }
        self.candidate = None;
        let event = NetworkEvent::between(self.reported, status);
        self.reported = status;
        event
    }
}

fn normalize(status: NetworkStatus) -> NetworkStatus {
    if status.is_online {
        status
    } else {
        NetworkStatus::offline()
    }
}
