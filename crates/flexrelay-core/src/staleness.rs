//! Edge-triggered staleness detection for a packet source.
//!
//! Both relay sides run one of these: the server against the capture
//! socket, the client against its stream (or the shared file's mtime).
//! `Instant`s are passed in rather than sampled internally so tests can
//! drive a simulated clock.

use std::time::{Duration, Instant};

/// Default threshold: no packet for this long means the source went quiet.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// State transition reported by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The source crossed the threshold. Reported exactly once per quiet
    /// episode.
    WentStale { idle: Duration },
    /// A packet arrived after the source had been declared stale.
    Recovered { outage: Duration },
}

/// Watches the gap between packet arrivals.
#[derive(Debug)]
pub struct StalenessMonitor {
    threshold: Duration,
    last_seen: Option<Instant>,
    stale: bool,
}

impl StalenessMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_seen: None,
            stale: false,
        }
    }

    /// Records a packet arrival. Returns `Recovered` when this arrival
    /// ends a stale episode.
    pub fn observe(&mut self, now: Instant) -> Option<Transition> {
        let previous = self.last_seen.replace(now);
        if self.stale {
            self.stale = false;
            let outage = previous
                .map(|last| now.saturating_duration_since(last))
                .unwrap_or_default();
            return Some(Transition::Recovered { outage });
        }
        None
    }

    /// Periodic poll. Returns `WentStale` the first time the idle gap
    /// crosses the threshold; subsequent polls in the same episode return
    /// `None`. A monitor that has never seen a packet is not stale.
    pub fn check(&mut self, now: Instant) -> Option<Transition> {
        let last = self.last_seen?;
        if self.stale {
            return None;
        }
        let idle = now.saturating_duration_since(last);
        if idle >= self.threshold {
            self.stale = true;
            return Some(Transition::WentStale { idle });
        }
        None
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Idle time at the given instant, if any packet has ever arrived.
    pub fn idle(&self, now: Instant) -> Option<Duration> {
        self.last_seen
            .map(|last| now.saturating_duration_since(last))
    }
}

impl Default for StalenessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}
