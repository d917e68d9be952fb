//! Link state and metrics shared between the link loop and diagnostics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Connection state of the relay link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// Not connected, no attempt in flight
    Disconnected,
    /// First connection attempt in flight
    Connecting,
    /// Receiving frames
    Connected,
    /// Waiting out the reconnect delay after a failure
    Reconnecting,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "Disconnected"),
            LinkState::Connecting => write!(f, "Connecting"),
            LinkState::Connected => write!(f, "Connected"),
            LinkState::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// Shared, cheaply clonable link status. The link loop writes, diagnostics
/// read.
#[derive(Debug, Clone)]
pub struct LinkStatus {
    state: Arc<parking_lot::RwLock<LinkState>>,
    frames_received: Arc<AtomicU64>,
    packets_broadcast: Arc<AtomicU64>,
    frames_discarded: Arc<AtomicU64>,
    reconnect_attempts: Arc<AtomicUsize>,
    connected_at: Arc<parking_lot::RwLock<Option<Instant>>>,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStatus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(parking_lot::RwLock::new(LinkState::Disconnected)),
            frames_received: Arc::new(AtomicU64::new(0)),
            packets_broadcast: Arc::new(AtomicU64::new(0)),
            frames_discarded: Arc::new(AtomicU64::new(0)),
            reconnect_attempts: Arc::new(AtomicUsize::new(0)),
            connected_at: Arc::new(parking_lot::RwLock::new(None)),
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state.read()
    }

    pub fn set_state(&self, state: LinkState) {
        *self.state.write() = state;
        match state {
            LinkState::Connected => {
                *self.connected_at.write() = Some(Instant::now());
                self.reconnect_attempts.store(0, Ordering::Relaxed);
            }
            LinkState::Disconnected | LinkState::Reconnecting => {
                *self.connected_at.write() = None;
            }
            LinkState::Connecting => {}
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), LinkState::Connected)
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.packets_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn packets_broadcast(&self) -> u64 {
        self.packets_broadcast.load(Ordering::Relaxed)
    }

    pub fn frames_discarded(&self) -> u64 {
        self.frames_discarded.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> usize {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn connection_duration(&self) -> Option<Duration> {
        self.connected_at.read().map(|t| t.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(LinkState::Connected.to_string(), "Connected");
        assert_eq!(LinkState::Reconnecting.to_string(), "Reconnecting");
    }

    #[test]
    fn connecting_resets_counters_on_success() {
        let status = LinkStatus::new();
        status.record_reconnect();
        status.record_reconnect();
        assert_eq!(status.reconnect_attempts(), 2);

        status.set_state(LinkState::Connected);
        assert!(status.is_connected());
        assert_eq!(status.reconnect_attempts(), 0);
        assert!(status.connection_duration().is_some());

        status.set_state(LinkState::Reconnecting);
        assert!(status.connection_duration().is_none());
    }

    #[test]
    fn counters_accumulate() {
        let status = LinkStatus::new();
        status.record_frame();
        status.record_frame();
        status.record_broadcast();
        status.record_discard();
        assert_eq!(status.frames_received(), 2);
        assert_eq!(status.packets_broadcast(), 1);
        assert_eq!(status.frames_discarded(), 1);
    }
}
