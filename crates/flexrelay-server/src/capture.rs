//! UDP capture source for discovery broadcasts.
//!
//! Sits on the segment the radio broadcasts on and turns valid datagrams
//! into [`Captured`] announcements. Receives run on a short timeout so the
//! caller's loop gets back control at least once a second for staleness and
//! health work.

use bytes::Bytes;
use flexrelay_core::error::{Result, TransportError};
use flexrelay_proto::{Announcement, Captured};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Largest datagram we accept; discovery packets are a few hundred bytes.
const RECV_BUFFER_SIZE: usize = 2048;

/// How long one receive call blocks before yielding an idle cycle.
const IDLE_CYCLE: Duration = Duration::from_secs(1);

/// Capture statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    /// Datagrams received, valid or not
    pub datagrams: u64,
    /// Datagrams that passed the discovery header check
    pub announcements: u64,
    /// Datagrams rejected by the header check
    pub rejected: u64,
    /// Receive calls that returned a socket error
    pub recv_errors: u64,
}

/// Bound UDP socket listening for discovery broadcasts.
pub struct CaptureSource {
    socket: UdpSocket,
    datagrams: AtomicU64,
    announcements: AtomicU64,
    rejected: AtomicU64,
    recv_errors: AtomicU64,
}

impl CaptureSource {
    /// Binds the capture socket with SO_REUSEADDR so a SmartSDR instance on
    /// the same host can keep its own discovery listener.
    ///
    /// # Errors
    ///
    /// Bind failures are fatal to the server; there is nothing to relay
    /// without the capture socket.
    pub fn bind(address: &str) -> Result<Self> {
        let addr: SocketAddr = address.parse().map_err(|e| {
            TransportError::bind_failed(address, format!("invalid address: {e}"))
        })?;

        let bind = || -> std::io::Result<UdpSocket> {
            let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
            socket.set_reuse_address(true)?;
            socket.set_nonblocking(true)?;
            socket.bind(&addr.into())?;
            UdpSocket::from_std(socket.into())
        };

        let socket =
            bind().map_err(|e| TransportError::bind_failed(address, e.to_string()))?;

        info!(address = %addr, "Capture socket bound");

        Ok(Self {
            socket,
            datagrams: AtomicU64::new(0),
            announcements: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
        })
    }

    /// Waits up to one idle cycle for a discovery announcement.
    ///
    /// Returns `None` when the cycle elapsed without a valid packet:
    /// nothing arrived, what arrived failed the header check, or the
    /// receive call itself errored. Runtime socket errors are logged and
    /// counted; only the initial bind is fatal. Foreign broadcasts are
    /// common on port 4992 and are discarded without ceremony.
    pub async fn recv(&self) -> Option<Captured> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        let (len, source) = match timeout(IDLE_CYCLE, self.socket.recv_from(&mut buf)).await {
            Err(_) => return None,
            Ok(Err(e)) => {
                self.recv_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Capture receive failed");
                return None;
            }
            Ok(Ok(received)) => received,
        };

        self.datagrams.fetch_add(1, Ordering::Relaxed);

        let raw = Bytes::copy_from_slice(&buf[..len]);
        match Announcement::decode(raw) {
            Ok(announcement) => {
                self.announcements.fetch_add(1, Ordering::Relaxed);
                Some(Captured::new(announcement, source))
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(source = %source, size = len, error = %e, "Discarding foreign datagram");
                None
            }
        }
    }

    /// Local address the socket actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            announcements: self.announcements.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub(crate) fn socket(&self) -> &UdpSocket {
        &self.socket
    }
}
