//! The relay link: a reconnecting TCP client that turns stream frames back
//! into local discovery broadcasts.
//!
//! The link is a four-state machine (Disconnected, Connecting, Connected,
//! Reconnecting). While connected, the short read timeout doubles as the
//! scheduling point for staleness checks, status lines, and diagnostic
//! sweeps, so no periodic work depends on traffic arriving.

use crate::broadcast::Rebroadcaster;
use crate::state::{LinkState, LinkStatus};
use flexrelay_core::config::{AppConfig, ClientSection};
use flexrelay_core::error::Result;
use flexrelay_core::health::{HealthProvider, NoChecks, Report, SweepTimer};
use flexrelay_core::staleness::{StalenessMonitor, Transition};
use flexrelay_proto::{ChangeKind, ChangeTracker, FieldMap, FrameReassembler, WireFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;

/// How often the idle status line is emitted while connected.
const STATUS_LINE_INTERVAL: Duration = Duration::from_secs(10);

pub struct RelayLink {
    config: ClientSection,
    broadcaster: Rebroadcaster,
    reassembler: FrameReassembler,
    tracker: ChangeTracker,
    staleness: StalenessMonitor,
    status: LinkStatus,
    health: Box<dyn HealthProvider>,
    sweeps: SweepTimer,
    shutdown: Arc<AtomicBool>,
    /// Failure kind last reported; repeats of the same kind log at debug.
    last_failure: Option<String>,
    /// Hex of the last rebroadcast packet, for duplicate console suppression.
    last_packet_hex: Option<String>,
    last_status_line: Instant,
    /// Reassembler oversize count already reported.
    oversized_seen: u64,
}

impl RelayLink {
    pub fn new(config: &AppConfig, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let client = config.client.clone();
        let broadcaster = Rebroadcaster::new(&client.broadcast_address, client.broadcast_port)?;
        let staleness = StalenessMonitor::new(client.stale_after());

        Ok(Self {
            config: client,
            broadcaster,
            reassembler: FrameReassembler::new(),
            tracker: ChangeTracker::new(),
            staleness,
            status: LinkStatus::new(),
            health: Box::new(NoChecks),
            sweeps: SweepTimer::new(config.diagnostics.enabled, config.diagnostics.interval()),
            shutdown,
            last_failure: None,
            last_packet_hex: None,
            last_status_line: Instant::now(),
            oversized_seen: 0,
        })
    }

    /// Shared status handle for diagnostics providers.
    pub fn status(&self) -> LinkStatus {
        self.status.clone()
    }

    /// Replaces the default no-op diagnostics provider.
    pub fn set_health(&mut self, health: Box<dyn HealthProvider>) {
        self.health = health;
    }

    /// Runs the state machine until the shutdown flag is set.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            server = %self.config.server_address,
            broadcast = %self.broadcaster.target(),
            "Relay link starting"
        );
        self.diagnostic_sweep();

        let mut first_attempt = true;
        while !self.shutdown.load(Ordering::Relaxed) {
            self.status.set_state(if first_attempt {
                LinkState::Connecting
            } else {
                LinkState::Reconnecting
            });
            if !first_attempt {
                self.status.record_reconnect();
            }
            first_attempt = false;

            let Some(mut stream) = self.connect().await else {
                self.reconnect_delay().await;
                continue;
            };

            self.status.set_state(LinkState::Connected);
            self.last_failure = None;
            // A fresh connection must never inherit half a line.
            self.reassembler.clear();

            self.serve(&mut stream).await;
            self.status.set_state(LinkState::Disconnected);

            if !self.shutdown.load(Ordering::Relaxed) {
                self.reconnect_delay().await;
            }
        }

        info!("Relay link stopped");
        Ok(())
    }

    async fn connect(&mut self) -> Option<TcpStream> {
        let address = self.config.server_address.clone();
        match timeout(self.config.connect_timeout(), TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => {
                info!(server = %address, "Connected to relay server");
                Some(stream)
            }
            Ok(Err(e)) => {
                self.report_failure(format!("{:?}", e.kind()), &e.to_string());
                None
            }
            Err(_) => {
                self.report_failure(
                    "ConnectTimeout".to_string(),
                    &format!("no answer within {}s", self.config.connect_timeout_secs),
                );
                None
            }
        }
    }

    /// One warn per distinct failure kind; an unreachable server retrying
    /// every few seconds must not flood the log.
    fn report_failure(&mut self, kind: String, detail: &str) {
        if self.last_failure.as_deref() == Some(kind.as_str()) {
            debug!(server = %self.config.server_address, detail, "Connect failed (repeat)");
        } else {
            warn!(server = %self.config.server_address, kind = %kind, detail, "Connect failed");
            self.last_failure = Some(kind);
        }
    }

    async fn reconnect_delay(&self) {
        tokio::time::sleep(self.config.reconnect_interval()).await;
    }

    /// Inner receive loop; returns when the connection dies or shutdown is
    /// requested.
    async fn serve(&mut self, stream: &mut TcpStream) {
        let mut buf = [0u8; READ_CHUNK];
        while !self.shutdown.load(Ordering::Relaxed) {
            match timeout(self.config.read_timeout(), stream.read(&mut buf)).await {
                Err(_) => self.periodic_work(),
                Ok(Ok(0)) => {
                    info!("Relay server closed the connection");
                    return;
                }
                Ok(Ok(n)) => {
                    self.reassembler.extend(&buf[..n]);
                    while let Some(line) = self.reassembler.next_line() {
                        self.handle_line(&line).await;
                    }
                    let oversized = self.reassembler.oversized();
                    if oversized > self.oversized_seen {
                        warn!(
                            dropped = oversized - self.oversized_seen,
                            "Discarded oversized data from desynced stream"
                        );
                        self.status.record_discard();
                        self.oversized_seen = oversized;
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Read error, dropping connection");
                    return;
                }
            }
        }
    }

    /// One complete frame line. Every decode failure condemns only this
    /// frame; the connection stays up.
    async fn handle_line(&mut self, line: &[u8]) {
        self.status.record_frame();

        let frame = match WireFrame::decode_line(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, size = line.len(), "Discarding malformed frame");
                self.status.record_discard();
                return;
            }
        };
        let packet = match frame.packet_bytes() {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Discarding frame with bad packet bytes");
                self.status.record_discard();
                return;
            }
        };

        if let Some(Transition::Recovered { outage }) = self.staleness.observe(Instant::now()) {
            info!(outage_secs = outage.as_secs(), "Packets flowing again");
        }

        // The raw bytes are rebroadcast for every frame, changed or not;
        // SmartSDR relies on the steady cadence.
        match self.broadcaster.send(&packet).await {
            Ok(()) => self.status.record_broadcast(),
            Err(e) => warn!(error = %e, "Rebroadcast failed"),
        }

        let fields: FieldMap = frame
            .parsed_payload
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        match self.tracker.observe(&fields) {
            ChangeKind::Initial => {
                info!(
                    model = %frame.radio_info.model,
                    serial = %frame.radio_info.serial,
                    ip = %frame.radio_info.ip,
                    nickname = %frame.radio_info.nickname,
                    status = %frame.radio_info.status,
                    server_version = %frame.server_version,
                    "Radio announced via relay"
                );
            }
            ChangeKind::Changed(diff) => {
                for change in &diff {
                    info!(
                        key = %change.key,
                        old = change.old.as_deref().unwrap_or("-"),
                        new = change.new.as_deref().unwrap_or("-"),
                        "Radio field changed"
                    );
                }
            }
            ChangeKind::Unchanged => {
                if self.last_packet_hex.as_deref() != Some(frame.packet_hex.as_str()) {
                    debug!(source = %frame.source_ip, "Announcement repeated with new bytes");
                }
            }
        }
        self.last_packet_hex = Some(frame.packet_hex);
        self.last_status_line = Instant::now();
    }

    /// Runs on every read timeout while connected.
    fn periodic_work(&mut self) {
        let now = Instant::now();

        if let Some(Transition::WentStale { idle }) = self.staleness.check(now) {
            warn!(
                idle_secs = idle.as_secs(),
                threshold_secs = self.config.stale_after_secs,
                "No frames from relay server, radio may be offline"
            );
        }

        if now.duration_since(self.last_status_line) >= STATUS_LINE_INTERVAL {
            self.last_status_line = now;
            info!(
                frames = self.status.frames_received(),
                idle_secs = self.staleness.idle(now).map(|d| d.as_secs()).unwrap_or(0),
                "Waiting for packets"
            );
        }

        self.diagnostic_sweep();
    }

    /// Runs the health checks when a sweep is due: at startup, then on the
    /// configured interval.
    fn diagnostic_sweep(&mut self) {
        if self.sweeps.due(Instant::now()) {
            Report::new(self.health.run_checks()).log();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexrelay_proto::{Announcement, Captured, Synthesizer};
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, UdpSocket};

    fn sample_line() -> (Vec<u8>, bytes::Bytes) {
        let mut synth = Synthesizer::new();
        let fields: FieldMap = [("model", "FLEX-6600M"), ("serial", "0715")]
            .into_iter()
            .collect();
        let packet = synth.encode_at(&fields, 1_700_000_000);
        let ann = Announcement::decode(packet.clone()).unwrap();
        let frame = WireFrame::from_captured(
            &Captured::new(ann, "10.0.0.9:4992".parse().unwrap()),
            "test",
        );
        (frame.encode_line().unwrap(), packet)
    }

    #[tokio::test]
    async fn recovers_and_rebroadcasts_packets() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let broadcast_port = receiver.local_addr().unwrap().port();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = listener.local_addr().unwrap();

        let (line, packet) = sample_line();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Split the line across two writes; reassembly must cope.
            let (a, b) = line.split_at(line.len() / 2);
            stream.write_all(a).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            stream.write_all(b).await.unwrap();
            // Hold the connection open until the test ends.
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut config = AppConfig::default();
        config.client.server_address = server_addr.to_string();
        config.client.broadcast_address = "127.0.0.1".to_string();
        config.client.broadcast_port = broadcast_port;
        config.client.read_timeout_secs = 1;

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut link = RelayLink::new(&config, Arc::clone(&shutdown)).unwrap();
        let status = link.status();
        let link_task = tokio::spawn(async move { link.run().await });

        let mut buf = [0u8; 2048];
        let (n, _) = timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
            .await
            .expect("rebroadcast expected")
            .unwrap();
        assert_eq!(&buf[..n], &packet[..]);
        assert_eq!(status.frames_received(), 1);
        assert_eq!(status.packets_broadcast(), 1);

        shutdown.store(true, Ordering::Relaxed);
        let _ = timeout(Duration::from_secs(5), link_task).await;
    }

    #[tokio::test]
    async fn malformed_frame_does_not_kill_the_link() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let broadcast_port = receiver.local_addr().unwrap().port();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = listener.local_addr().unwrap();

        let (line, packet) = sample_line();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"{broken json\n").await.unwrap();
            stream.write_all(&line).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut config = AppConfig::default();
        config.client.server_address = server_addr.to_string();
        config.client.broadcast_address = "127.0.0.1".to_string();
        config.client.broadcast_port = broadcast_port;
        config.client.read_timeout_secs = 1;

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut link = RelayLink::new(&config, Arc::clone(&shutdown)).unwrap();
        let status = link.status();
        let link_task = tokio::spawn(async move { link.run().await });

        // The valid frame behind the garbage still comes through.
        let mut buf = [0u8; 2048];
        let (n, _) = timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
            .await
            .expect("rebroadcast expected")
            .unwrap();
        assert_eq!(&buf[..n], &packet[..]);
        assert_eq!(status.frames_discarded(), 1);

        shutdown.store(true, Ordering::Relaxed);
        let _ = timeout(Duration::from_secs(5), link_task).await;
    }
}
