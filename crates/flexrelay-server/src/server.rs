//! Server orchestration: capture, classify, fan out.

use crate::capture::CaptureSource;
use crate::file_sink::SharedFileSink;
use crate::hub::RelayHub;
use flexrelay_core::config::{AppConfig, ServerSection};
use flexrelay_core::error::Result;
use flexrelay_core::health::{HealthProvider, NoChecks, Report, SweepTimer};
use flexrelay_core::staleness::{StalenessMonitor, Transition};
use flexrelay_proto::{hex_dump, Captured, ChangeKind, ChangeTracker, WireFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The relay server: one capture socket, one fan-out hub, optionally one
/// shared-file sink. Single control loop; the hub's accept task is the only
/// other task.
pub struct RelayServer {
    config: ServerSection,
    capture: CaptureSource,
    hub: Arc<RelayHub>,
    file_sink: Option<SharedFileSink>,
    staleness: StalenessMonitor,
    tracker: ChangeTracker,
    health: Box<dyn HealthProvider>,
    sweeps: SweepTimer,
    shutdown: Arc<AtomicBool>,
    version: String,
    packets_seen: u64,
}

impl RelayServer {
    /// Binds the capture socket and assembles the server. Bind failures
    /// here are fatal; everything after startup degrades instead of dying.
    pub fn new(config: &AppConfig, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let server = config.server.clone();
        let capture = CaptureSource::bind(&server.capture_address())?;
        let hub = RelayHub::new(server.max_clients, Arc::clone(&shutdown));
        let file_sink = server
            .shared_file_path
            .clone()
            .map(|path| SharedFileSink::new(path, server.update_interval()));
        let staleness = StalenessMonitor::new(server.stale_after());

        Ok(Self {
            config: server,
            capture,
            hub,
            file_sink,
            staleness,
            tracker: ChangeTracker::new(),
            health: Box::new(NoChecks),
            sweeps: SweepTimer::new(config.diagnostics.enabled, config.diagnostics.interval()),
            shutdown,
            version: env!("CARGO_PKG_VERSION").to_string(),
            packets_seen: 0,
        })
    }

    /// Handle on the hub, for wiring up diagnostics providers.
    pub fn hub(&self) -> Arc<RelayHub> {
        Arc::clone(&self.hub)
    }

    /// Replaces the default no-op diagnostics provider.
    pub fn set_health(&mut self, health: Box<dyn HealthProvider>) {
        self.health = health;
    }

    /// Runs until the shutdown flag is set.
    ///
    /// Every pass through the loop is bounded by the capture socket's
    /// one-second receive cycle, so staleness checks, consumer pruning, and
    /// diagnostic sweeps never wait on traffic.
    pub async fn run(&mut self) -> Result<()> {
        let (stream_addr, accept_task) = self.hub.start(&self.config.stream_address()).await?;
        info!(
            capture = %self.config.capture_address(),
            stream = %stream_addr,
            version = %self.version,
            "Relay server running"
        );
        self.diagnostic_sweep();

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.capture.recv().await {
                Some(captured) => self.handle_packet(captured).await,
                None => self.idle_work().await,
            }
        }

        info!("Shutdown requested, stopping relay server");
        let _ = accept_task.await;
        Ok(())
    }

    async fn handle_packet(&mut self, captured: Captured) {
        self.packets_seen += 1;
        if let Some(Transition::Recovered { outage }) = self.staleness.observe(captured.monotonic)
        {
            info!(outage_secs = outage.as_secs(), "Radio back online");
        }

        match self.tracker.observe(captured.announcement.fields()) {
            ChangeKind::Initial => {
                let summary = captured
                    .announcement
                    .summary(&captured.source.ip().to_string());
                info!(
                    model = %summary.model,
                    serial = %summary.serial,
                    ip = %summary.ip,
                    nickname = %summary.nickname,
                    status = %summary.status,
                    "Radio discovered"
                );
                debug!("\n{}", hex_dump(captured.announcement.raw()));
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
                debug!("\n{}", hex_dump(captured.announcement.raw()));
            }
            ChangeKind::Unchanged => {
                debug!(source = %captured.source, "Announcement unchanged");
            }
        }

        let mut frame = WireFrame::from_captured(&captured, &self.version);
        frame.packet_count = self.packets_seen;
        let line = match frame.encode_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize frame, dropping packet");
                return;
            }
        };

        let delivered = self.hub.publish(&line).await;
        debug!(delivered, size = line.len(), "Frame published");

        if let Some(sink) = &mut self.file_sink {
            if let Err(e) = sink.write(&frame, Instant::now()) {
                warn!(error = %e, "Shared file update failed");
            }
        }
    }

    /// Housekeeping run when a receive cycle comes back empty.
    async fn idle_work(&mut self) {
        if let Some(Transition::WentStale { idle }) = self.staleness.check(Instant::now()) {
            warn!(
                idle_secs = idle.as_secs(),
                threshold_secs = self.config.stale_after_secs,
                "No discovery packets, radio may be offline"
            );
        }

        self.hub.prune_dead_consumers().await;
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
