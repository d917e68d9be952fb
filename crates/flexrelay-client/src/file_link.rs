//! Shared-file transport, client side.
//!
//! Fallback for sites where the stream port cannot be reached but a common
//! filesystem exists. The file's mtime is the freshness signal: a new mtime
//! means a new announcement, an old one feeds the staleness monitor.

use crate::broadcast::Rebroadcaster;
use crate::state::{LinkState, LinkStatus};
use flexrelay_core::config::AppConfig;
use flexrelay_core::error::{ConfigError, Result};
use flexrelay_core::health::{HealthProvider, NoChecks, Report, SweepTimer};
use flexrelay_core::staleness::{StalenessMonitor, Transition};
use flexrelay_proto::{ChangeKind, ChangeTracker, FieldMap, WireFrame};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

pub struct FileLink {
    path: PathBuf,
    check_interval: Duration,
    broadcaster: Rebroadcaster,
    tracker: ChangeTracker,
    staleness: StalenessMonitor,
    status: LinkStatus,
    health: Box<dyn HealthProvider>,
    sweeps: SweepTimer,
    shutdown: Arc<AtomicBool>,
    last_mtime: Option<SystemTime>,
    missing_reported: bool,
}

impl FileLink {
    pub fn new(config: &AppConfig, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let client = &config.client;
        let path = client.shared_file_path.clone().ok_or_else(|| {
            ConfigError::invalid_value("client.shared_file_path", "required for the file transport")
        })?;
        let broadcaster = Rebroadcaster::new(&client.broadcast_address, client.broadcast_port)?;

        Ok(Self {
            path,
            check_interval: client.check_interval(),
            broadcaster,
            tracker: ChangeTracker::new(),
            staleness: StalenessMonitor::new(client.stale_after()),
            status: LinkStatus::new(),
            health: Box::new(NoChecks),
            sweeps: SweepTimer::new(config.diagnostics.enabled, config.diagnostics.interval()),
            shutdown,
            last_mtime: None,
            missing_reported: false,
        })
    }

    pub fn status(&self) -> LinkStatus {
        self.status.clone()
    }

    /// Replaces the default no-op diagnostics provider.
    pub fn set_health(&mut self, health: Box<dyn HealthProvider>) {
        self.health = health;
    }

    /// Polls until the shutdown flag is set.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            path = %self.path.display(),
            broadcast = %self.broadcaster.target(),
            "File link starting"
        );
        self.status.set_state(LinkState::Connected);

        while !self.shutdown.load(Ordering::Relaxed) {
            self.poll_once().await;
            tokio::time::sleep(self.check_interval).await;
        }

        self.status.set_state(LinkState::Disconnected);
        info!("File link stopped");
        Ok(())
    }

    /// One poll of the shared file. Public so the run loop and tests drive
    /// the same code path.
    pub async fn poll_once(&mut self) {
        let now = Instant::now();
        self.diagnostic_sweep(now);

        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                if !self.missing_reported {
                    warn!(path = %self.path.display(), error = %e, "Shared file unavailable");
                    self.missing_reported = true;
                }
                self.check_staleness(now);
                return;
            }
        };
        self.missing_reported = false;

        if self.last_mtime == Some(mtime) {
            self.check_staleness(now);
            return;
        }

        let contents = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Shared file read failed");
                return;
            }
        };

        let line = contents
            .strip_suffix(b"\n")
            .unwrap_or(contents.as_slice());
        let frame = match WireFrame::decode_line(line) {
            Ok(frame) => frame,
            Err(e) => {
                // Possibly a half-written file; mtime stays unrecorded so
                // the next poll retries.
                debug!(path = %self.path.display(), error = %e, "Shared file not parseable yet");
                self.status.record_discard();
                return;
            }
        };
        let packet = match frame.packet_bytes() {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Discarding shared-file frame with bad packet bytes");
                self.status.record_discard();
                return;
            }
        };

        self.last_mtime = Some(mtime);
        self.status.record_frame();

        if let Some(Transition::Recovered { outage }) = self.staleness.observe(now) {
            info!(outage_secs = outage.as_secs(), "Shared file updating again");
        }

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
                    "Radio announced via shared file"
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
                debug!(path = %self.path.display(), "Announcement unchanged");
            }
        }
    }

    fn check_staleness(&mut self, now: Instant) {
        if let Some(Transition::WentStale { idle }) = self.staleness.check(now) {
            warn!(
                path = %self.path.display(),
                idle_secs = idle.as_secs(),
                "Shared file gone stale, radio may be offline"
            );
        }
    }

    /// Runs the health checks when a sweep is due: on the first poll, then
    /// on the configured interval.
    fn diagnostic_sweep(&mut self, now: Instant) {
        if self.sweeps.due(now) {
            Report::new(self.health.run_checks()).log();
        }
    }
}
