//! Server-side diagnostic checks.

use crate::hub::RelayHub;
use flexrelay_core::{CheckResult, HealthProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Checks run from the server loop's diagnostic sweeps.
pub struct ServerChecks {
    hub: Arc<RelayHub>,
    shared_file: Option<PathBuf>,
    stale_after: Duration,
}

impl ServerChecks {
    pub fn new(hub: Arc<RelayHub>, shared_file: Option<PathBuf>, stale_after: Duration) -> Self {
        Self {
            hub,
            shared_file,
            stale_after,
        }
    }

    fn check_consumers(&self) -> CheckResult {
        let stats = self.hub.stats();
        if stats.active == 0 {
            CheckResult::warn("relay-clients", "no relay clients connected")
        } else {
            CheckResult::pass(
                "relay-clients",
                format!("{} connected, {} accepted total", stats.active, stats.accepted),
            )
        }
    }

    fn check_shared_file(&self) -> CheckResult {
        let Some(path) = &self.shared_file else {
            return CheckResult::skip("shared-file", "file transport not configured");
        };

        let started = Instant::now();
        let result = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Err(e) => CheckResult::fail("shared-file", format!("{}: {e}", path.display())),
            Ok(modified) => match modified.elapsed() {
                Ok(age) if age > self.stale_after => CheckResult::warn(
                    "shared-file",
                    format!("{} not updated for {}s", path.display(), age.as_secs()),
                ),
                _ => CheckResult::pass("shared-file", format!("{} fresh", path.display())),
            },
        };
        result.with_latency(started.elapsed())
    }
}

impl HealthProvider for ServerChecks {
    fn run_checks(&mut self) -> Vec<CheckResult> {
        vec![self.check_consumers(), self.check_shared_file()]
    }
}
