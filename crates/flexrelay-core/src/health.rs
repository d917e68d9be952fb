//! Health-check reporting contract.
//!
//! The relay loops run periodic diagnostic sweeps; what gets checked is
//! supplied from outside through [`HealthProvider`]. The server and client
//! binaries plug in different providers, the reporting shape is shared.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Check succeeded
    Pass,
    /// Check succeeded with a caveat worth surfacing
    Warn,
    /// Check failed
    Fail,
    /// Check did not apply in the current configuration
    Skip,
}

/// Result of one named check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    /// Optional multi-line detail for the log
    pub detail: Option<String>,
    /// How long the check took, when measured
    pub latency: Option<Duration>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            detail: None,
            latency: None,
        }
    }

    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Pass, message)
    }

    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warn, message)
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Fail, message)
    }

    pub fn skip(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Skip, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// Source of diagnostic checks.
///
/// Implementations are selected once at construction; the relay loops only
/// ever call `run_checks` and log the resulting report.
pub trait HealthProvider: Send + Sync {
    /// Runs every configured check and returns one result per check.
    fn run_checks(&mut self) -> Vec<CheckResult>;
}

/// A full diagnostic sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub results: Vec<CheckResult>,
}

impl Report {
    pub fn new(results: Vec<CheckResult>) -> Self {
        Self { results }
    }

    /// Worst status across all checks. Skips don't count against health;
    /// an all-skip (or empty) report is a pass.
    pub fn overall(&self) -> CheckStatus {
        let mut overall = CheckStatus::Pass;
        for result in &self.results {
            match result.status {
                CheckStatus::Fail => return CheckStatus::Fail,
                CheckStatus::Warn => overall = CheckStatus::Warn,
                CheckStatus::Pass | CheckStatus::Skip => {}
            }
        }
        overall
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results
            .iter()
            .filter(|r| r.status == CheckStatus::Fail)
    }

    /// Logs the sweep outcome: every failure at warn, warnings and clean
    /// sweeps as one summary line.
    pub fn log(&self) {
        match self.overall() {
            CheckStatus::Fail => {
                for failure in self.failures() {
                    warn!(check = %failure.name, message = %failure.message, "Diagnostic check failed");
                }
            }
            CheckStatus::Warn => {
                info!(checks = self.results.len(), "Diagnostics: warnings present");
            }
            _ => debug!(checks = self.results.len(), "Diagnostics clean"),
        }
    }
}

/// Decides when a diagnostic sweep is due: once at startup, then once per
/// interval. Instants are passed in so tests can drive a simulated clock.
#[derive(Debug)]
pub struct SweepTimer {
    enabled: bool,
    interval: Duration,
    last: Option<Instant>,
}

impl SweepTimer {
    pub fn new(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval,
            last: None,
        }
    }

    /// Returns whether a sweep should run now, and marks it as run.
    pub fn due(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last {
            None => {
                self.last = Some(now);
                true
            }
            Some(last) if now.saturating_duration_since(last) >= self.interval => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

/// Provider used when diagnostics are disabled.
#[derive(Debug, Default)]
pub struct NoChecks;

impl HealthProvider for NoChecks {
    fn run_checks(&mut self) -> Vec<CheckResult> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_is_worst_status() {
        let report = Report::new(vec![
            CheckResult::pass("socket", "bound"),
            CheckResult::warn("disk", "82% full"),
            CheckResult::skip("file-transport", "not configured"),
        ]);
        assert_eq!(report.overall(), CheckStatus::Warn);

        let report = Report::new(vec![
            CheckResult::pass("socket", "bound"),
            CheckResult::fail("upstream", "unreachable"),
        ]);
        assert_eq!(report.overall(), CheckStatus::Fail);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn empty_report_passes() {
        assert_eq!(Report::new(Vec::new()).overall(), CheckStatus::Pass);
    }

    #[test]
    fn no_checks_provider_is_empty() {
        let mut provider = NoChecks;
        assert!(provider.run_checks().is_empty());
    }

    #[test]
    fn first_sweep_is_due_immediately() {
        let mut timer = SweepTimer::new(true, Duration::from_secs(60));
        let start = Instant::now();
        assert!(timer.due(start));
        assert!(!timer.due(start + Duration::from_secs(59)));
        assert!(timer.due(start + Duration::from_secs(60)));
        assert!(!timer.due(start + Duration::from_secs(61)));
    }

    #[test]
    fn disabled_timer_is_never_due() {
        let mut timer = SweepTimer::new(false, Duration::from_secs(60));
        assert!(!timer.due(Instant::now()));
    }

    #[test]
    fn builder_attaches_detail_and_latency() {
        let result = CheckResult::pass("ping", "2ms")
            .with_detail("64 bytes from 10.0.0.5")
            .with_latency(Duration::from_millis(2));
        assert!(result.detail.is_some());
        assert_eq!(result.latency, Some(Duration::from_millis(2)));
    }
}
