//! Client-side diagnostic checks.

use crate::state::{LinkState, LinkStatus};
use flexrelay_core::{CheckResult, HealthProvider};

/// Checks run from the link's diagnostic sweeps.
pub struct ClientChecks {
    status: LinkStatus,
}

impl ClientChecks {
    pub fn new(status: LinkStatus) -> Self {
        Self { status }
    }

    fn check_link(&self) -> CheckResult {
        match self.status.state() {
            LinkState::Connected => {
                let uptime = self
                    .status
                    .connection_duration()
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                CheckResult::pass("link", format!("connected for {uptime}s"))
            }
            state => CheckResult::warn("link", format!("link is {state}")),
        }
    }

    fn check_traffic(&self) -> CheckResult {
        let received = self.status.frames_received();
        let discarded = self.status.frames_discarded();
        if received == 0 {
            CheckResult::warn("traffic", "no frames received yet")
        } else if discarded * 10 > received {
            CheckResult::warn(
                "traffic",
                format!("{discarded} of {received} frames discarded"),
            )
        } else {
            CheckResult::pass(
                "traffic",
                format!(
                    "{received} frames received, {} rebroadcast",
                    self.status.packets_broadcast()
                ),
            )
        }
    }
}

impl HealthProvider for ClientChecks {
    fn run_checks(&mut self) -> Vec<CheckResult> {
        vec![self.check_link(), self.check_traffic()]
    }
}
