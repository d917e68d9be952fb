//! Server side of the FlexRelay discovery relay: captures broadcasts on the
//! radio's segment and fans them out to remote relay clients.

pub mod capture;
pub mod diagnostics;
pub mod file_sink;
pub mod hub;
pub mod server;

pub use capture::{CaptureSource, CaptureStats};
pub use diagnostics::ServerChecks;
pub use file_sink::SharedFileSink;
pub use hub::{HubStats, RelayHub};
pub use server::RelayServer;
