//! Client side of the FlexRelay discovery relay: receives frames from a
//! relay server (or a shared file) and re-emits the original packets as
//! local UDP broadcasts.

pub mod broadcast;
pub mod diagnostics;
pub mod file_link;
pub mod link;
pub mod state;

pub use broadcast::Rebroadcaster;
pub use diagnostics::ClientChecks;
pub use file_link::FileLink;
pub use link::RelayLink;
pub use state::{LinkState, LinkStatus};
