//! FlexRadio discovery protocol: packet codec, stream framing, and change
//! tracking shared by the relay server and client.

pub mod announcement;
pub mod encode;
pub mod frame;
pub mod header;
pub mod tracker;

use thiserror::Error;

/// Errors while decoding a raw discovery packet.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid discovery header: {0}")]
    InvalidHeader(String),
}

pub use announcement::{hex_dump, Announcement, Captured, FieldMap, RadioSummary};
pub use encode::Synthesizer;
pub use frame::{FrameError, FrameReassembler, WireFrame, MAX_FRAME_SIZE};
pub use header::{DiscoveryHeader, HEADER_LEN, PACKET_TYPE_MARKER};
pub use tracker::{ChangeKind, ChangeTracker, FieldChange};
