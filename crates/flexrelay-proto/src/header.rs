//! Binary header for FlexRadio discovery packets.
//!
//! Discovery broadcasts carry a fixed 28-byte VITA-49 header followed by a
//! textual `key=value` payload. All multi-byte integers are big-endian and
//! the packet size field counts 32-bit words, not bytes.

use crate::DecodeError;

/// Length of the fixed header in bytes (7 words).
pub const HEADER_LEN: usize = 28;

/// First byte of every discovery packet. Anything else is a foreign
/// broadcast and is discarded before parsing.
pub const PACKET_TYPE_MARKER: u8 = 0x38;

/// Fixed tag occupying the upper 4 bits of the flags byte; the lower 4 bits
/// are a wrapping sequence counter.
pub const FLAGS_TAG: u8 = 0x5;

/// Stream identifier used by discovery broadcasts.
pub const DISCOVERY_STREAM_ID: u32 = 0x0000_0800;

/// Class identifier (vendor OUI 00-1C-2D plus information/packet class
/// codes) observed on FLEX-6000 series discovery packets.
pub const DISCOVERY_CLASS_ID: u64 = 0x0000_1C2D_534C_FFFF;

/// Decoded fixed-size header fields.
///
/// `size_words` is the total packet length (header plus padded payload)
/// expressed in 32-bit words. `frac_timestamp` is carried on the wire but
/// unused by radios in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryHeader {
    pub packet_type: u8,
    /// Wrapping 4-bit sequence counter (low nibble of byte 1).
    pub sequence: u8,
    pub size_words: u16,
    pub stream_id: u32,
    pub class_id: u64,
    /// Integer Unix timestamp stamped by the sender.
    pub timestamp: u32,
    pub frac_timestamp: u64,
}

impl DiscoveryHeader {
    /// Decodes the fixed header from the start of a packet.
    ///
    /// Fails with [`DecodeError::InvalidHeader`] when the input is shorter
    /// than 28 bytes or does not start with the discovery marker byte.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::InvalidHeader(format!(
                "packet too short: {} bytes, need {}",
                bytes.len(),
                HEADER_LEN
            )));
        }
        if bytes[0] != PACKET_TYPE_MARKER {
            return Err(DecodeError::InvalidHeader(format!(
                "unexpected packet type marker {:#04x}",
                bytes[0]
            )));
        }

        Ok(Self {
            packet_type: bytes[0],
            sequence: bytes[1] & 0x0F,
            size_words: u16::from_be_bytes([bytes[2], bytes[3]]),
            stream_id: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            class_id: u64::from_be_bytes([
                bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14],
                bytes[15],
            ]),
            timestamp: u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
            frac_timestamp: u64::from_be_bytes([
                bytes[20], bytes[21], bytes[22], bytes[23], bytes[24], bytes[25], bytes[26],
                bytes[27],
            ]),
        })
    }

    /// Serializes the header into its 28-byte wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.packet_type;
        out[1] = (FLAGS_TAG << 4) | (self.sequence & 0x0F);
        out[2..4].copy_from_slice(&self.size_words.to_be_bytes());
        out[4..8].copy_from_slice(&self.stream_id.to_be_bytes());
        out[8..16].copy_from_slice(&self.class_id.to_be_bytes());
        out[16..20].copy_from_slice(&self.timestamp.to_be_bytes());
        out[20..28].copy_from_slice(&self.frac_timestamp.to_be_bytes());
        out
    }

    /// Header template for synthesized discovery packets. The size and
    /// timestamp fields are stamped at encode time.
    pub fn template() -> Self {
        Self {
            packet_type: PACKET_TYPE_MARKER,
            sequence: 0,
            size_words: 0,
            stream_id: DISCOVERY_STREAM_ID,
            class_id: DISCOVERY_CLASS_ID,
            timestamp: 0,
            frac_timestamp: 0,
        }
    }
}
