//! Encode direction of the discovery codec.
//!
//! The relay core only ever forwards captured bytes verbatim; this module
//! exists for the wedge utility, which synthesizes discovery packets for a
//! radio that cannot broadcast onto the local segment itself. It shares the
//! header layout with the decode path.

use crate::announcement::FieldMap;
use crate::header::{DiscoveryHeader, HEADER_LEN};
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stateful packet builder carrying the wrapping sequence counter.
#[derive(Debug)]
pub struct Synthesizer {
    header: DiscoveryHeader,
}

impl Synthesizer {
    pub fn new() -> Self {
        Self {
            header: DiscoveryHeader::template(),
        }
    }

    /// Builds one discovery packet from the given fields, stamping the
    /// current Unix timestamp and advancing the 4-bit sequence counter.
    pub fn encode(&mut self, fields: &FieldMap) -> Bytes {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        self.encode_at(fields, now)
    }

    /// Same as [`encode`](Self::encode) with an explicit timestamp, so
    /// tests produce deterministic packets.
    pub fn encode_at(&mut self, fields: &FieldMap, timestamp: u32) -> Bytes {
        let mut payload = fields.to_payload().into_bytes();

        // Pad the whole packet out to a 4-byte boundary with NULs; the
        // size field counts 32-bit words.
        let total = HEADER_LEN + payload.len();
        let padding = (4 - total % 4) % 4;
        payload.extend(std::iter::repeat(0u8).take(padding));

        self.header.sequence = (self.header.sequence + 1) & 0x0F;
        self.header.size_words = ((HEADER_LEN + payload.len()) / 4) as u16;
        self.header.timestamp = timestamp;

        let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
        packet.extend_from_slice(&self.header.to_bytes());
        packet.extend_from_slice(&payload);
        Bytes::from(packet)
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcement::Announcement;

    fn sample_fields() -> FieldMap {
        [
            ("model", "FLEX-6600"),
            ("serial", "1234-5678"),
            ("callsign", "WX7V"),
            ("nickname", "Shack"),
            ("ip", "10.0.0.5"),
            ("status", "Available"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn decode_of_encode_reproduces_fields() {
        let fields = sample_fields();
        let mut synth = Synthesizer::new();
        let packet = synth.encode_at(&fields, 1_700_000_000);

        let ann = Announcement::decode(packet).unwrap();
        assert_eq!(ann.fields().canonical(), fields.canonical());
        assert_eq!(ann.header().timestamp, 1_700_000_000);
    }

    #[test]
    fn packet_length_is_word_aligned_and_sized() {
        let mut synth = Synthesizer::new();
        let packet = synth.encode_at(&sample_fields(), 0);
        assert_eq!(packet.len() % 4, 0);

        let ann = Announcement::decode(packet.clone()).unwrap();
        assert_eq!(ann.header().size_words as usize * 4, packet.len());
    }

    #[test]
    fn sequence_counter_wraps_modulo_16() {
        let fields = sample_fields();
        let mut synth = Synthesizer::new();
        let mut last = 0;
        for i in 1..=20 {
            let packet = synth.encode_at(&fields, 0);
            let ann = Announcement::decode(packet).unwrap();
            last = ann.header().sequence;
            if i == 16 {
                assert_eq!(last, 0);
            }
        }
        assert_eq!(last, 4);
    }
}
