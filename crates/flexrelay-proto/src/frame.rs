//! The JSON frame exchanged between hub and links, and the reassembly
//! buffer that recovers frames from an arbitrary-chunked byte stream.
//!
//! A frame is one JSON object terminated by a single `\n`. JSON string
//! escaping guarantees the serialized object never contains a raw newline,
//! so the terminator is unambiguous.

use crate::announcement::{Captured, RadioSummary};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Newline terminator for frames.
const FRAME_DELIMITER: u8 = b'\n';

/// Upper bound on a single frame; anything larger indicates a desynced or
/// hostile peer.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Errors while decoding a received frame. Each one discards the offending
/// frame only; the connection carrying it stays up.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid packet hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("frame exceeds {MAX_FRAME_SIZE} bytes")]
    Oversized,
}

/// One relayed announcement as it travels over the stream transport.
///
/// Field names match the wire format produced by earlier deployments, so
/// mixed-version server/client pairs interoperate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFrame {
    /// Human-readable capture timestamp.
    pub timestamp: String,
    /// Capture time as a Unix timestamp.
    pub timestamp_unix: f64,
    /// Version of the software that published the frame.
    pub server_version: String,
    /// Complete raw discovery packet, hex encoded.
    pub packet_hex: String,
    pub packet_size: usize,
    /// Position in the publisher's monotonic packet count. Zero on frames
    /// from publishers that predate the field.
    #[serde(default)]
    pub packet_count: u64,
    pub source_ip: String,
    pub source_port: u16,
    pub radio_info: RadioSummary,
    /// Full decoded field mapping.
    pub parsed_payload: BTreeMap<String, String>,
}

impl WireFrame {
    /// Builds a frame from a captured announcement.
    pub fn from_captured(captured: &Captured, version: &str) -> Self {
        let raw = captured.announcement.raw();
        let source_ip = captured.source.ip().to_string();
        Self {
            timestamp: captured.wall_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            timestamp_unix: captured.wall_time.timestamp_micros() as f64 / 1_000_000.0,
            server_version: version.to_string(),
            packet_hex: hex::encode(raw),
            packet_size: raw.len(),
            packet_count: 0,
            source_ip: source_ip.clone(),
            source_port: captured.source.port(),
            radio_info: captured.announcement.summary(&source_ip),
            parsed_payload: captured.announcement.fields().canonical(),
        }
    }

    /// Serializes the frame as one newline-terminated line.
    pub fn encode_line(&self) -> Result<Vec<u8>, FrameError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(FRAME_DELIMITER);
        Ok(line)
    }

    /// Parses one line (without its terminator) back into a frame.
    pub fn decode_line(line: &[u8]) -> Result<Self, FrameError> {
        if line.len() > MAX_FRAME_SIZE {
            return Err(FrameError::Oversized);
        }
        Ok(serde_json::from_slice(line)?)
    }

    /// Decodes the embedded raw packet bytes.
    pub fn packet_bytes(&self) -> Result<Bytes, FrameError> {
        Ok(Bytes::from(hex::decode(&self.packet_hex)?))
    }
}

/// Accumulates stream chunks and yields complete lines.
///
/// Partial frames stay buffered until their terminator arrives; a reader
/// never sees an unterminated frame. Empty lines are swallowed. An
/// unterminated frame may only grow to [`MAX_FRAME_SIZE`]: past that the
/// buffered bytes are discarded and input is skipped until the next
/// terminator resynchronizes the stream.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buf: BytesMut,
    skipping: bool,
    oversized: u64,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes to the buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extracts the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<Bytes> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == FRAME_DELIMITER) else {
                if self.skipping {
                    self.buf.clear();
                } else if self.buf.len() > MAX_FRAME_SIZE {
                    self.oversized += 1;
                    self.skipping = true;
                    self.buf.clear();
                }
                return None;
            };
            let mut line = self.buf.split_to(pos + 1);
            if self.skipping {
                // Tail of a discarded oversized frame.
                self.skipping = false;
                continue;
            }
            line.truncate(line.len() - 1);
            if line.is_empty() {
                continue;
            }
            return Some(line.freeze());
        }
    }

    /// Bytes held for a not-yet-terminated frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Frames discarded for exceeding the size cap before their terminator
    /// arrived.
    pub fn oversized(&self) -> u64 {
        self.oversized
    }

    /// Drops any partial frame; used when a connection is torn down so a
    /// fresh connection never inherits half a line.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.skipping = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcement::Announcement;
    use crate::encode::Synthesizer;
    use std::net::SocketAddr;

    fn sample_frame() -> WireFrame {
        let mut synth = Synthesizer::new();
        let fields = [
            ("model", "FLEX-6600"),
            ("serial", "1234"),
            ("callsign", "WX7V"),
            ("status", "Available"),
        ]
        .into_iter()
        .collect();
        let packet = synth.encode_at(&fields, 1_700_000_000);
        let ann = Announcement::decode(packet).unwrap();
        let source: SocketAddr = "192.168.1.20:4992".parse().unwrap();
        WireFrame::from_captured(&Captured::new(ann, source), "3.1.0")
    }

    #[test]
    fn frame_line_round_trips() {
        let mut frame = sample_frame();
        frame.packet_count = 7;
        let line = frame.encode_line().unwrap();
        assert_eq!(*line.last().unwrap(), b'\n');
        // The terminator is the only newline in the line.
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);

        let decoded = WireFrame::decode_line(&line[..line.len() - 1]).unwrap();
        assert_eq!(decoded.packet_hex, frame.packet_hex);
        assert_eq!(decoded.packet_count, 7);
        assert_eq!(decoded.radio_info, frame.radio_info);
        assert_eq!(decoded.parsed_payload, frame.parsed_payload);
        assert_eq!(decoded.packet_bytes().unwrap(), frame.packet_bytes().unwrap());
    }

    #[test]
    fn frames_without_a_packet_count_still_decode() {
        let mut value = serde_json::to_value(sample_frame()).unwrap();
        value.as_object_mut().unwrap().remove("packet_count");
        let line = serde_json::to_vec(&value).unwrap();

        let frame = WireFrame::decode_line(&line).unwrap();
        assert_eq!(frame.packet_count, 0);
    }

    #[test]
    fn embedded_newlines_in_fields_stay_escaped() {
        let mut frame = sample_frame();
        frame.radio_info.nickname = "line\nbreak".to_string();
        let line = frame.encode_line().unwrap();
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
        let decoded = WireFrame::decode_line(&line[..line.len() - 1]).unwrap();
        assert_eq!(decoded.radio_info.nickname, "line\nbreak");
    }

    #[test]
    fn reassembly_is_chunking_invariant() {
        let frames: Vec<WireFrame> = (0..3).map(|_| sample_frame()).collect();
        let mut stream = Vec::new();
        for frame in &frames {
            stream.extend(frame.encode_line().unwrap());
        }
        stream.extend(b"\n"); // stray empty line must be skipped

        let collect = |chunk_size: usize| -> Vec<Bytes> {
            let mut reassembler = FrameReassembler::new();
            let mut out = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                reassembler.extend(chunk);
                while let Some(line) = reassembler.next_line() {
                    out.push(line);
                }
            }
            out
        };

        let whole = collect(stream.len());
        assert_eq!(whole.len(), frames.len());
        for chunk_size in [1, 2, 3, 7, 64, 1000] {
            assert_eq!(collect(chunk_size), whole, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn partial_frame_is_not_yielded_until_terminated() {
        let line = sample_frame().encode_line().unwrap();
        let mut reassembler = FrameReassembler::new();
        reassembler.extend(&line[..line.len() - 1]);
        assert!(reassembler.next_line().is_none());
        assert_eq!(reassembler.pending(), line.len() - 1);

        reassembler.extend(b"\n");
        assert!(reassembler.next_line().is_some());
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn unterminated_stream_is_capped_and_resyncs() {
        let mut reassembler = FrameReassembler::new();

        // A desynced peer streams bytes with no terminator.
        for _ in 0..8 {
            reassembler.extend(&vec![b'x'; 64 * 1024]);
            assert!(reassembler.next_line().is_none());
            assert!(reassembler.pending() <= MAX_FRAME_SIZE);
        }
        assert_eq!(reassembler.oversized(), 1);

        // The rest of the runaway line is skipped, then framing recovers.
        reassembler.extend(b"runaway tail\n");
        assert!(reassembler.next_line().is_none());

        let line = sample_frame().encode_line().unwrap();
        reassembler.extend(&line);
        let recovered = reassembler.next_line().expect("framing must recover");
        assert!(WireFrame::decode_line(&recovered).is_ok());
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        assert!(WireFrame::decode_line(b"{not json").is_err());
    }

    #[test]
    fn bad_hex_is_reported() {
        let mut frame = sample_frame();
        frame.packet_hex = "zz".to_string();
        assert!(matches!(frame.packet_bytes(), Err(FrameError::Hex(_))));
    }
}
