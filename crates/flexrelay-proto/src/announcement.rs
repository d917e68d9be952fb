//! Decoded discovery announcements and their textual field payload.

use crate::header::{DiscoveryHeader, HEADER_LEN};
use crate::DecodeError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

/// Ordered `key=value` field mapping parsed from a discovery payload.
///
/// Insertion order is preserved (it matters when re-encoding a payload);
/// duplicate keys are last-writer-wins. Lookups are linear, which is fine
/// for the ~30 fields a radio announces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the payload portion of a discovery packet.
    ///
    /// Tolerant by design: invalid UTF-8 is replaced, trailing NUL padding
    /// is stripped, and tokens without an `=` are dropped. Never fails; the
    /// worst case is an empty map.
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let text = text.trim_end_matches('\0');

        let mut map = Self::new();
        for token in text.split(' ') {
            if let Some((key, value)) = token.split_once('=') {
                if !key.is_empty() {
                    map.insert(key, value);
                }
            }
        }
        map
    }

    /// Inserts a field, replacing any previous value for the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order-independent canonical form, used for change comparison.
    pub fn canonical(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }

    /// Joins the fields back into the wire payload text.
    pub fn to_payload(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// One decoded discovery announcement.
///
/// The raw bytes are owned immutably and forwarded verbatim to every
/// consumer; the field map is parsed once at decode time and cached.
#[derive(Debug, Clone)]
pub struct Announcement {
    raw: Bytes,
    header: DiscoveryHeader,
    fields: FieldMap,
}

impl Announcement {
    /// Decodes a datagram into an announcement.
    ///
    /// The header check is strict (28 bytes, correct marker); payload
    /// parsing is tolerant and never fails.
    pub fn decode(raw: Bytes) -> Result<Self, DecodeError> {
        let header = DiscoveryHeader::decode(&raw)?;
        let fields = FieldMap::parse(&raw[HEADER_LEN..]);
        Ok(Self {
            raw,
            header,
            fields,
        })
    }

    /// The exact packet bytes as received. Never mutated.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn header(&self) -> &DiscoveryHeader {
        &self.header
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Builds the human-facing summary, falling back to the capture source
    /// address when the radio did not announce its own IP.
    pub fn summary(&self, fallback_ip: &str) -> RadioSummary {
        let field = |key: &str| {
            self.fields
                .get(key)
                .filter(|v| !v.is_empty())
                .unwrap_or("Unknown")
                .to_string()
        };
        RadioSummary {
            model: field("model"),
            serial: field("serial"),
            ip: self
                .fields
                .get("ip")
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback_ip)
                .to_string(),
            nickname: field("nickname"),
            callsign: field("callsign"),
            version: field("version"),
            status: field("status"),
        }
    }
}

/// Summary of the fields operators care about, embedded in every frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioSummary {
    pub model: String,
    pub serial: String,
    pub ip: String,
    pub nickname: String,
    pub callsign: String,
    pub version: String,
    pub status: String,
}

/// An announcement plus the provenance attached at capture time. The
/// provenance is metadata about the capture, not part of the wire bytes.
#[derive(Debug, Clone)]
pub struct Captured {
    pub announcement: Announcement,
    pub source: SocketAddr,
    pub wall_time: DateTime<Utc>,
    pub monotonic: Instant,
}

impl Captured {
    pub fn new(announcement: Announcement, source: SocketAddr) -> Self {
        Self {
            announcement,
            source,
            wall_time: Utc::now(),
            monotonic: Instant::now(),
        }
    }
}

/// Formats bytes as a 16-bytes-per-row hex dump with offsets and an ASCII
/// gutter, for the audit log entries written on initial/changed packets.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| {
                if (0x20..0x7f).contains(&b) {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        out.push_str(&format!("{:04x}  {:<48}  {}\n", row * 16, hex.join(" "), ascii));
    }
    out
}
