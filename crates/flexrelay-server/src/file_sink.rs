//! Shared-file transport, server side.
//!
//! Writes the latest frame wholesale to a file on a shared filesystem for
//! clients that cannot reach the stream port. Only the newest announcement
//! matters, so the file is replaced, never appended, and rewrites are
//! rate-limited to keep mtime churn down on network mounts.

use flexrelay_core::error::{ResourceError, Result};
use flexrelay_proto::WireFrame;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct SharedFileSink {
    path: PathBuf,
    min_interval: Duration,
    last_write: Option<Instant>,
    writes: u64,
}

impl SharedFileSink {
    pub fn new(path: PathBuf, min_interval: Duration) -> Self {
        Self {
            path,
            min_interval,
            last_write: None,
            writes: 0,
        }
    }

    /// Writes the frame unless the previous write is too recent. Returns
    /// whether the file was actually updated.
    pub fn write(&mut self, frame: &WireFrame, now: Instant) -> Result<bool> {
        if let Some(last) = self.last_write {
            if now.saturating_duration_since(last) < self.min_interval {
                return Ok(false);
            }
        }

        let line = frame.encode_line()?;
        std::fs::write(&self.path, &line)
            .map_err(|e| ResourceError::write_failed(self.path.display().to_string(), e.to_string()))?;

        self.last_write = Some(now);
        self.writes += 1;
        debug!(path = %self.path.display(), size = line.len(), "Shared file updated");
        Ok(true)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexrelay_proto::{Announcement, Captured, FieldMap, Synthesizer};

    fn sample_frame() -> WireFrame {
        let mut synth = Synthesizer::new();
        let fields: FieldMap = [("model", "FLEX-6700"), ("serial", "42")].into_iter().collect();
        let packet = synth.encode_at(&fields, 1_700_000_000);
        let ann = Announcement::decode(packet).unwrap();
        WireFrame::from_captured(
            &Captured::new(ann, "10.0.0.5:4992".parse().unwrap()),
            "test",
        )
    }

    #[test]
    fn writes_latest_frame_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery.json");
        let mut sink = SharedFileSink::new(path.clone(), Duration::from_secs(0));

        let now = Instant::now();
        assert!(sink.write(&sample_frame(), now).unwrap());
        assert!(sink.write(&sample_frame(), now + Duration::from_secs(1)).unwrap());

        // File holds exactly one frame, the most recent.
        let contents = std::fs::read(&path).unwrap();
        let line = contents.strip_suffix(b"\n").unwrap();
        let frame = WireFrame::decode_line(line).unwrap();
        assert_eq!(frame.radio_info.model, "FLEX-6700");
        assert_eq!(sink.writes(), 2);
    }

    #[test]
    fn rewrites_are_rate_limited() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SharedFileSink::new(dir.path().join("d.json"), Duration::from_secs(5));

        let start = Instant::now();
        assert!(sink.write(&sample_frame(), start).unwrap());
        assert!(!sink.write(&sample_frame(), start + Duration::from_secs(2)).unwrap());
        assert!(sink.write(&sample_frame(), start + Duration::from_secs(6)).unwrap());
        assert_eq!(sink.writes(), 2);
    }

    #[test]
    fn unwritable_path_is_a_resource_error() {
        let mut sink = SharedFileSink::new(
            PathBuf::from("/nonexistent-dir/discovery.json"),
            Duration::from_secs(0),
        );
        assert!(sink.write(&sample_frame(), Instant::now()).is_err());
    }
}
