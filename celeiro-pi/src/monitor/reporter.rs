//! Operator report sink
//!
//! Serializes report messages into HMAC-framed records appended to the
//! configured report stream. A disabled reporter logs and drops.

use crate::wire::FrameWriter;
use celeiro_common::report::ReportMessage;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

pub struct Reporter {
    sink: Option<Mutex<FrameWriter<Box<dyn Write + Send>>>>,
}

impl Reporter {
    /// Append frames to a file (created if absent)
    pub fn to_file(path: &Path, secret: &[u8]) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            sink: Some(Mutex::new(FrameWriter::new(Box::new(file), secret))),
        })
    }

    /// Reporter that drops everything
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Emit one message; write failures are logged, never raised — losing a
    /// report frame must not take a worker down
    pub fn send(&self, message: &ReportMessage) {
        debug!("report: {}", message.summary());

        let Some(sink) = &self.sink else {
            return;
        };
        let mut writer = match sink.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writer.write_message(message) {
            warn!("Failed to write report frame: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::FrameReader;
    use chrono::Utc;
    use std::io::BufReader;

    #[test]
    fn test_reporter_frames_are_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.frames");
        let reporter = Reporter::to_file(&path, b"secret").unwrap();

        let message = ReportMessage::PackageSighted {
            path: "/inbox/a.zip".into(),
            timestamp: Utc::now(),
        };
        reporter.send(&message);
        reporter.send(&message);

        let file = std::fs::File::open(&path).unwrap();
        let mut reader = FrameReader::new(BufReader::new(file), b"secret");
        assert_eq!(reader.read_message().unwrap(), message);
        assert_eq!(reader.read_message().unwrap(), message);
    }

    #[test]
    fn test_disabled_reporter_drops() {
        let reporter = Reporter::disabled();
        reporter.send(&ReportMessage::PackageIgnored {
            path: "/inbox/x".into(),
            reason: "not an archive".into(),
            timestamp: Utc::now(),
        });
    }
}
