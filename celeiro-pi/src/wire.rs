//! Report stream framing
//!
//! Line-oriented frames between the dispatch process and an out-of-process
//! reporting consumer: `<hex-digest> <byte-length>\n` followed by exactly
//! `byte-length` payload bytes. The digest is an HMAC-SHA256 over the
//! payload using a shared secret. Readers recompute the digest and discard
//! frames that fail to match, treating the stream as self-healing against
//! corruption.

use celeiro_common::report::ReportMessage;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::io::{BufRead, Write};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Wire protocol errors
#[derive(Debug, Error)]
pub enum WireError {
    /// The underlying transport is exhausted
    #[error("end of stream")]
    EndOfStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn digest_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(payload);
    let bytes = mac.finalize().into_bytes();
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Frame writer over any byte sink
pub struct FrameWriter<W: Write> {
    inner: W,
    secret: Vec<u8>,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W, secret: &[u8]) -> Self {
        Self {
            inner,
            secret: secret.to_vec(),
        }
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let digest = digest_hex(&self.secret, payload);
        writeln!(self.inner, "{} {}", digest, payload.len())?;
        self.inner.write_all(payload)?;
        self.inner.flush()
    }

    pub fn write_message(&mut self, message: &ReportMessage) -> std::io::Result<()> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.write_frame(&payload)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Frame reader over any buffered byte source
pub struct FrameReader<R: BufRead> {
    inner: R,
    secret: Vec<u8>,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(inner: R, secret: &[u8]) -> Self {
        Self {
            inner,
            secret: secret.to_vec(),
        }
    }

    /// Next payload whose digest verifies. Corrupt frames and unparseable
    /// headers are skipped; exhaustion of the transport is `EndOfStream`.
    pub fn read_frame(&mut self) -> Result<Vec<u8>, WireError> {
        loop {
            let mut header = String::new();
            let n = self.inner.read_line(&mut header)?;
            if n == 0 {
                return Err(WireError::EndOfStream);
            }

            let header = header.trim_end();
            let Some((digest, len_str)) = header.split_once(' ') else {
                // Garbage between frames; resync on the next line
                continue;
            };
            let Ok(len) = len_str.parse::<usize>() else {
                continue;
            };

            let mut payload = vec![0u8; len];
            if self.inner.read_exact(&mut payload).is_err() {
                return Err(WireError::EndOfStream);
            }

            if digest_hex(&self.secret, &payload) == digest {
                return Ok(payload);
            }
            // Digest mismatch: discard this frame, keep reading
        }
    }

    /// Next frame that deserializes as a report message
    pub fn read_message(&mut self) -> Result<ReportMessage, WireError> {
        loop {
            let payload = self.read_frame()?;
            match serde_json::from_slice(&payload) {
                Ok(message) => return Ok(message),
                Err(e) => {
                    tracing::warn!("Discarding undecodable report frame: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Cursor;

    const SECRET: &[u8] = b"shared-secret";

    #[test]
    fn test_frame_round_trip() {
        let mut writer = FrameWriter::new(Vec::new(), SECRET);
        writer.write_frame(b"hello").unwrap();
        writer.write_frame(b"world").unwrap();
        let bytes = writer.into_inner();

        let mut reader = FrameReader::new(Cursor::new(bytes), SECRET);
        assert_eq!(reader.read_frame().unwrap(), b"hello");
        assert_eq!(reader.read_frame().unwrap(), b"world");
        assert!(matches!(
            reader.read_frame(),
            Err(WireError::EndOfStream)
        ));
    }

    #[test]
    fn test_corrupt_frame_is_discarded_not_raised() {
        let mut writer = FrameWriter::new(Vec::new(), SECRET);
        writer.write_frame(b"good one").unwrap();
        let mut bytes = writer.into_inner();

        // Corrupt frame in the middle: valid header shape, wrong digest
        let mut corrupted = Vec::new();
        corrupted.extend_from_slice(format!("{} {}\n", "ab".repeat(32), 3).as_bytes());
        corrupted.extend_from_slice(b"bad");
        corrupted.append(&mut bytes);

        let mut reader = FrameReader::new(Cursor::new(corrupted), SECRET);
        assert_eq!(reader.read_frame().unwrap(), b"good one");
    }

    #[test]
    fn test_wrong_secret_never_verifies() {
        let mut writer = FrameWriter::new(Vec::new(), SECRET);
        writer.write_frame(b"payload").unwrap();
        let bytes = writer.into_inner();

        let mut reader = FrameReader::new(Cursor::new(bytes), b"other-secret");
        assert!(matches!(
            reader.read_frame(),
            Err(WireError::EndOfStream)
        ));
    }

    #[test]
    fn test_garbage_between_frames_resyncs() {
        let mut writer = FrameWriter::new(Vec::new(), SECRET);
        writer.write_frame(b"after noise").unwrap();
        let bytes = writer.into_inner();

        let mut noisy = b"not a header line\n".to_vec();
        noisy.extend_from_slice(&bytes);

        let mut reader = FrameReader::new(Cursor::new(noisy), SECRET);
        assert_eq!(reader.read_frame().unwrap(), b"after noise");
    }

    #[test]
    fn test_message_round_trip() {
        let message = ReportMessage::PackageSighted {
            path: "/inbox/pkg.zip".into(),
            timestamp: Utc::now(),
        };

        let mut writer = FrameWriter::new(Vec::new(), SECRET);
        writer.write_message(&message).unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()), SECRET);
        assert_eq!(reader.read_message().unwrap(), message);
    }
}
