//! Report messages emitted by the intake workers
//!
//! These are the operator-facing messages the dispatch process writes to an
//! out-of-process reporting consumer. Serialized as tagged JSON so consumers
//! can match on `type` without tracking struct layouts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One operator-facing report message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ReportMessage {
    /// A candidate archive appeared in a watched directory
    PackageSighted {
        path: String,
        timestamp: DateTime<Utc>,
    },

    /// A path was dropped before checkin (not an archive, unreadable, ...)
    PackageIgnored {
        path: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Checkin produced a persisted attempt
    CheckinSucceeded {
        attempt_id: Uuid,
        package_name: String,
        is_valid: bool,
        timestamp: DateTime<Utc>,
    },

    /// Checkin failed; reason carries the classified failure text
    CheckinFailed {
        path: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The validation pipeline finished for an attempt
    ValidationFinished {
        attempt_id: Uuid,
        is_valid: bool,
        timestamp: DateTime<Utc>,
    },
}

impl ReportMessage {
    /// Short human-readable summary used in logs
    pub fn summary(&self) -> String {
        match self {
            ReportMessage::PackageSighted { path, .. } => format!("sighted {}", path),
            ReportMessage::PackageIgnored { path, reason, .. } => {
                format!("ignored {} ({})", path, reason)
            }
            ReportMessage::CheckinSucceeded {
                package_name,
                is_valid,
                ..
            } => format!(
                "checked in {} ({})",
                package_name,
                if *is_valid { "valid" } else { "invalid" }
            ),
            ReportMessage::CheckinFailed { path, reason, .. } => {
                format!("checkin failed {} ({})", path, reason)
            }
            ReportMessage::ValidationFinished {
                attempt_id,
                is_valid,
                ..
            } => format!(
                "validation finished {} ({})",
                attempt_id,
                if *is_valid { "valid" } else { "invalid" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_round_trips_as_tagged_json() {
        let msg = ReportMessage::CheckinFailed {
            path: "/inbox/broken.zip".to_string(),
            reason: "corrupt archive".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"CheckinFailed\""));

        let back: ReportMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_summary_mentions_path() {
        let msg = ReportMessage::PackageIgnored {
            path: "/inbox/notes.txt".to_string(),
            reason: "not an archive".to_string(),
            timestamp: Utc::now(),
        };
        assert!(msg.summary().contains("notes.txt"));
    }
}
