//! Persistent domain records: attempts, article packages, lifecycle enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage a checkpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Point {
    Checkin,
    Validation,
    Checkout,
}

impl Point {
    pub fn as_str(&self) -> &'static str {
        match self {
            Point::Checkin => "checkin",
            Point::Validation => "validation",
            Point::Checkout => "checkout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "checkin" => Some(Point::Checkin),
            "validation" => Some(Point::Validation),
            "checkout" => Some(Point::Checkout),
            _ => None,
        }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notice severity
///
/// `ServBegin`/`ServEnd` are bookkeeping markers framing a pipeline run in
/// outbound notifications; they never appear as a stage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Warning,
    Error,
    ServBegin,
    ServEnd,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Warning => "warning",
            Status::Error => "error",
            Status::ServBegin => "serv_begin",
            Status::ServEnd => "serv_end",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Status::Ok),
            "warning" => Some(Status::Warning),
            "error" => Some(Status::Error),
            "serv_begin" => Some(Status::ServBegin),
            "serv_end" => Some(Status::ServEnd),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingestion event for one archive
#[derive(Debug, Clone)]
pub struct Attempt {
    pub id: Uuid,
    /// SHA-256 over the whole-archive byte stream; unique, collisions mean
    /// a duplicated package
    pub checksum: String,
    /// Working-copy path the inspector operates on
    pub package_path: String,
    /// Original inbound path, kept for operator reprocessing
    pub origin_path: String,
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
    /// Validation window
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub queued_checkout: bool,
    pub articlepkg_id: Option<Uuid>,
}

impl Attempt {
    /// Build a candidate attempt before persistence; validity starts false
    /// and is only flipped by the checkin validity test.
    pub fn candidate(checksum: String, package_path: String, origin_path: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            checksum,
            package_path,
            origin_path,
            is_valid: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            queued_checkout: false,
            articlepkg_id: None,
        }
    }

    /// File name of the original package, for operator-facing messages
    pub fn package_name(&self) -> String {
        std::path::Path::new(&self.origin_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.origin_path.clone())
    }
}

/// The bibliographic identity an archive maps to
#[derive(Debug, Clone)]
pub struct ArticlePkg {
    pub id: Uuid,
    pub article_title: String,
    pub journal_title: Option<String>,
    pub issn_print: Option<String>,
    pub issn_electronic: Option<String>,
    pub issue_year: Option<i64>,
    pub issue_volume: Option<String>,
    pub issue_number: Option<String>,
    pub issue_suppl_volume: Option<String>,
    pub issue_suppl_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ArticlePkg {
    /// Compact issue designation for operator-facing messages,
    /// e.g. `v32n9 (1999)`
    pub fn issue_label(&self) -> Option<String> {
        let mut label = String::new();
        if let Some(v) = &self.issue_volume {
            label.push_str(&format!("v{v}"));
        }
        if let Some(n) = &self.issue_number {
            label.push_str(&format!("n{n}"));
        }
        if let Some(s) = self
            .issue_suppl_volume
            .as_ref()
            .or(self.issue_suppl_number.as_ref())
        {
            label.push_str(&format!(" suppl {s}"));
        }
        if let Some(y) = self.issue_year {
            if label.is_empty() {
                label = y.to_string();
            } else {
                label.push_str(&format!(" ({y})"));
            }
        }
        if label.is_empty() {
            None
        } else {
            Some(label)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_round_trip() {
        for p in [Point::Checkin, Point::Validation, Point::Checkout] {
            assert_eq!(Point::parse(p.as_str()), Some(p));
        }
        assert_eq!(Point::parse("unknown"), None);
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            Status::Ok,
            Status::Warning,
            Status::Error,
            Status::ServBegin,
            Status::ServEnd,
        ] {
            assert_eq!(Status::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_candidate_attempt_starts_invalid() {
        let a = Attempt::candidate("abc".into(), "/w/x.zip".into(), "/in/x.zip".into());
        assert!(!a.is_valid);
        assert!(a.started_at.is_none());
        assert_eq!(a.package_name(), "x.zip");
    }
}
