//! Outbound notifications to the editorial system
//!
//! Translates ledger events into POSTs against the editorial API. Transport
//! failures are caught and logged here; they never abort checkin or a
//! validation pipeline run.

use crate::models::Status;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Payload announcing a successful checkin
#[derive(Debug, Clone, Serialize)]
pub struct CheckinNotification {
    pub articlepkg_ref: Option<String>,
    pub attempt_ref: String,
    pub article_title: Option<String>,
    pub journal_title: Option<String>,
    pub issue_label: Option<String>,
    pub package_name: String,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

/// Payload forwarding one notice
#[derive(Debug, Clone, Serialize)]
pub struct NoticeNotification {
    /// Reference returned by the prior checkin notification
    pub checkin: Option<String>,
    pub stage: String,
    pub checkpoint: String,
    pub message: String,
    pub status: Status,
}

#[derive(Debug, Deserialize)]
struct CheckinResponse {
    reference: String,
}

/// Notifier client; a disabled notifier logs and drops every call
pub struct Notifier {
    http: Option<reqwest::Client>,
    base_url: String,
}

impl Notifier {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build().ok();
        if http.is_none() {
            warn!("Notifier HTTP client could not be built; notifications disabled");
        }
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Notifier that drops everything; used by tests and dry runs
    pub fn disabled() -> Self {
        Self {
            http: None,
            base_url: String::new(),
        }
    }

    /// Announce a checkin; returns the editorial reference for follow-up
    /// notices, or None when the call failed (logged, not raised)
    pub async fn notify_checkin(&self, payload: &CheckinNotification) -> Option<String> {
        let Some(http) = &self.http else {
            debug!(attempt = %payload.attempt_ref, "Notifier disabled; dropping checkin notification");
            return None;
        };

        let url = format!("{}/checkins/", self.base_url);
        match http.post(&url).json(payload).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<CheckinResponse>().await {
                    Ok(body) => {
                        debug!(reference = %body.reference, "Checkin notified");
                        Some(body.reference)
                    }
                    Err(e) => {
                        warn!("Checkin notification response unreadable: {}", e);
                        None
                    }
                }
            }
            Ok(response) => {
                warn!(
                    status = response.status().as_u16(),
                    "Checkin notification rejected"
                );
                None
            }
            Err(e) => {
                warn!("Checkin notification failed: {}", e);
                None
            }
        }
    }

    /// Forward one notice; failures are logged and swallowed
    pub async fn notify_notice(&self, payload: &NoticeNotification) {
        let Some(http) = &self.http else {
            return;
        };

        let url = format!("{}/notices/", self.base_url);
        match http.post(&url).json(payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(
                    status = response.status().as_u16(),
                    stage = %payload.stage,
                    "Notice notification rejected"
                );
            }
            Err(e) => {
                warn!(stage = %payload.stage, "Notice notification failed: {}", e);
            }
        }
    }

    /// Bookkeeping marker framing a pipeline run (serv_begin / serv_end)
    pub async fn notify_marker(&self, checkin: Option<&str>, checkpoint: &str, status: Status) {
        self.notify_notice(&NoticeNotification {
            checkin: checkin.map(|s| s.to_string()),
            stage: String::new(),
            checkpoint: checkpoint.to_string(),
            message: String::new(),
            status,
        })
        .await;
    }
}
