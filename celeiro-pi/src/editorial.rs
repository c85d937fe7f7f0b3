//! Editorial system lookup client
//!
//! Resolves journal and issue records and answers DOI registration checks.
//! Every call carries a bounded timeout; callers degrade gracefully on
//! transport errors instead of hanging a worker.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Editorial client errors
#[derive(Debug, Error)]
pub enum EditorialError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Journal record as the editorial system registers it
#[derive(Debug, Clone, Deserialize)]
pub struct JournalRecord {
    /// Opaque reference used in follow-up lookups and notifications
    pub reference: String,
    pub title: Option<String>,
    pub print_issn: Option<String>,
    pub electronic_issn: Option<String>,
    pub publisher_name: Option<String>,
    pub abbreviated_title: Option<String>,
    pub nlm_title: Option<String>,
}

/// Issue record with the declared publication window and section titles
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRecord {
    pub reference: String,
    pub label: String,
    pub year: Option<i64>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub suppl_volume: Option<String>,
    pub suppl_number: Option<String>,
    /// Declared publication window; a single-month issue leaves the end
    /// month unset
    pub publication_start_month: Option<u32>,
    pub publication_end_month: Option<u32>,
    /// Registered section titles for the issue
    #[serde(default)]
    pub sections: Vec<String>,
}

/// Issue-identifying criteria taken from the ArticlePkg
#[derive(Debug, Clone, Default)]
pub struct IssueCriteria {
    pub year: Option<i64>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub suppl_volume: Option<String>,
    pub suppl_number: Option<String>,
}

/// Journal/issue resolution seam; the production implementation talks to
/// the editorial system over HTTP
#[async_trait]
pub trait IssueResolver: Send + Sync {
    async fn journal_by_issn(&self, issn: &str)
        -> Result<Option<JournalRecord>, EditorialError>;

    async fn find_issue(
        &self,
        journal: &JournalRecord,
        criteria: &IssueCriteria,
    ) -> Result<Option<IssueRecord>, EditorialError>;

    async fn is_doi_registered(&self, doi: &str) -> Result<bool, EditorialError>;
}

/// HTTP implementation of [`IssueResolver`]
pub struct EditorialClient {
    http: reqwest::Client,
    base_url: String,
}

impl EditorialClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EditorialError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EditorialError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IssueResolver for EditorialClient {
    async fn journal_by_issn(
        &self,
        issn: &str,
    ) -> Result<Option<JournalRecord>, EditorialError> {
        let url = format!("{}/journals/", self.base_url);
        debug!(issn = issn, "Looking up journal");

        let response = self
            .http
            .get(&url)
            .query(&[("issn", issn)])
            .send()
            .await
            .map_err(|e| EditorialError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EditorialError::Api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ));
        }

        let mut journals: Vec<JournalRecord> = response
            .json()
            .await
            .map_err(|e| EditorialError::Parse(e.to_string()))?;
        Ok(if journals.is_empty() {
            None
        } else {
            Some(journals.remove(0))
        })
    }

    async fn find_issue(
        &self,
        journal: &JournalRecord,
        criteria: &IssueCriteria,
    ) -> Result<Option<IssueRecord>, EditorialError> {
        let url = format!("{}/journals/{}/issues/", self.base_url, journal.reference);

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(year) = criteria.year {
            query.push(("year", year.to_string()));
        }
        if let Some(v) = &criteria.volume {
            query.push(("volume", v.clone()));
        }
        if let Some(n) = &criteria.number {
            query.push(("number", n.clone()));
        }
        if let Some(sv) = &criteria.suppl_volume {
            query.push(("suppl_volume", sv.clone()));
        }
        if let Some(sn) = &criteria.suppl_number {
            query.push(("suppl_number", sn.clone()));
        }

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| EditorialError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EditorialError::Api(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ));
        }

        let mut issues: Vec<IssueRecord> = response
            .json()
            .await
            .map_err(|e| EditorialError::Parse(e.to_string()))?;
        Ok(if issues.is_empty() {
            None
        } else {
            Some(issues.remove(0))
        })
    }

    async fn is_doi_registered(&self, doi: &str) -> Result<bool, EditorialError> {
        let url = format!("{}/dois/{}", self.base_url, doi);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EditorialError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(EditorialError::Api(
                status.as_u16(),
                response.text().await.unwrap_or_default(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_record_deserializes() {
        let json = r#"{
            "reference": "j-42",
            "title": "Brazilian Journal of Medical and Biological Research",
            "print_issn": "0100-879X",
            "electronic_issn": "1414-431X",
            "publisher_name": "ABDC",
            "abbreviated_title": "Braz. J. Med. Biol. Res.",
            "nlm_title": "Braz J Med Biol Res"
        }"#;
        let journal: JournalRecord = serde_json::from_str(json).unwrap();
        assert_eq!(journal.reference, "j-42");
        assert_eq!(journal.print_issn.as_deref(), Some("0100-879X"));
    }

    #[test]
    fn test_issue_record_defaults_sections() {
        let json = r#"{
            "reference": "i-7",
            "label": "v32n9 1999",
            "year": 1999,
            "volume": "32",
            "number": "9",
            "suppl_volume": null,
            "suppl_number": null,
            "publication_start_month": 9,
            "publication_end_month": null
        }"#;
        let issue: IssueRecord = serde_json::from_str(json).unwrap();
        assert_eq!(issue.publication_start_month, Some(9));
        assert!(issue.sections.is_empty());
    }
}
