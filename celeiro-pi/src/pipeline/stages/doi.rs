//! Identifier registration check
//!
//! Validates the DOI shape, then asks the registry whether it resolves. An
//! unreachable registry is a warning, not an error: the format check
//! already ran and the lookup can be repeated later.

use crate::editorial::IssueResolver;
use crate::error::Result;
use crate::models::Status;
use crate::pipeline::{PipelineItem, Stage};
use async_trait::async_trait;
use std::sync::Arc;

pub struct DoiStage {
    resolver: Arc<dyn IssueResolver>,
}

impl DoiStage {
    pub fn new(resolver: Arc<dyn IssueResolver>) -> Self {
        Self { resolver }
    }
}

/// `10.<registrant>/<suffix>` with a non-empty numeric registrant segment
fn is_doi_shaped(doi: &str) -> bool {
    let Some(rest) = doi.strip_prefix("10.") else {
        return false;
    };
    let Some((registrant, suffix)) = rest.split_once('/') else {
        return false;
    };
    !registrant.is_empty()
        && registrant.chars().all(|c| c.is_ascii_digit() || c == '.')
        && !suffix.is_empty()
}

#[async_trait]
impl Stage for DoiStage {
    fn label(&self) -> &'static str {
        "doi"
    }

    async fn validate(&self, item: &mut PipelineItem) -> Result<(Status, String)> {
        let Some(doc) = item.doc.as_ref() else {
            return Ok((Status::Error, "primary document unavailable".into()));
        };

        let Some(doi) = doc.doi.as_deref() else {
            return Ok((Status::Error, "article carries no DOI".into()));
        };

        if !is_doi_shaped(doi) {
            return Ok((Status::Error, format!("malformed DOI '{doi}'")));
        }

        match self.resolver.is_doi_registered(doi).await {
            Ok(true) => Ok((Status::Ok, format!("DOI {doi} is registered"))),
            Ok(false) => Ok((Status::Error, format!("DOI {doi} is not registered"))),
            Err(e) => Ok((
                Status::Warning,
                format!("DOI registry unreachable for {doi}: {e}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{stage_item, stage_item_with_xml, StubResolver};

    #[tokio::test]
    async fn test_registered_doi_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mut item = stage_item(dir.path());

        let stage = DoiStage::new(Arc::new(StubResolver::matching_sample()));
        let (status, _) = stage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Ok);
    }

    #[tokio::test]
    async fn test_unregistered_doi_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut item = stage_item(dir.path());

        let stage = DoiStage::new(Arc::new(StubResolver::empty()));
        let (status, description) = stage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Error);
        assert!(description.contains("not registered"));
    }

    #[tokio::test]
    async fn test_registry_unreachable_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut item = stage_item(dir.path());

        let stage = DoiStage::new(Arc::new(StubResolver::failing()));
        let (status, _) = stage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Warning);
    }

    #[tokio::test]
    async fn test_missing_doi_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut item = stage_item_with_xml(dir.path(), b"<article/>");

        let stage = DoiStage::new(Arc::new(StubResolver::matching_sample()));
        let (status, description) = stage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Error);
        assert!(description.contains("no DOI"));
    }

    #[test]
    fn test_doi_shape() {
        assert!(is_doi_shaped("10.1590/S0100-879X1999000900001"));
        assert!(is_doi_shaped("10.1000/182"));
        assert!(!is_doi_shaped("11.1590/x"));
        assert!(!is_doi_shaped("10.1590"));
        assert!(!is_doi_shaped("10./suffix"));
        assert!(!is_doi_shaped("10.15a0/x"));
    }
}
