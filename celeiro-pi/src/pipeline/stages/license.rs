//! License statement presence check

use crate::error::Result;
use crate::models::Status;
use crate::pipeline::{PipelineItem, Stage};
use async_trait::async_trait;

pub struct LicenseStage;

#[async_trait]
impl Stage for LicenseStage {
    fn label(&self) -> &'static str {
        "license"
    }

    async fn validate(&self, item: &mut PipelineItem) -> Result<(Status, String)> {
        let Some(doc) = item.doc.as_ref() else {
            return Ok((Status::Error, "primary document unavailable".into()));
        };

        if !doc.has_license {
            return Ok((Status::Error, "no license statement found".into()));
        }

        Ok(match &doc.license_uri {
            Some(uri) => (Status::Ok, format!("license statement present ({uri})")),
            None => (
                Status::Warning,
                "license statement present but carries no URI".into(),
            ),
        })
    }
}
