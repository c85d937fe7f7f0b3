//! Article category membership check
//!
//! The article's section heading must be one of the section titles the
//! editorial system registered for the issue. Comparison is case and
//! diacritic insensitive.

use crate::error::Result;
use crate::models::Status;
use crate::pipeline::{PipelineItem, Stage};
use crate::text::titles_match;
use async_trait::async_trait;

pub struct SectionStage;

#[async_trait]
impl Stage for SectionStage {
    fn label(&self) -> &'static str {
        "section"
    }

    async fn validate(&self, item: &mut PipelineItem) -> Result<(Status, String)> {
        let Some(doc) = item.doc.as_ref() else {
            return Ok((Status::Error, "primary document unavailable".into()));
        };
        let Some(issue) = item.issue.as_ref() else {
            return Ok((Status::Error, "no issue context resolved".into()));
        };

        let Some(section) = doc.section_title.as_deref() else {
            return Ok((Status::Error, "article declares no section heading".into()));
        };

        if issue
            .sections
            .iter()
            .any(|registered| titles_match(registered, section))
        {
            Ok((Status::Ok, format!("section '{section}' is registered")))
        } else {
            Ok((
                Status::Error,
                format!(
                    "section '{}' not among the issue's registered titles: {}",
                    section,
                    issue.sections.join("; ")
                ),
            ))
        }
    }
}
