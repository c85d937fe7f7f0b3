//! Bibliography completeness check
//!
//! Every reference entry needs a non-empty source and a four-digit year;
//! journal-type references also need an article title. Offending entries
//! are aggregated into one error description, identified by reference id.

use crate::archive::RefEntry;
use crate::error::Result;
use crate::models::Status;
use crate::pipeline::{PipelineItem, Stage};
use async_trait::async_trait;

pub struct ReferencesStage;

fn is_four_digit_year(year: Option<&str>) -> bool {
    year.is_some_and(|y| y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()))
}

/// Field names missing or malformed on one entry; empty when complete
fn entry_defects(entry: &RefEntry) -> Vec<&'static str> {
    let mut defects = Vec::new();

    if entry.source.as_deref().map_or(true, |s| s.trim().is_empty()) {
        defects.push("source");
    }
    if !is_four_digit_year(entry.year.as_deref()) {
        defects.push("year");
    }
    if entry.publication_type.as_deref() == Some("journal")
        && entry
            .article_title
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
    {
        defects.push("article-title");
    }

    defects
}

#[async_trait]
impl Stage for ReferencesStage {
    fn label(&self) -> &'static str {
        "references"
    }

    async fn validate(&self, item: &mut PipelineItem) -> Result<(Status, String)> {
        let Some(doc) = item.doc.as_ref() else {
            return Ok((Status::Error, "primary document unavailable".into()));
        };

        if doc.references.is_empty() {
            return Ok((Status::Warning, "article carries no reference list".into()));
        }

        let mut problems = Vec::new();
        for (idx, entry) in doc.references.iter().enumerate() {
            let defects = entry_defects(entry);
            if !defects.is_empty() {
                let id = if entry.id.is_empty() {
                    format!("#{}", idx + 1)
                } else {
                    entry.id.clone()
                };
                problems.push(format!("{}: missing or malformed {}", id, defects.join(", ")));
            }
        }

        if problems.is_empty() {
            Ok((
                Status::Ok,
                format!("{} references complete", doc.references.len()),
            ))
        } else {
            Ok((Status::Error, problems.join("; ")))
        }
    }
}
