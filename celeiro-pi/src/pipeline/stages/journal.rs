//! Journal detail equality checks
//!
//! Publisher name, abbreviated journal title and NLM-registered title in
//! the document must match the editorial system's journal record, compared
//! case and diacritic insensitively. Fields the record does not register
//! are skipped.

use crate::error::Result;
use crate::models::Status;
use crate::pipeline::{PipelineItem, Stage};
use crate::text::titles_match;
use async_trait::async_trait;

pub struct JournalDetailsStage;

#[async_trait]
impl Stage for JournalDetailsStage {
    fn label(&self) -> &'static str {
        "journal details"
    }

    async fn validate(&self, item: &mut PipelineItem) -> Result<(Status, String)> {
        let Some(doc) = item.doc.as_ref() else {
            return Ok((Status::Error, "primary document unavailable".into()));
        };
        let Some(journal) = item.journal.as_ref() else {
            return Ok((Status::Error, "no journal context resolved".into()));
        };

        let pairs: [(&str, Option<&str>, Option<&str>); 3] = [
            (
                "publisher name",
                doc.publisher_name.as_deref(),
                journal.publisher_name.as_deref(),
            ),
            (
                "abbreviated journal title",
                doc.abbrev_journal_title.as_deref(),
                journal.abbreviated_title.as_deref(),
            ),
            (
                "NLM journal title",
                doc.nlm_title.as_deref(),
                journal.nlm_title.as_deref(),
            ),
        ];

        let mut mismatches = Vec::new();
        for (what, found, registered) in pairs {
            let Some(registered) = registered else {
                continue;
            };
            match found {
                Some(found) if titles_match(found, registered) => {}
                Some(found) => mismatches.push(format!(
                    "{what}: found '{found}', registered '{registered}'"
                )),
                None => mismatches.push(format!(
                    "{what}: absent in document, registered '{registered}'"
                )),
            }
        }

        if mismatches.is_empty() {
            Ok((
                Status::Ok,
                "journal details match the registered record".into(),
            ))
        } else {
            Ok((Status::Error, mismatches.join("; ")))
        }
    }
}
