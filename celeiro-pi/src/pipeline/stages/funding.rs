//! Funding disclosure check
//!
//! A declared funding-group is taken at face value. Without one, the
//! acknowledgment text is scanned for award-like numbers: grants mentioned
//! in prose but not declared are a disclosure gap worth flagging, not an
//! outright error.

use crate::error::Result;
use crate::models::Status;
use crate::pipeline::{PipelineItem, Stage};
use async_trait::async_trait;

pub struct FundingStage;

/// True when the text mentions something that looks like an award number
/// (a token carrying four or more digits)
fn mentions_award_number(text: &str) -> bool {
    text.split_whitespace()
        .any(|token| token.chars().filter(|c| c.is_ascii_digit()).count() >= 4)
}

#[async_trait]
impl Stage for FundingStage {
    fn label(&self) -> &'static str {
        "funding"
    }

    async fn validate(&self, item: &mut PipelineItem) -> Result<(Status, String)> {
        let Some(doc) = item.doc.as_ref() else {
            return Ok((Status::Error, "primary document unavailable".into()));
        };

        if doc.has_funding_group {
            if doc.funding_awards.is_empty() {
                return Ok((
                    Status::Warning,
                    "funding-group declared without any award-id".into(),
                ));
            }
            return Ok((
                Status::Ok,
                format!("funding declared, awards: {}", doc.funding_awards.join(", ")),
            ));
        }

        match &doc.ack_text {
            Some(ack) if mentions_award_number(ack) => Ok((
                Status::Warning,
                "acknowledgments mention award-like numbers but no funding-group is declared"
                    .into(),
            )),
            _ => Ok((Status::Ok, "no funding data declared".into())),
        }
    }
}
