//! Publication date consistency check
//!
//! The article's pub-date must fall inside the issue's declared publication
//! window. Articles write months as numerals or three-letter abbreviations;
//! season issues write ranges like `Jul-Sep`, which must sit inside the
//! window as a whole.

use crate::archive::ArticleDocument;
use crate::editorial::IssueRecord;
use crate::error::Result;
use crate::models::Status;
use crate::pipeline::{PipelineItem, Stage};
use async_trait::async_trait;

pub struct PubDateStage;

const MONTH_ABBREVS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Parse one month token: `9`, `09`, `Sep`, `SEP`
fn parse_month(token: &str) -> Option<u32> {
    let token = token.trim();
    if let Ok(n) = token.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let lower = token.to_lowercase();
    MONTH_ABBREVS
        .iter()
        .position(|abbrev| lower.starts_with(abbrev))
        .map(|idx| idx as u32 + 1)
}

/// Months the article claims: a single month, or both endpoints of a
/// season range (`Jul-Sep`, `Jul/Sep`)
fn article_months(doc: &ArticleDocument) -> Option<Vec<u32>> {
    if let Some(month) = doc.pub_month.as_deref() {
        return parse_month(month).map(|m| vec![m]);
    }
    if let Some(season) = doc.pub_season.as_deref() {
        let parts: Vec<u32> = season
            .split(['-', '/'])
            .filter_map(parse_month)
            .collect();
        if !parts.is_empty() {
            return Some(parts);
        }
    }
    None
}

fn window_label(issue: &IssueRecord) -> String {
    let year = issue.year.map(|y| y.to_string()).unwrap_or_default();
    match (issue.publication_start_month, issue.publication_end_month) {
        (Some(start), Some(end)) => format!("{start:02}-{end:02}/{year}"),
        (Some(start), None) => format!("{start:02}/{year}"),
        _ => year,
    }
}

#[async_trait]
impl Stage for PubDateStage {
    fn label(&self) -> &'static str {
        "publication date"
    }

    async fn validate(&self, item: &mut PipelineItem) -> Result<(Status, String)> {
        let Some(doc) = item.doc.as_ref() else {
            return Ok((Status::Error, "primary document unavailable".into()));
        };
        let Some(issue) = item.issue.as_ref() else {
            return Ok((Status::Error, "no issue context resolved".into()));
        };

        let (Some(start), Some(expected_year)) = (issue.publication_start_month, issue.year)
        else {
            return Ok((
                Status::Warning,
                "issue declares no publication window to check against".into(),
            ));
        };
        let end = issue.publication_end_month.unwrap_or(start);

        let found_year = doc.pub_year.as_deref().and_then(|y| y.parse::<i64>().ok());
        let months = article_months(doc);

        let (Some(found_year), Some(months)) = (found_year, months) else {
            return Ok((
                Status::Error,
                format!(
                    "article declares no usable publication date; expected {}",
                    window_label(issue)
                ),
            ));
        };

        let found_label = format!(
            "{}/{}",
            months
                .iter()
                .map(|m| format!("{m:02}"))
                .collect::<Vec<_>>()
                .join("-"),
            found_year
        );

        let in_window =
            found_year == expected_year && months.iter().all(|m| (start..=end).contains(m));

        if in_window {
            Ok((Status::Ok, format!("publication date {found_label} matches")))
        } else {
            Ok((
                Status::Error,
                format!(
                    "publication date {} outside the issue window {}",
                    found_label,
                    window_label(issue)
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sample_issue, stage_item, stage_item_with_xml};

    fn dated_xml(month_or_season: &str, year: &str, season: bool) -> Vec<u8> {
        let inner = if season {
            format!("<season>{month_or_season}</season><year>{year}</year>")
        } else {
            format!("<month>{month_or_season}</month><year>{year}</year>")
        };
        format!(
            "<article><front><article-meta><pub-date pub-type=\"ppub\">{inner}</pub-date>\
             </article-meta></front></article>"
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_september_1999_inside_september_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut item = stage_item(dir.path());

        let (status, _) = PubDateStage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Ok);
    }

    #[tokio::test]
    async fn test_august_against_september_window_names_both_dates() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dated_xml("08", "1999", false);
        let mut item = stage_item_with_xml(dir.path(), &xml);

        let (status, description) = PubDateStage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Error);
        assert!(description.contains("08/1999"), "{description}");
        assert!(description.contains("09/1999"), "{description}");
    }

    #[tokio::test]
    async fn test_abbreviated_month_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dated_xml("Sep", "1999", false);
        let mut item = stage_item_with_xml(dir.path(), &xml);

        let (status, _) = PubDateStage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Ok);
    }

    #[tokio::test]
    async fn test_season_range_inside_window() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dated_xml("Jul-Sep", "1999", true);
        let mut item = stage_item_with_xml(dir.path(), &xml);

        let mut issue = sample_issue();
        issue.publication_start_month = Some(7);
        issue.publication_end_month = Some(9);
        item.issue = Some(issue);

        let (status, _) = PubDateStage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Ok);
    }

    #[tokio::test]
    async fn test_season_range_outside_window_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dated_xml("Jul-Sep", "1999", true);
        let mut item = stage_item_with_xml(dir.path(), &xml);

        let (status, _) = PubDateStage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Error);
    }

    #[tokio::test]
    async fn test_wrong_year_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dated_xml("09", "2000", false);
        let mut item = stage_item_with_xml(dir.path(), &xml);

        let (status, _) = PubDateStage.validate(&mut item).await.unwrap();
        assert_eq!(status, Status::Error);
    }

    #[test]
    fn test_parse_month_forms() {
        assert_eq!(parse_month("9"), Some(9));
        assert_eq!(parse_month("09"), Some(9));
        assert_eq!(parse_month("Sep"), Some(9));
        assert_eq!(parse_month("SEPTEMBER"), Some(9));
        assert_eq!(parse_month("13"), None);
        assert_eq!(parse_month("foo"), None);
    }
}
