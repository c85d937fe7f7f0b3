//! ArticlePkg persistence
//!
//! Lookup is by article title, the primary dedup key: one bibliographic
//! item can be resubmitted many times, each resubmission linking a new
//! attempt to the same row.

use crate::archive::BibRecord;
use crate::error::Result;
use crate::models::ArticlePkg;
use chrono::{DateTime, Utc};
use sqlx::Sqlite;
use uuid::Uuid;

type ArticlePkgRow = (
    String,         // id
    String,         // article_title
    Option<String>, // journal_title
    Option<String>, // issn_print
    Option<String>, // issn_electronic
    Option<i64>,    // issue_year
    Option<String>, // issue_volume
    Option<String>, // issue_number
    Option<String>, // issue_suppl_volume
    Option<String>, // issue_suppl_number
    DateTime<Utc>,  // created_at
);

fn from_row(row: ArticlePkgRow) -> ArticlePkg {
    ArticlePkg {
        id: Uuid::parse_str(&row.0).unwrap_or_default(),
        article_title: row.1,
        journal_title: row.2,
        issn_print: row.3,
        issn_electronic: row.4,
        issue_year: row.5,
        issue_volume: row.6,
        issue_number: row.7,
        issue_suppl_volume: row.8,
        issue_suppl_number: row.9,
        created_at: row.10,
    }
}

const COLUMNS: &str = "id, article_title, journal_title, issn_print, issn_electronic, \
                       issue_year, issue_volume, issue_number, issue_suppl_volume, \
                       issue_suppl_number, created_at";

pub async fn find_by_title<'e, E>(ex: E, title: &str) -> Result<Option<ArticlePkg>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row: Option<ArticlePkgRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM article_pkgs WHERE article_title = ?"
    ))
    .bind(title)
    .fetch_optional(ex)
    .await?;
    Ok(row.map(from_row))
}

pub async fn fetch<'e, E>(ex: E, id: Uuid) -> Result<Option<ArticlePkg>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row: Option<ArticlePkgRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM article_pkgs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(ex)
            .await?;
    Ok(row.map(from_row))
}

pub async fn insert<'e, E>(ex: E, pkg: &ArticlePkg) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO article_pkgs
            (id, article_title, journal_title, issn_print, issn_electronic,
             issue_year, issue_volume, issue_number, issue_suppl_volume,
             issue_suppl_number, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(pkg.id.to_string())
    .bind(&pkg.article_title)
    .bind(&pkg.journal_title)
    .bind(&pkg.issn_print)
    .bind(&pkg.issn_electronic)
    .bind(pkg.issue_year)
    .bind(&pkg.issue_volume)
    .bind(&pkg.issue_number)
    .bind(&pkg.issue_suppl_volume)
    .bind(&pkg.issue_suppl_number)
    .bind(pkg.created_at)
    .execute(ex)
    .await?;
    Ok(())
}

/// Build a new ArticlePkg from bibliographic metadata; the caller supplies
/// the (required, already verified non-empty) title.
pub fn from_bib(title: String, bib: &BibRecord) -> ArticlePkg {
    ArticlePkg {
        id: Uuid::new_v4(),
        article_title: title,
        journal_title: bib.journal_title.clone(),
        issn_print: bib.issn_print.clone(),
        issn_electronic: bib.issn_electronic.clone(),
        issue_year: bib
            .publication_year
            .as_deref()
            .and_then(|y| y.parse::<i64>().ok()),
        issue_volume: bib.volume.clone(),
        issue_number: bib.number.clone(),
        issue_suppl_volume: bib.suppl_volume.clone(),
        issue_suppl_number: bib.suppl_number.clone(),
        created_at: Utc::now(),
    }
}
