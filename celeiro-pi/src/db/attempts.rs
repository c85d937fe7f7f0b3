//! Attempt persistence

use crate::error::Result;
use crate::models::Attempt;
use chrono::{DateTime, Utc};
use sqlx::Sqlite;
use uuid::Uuid;

type AttemptRow = (
    String,                // id
    String,                // checksum
    String,                // package_path
    String,                // origin_path
    i64,                   // is_valid
    DateTime<Utc>,         // created_at
    Option<DateTime<Utc>>, // started_at
    Option<DateTime<Utc>>, // finished_at
    i64,                   // queued_checkout
    Option<String>,        // articlepkg_id
);

fn from_row(row: AttemptRow) -> Attempt {
    Attempt {
        id: Uuid::parse_str(&row.0).unwrap_or_default(),
        checksum: row.1,
        package_path: row.2,
        origin_path: row.3,
        is_valid: row.4 != 0,
        created_at: row.5,
        started_at: row.6,
        finished_at: row.7,
        queued_checkout: row.8 != 0,
        articlepkg_id: row.9.and_then(|s| Uuid::parse_str(&s).ok()),
    }
}

const COLUMNS: &str = "id, checksum, package_path, origin_path, is_valid, created_at, \
                       started_at, finished_at, queued_checkout, articlepkg_id";

/// Insert a candidate attempt. A unique violation on the checksum column is
/// returned raw; the checkin procedure classifies it.
pub async fn insert<'e, E>(ex: E, attempt: &Attempt) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO attempts (id, checksum, package_path, origin_path, is_valid, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(attempt.id.to_string())
    .bind(&attempt.checksum)
    .bind(&attempt.package_path)
    .bind(&attempt.origin_path)
    .bind(attempt.is_valid as i64)
    .bind(attempt.created_at)
    .execute(ex)
    .await?;
    Ok(())
}

/// Flip validity and (optionally) link the resolved article package
pub async fn set_validity<'e, E>(
    ex: E,
    attempt_id: Uuid,
    is_valid: bool,
    articlepkg_id: Option<Uuid>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE attempts SET is_valid = ?, articlepkg_id = ? WHERE id = ?")
        .bind(is_valid as i64)
        .bind(articlepkg_id.map(|u| u.to_string()))
        .bind(attempt_id.to_string())
        .execute(ex)
        .await?;
    Ok(())
}

/// Record the start of the validation window
pub async fn set_validation_started<'e, E>(
    ex: E,
    attempt_id: Uuid,
    at: DateTime<Utc>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE attempts SET started_at = ? WHERE id = ?")
        .bind(at)
        .bind(attempt_id.to_string())
        .execute(ex)
        .await?;
    Ok(())
}

/// Record the end of the validation window
pub async fn set_validation_finished<'e, E>(
    ex: E,
    attempt_id: Uuid,
    at: DateTime<Utc>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE attempts SET finished_at = ? WHERE id = ?")
        .bind(at)
        .bind(attempt_id.to_string())
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn fetch<'e, E>(ex: E, attempt_id: Uuid) -> Result<Option<Attempt>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row: Option<AttemptRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM attempts WHERE id = ?"))
            .bind(attempt_id.to_string())
            .fetch_optional(ex)
            .await?;
    Ok(row.map(from_row))
}

pub async fn fetch_by_checksum<'e, E>(ex: E, checksum: &str) -> Result<Option<Attempt>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row: Option<AttemptRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM attempts WHERE checksum = ?"))
            .bind(checksum)
            .fetch_optional(ex)
            .await?;
    Ok(row.map(from_row))
}
