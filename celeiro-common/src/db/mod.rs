//! Database initialization and schema bring-up
//!
//! Creates the intake tables on first run so a fresh deployment starts from
//! an empty but fully-formed database.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_pragmas(&pool).await?;
    create_tables(&pool).await?;

    Ok(pool)
}

/// Connection pragmas: referential integrity, WAL for concurrent workers,
/// bounded lock waits
async fn configure_pragmas(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer, which matters once the
    // worker pool runs more than one checkin at a time
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

/// Create intake tables (idempotent)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_article_pkgs_table(pool).await?;
    create_attempts_table(pool).await?;
    create_checkpoints_table(pool).await?;
    create_notices_table(pool).await?;
    info!("Database tables initialized (article_pkgs, attempts, checkpoints, notices)");
    Ok(())
}

async fn create_article_pkgs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS article_pkgs (
            id TEXT PRIMARY KEY,
            article_title TEXT NOT NULL UNIQUE,
            journal_title TEXT,
            issn_print TEXT,
            issn_electronic TEXT,
            issue_year INTEGER,
            issue_volume TEXT,
            issue_number TEXT,
            issue_suppl_volume TEXT,
            issue_suppl_number TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_attempts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attempts (
            id TEXT PRIMARY KEY,
            checksum TEXT NOT NULL UNIQUE,
            package_path TEXT NOT NULL,
            origin_path TEXT NOT NULL,
            is_valid INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            started_at TIMESTAMP,
            finished_at TIMESTAMP,
            queued_checkout INTEGER NOT NULL DEFAULT 0,
            articlepkg_id TEXT REFERENCES article_pkgs(id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_checkpoints_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            id TEXT PRIMARY KEY,
            attempt_id TEXT NOT NULL REFERENCES attempts(id) ON DELETE CASCADE,
            point TEXT NOT NULL,
            started_at TIMESTAMP,
            finished_at TIMESTAMP,
            UNIQUE(attempt_id, point)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_notices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notices (
            id TEXT PRIMARY KEY,
            checkpoint_id TEXT NOT NULL REFERENCES checkpoints(id) ON DELETE CASCADE,
            recorded_at TIMESTAMP NOT NULL,
            label TEXT NOT NULL,
            message TEXT NOT NULL,
            status TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One connection only: each pooled connection to `:memory:` opens its
    /// own database
    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_tables_in_memory() {
        let pool = memory_pool().await;
        create_tables(&pool).await.unwrap();

        // Tables exist and accept rows honoring the unique constraints
        sqlx::query("INSERT INTO article_pkgs (id, article_title) VALUES ('a1', 'Title')")
            .execute(&pool)
            .await
            .unwrap();

        let dup = sqlx::query("INSERT INTO article_pkgs (id, article_title) VALUES ('a2', 'Title')")
            .execute(&pool)
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_create_tables_idempotent() {
        let pool = memory_pool().await;
        create_tables(&pool).await.unwrap();
        create_tables(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_attempt_checksum_unique() {
        let pool = memory_pool().await;
        create_tables(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO attempts (id, checksum, package_path, origin_path) VALUES ('t1', 'c1', '/w/a.zip', '/in/a.zip')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let dup = sqlx::query(
            "INSERT INTO attempts (id, checksum, package_path, origin_path) VALUES ('t2', 'c1', '/w/b.zip', '/in/b.zip')",
        )
        .execute(&pool)
        .await;
        assert!(dup.is_err());
    }
}
