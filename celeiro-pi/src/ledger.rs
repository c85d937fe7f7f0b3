//! Checkpoint/notice ledger
//!
//! Append-only audit trail of the submission lifecycle. Each checkpoint
//! walks unopened → open → closed; notices are only accepted while open and
//! are never mutated or deleted afterwards.

use crate::error::{IntakeError, Result};
use crate::models::{Point, Status};
use chrono::{DateTime, Utc};
use sqlx::{Acquire, SqlitePool};
use tracing::error;
use uuid::Uuid;

/// One lifecycle checkpoint for one attempt
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub point: Point,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn is_open(&self) -> bool {
        self.started_at.is_some() && self.finished_at.is_none()
    }
}

/// One recorded notice
#[derive(Debug, Clone)]
pub struct Notice {
    pub id: Uuid,
    pub checkpoint_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub label: String,
    pub message: String,
    pub status: Status,
}

/// Ledger service over the checkpoints/notices tables
#[derive(Clone)]
pub struct Ledger {
    db: SqlitePool,
}

impl Ledger {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Fetch the checkpoint for (attempt, point), creating an unopened row
    /// if none exists yet
    pub async fn checkpoint(&self, attempt_id: Uuid, point: Point) -> Result<Checkpoint> {
        let existing: Option<(String, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> =
            sqlx::query_as(
                "SELECT id, started_at, finished_at FROM checkpoints \
                 WHERE attempt_id = ? AND point = ?",
            )
            .bind(attempt_id.to_string())
            .bind(point.as_str())
            .fetch_optional(&self.db)
            .await?;

        if let Some((id, started_at, finished_at)) = existing {
            return Ok(Checkpoint {
                id: Uuid::parse_str(&id).unwrap_or_default(),
                attempt_id,
                point,
                started_at,
                finished_at,
            });
        }

        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO checkpoints (id, attempt_id, point) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(attempt_id.to_string())
            .bind(point.as_str())
            .execute(&self.db)
            .await?;

        Ok(Checkpoint {
            id,
            attempt_id,
            point,
            started_at: None,
            finished_at: None,
        })
    }

    /// Open the checkpoint. Idempotent: a second call leaves the original
    /// timestamp in place.
    pub async fn start(&self, cp: &mut Checkpoint) -> Result<()> {
        if cp.started_at.is_some() {
            return Ok(());
        }

        let now = Utc::now();
        sqlx::query("UPDATE checkpoints SET started_at = ? WHERE id = ?")
            .bind(now)
            .bind(cp.id.to_string())
            .execute(&self.db)
            .await?;
        cp.started_at = Some(now);
        Ok(())
    }

    /// Close the checkpoint. Calling before `start` is a programming error
    /// and fails loudly; calling twice is idempotent.
    pub async fn end(&self, cp: &mut Checkpoint) -> Result<()> {
        if cp.finished_at.is_some() {
            return Ok(());
        }
        if cp.started_at.is_none() {
            return Err(IntakeError::Ledger(format!(
                "end() before start() on {} checkpoint of attempt {}",
                cp.point, cp.attempt_id
            )));
        }

        let now = Utc::now();
        sqlx::query("UPDATE checkpoints SET finished_at = ? WHERE id = ?")
            .bind(now)
            .bind(cp.id.to_string())
            .execute(&self.db)
            .await?;
        cp.finished_at = Some(now);
        Ok(())
    }

    /// Record a notice against an open checkpoint.
    ///
    /// The insert runs inside a nested savepoint; if it fails the savepoint
    /// is rolled back, the failure logged and the error propagated — callers
    /// treat a broken audit trail as fatal to the run.
    pub async fn tell(
        &self,
        cp: &Checkpoint,
        label: &str,
        status: Status,
        message: &str,
    ) -> Result<Notice> {
        if cp.started_at.is_none() {
            return Err(IntakeError::Ledger(format!(
                "notice on unopened {} checkpoint of attempt {}",
                cp.point, cp.attempt_id
            )));
        }
        if cp.finished_at.is_some() {
            return Err(IntakeError::Ledger(format!(
                "notice on closed {} checkpoint of attempt {}",
                cp.point, cp.attempt_id
            )));
        }

        let notice = Notice {
            id: Uuid::new_v4(),
            checkpoint_id: cp.id,
            recorded_at: Utc::now(),
            label: label.to_string(),
            message: message.to_string(),
            status,
        };

        let mut tx = self.db.begin().await?;
        let mut sp = tx.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO notices (id, checkpoint_id, recorded_at, label, message, status) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(notice.id.to_string())
        .bind(notice.checkpoint_id.to_string())
        .bind(notice.recorded_at)
        .bind(&notice.label)
        .bind(&notice.message)
        .bind(notice.status.as_str())
        .execute(&mut *sp)
        .await;

        match inserted {
            Ok(_) => {
                sp.commit().await?;
                tx.commit().await?;
                Ok(notice)
            }
            Err(e) => {
                error!(
                    checkpoint_id = %cp.id,
                    label = label,
                    "Failed to record notice: {}",
                    e
                );
                sp.rollback().await.ok();
                tx.rollback().await.ok();
                Err(IntakeError::Database(e))
            }
        }
    }

    /// All notices of a checkpoint in arrival order
    pub async fn notices(&self, checkpoint_id: Uuid) -> Result<Vec<Notice>> {
        let rows: Vec<(String, String, DateTime<Utc>, String, String, String)> = sqlx::query_as(
            "SELECT id, checkpoint_id, recorded_at, label, message, status \
             FROM notices WHERE checkpoint_id = ? ORDER BY recorded_at, id",
        )
        .bind(checkpoint_id.to_string())
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, cp_id, recorded_at, label, message, status)| Notice {
                id: Uuid::parse_str(&id).unwrap_or_default(),
                checkpoint_id: Uuid::parse_str(&cp_id).unwrap_or_default(),
                recorded_at,
                label,
                message,
                status: Status::parse(&status).unwrap_or(Status::Error),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attempt;

    async fn setup() -> (Ledger, Uuid) {
        let pool = crate::testutil::setup_test_db().await;

        let attempt = Attempt::candidate("cksum".into(), "/w/a.zip".into(), "/in/a.zip".into());
        crate::db::attempts::insert(&pool, &attempt).await.unwrap();

        (Ledger::new(pool), attempt.id)
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (ledger, attempt_id) = setup().await;
        let mut cp = ledger.checkpoint(attempt_id, Point::Validation).await.unwrap();

        ledger.start(&mut cp).await.unwrap();
        let first = cp.started_at.unwrap();
        ledger.start(&mut cp).await.unwrap();
        assert_eq!(cp.started_at.unwrap(), first);
    }

    #[tokio::test]
    async fn test_end_before_start_fails_loudly() {
        let (ledger, attempt_id) = setup().await;
        let mut cp = ledger.checkpoint(attempt_id, Point::Checkin).await.unwrap();

        let err = ledger.end(&mut cp).await.unwrap_err();
        assert!(matches!(err, IntakeError::Ledger(_)));
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let (ledger, attempt_id) = setup().await;
        let mut cp = ledger.checkpoint(attempt_id, Point::Validation).await.unwrap();

        ledger.start(&mut cp).await.unwrap();
        ledger.end(&mut cp).await.unwrap();
        let first = cp.finished_at.unwrap();
        ledger.end(&mut cp).await.unwrap();
        assert_eq!(cp.finished_at.unwrap(), first);
    }

    #[tokio::test]
    async fn test_tell_requires_open_checkpoint() {
        let (ledger, attempt_id) = setup().await;
        let mut cp = ledger.checkpoint(attempt_id, Point::Validation).await.unwrap();

        // Unopened
        assert!(ledger
            .tell(&cp, "stage", Status::Ok, "msg")
            .await
            .is_err());

        ledger.start(&mut cp).await.unwrap();
        ledger.tell(&cp, "stage", Status::Ok, "msg").await.unwrap();

        ledger.end(&mut cp).await.unwrap();
        // Closed
        assert!(ledger
            .tell(&cp, "stage", Status::Error, "late")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_notices_kept_in_arrival_order() {
        let (ledger, attempt_id) = setup().await;
        let mut cp = ledger.checkpoint(attempt_id, Point::Validation).await.unwrap();
        ledger.start(&mut cp).await.unwrap();

        ledger.tell(&cp, "first", Status::Ok, "one").await.unwrap();
        ledger
            .tell(&cp, "second", Status::Warning, "two")
            .await
            .unwrap();
        ledger.tell(&cp, "third", Status::Error, "three").await.unwrap();

        let notices = ledger.notices(cp.id).await.unwrap();
        assert_eq!(notices.len(), 3);
        assert_eq!(notices[0].label, "first");
        assert_eq!(notices[1].status, Status::Warning);
        assert_eq!(notices[2].message, "three");
    }

    #[tokio::test]
    async fn test_checkpoint_fetch_or_create_is_stable() {
        let (ledger, attempt_id) = setup().await;
        let cp1 = ledger.checkpoint(attempt_id, Point::Checkin).await.unwrap();
        let cp2 = ledger.checkpoint(attempt_id, Point::Checkin).await.unwrap();
        assert_eq!(cp1.id, cp2.id);
    }
}
