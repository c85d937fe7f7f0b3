//! Validation pipeline engine
//!
//! An ordered sequence of stages, each gated by a precondition, each
//! producing a status/description pair recorded against the open validation
//! checkpoint and forwarded to the notifier. A setup phase always runs
//! first (checkpoint open, lock, journal/issue resolution) and a teardown
//! phase always runs last (checkpoint close, unlock, failure marking).
//!
//! Stage outcomes are values, not control flow: an unmet precondition skips
//! the stage, a failed business validation is an `error` notice. The one
//! fatal condition is a ledger write failure — a broken audit trail aborts
//! the run for that attempt.

pub mod stages;

use crate::archive::{ArticleDocument, ArticlePackage, BibliographicExtractor, PackageGuard};
use crate::db::{article_pkgs, attempts};
use crate::editorial::{IssueCriteria, IssueRecord, IssueResolver, JournalRecord};
use crate::error::{IntakeError, Result};
use crate::ledger::{Checkpoint, Ledger};
use crate::models::{ArticlePkg, Attempt, Point, Status};
use crate::notifier::{Notifier, NoticeNotification};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything one attempt carries through the pipeline
pub struct PipelineItem {
    pub attempt: Attempt,
    pub package: ArticlePackage,
    pub guard: PackageGuard,
    /// Primary document, parsed once by setup for valid attempts
    pub doc: Option<ArticleDocument>,
    pub article: Option<ArticlePkg>,
    pub journal: Option<JournalRecord>,
    pub issue: Option<IssueRecord>,
    /// Open validation checkpoint, set by setup
    pub checkpoint: Option<Checkpoint>,
    /// Editorial reference from the checkin notification
    pub checkin_ref: Option<String>,
}

/// One validation stage
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage identity; used as the notice label
    fn label(&self) -> &'static str;

    /// Universal precondition: the attempt must still be valid. Unmet means
    /// the stage is skipped entirely — no notice, no failure.
    fn precondition(&self, item: &PipelineItem) -> bool {
        item.attempt.is_valid
    }

    /// Run the check. An `Err` is mapped by the engine to an `error`
    /// notice; it does not abort the run.
    async fn validate(&self, item: &mut PipelineItem) -> Result<(Status, String)>;
}

/// What happened to one stage for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Ran { label: &'static str, status: Status },
    Skipped { label: &'static str },
}

/// The engine
pub struct ValidationPipeline {
    db: SqlitePool,
    ledger: Ledger,
    notifier: Arc<Notifier>,
    resolver: Arc<dyn IssueResolver>,
    stages: Vec<Box<dyn Stage>>,
}

impl ValidationPipeline {
    /// Pipeline with the full registered stage set
    pub fn new(db: SqlitePool, notifier: Arc<Notifier>, resolver: Arc<dyn IssueResolver>) -> Self {
        let stages = stages::default_stages(Arc::clone(&resolver));
        Self::with_stages(db, notifier, resolver, stages)
    }

    pub fn with_stages(
        db: SqlitePool,
        notifier: Arc<Notifier>,
        resolver: Arc<dyn IssueResolver>,
        stages: Vec<Box<dyn Stage>>,
    ) -> Self {
        Self {
            ledger: Ledger::new(db.clone()),
            db,
            notifier,
            resolver,
            stages,
        }
    }

    /// Run the pipeline for one item. The permission lock is released on
    /// every exit path, including a fatal ledger failure.
    pub async fn run(&self, mut item: PipelineItem) -> Result<(PipelineItem, Vec<StageOutcome>)> {
        match self.run_inner(&mut item).await {
            Ok(outcomes) => Ok((item, outcomes)),
            Err(e) => {
                if let Err(unlock_err) = item.guard.unlock() {
                    warn!(
                        attempt_id = %item.attempt.id,
                        "Unlock after pipeline failure also failed: {}",
                        unlock_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_inner(&self, item: &mut PipelineItem) -> Result<Vec<StageOutcome>> {
        self.setup(item).await?;

        self.notifier
            .notify_marker(
                item.checkin_ref.as_deref(),
                Point::Validation.as_str(),
                Status::ServBegin,
            )
            .await;

        let mut outcomes = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            if !stage.precondition(item) {
                debug!(
                    attempt_id = %item.attempt.id,
                    stage = stage.label(),
                    "Precondition unmet; stage skipped"
                );
                outcomes.push(StageOutcome::Skipped {
                    label: stage.label(),
                });
                continue;
            }

            let (status, description) = match stage.validate(item).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(
                        attempt_id = %item.attempt.id,
                        stage = stage.label(),
                        "Stage raised: {}",
                        e
                    );
                    (Status::Error, format!("{} check failed: {}", stage.label(), e))
                }
            };

            self.record(item, stage.label(), status, &description).await?;
            outcomes.push(StageOutcome::Ran {
                label: stage.label(),
                status,
            });
        }

        self.notifier
            .notify_marker(
                item.checkin_ref.as_deref(),
                Point::Validation.as_str(),
                Status::ServEnd,
            )
            .await;

        self.teardown(item).await?;
        Ok(outcomes)
    }

    /// Open the validation checkpoint, lock the package and resolve the
    /// journal/issue context. Resolution failures degrade the attempt to
    /// invalid with a single error notice; the pipeline continues so the
    /// stages short-circuit cleanly.
    async fn setup(&self, item: &mut PipelineItem) -> Result<()> {
        let mut cp = self
            .ledger
            .checkpoint(item.attempt.id, Point::Validation)
            .await?;
        self.ledger.start(&mut cp).await?;
        item.checkpoint = Some(cp);

        item.guard.lock()?;

        let now = Utc::now();
        attempts::set_validation_started(&self.db, item.attempt.id, now).await?;
        item.attempt.started_at = Some(now);

        if !item.attempt.is_valid {
            // Nothing to resolve; every stage precondition will fail
            return Ok(());
        }

        match item.package.primary_document() {
            Ok(doc) => item.doc = Some(doc),
            Err(e) => {
                return self
                    .degrade(item, format!("primary document unusable: {e}"))
                    .await;
            }
        }

        let article = match item.attempt.articlepkg_id {
            Some(id) => article_pkgs::fetch(&self.db, id).await?,
            None => None,
        };
        let Some(article) = article else {
            return self
                .degrade(item, "attempt has no article record to resolve against".into())
                .await;
        };

        let journal = match self.resolve_journal(&article).await {
            Ok(Some(journal)) => journal,
            Ok(None) => {
                let issns = [
                    article.issn_print.as_deref().unwrap_or("-"),
                    article.issn_electronic.as_deref().unwrap_or("-"),
                ]
                .join("/");
                return self
                    .degrade(item, format!("no registered journal for ISSNs {issns}"))
                    .await;
            }
            Err(e) => {
                return self
                    .degrade(item, format!("journal lookup failed: {e}"))
                    .await;
            }
        };

        let criteria = IssueCriteria {
            year: article.issue_year,
            volume: article.issue_volume.clone(),
            number: article.issue_number.clone(),
            suppl_volume: article.issue_suppl_volume.clone(),
            suppl_number: article.issue_suppl_number.clone(),
        };
        let issue = match self.resolver.find_issue(&journal, &criteria).await {
            Ok(Some(issue)) => issue,
            Ok(None) => {
                return self
                    .degrade(
                        item,
                        format!("no issue matching {:?} for journal {}", criteria, journal.reference),
                    )
                    .await;
            }
            Err(e) => {
                return self.degrade(item, format!("issue lookup failed: {e}")).await;
            }
        };

        debug!(
            attempt_id = %item.attempt.id,
            journal = %journal.reference,
            issue = %issue.reference,
            "Journal/issue context resolved"
        );

        item.article = Some(article);
        item.journal = Some(journal);
        item.issue = Some(issue);
        Ok(())
    }

    /// Print-ISSN lookup first, electronic fallback only when the first
    /// lookup yields nothing
    async fn resolve_journal(
        &self,
        article: &ArticlePkg,
    ) -> std::result::Result<Option<JournalRecord>, crate::editorial::EditorialError> {
        if let Some(issn) = article.issn_print.as_deref().filter(|s| !s.is_empty()) {
            if let Some(journal) = self.resolver.journal_by_issn(issn).await? {
                return Ok(Some(journal));
            }
        }
        if let Some(issn) = article
            .issn_electronic
            .as_deref()
            .filter(|s| !s.is_empty())
        {
            return self.resolver.journal_by_issn(issn).await;
        }
        Ok(None)
    }

    /// Mark the attempt invalid and record the single setup error notice
    async fn degrade(&self, item: &mut PipelineItem, reason: String) -> Result<()> {
        warn!(attempt_id = %item.attempt.id, "Attempt degraded to invalid: {}", reason);

        attempts::set_validity(&self.db, item.attempt.id, false, item.attempt.articlepkg_id)
            .await?;
        item.attempt.is_valid = false;

        self.record(item, "setup", Status::Error, &reason).await
    }

    /// Record a notice against the open checkpoint and forward it. A ledger
    /// write failure propagates; a notifier transport failure does not.
    async fn record(
        &self,
        item: &PipelineItem,
        label: &'static str,
        status: Status,
        description: &str,
    ) -> Result<()> {
        let cp = item
            .checkpoint
            .as_ref()
            .ok_or_else(|| IntakeError::Ledger("no open validation checkpoint".into()))?;

        self.ledger.tell(cp, label, status, description).await?;

        self.notifier
            .notify_notice(&NoticeNotification {
                checkin: item.checkin_ref.clone(),
                stage: label.to_string(),
                checkpoint: cp.point.to_string(),
                message: description.to_string(),
                status,
            })
            .await;

        Ok(())
    }

    /// Close the checkpoint, restore permissions, mark the original failed
    /// when the attempt ended invalid
    async fn teardown(&self, item: &mut PipelineItem) -> Result<()> {
        let now = Utc::now();
        attempts::set_validation_finished(&self.db, item.attempt.id, now).await?;
        item.attempt.finished_at = Some(now);

        if let Some(cp) = item.checkpoint.as_mut() {
            self.ledger.end(cp).await?;
        }

        item.guard.unlock()?;

        if !item.attempt.is_valid {
            item.guard.mark_failed(true)?;
        }

        info!(
            attempt_id = %item.attempt.id,
            is_valid = item.attempt.is_valid,
            "Validation pipeline finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkin::CheckinProcedure;
    use crate::ledger::Ledger;
    use crate::testutil::{
        setup_test_db, valid_package, StubResolver,
    };
    use std::path::Path;

    async fn checked_in_item(
        pool: &SqlitePool,
        dir: &Path,
        file_name: &str,
    ) -> PipelineItem {
        let origin = valid_package(dir, file_name);
        let proc = CheckinProcedure::new(pool.clone(), dir.join("work"));
        let mut guard = PackageGuard::new(&origin, None);
        let (attempt, package) = proc.run(&mut guard).await.unwrap();
        PipelineItem {
            attempt,
            package,
            guard,
            doc: None,
            article: None,
            journal: None,
            issue: None,
            checkpoint: None,
            checkin_ref: None,
        }
    }

    fn pipeline(pool: &SqlitePool, resolver: StubResolver) -> ValidationPipeline {
        ValidationPipeline::new(
            pool.clone(),
            Arc::new(Notifier::disabled()),
            Arc::new(resolver),
        )
    }

    #[tokio::test]
    async fn test_happy_path_every_stage_records_ok_or_warning() {
        let pool = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let item = checked_in_item(&pool, dir.path(), "pkg.zip").await;
        let attempt_id = item.attempt.id;

        let engine = pipeline(&pool, StubResolver::matching_sample());
        let (item, outcomes) = engine.run(item).await.unwrap();

        assert!(item.attempt.is_valid);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, StageOutcome::Ran { status, .. }
                if *status == Status::Ok || *status == Status::Warning)));

        // Checkpoint closed, one notice per stage
        let ledger = Ledger::new(pool.clone());
        let cp = ledger.checkpoint(attempt_id, Point::Validation).await.unwrap();
        assert!(cp.finished_at.is_some());
        let notices = ledger.notices(cp.id).await.unwrap();
        assert_eq!(notices.len(), outcomes.len());

        // Validation window recorded on the attempt
        let stored = attempts::fetch(&pool, attempt_id).await.unwrap().unwrap();
        assert!(stored.started_at.is_some());
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_invalid_attempt_short_circuits_all_stages() {
        let pool = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let mut item = checked_in_item(&pool, dir.path(), "pkg.zip").await;

        // Force invalid before the pipeline sees it
        attempts::set_validity(&pool, item.attempt.id, false, None)
            .await
            .unwrap();
        item.attempt.is_valid = false;
        let attempt_id = item.attempt.id;

        let engine = pipeline(&pool, StubResolver::matching_sample());
        let (_item, outcomes) = engine.run(item).await.unwrap();

        assert!(outcomes
            .iter()
            .all(|o| matches!(o, StageOutcome::Skipped { .. })));

        // Zero notices from any stage
        let ledger = Ledger::new(pool.clone());
        let cp = ledger.checkpoint(attempt_id, Point::Validation).await.unwrap();
        assert!(ledger.notices(cp.id).await.unwrap().is_empty());
        assert!(cp.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_unresolvable_journal_degrades_with_single_notice() {
        let pool = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let item = checked_in_item(&pool, dir.path(), "pkg.zip").await;
        let attempt_id = item.attempt.id;
        let origin = item.guard.origin().to_path_buf();

        let engine = pipeline(&pool, StubResolver::empty());
        let (item, outcomes) = engine.run(item).await.unwrap();

        assert!(!item.attempt.is_valid);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, StageOutcome::Skipped { .. })));

        let ledger = Ledger::new(pool.clone());
        let cp = ledger.checkpoint(attempt_id, Point::Validation).await.unwrap();
        let notices = ledger.notices(cp.id).await.unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].label, "setup");
        assert_eq!(notices[0].status, Status::Error);

        // Teardown marked the original failed
        assert!(!origin.exists());
        assert!(origin
            .with_file_name("failed_pkg.zip")
            .exists());
    }

    #[tokio::test]
    async fn test_lookup_transport_error_degrades_instead_of_hanging() {
        let pool = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let item = checked_in_item(&pool, dir.path(), "pkg.zip").await;

        let engine = pipeline(&pool, StubResolver::failing());
        let (item, outcomes) = engine.run(item).await.unwrap();

        assert!(!item.attempt.is_valid);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, StageOutcome::Skipped { .. })));
    }

    #[tokio::test]
    async fn test_permissions_restored_after_run() {
        use std::os::unix::fs::PermissionsExt;

        let pool = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();

        // Mode observed before any guarded processing
        let origin = valid_package(dir.path(), "pkg.zip");
        let before = std::fs::metadata(&origin).unwrap().permissions().mode() & 0o777;

        let proc = CheckinProcedure::new(pool.clone(), dir.path().join("work"));
        let mut guard = PackageGuard::new(&origin, None);
        let (attempt, package) = proc.run(&mut guard).await.unwrap();
        let item = PipelineItem {
            attempt,
            package,
            guard,
            doc: None,
            article: None,
            journal: None,
            issue: None,
            checkpoint: None,
            checkin_ref: None,
        };

        let engine = pipeline(&pool, StubResolver::matching_sample());
        let (_item, _) = engine.run(item).await.unwrap();

        // Valid run leaves the original in place with its permissions back
        let after = std::fs::metadata(&origin).unwrap().permissions().mode() & 0o777;
        assert_eq!(after, before);
    }
}
