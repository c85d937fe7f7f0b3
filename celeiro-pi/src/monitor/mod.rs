//! Dispatch layer
//!
//! Wires the filesystem watch to the bounded candidate queue and the worker
//! pool, and owns the per-path processing sequence: guard → checkin →
//! checkin ledger/notification → validation pipeline. Every failure is
//! mapped to an operator report here; nothing propagates past a worker.

pub mod pool;
pub mod reporter;
pub mod watcher;

pub use pool::WorkerPool;
pub use reporter::Reporter;

use crate::archive::PackageGuard;
use crate::checkin::CheckinProcedure;
use crate::db::article_pkgs;
use crate::error::{IntakeError, Result};
use crate::ledger::Ledger;
use crate::models::{Attempt, Point, Status};
use crate::notifier::{CheckinNotification, Notifier};
use crate::pipeline::{PipelineItem, ValidationPipeline};
use crate::AppContext;
use celeiro_common::report::ReportMessage;
use chrono::Utc;
use notify::RecommendedWatcher;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// The running dispatch layer; dropping the watcher stops event delivery
pub struct Monitor {
    _watcher: RecommendedWatcher,
    pool: WorkerPool,
}

impl Monitor {
    /// Sweep pre-existing files, register the watch and start the pool
    pub fn start(ctx: &AppContext) -> Result<Self> {
        let settings = &ctx.config.settings;
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));

        watcher::sweep_existing(&settings.watch_dirs, settings.recursive_watch, &tx);

        let fs_watcher =
            watcher::spawn_watcher(&settings.watch_dirs, settings.recursive_watch, tx)
                .map_err(|e| IntakeError::Processing(format!("watch setup failed: {e}")))?;

        let processor = Arc::new(PackageProcessor::new(ctx));
        let pool = WorkerPool::spawn(processor, rx, settings.worker_count);

        info!(
            dirs = settings.watch_dirs.len(),
            workers = settings.worker_count,
            "Monitor started"
        );

        Ok(Self {
            _watcher: fs_watcher,
            pool,
        })
    }

    /// Stop watching and drain the pool
    pub async fn shutdown(self) {
        drop(self._watcher);
        self.pool.shutdown().await;
    }
}

/// Per-path processing sequence shared by all workers
pub struct PackageProcessor {
    db: SqlitePool,
    group_id: Option<u32>,
    reporter: Arc<Reporter>,
    notifier: Arc<Notifier>,
    ledger: Ledger,
    checkin: CheckinProcedure,
    engine: ValidationPipeline,
}

impl PackageProcessor {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            db: ctx.db.clone(),
            group_id: ctx.config.settings.app_group_id,
            reporter: Arc::clone(&ctx.reporter),
            notifier: Arc::clone(&ctx.notifier),
            ledger: Ledger::new(ctx.db.clone()),
            checkin: CheckinProcedure::new(ctx.db.clone(), ctx.config.working_dir.clone()),
            engine: ValidationPipeline::new(
                ctx.db.clone(),
                Arc::clone(&ctx.notifier),
                Arc::clone(&ctx.resolver),
            ),
        }
    }

    /// Processor with stubbed collaborators, for tests
    #[cfg(test)]
    pub fn for_tests(
        db: SqlitePool,
        working_dir: std::path::PathBuf,
        resolver: crate::testutil::StubResolver,
    ) -> Self {
        let notifier = Arc::new(Notifier::disabled());
        let resolver: Arc<dyn crate::editorial::IssueResolver> = Arc::new(resolver);
        Self {
            db: db.clone(),
            group_id: None,
            reporter: Arc::new(Reporter::disabled()),
            notifier: Arc::clone(&notifier),
            ledger: Ledger::new(db.clone()),
            checkin: CheckinProcedure::new(db.clone(), working_dir),
            engine: ValidationPipeline::new(db, notifier, resolver),
        }
    }

    /// Run one candidate path through checkin and validation. Never
    /// propagates; the worker loops back unconditionally.
    pub async fn process(&self, path: &Path) {
        info!(path = %path.display(), "Processing candidate package");
        self.reporter.send(&ReportMessage::PackageSighted {
            path: path.display().to_string(),
            timestamp: Utc::now(),
        });

        let mut guard = PackageGuard::new(path, self.group_id);

        let (attempt, package) = match self.checkin.run(&mut guard).await {
            Ok(pair) => pair,
            Err(e) => {
                self.handle_checkin_failure(path, &mut guard, e);
                return;
            }
        };

        self.reporter.send(&ReportMessage::CheckinSucceeded {
            attempt_id: attempt.id,
            package_name: attempt.package_name(),
            is_valid: attempt.is_valid,
            timestamp: Utc::now(),
        });

        let checkin_ref = match self.record_checkin(&attempt).await {
            Ok(reference) => reference,
            Err(e) => {
                // Broken audit trail: abort this item, release the lock
                error!(
                    attempt_id = %attempt.id,
                    "Checkin ledger write failed; aborting item: {}",
                    e
                );
                if let Err(unlock_err) = guard.unlock() {
                    warn!("Unlock after ledger failure also failed: {}", unlock_err);
                }
                return;
            }
        };

        let item = PipelineItem {
            attempt,
            package,
            guard,
            doc: None,
            article: None,
            journal: None,
            issue: None,
            checkpoint: None,
            checkin_ref,
        };

        match self.engine.run(item).await {
            Ok((item, _outcomes)) => {
                self.reporter.send(&ReportMessage::ValidationFinished {
                    attempt_id: item.attempt.id,
                    is_valid: item.attempt.is_valid,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                // The engine released the lock; the checkpoint stays open
                // for the next run to find and resume
                error!("Validation pipeline aborted: {}", e);
            }
        }
    }

    /// Map a classified checkin failure to file markers and a report
    fn handle_checkin_failure(&self, path: &Path, guard: &mut PackageGuard, e: IntakeError) {
        // Restore permissions before any rename
        if let Err(unlock_err) = guard.unlock() {
            warn!(path = %path.display(), "Unlock after checkin failure failed: {}", unlock_err);
        }

        match &e {
            IntakeError::DuplicatedPackage(checksum) => {
                warn!(path = %path.display(), checksum = %checksum, "Duplicated package");
                if let Err(mark_err) = guard.mark_duplicated(true) {
                    warn!("Could not mark duplicated: {}", mark_err);
                }
            }
            IntakeError::SourceVanished(_) => {
                // Transient; the package (if it reappears) is left for the
                // operator
                warn!(path = %path.display(), "Source vanished mid-analysis");
            }
            _ => {
                error!(path = %path.display(), "Checkin failed: {}", e);
                if let Err(mark_err) = guard.mark_failed(true) {
                    warn!("Could not mark failed: {}", mark_err);
                }
            }
        }

        self.reporter.send(&ReportMessage::CheckinFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Open/close the checkin checkpoint and announce the checkin
    async fn record_checkin(&self, attempt: &Attempt) -> Result<Option<String>> {
        let article = match attempt.articlepkg_id {
            Some(id) => article_pkgs::fetch(&self.db, id).await?,
            None => None,
        };

        let mut cp = self.ledger.checkpoint(attempt.id, Point::Checkin).await?;
        self.ledger.start(&mut cp).await?;

        let (status, message) = if attempt.is_valid {
            (
                Status::Ok,
                "package structure and metadata accepted".to_string(),
            )
        } else {
            (
                Status::Warning,
                "package recorded but marked invalid".to_string(),
            )
        };
        self.ledger.tell(&cp, "checkin", status, &message).await?;
        self.ledger.end(&mut cp).await?;

        let reference = self
            .notifier
            .notify_checkin(&CheckinNotification {
                articlepkg_ref: attempt.articlepkg_id.map(|u| u.to_string()),
                attempt_ref: attempt.id.to_string(),
                article_title: article.as_ref().map(|a| a.article_title.clone()),
                journal_title: article.as_ref().and_then(|a| a.journal_title.clone()),
                issue_label: article.as_ref().and_then(|a| a.issue_label()),
                package_name: attempt.package_name(),
                uploaded_at: attempt.created_at,
            })
            .await;

        Ok(reference)
    }
}
