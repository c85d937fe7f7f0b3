//! Checkin procedure
//!
//! Turns a guarded package into a persisted attempt. The whole-archive
//! checksum is the duplicate key; ArticlePkg resolution runs in a savepoint
//! so its failure degrades the attempt to invalid instead of aborting the
//! transaction. Every failure leaving this module is classified.

use crate::archive::{
    ArticlePackage, BibRecord, BibliographicExtractor, PackageGuard,
};
use crate::db::{article_pkgs, attempts};
use crate::error::{IntakeError, Result};
use crate::models::Attempt;
use sha2::{Digest, Sha256};
use sqlx::{Acquire, Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Checkin procedure over a shared pool and working directory
pub struct CheckinProcedure {
    db: SqlitePool,
    working_dir: PathBuf,
}

impl CheckinProcedure {
    pub fn new(db: SqlitePool, working_dir: PathBuf) -> Self {
        Self { db, working_dir }
    }

    /// Run checkin for the package behind `guard`.
    ///
    /// On success the attempt is committed and the opened working-copy
    /// package is returned for the validation phase. The guard stays locked;
    /// the pipeline teardown releases it.
    pub async fn run(&self, guard: &mut PackageGuard) -> Result<(Attempt, ArticlePackage)> {
        guard.lock()?;
        let copy = guard.isolate(&self.working_dir)?;

        let checksum = compute_checksum(&copy).await?;
        debug!(path = %copy.display(), checksum = %checksum, "Package checksum computed");

        let mut package = ArticlePackage::open(&copy)?;

        // Structural and bibliographic probes; their failure is data, not
        // an abort
        let bib = match package.bibliographic_metadata() {
            Ok(bib) => Some(bib),
            Err(e) => {
                warn!(path = %copy.display(), "Bibliographic extraction failed: {}", e);
                None
            }
        };

        let mut attempt = Attempt::candidate(
            checksum.clone(),
            copy.display().to_string(),
            guard.origin().display().to_string(),
        );

        let mut tx = self.db.begin().await?;

        attempts::insert(&mut *tx, &attempt)
            .await
            .map_err(|e| classify_insert_error(e, &checksum))?;

        let articlepkg_id = match &bib {
            Some(bib) if bib.has_article_title() => {
                match resolve_articlepkg(&mut tx, bib).await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        // Degrades the attempt to invalid; the transaction
                        // itself survives
                        warn!(attempt_id = %attempt.id, "ArticlePkg resolution failed: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let structure_ok = package.has_members("xml") && package.has_members("pdf");
        let bib_ok = bib
            .as_ref()
            .is_some_and(|b| b.has_journal_identifier() && b.has_article_title());

        if structure_ok && bib_ok && articlepkg_id.is_some() {
            attempts::set_validity(&mut *tx, attempt.id, true, articlepkg_id).await?;
            attempt.is_valid = true;
            attempt.articlepkg_id = articlepkg_id;
        } else {
            debug!(
                attempt_id = %attempt.id,
                structure_ok = structure_ok,
                bib_ok = bib_ok,
                "Attempt recorded as invalid"
            );
        }

        tx.commit().await?;

        info!(
            attempt_id = %attempt.id,
            package = %attempt.package_name(),
            is_valid = attempt.is_valid,
            "Package checked in"
        );

        Ok((attempt, package))
    }
}

/// Resolve or create the ArticlePkg inside a savepoint. A concurrent
/// creation race surfaces as a uniqueness violation and is resolved by
/// retrying the lookup.
async fn resolve_articlepkg(
    tx: &mut Transaction<'_, Sqlite>,
    bib: &BibRecord,
) -> Result<Uuid> {
    let title = bib
        .article_title
        .clone()
        .ok_or_else(|| IntakeError::InvalidInput("article title absent".into()))?;

    let mut sp = tx.begin().await?;

    if let Some(existing) = article_pkgs::find_by_title(&mut *sp, &title).await? {
        sp.commit().await?;
        return Ok(existing.id);
    }

    let pkg = article_pkgs::from_bib(title.clone(), bib);
    match article_pkgs::insert(&mut *sp, &pkg).await {
        Ok(()) => {
            sp.commit().await?;
            Ok(pkg.id)
        }
        Err(IntakeError::Database(e)) if is_unique_violation(&e) => {
            sp.rollback().await?;
            debug!(title = %title, "ArticlePkg creation raced; retrying lookup");
            article_pkgs::find_by_title(&mut **tx, &title)
                .await?
                .map(|p| p.id)
                .ok_or_else(|| {
                    IntakeError::Processing(format!(
                        "article '{title}' vanished after uniqueness race"
                    ))
                })
        }
        Err(e) => {
            sp.rollback().await.ok();
            Err(e)
        }
    }
}

/// SHA-256 over the whole-archive byte stream, off the async runtime
pub async fn compute_checksum(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String> {
        use std::io::Read;

        let mut file = std::fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IntakeError::SourceVanished(path.clone())
            } else {
                IntakeError::Io(e)
            }
        })?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 1024 * 1024];
        loop {
            let n = file.read(&mut buffer).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    IntakeError::SourceVanished(path.clone())
                } else {
                    IntakeError::Io(e)
                }
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| IntakeError::Processing(format!("checksum task failed: {e}")))?
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

/// Classify a failed attempt insert per the intake error taxonomy
fn classify_insert_error(e: IntakeError, checksum: &str) -> IntakeError {
    let IntakeError::Database(db_err) = e else {
        return e;
    };

    match &db_err {
        sqlx::Error::Database(inner) => match inner.kind() {
            sqlx::error::ErrorKind::UniqueViolation => {
                IntakeError::DuplicatedPackage(checksum.to_string())
            }
            sqlx::error::ErrorKind::NotNullViolation => {
                IntakeError::InvalidInput(inner.message().to_string())
            }
            // Other integrity violations behave like duplicates for the
            // operator: the original is preserved under a marker rename
            sqlx::error::ErrorKind::ForeignKeyViolation
            | sqlx::error::ErrorKind::CheckViolation => {
                IntakeError::DuplicatedPackage(checksum.to_string())
            }
            _ => IntakeError::Database(db_err),
        },
        _ => IntakeError::Database(db_err),
    }
}
