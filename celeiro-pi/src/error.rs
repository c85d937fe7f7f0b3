//! Error taxonomy for the package intake service
//!
//! One classified variant per terminal outcome an operator can observe. The
//! dispatch worker maps these onto file renames and report messages; nothing
//! in here ever crosses the worker boundary unhandled.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for intake operations
pub type Result<T> = std::result::Result<T, IntakeError>;

/// Classified intake failures
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The file is not a readable archive container. Fatal to the item;
    /// the original is marked failed.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// No archive member carries the requested extension
    #[error("no member with extension '{0}'")]
    NoSuchMember(String),

    /// The package holds zero or more than one XML document
    #[error("expected exactly one XML document, found {0}")]
    AmbiguousOrMissingDocument(usize),

    /// Checksum collision with an already checked-in package
    #[error("duplicated package: checksum {0} already checked in")]
    DuplicatedPackage(String),

    /// The source file disappeared mid-analysis. Transient; the package is
    /// left in place for the operator.
    #[error("source vanished during analysis: {0}")]
    SourceVanished(PathBuf),

    /// Data-quality failure (e.g. a not-null violation on insert)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem permission locking failed
    #[error("lock error: {0}")]
    Lock(String),

    /// Checkpoint/notice ledger misuse or write failure
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Anything unclassified; logged with context, package marked failed
    #[error("processing error: {0}")]
    Processing(String),

    /// Database operation error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared infrastructure error
    #[error("common error: {0}")]
    Common(#[from] celeiro_common::Error),
}

impl IntakeError {
    /// True for failures that should leave the original file untouched
    /// (transient conditions an operator may retry).
    pub fn is_transient(&self) -> bool {
        matches!(self, IntakeError::SourceVanished(_))
    }
}
