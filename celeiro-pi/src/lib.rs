//! celeiro-pi library interface
//!
//! Package Intake service: watches inbound directories for article
//! submission packages, checks them in against the shared database and runs
//! each valid attempt through the validation pipeline, reporting outcomes
//! to the editorial system and the operator report stream.

pub mod archive;
pub mod checkin;
pub mod config;
pub mod db;
pub mod editorial;
pub mod error;
pub mod ledger;
pub mod models;
pub mod monitor;
pub mod notifier;
pub mod pipeline;
pub mod text;
pub mod wire;

#[cfg(test)]
pub mod testutil;

pub use crate::error::{IntakeError, Result};

use crate::config::IntakeConfig;
use crate::editorial::{EditorialClient, IssueResolver};
use crate::monitor::Reporter;
use crate::notifier::Notifier;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Process-wide context, constructed once at startup and passed by
/// reference into the dispatch layer, checkin procedure and pipeline —
/// there is no ambient global state.
pub struct AppContext {
    pub db: SqlitePool,
    pub config: IntakeConfig,
    pub notifier: Arc<Notifier>,
    pub resolver: Arc<dyn IssueResolver>,
    pub reporter: Arc<Reporter>,
}

impl AppContext {
    pub fn new(db: SqlitePool, config: IntakeConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.settings.lookup_timeout_secs);

        let notifier = Arc::new(Notifier::new(&config.settings.editorial_base_url, timeout));

        let resolver: Arc<dyn IssueResolver> = Arc::new(
            EditorialClient::new(&config.settings.editorial_base_url, timeout)
                .map_err(|e| IntakeError::Processing(format!("editorial client: {e}")))?,
        );

        let reporter = match Reporter::to_file(
            &config.report_path,
            config.settings.report_secret.as_bytes(),
        ) {
            Ok(reporter) => Arc::new(reporter),
            Err(e) => {
                warn!(
                    path = %config.report_path.display(),
                    "Report stream unavailable, reporting disabled: {}",
                    e
                );
                Arc::new(Reporter::disabled())
            }
        };

        Ok(Self {
            db,
            config,
            notifier,
            resolver,
            reporter,
        })
    }
}
