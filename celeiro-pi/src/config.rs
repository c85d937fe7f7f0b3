//! Configuration resolution for the intake service
//!
//! CLI flags beat the environment, which beats the TOML file, which beats
//! the compiled defaults. The root folder anchors the database, the working
//! directory for safe copies and the report stream.

use celeiro_common::config::{locate_config_file, resolve_root_folder, IntakeSettings};
use celeiro_common::Result;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug, Default)]
#[command(name = "celeiro-pi", about = "Celeiro package intake service")]
pub struct Cli {
    /// Application root folder (database, working dir, reports)
    #[arg(long)]
    pub root_folder: Option<String>,

    /// Path to config.toml (defaults to the platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the configured worker count
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub root: PathBuf,
    pub db_path: PathBuf,
    /// Application-owned directory holding safe copies
    pub working_dir: PathBuf,
    /// Report frame stream
    pub report_path: PathBuf,
    pub settings: IntakeSettings,
}

impl IntakeConfig {
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let root = resolve_root_folder(cli.root_folder.as_deref(), "CELEIRO_ROOT");

        let mut settings = match cli.config.clone().or_else(|| locate_config_file().ok()) {
            Some(path) => IntakeSettings::load(&path)?,
            None => IntakeSettings::default(),
        };
        if let Some(workers) = cli.workers {
            settings.worker_count = workers;
        }

        Ok(Self {
            db_path: root.join("celeiro.db"),
            working_dir: root.join("packages"),
            report_path: root.join("reports.frames"),
            root,
            settings,
        })
    }

    /// Create the root and working directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.working_dir)?;
        for dir in &self.settings.watch_dirs {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_with_cli_root() {
        let cli = Cli {
            root_folder: Some("/tmp/celeiro-cli-root".into()),
            config: None,
            workers: Some(4),
        };
        let config = IntakeConfig::resolve(&cli).unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/celeiro-cli-root"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/celeiro-cli-root/celeiro.db"));
        assert_eq!(config.settings.worker_count, 4);
    }

    #[test]
    fn test_config_file_flag_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[intake]\nqueue_capacity = 128\n").unwrap();

        let cli = Cli {
            root_folder: Some(dir.path().display().to_string()),
            config: Some(path),
            workers: None,
        };
        let config = IntakeConfig::resolve(&cli).unwrap();
        assert_eq!(config.settings.queue_capacity, 128);
        assert_eq!(config.settings.worker_count, 1);
    }
}
