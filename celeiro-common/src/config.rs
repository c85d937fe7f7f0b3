//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Resolve the application root folder with the following priority:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Get default configuration file path for the platform
pub fn locate_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/celeiro/config.toml first, then /etc/celeiro/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("celeiro").join("config.toml")) {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/celeiro/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("celeiro").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("celeiro"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/celeiro"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("celeiro"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/celeiro"))
    } else {
        PathBuf::from("./celeiro_data")
    }
}

/// Intake service settings, loaded from the `[intake]` table of config.toml
///
/// Every field has a compiled default so a missing file or a partial file
/// still yields a runnable configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeSettings {
    /// Directories watched for inbound packages
    pub watch_dirs: Vec<PathBuf>,
    /// Watch subdirectories of each watch dir
    pub recursive_watch: bool,
    /// Number of checkin worker tasks
    pub worker_count: usize,
    /// Bounded candidate-path queue capacity
    pub queue_capacity: usize,
    /// Base URL of the editorial system API
    pub editorial_base_url: String,
    /// Timeout for editorial lookups and notifications, seconds
    pub lookup_timeout_secs: u64,
    /// Group id applied to packages while locked (None = leave group alone)
    pub app_group_id: Option<u32>,
    /// Shared secret for report frame digests
    pub report_secret: String,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            watch_dirs: vec![PathBuf::from("./inbox")],
            recursive_watch: false,
            worker_count: 1,
            queue_capacity: 64,
            editorial_base_url: "http://localhost:6543".to_string(),
            lookup_timeout_secs: 10,
            app_group_id: None,
            report_secret: "celeiro-report".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    intake: IntakeSettings,
}

impl IntakeSettings {
    /// Load settings from a TOML file; missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let parsed: ConfigFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(parsed.intake)
    }
}
