//! Bootstrap configuration loading and database path resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Environment variable overriding the database path
pub const DATABASE_ENV_VAR: &str = "TREEPORT_DATABASE";

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "TREEPORT_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite content database (optional)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logical store name stamped on every extracted node
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// JSON file holding template field metadata (optional)
    #[serde(default)]
    pub template_fields: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Field exclusion configuration (optional)
    #[serde(default)]
    pub field_filter: FieldFilterConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            database_name: default_database_name(),
            template_fields: None,
            logging: LoggingConfig::default(),
            field_filter: FieldFilterConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Field exclusion configuration
///
/// `excludes` replaces the built-in exclusion list when present.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FieldFilterConfig {
    #[serde(default)]
    pub excludes: Option<Vec<Uuid>>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_name() -> String {
    "master".to_string()
}

/// Load TOML configuration from an explicit path
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load TOML configuration, falling back to defaults when no file exists
///
/// An explicit path that cannot be read is an error; a missing default
/// config file is not.
pub fn load_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    match locate_config(explicit) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        None => {
            warn!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Configuration file to load, without reading or logging anything
///
/// Explicit path, then `TREEPORT_CONFIG`, then the platform default if it
/// exists. Lets callers read the file before logging is set up.
pub fn locate_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    default_config_path().filter(|path| path.exists())
}

/// Resolve the content database path
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.database_path {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_database_path()
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("treeport").join("config.toml"))
}

/// OS-dependent default database path
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("treeport").join("content.db"))
        .unwrap_or_else(|| PathBuf::from("./treeport_data/content.db"))
}
