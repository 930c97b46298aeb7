//! Configuration loading and path resolution
//!
//! Bootstrap settings come from a TOML file. Paths resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing config file is not fatal: a warning is logged and compiled
//! defaults are used. A config file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "SUGGEST_CONFIG";

/// Environment variable naming the SQLite database file
pub const DATABASE_ENV_VAR: &str = "SUGGEST_DATABASE";

/// Environment variable naming the ontology JSON file
pub const ONTOLOGY_ENV_VAR: &str = "SUGGEST_ONTOLOGY";

const APP_DIR: &str = "suggest";

/// Bootstrap settings shared by every process that opens the corpus
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BootstrapConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Path to the ontology JSON file
    #[serde(default)]
    pub ontology_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
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

fn default_log_level() -> String {
    "info".to_string()
}

/// Default config file location: `<config dir>/suggest/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(format!("{}.toml", module_name)))
}

/// Resolve which config file to read, if any
///
/// CLI and environment paths are returned even if they do not exist, so the
/// caller can warn about them; the compiled default is only returned when it
/// exists.
pub fn resolve_config_path(cli_arg: Option<&Path>, module_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path(module_name).filter(|p| p.exists())
}

/// Load a TOML config file, falling back to defaults when it is absent
pub fn load_toml_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve the SQLite database path
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &BootstrapConfig) -> PathBuf {
    resolve_path(cli_arg, DATABASE_ENV_VAR, config.database_path.as_deref())
        .unwrap_or_else(default_database_path)
}

/// Resolve the ontology file path; there is no compiled default
pub fn resolve_ontology_path(cli_arg: Option<&Path>, config: &BootstrapConfig) -> Option<PathBuf> {
    resolve_path(cli_arg, ONTOLOGY_ENV_VAR, config.ontology_path.as_deref())
}

fn resolve_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: TOML config file
    toml_value.map(Path::to_path_buf)
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./suggest_data"))
        .join("suggest.db")
}
