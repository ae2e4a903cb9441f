//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/gareport/config.toml`
//!
//! Paths follow the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/gareport/` (~/.config/gareport/)
//! - Data: `$XDG_DATA_HOME/gareport/` (~/.local/share/gareport/)
//! - State/Logs: `$XDG_STATE_HOME/gareport/` (~/.local/state/gareport/)

use crate::error::{Error, Result};
use crate::types::CommitMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "gareport";

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `$name`, or `fallback` under the home directory when unset
fn xdg_dir(name: &str, fallback: &str) -> PathBuf {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(fallback))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of daily log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Aggregation settings
#[derive(Debug, Deserialize)]
pub struct AggregationConfig {
    /// Transaction boundary for ingest, referral, sitewide and rollup writes
    #[serde(default)]
    pub commit_mode: CommitMode,

    /// Rows printed by `gareport show urls` when no limit is given
    #[serde(default = "default_top_urls_limit")]
    pub top_urls_limit: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            commit_mode: CommitMode::default(),
            top_urls_limit: default_top_urls_limit(),
        }
    }
}

fn default_top_urls_limit() -> usize {
    20
}

/// Database location override
#[derive(Debug, Deserialize, Default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// Default catalog export
#[derive(Debug, Deserialize, Default)]
pub struct CatalogConfig {
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.aggregation.top_urls_limit == 0 {
            return Err(Error::Config(
                "aggregation.top_urls_limit must be at least 1".to_string(),
            ));
        }
        if self.logging.max_files == 0 {
            return Err(Error::Config(
                "logging.max_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Database path from config, or the XDG default
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(Self::database_path)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/gareport/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_dir("XDG_CONFIG_HOME", ".config")
            .join(APP_DIR)
            .join("config.toml")
    }

    /// `$XDG_DATA_HOME/gareport/`
    pub fn data_dir() -> PathBuf {
        xdg_dir("XDG_DATA_HOME", ".local/share").join(APP_DIR)
    }

    /// `$XDG_STATE_HOME/gareport/`
    pub fn state_dir() -> PathBuf {
        xdg_dir("XDG_STATE_HOME", ".local/state").join(APP_DIR)
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/gareport/gareport.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("gareport.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/gareport/gareport.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("gareport.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// Called by the CLI before anything reads these variables.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        for (name, fallback) in [
            ("XDG_DATA_HOME", ".local/share"),
            ("XDG_STATE_HOME", ".local/state"),
            ("XDG_CONFIG_HOME", ".config"),
        ] {
            if std::env::var_os(name).map_or(true, |v| v.is_empty()) {
                std::env::set_var(name, home.join(fallback));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.max_files, 5);
        assert_eq!(config.aggregation.commit_mode, CommitMode::PerBatch);
        assert_eq!(config.aggregation.top_urls_limit, 20);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[logging]
level = "debug"

[aggregation]
commit_mode = "per_row"
top_urls_limit = 50

[database]
path = "/srv/gareport/stats.db"

[catalog]
path = "/srv/gareport/catalog.json"
"#;
        let config = Config::from_toml_str(toml).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.aggregation.commit_mode, CommitMode::PerRow);
        assert_eq!(config.aggregation.top_urls_limit, 50);
        assert_eq!(
            config.resolved_database_path(),
            PathBuf::from("/srv/gareport/stats.db")
        );
        assert_eq!(
            config.catalog.path.as_deref(),
            Some(Path::new("/srv/gareport/catalog.json"))
        );
    }

    #[test]
    fn test_unknown_commit_mode_rejected() {
        let toml = r#"
[aggregation]
commit_mode = "whenever"
"#;
        assert!(matches!(
            Config::from_toml_str(toml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let toml = r#"
[aggregation]
top_urls_limit = 0
"#;
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nmax_files = 2\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.logging.max_files, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_paths_end_with_app_files() {
        assert!(Config::database_path().ends_with("gareport/gareport.db"));
        assert!(Config::log_path().ends_with("gareport/gareport.log"));
        assert!(Config::config_path().ends_with("gareport/config.toml"));
    }
}
