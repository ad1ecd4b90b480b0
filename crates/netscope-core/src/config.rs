//! Configuration management for netscope.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/netscope/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// External tool locations
    pub tools: ToolsConfig,
    /// Scan execution settings
    pub scanning: ScanningConfig,
    /// Persistence settings
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(config_path: &std::path::Path) -> ConfigResult<Self> {
        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `NETSCOPE_NMAP_PATH`: Override the nmap executable
    /// - `NETSCOPE_TSHARK_PATH`: Override the tshark executable
    /// - `NETSCOPE_SCANNER_TIMEOUT_SECS`: Override the per-scanner timeout
    /// - `NETSCOPE_DATABASE_PATH`: Override the database file location
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("NETSCOPE_NMAP_PATH") {
            tracing::debug!("Override tools.nmap_path from env: {}", val);
            self.tools.nmap_path = val;
        }

        if let Some(val) = lookup("NETSCOPE_TSHARK_PATH") {
            tracing::debug!("Override tools.tshark_path from env: {}", val);
            self.tools.tshark_path = val;
        }

        if let Some(val) = lookup("NETSCOPE_SCANNER_TIMEOUT_SECS") {
            let secs = val.parse().map_err(|_| ConfigError::InvalidValue {
                field: "scanning.scanner_timeout_secs".to_string(),
                reason: format!("'{val}' is not a whole number of seconds"),
            })?;
            tracing::debug!("Override scanning.scanner_timeout_secs from env: {}", secs);
            self.scanning.scanner_timeout_secs = secs;
        }

        if let Some(val) = lookup("NETSCOPE_DATABASE_PATH") {
            tracing::debug!("Override database.path from env: {}", val);
            self.database.path = Some(PathBuf::from(val));
        }

        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/netscope/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "netscope", "netscope").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/netscope`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "netscope", "netscope").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolve the database file, defaulting to `<data_dir>/netscope.db`.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("netscope.db")),
        }
    }
}

/// External tool locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Port/service scanner executable
    pub nmap_path: String,
    /// Packet capture executable
    pub tshark_path: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            nmap_path: "nmap".to_string(),
            tshark_path: "tshark".to_string(),
        }
    }
}

/// Scan execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Supervisory timeout per scanner in seconds (0 = no timeout)
    pub scanner_timeout_secs: u64,
    /// Directory for packet capture artifacts (defaults to the OS temp dir)
    pub capture_dir: Option<PathBuf>,
    /// Capture interface used when a request does not name one
    pub default_interface: String,
}

impl ScanningConfig {
    /// The supervisory timeout, or `None` when disabled.
    #[must_use]
    pub fn scanner_timeout(&self) -> Option<Duration> {
        (self.scanner_timeout_secs > 0).then(|| Duration::from_secs(self.scanner_timeout_secs))
    }

    /// The resolved capture directory.
    #[must_use]
    pub fn capture_dir(&self) -> PathBuf {
        self.capture_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            scanner_timeout_secs: 3600,
            capture_dir: None,
            default_interface: "eth0".to_string(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file (defaults to `<data_dir>/netscope.db`)
    pub path: Option<PathBuf>,
}
