//! fieldsync configuration file handling
//!
//! Loads and manages the ~/.config/fieldsync/config.yaml file.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the read API listens on
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:3001".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Relational store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Enable WAL mode so readers are not blocked by a running pass
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// How long a connection waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("fieldsync");
    path.push("fieldsync.db");
    path
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wal_mode: true,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Remote service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Plot and sensor snapshot endpoint
    #[serde(default = "default_plots_url")]
    pub plots_url: String,

    /// Irrigation zone snapshot endpoint
    #[serde(default = "default_zones_url")]
    pub zones_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_plots_url() -> String {
    "http://moriahmkt.com/iotapp/updated/".to_string()
}

fn default_zones_url() -> String {
    "https://moriahmkt.com/iotapp/am".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            plots_url: default_plots_url(),
            zones_url: default_zones_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timer configuration for the sync jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Start the timers when serving
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between plot-sync passes
    #[serde(default = "default_interval_secs")]
    pub plots_interval_secs: u64,

    /// Seconds between zone-sync passes
    #[serde(default = "default_interval_secs")]
    pub zones_interval_secs: u64,

    /// Upper bound on ticks skipped after repeated transport failures
    #[serde(default = "default_max_skipped_ticks")]
    pub max_skipped_ticks: u32,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_skipped_ticks() -> u32 {
    8
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            plots_interval_secs: default_interval_secs(),
            zones_interval_secs: default_interval_secs(),
            max_skipped_ticks: default_max_skipped_ticks(),
        }
    }
}

impl ScheduleConfig {
    pub fn plots_interval(&self) -> Duration {
        Duration::from_secs(self.plots_interval_secs)
    }

    pub fn zones_interval(&self) -> Duration {
        Duration::from_secs(self.zones_interval_secs)
    }
}

/// fieldsync configuration
///
/// Represents the complete ~/.config/fieldsync/config.yaml file. Every section is
/// optional; missing values fall back to the defaults above.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Settings {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::SyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading fieldsync configuration");

        let content = fs::read_to_string(path)?;
        let settings: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            db = %settings.store.path.display(),
            bind = %settings.server.bind,
            "Configuration loaded successfully"
        );

        Ok(settings)
    }

    /// Load from `path` if given, else from the default path, else fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    tracing::debug!(path = %path.display(), "No config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving fieldsync configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/fieldsync/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("fieldsync");
        path.push("config.yaml");
        path
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.server.bind.parse::<SocketAddr>().is_err() {
            problems.push(format!("server.bind is not a socket address: {}", self.server.bind));
        }
        if self.upstream.plots_url.trim().is_empty() {
            problems.push("upstream.plots_url is empty".to_string());
        }
        if self.upstream.zones_url.trim().is_empty() {
            problems.push("upstream.zones_url is empty".to_string());
        }
        if self.upstream.timeout_secs == 0 {
            problems.push("upstream.timeout_secs must be positive".to_string());
        }
        if self.schedule.plots_interval_secs == 0 {
            problems.push("schedule.plots_interval_secs must be positive".to_string());
        }
        if self.schedule.zones_interval_secs == 0 {
            problems.push("schedule.zones_interval_secs must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(crate::SyncError::Config(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.server.bind, "0.0.0.0:3001");
        assert_eq!(settings.schedule.plots_interval(), Duration::from_secs(30));
        assert_eq!(settings.schedule.zones_interval(), Duration::from_secs(30));
        assert!(settings.store.wal_mode);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.yaml");

        let mut settings = Settings::new();
        settings.schedule.plots_interval_secs = 10;
        settings.upstream.plots_url = "http://localhost:9000/updated/".to_string();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.schedule.plots_interval_secs, 10);
        assert_eq!(loaded.upstream.plots_url, "http://localhost:9000/updated/");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "schedule:\n  zones_interval_secs: 45\n").unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.schedule.zones_interval_secs, 45);
        assert_eq!(loaded.schedule.plots_interval_secs, 30);
        assert_eq!(loaded.upstream.zones_url, "https://moriahmkt.com/iotapp/am");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Settings::load("/nonexistent/fieldsync.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval_and_bad_bind() {
        let mut settings = Settings::new();
        settings.schedule.plots_interval_secs = 0;
        settings.server.bind = "not-an-address".to_string();

        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("plots_interval_secs"));
        assert!(err.contains("server.bind"));
    }

    #[test]
    fn test_default_path() {
        let path = Settings::default_path();
        assert!(path.ends_with("fieldsync/config.yaml"));
    }
}
