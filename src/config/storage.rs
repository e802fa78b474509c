//! Configuration Storage Implementation
//!
//! The daemon reads its configuration once at start-up; there is no live
//! reload. Every field has a default, so `{}` is a valid configuration that
//! watches nothing and feeds no device.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::heartbeat::DEFAULT_HEARTBEAT_STAMPS;
use crate::logging::LoggingConfig;
use crate::watchdog::TestBinary;

/// Where the binary looks for its configuration by default
pub const DEFAULT_CONFIG_PATH: &str = "/etc/liveguard.json";

/// Default seconds between daemon cycles
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between daemon cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Hardware watchdog device; no device means no keepalive
    #[serde(default)]
    pub watchdog_device: Option<PathBuf>,

    /// Escalate device and reap failures instead of only logging them
    #[serde(default)]
    pub soft_reboot: bool,

    /// Directory for the shared test-binary output logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Heartbeat journal file; unset disables journaling
    #[serde(default)]
    pub heartbeat_file: Option<PathBuf>,

    /// Number of timestamps the journal keeps
    #[serde(default = "default_heartbeat_stamps")]
    pub heartbeat_stamps: usize,

    /// Health-check programs run every cycle
    #[serde(default)]
    pub test_binaries: Vec<TestBinary>,

    /// Bound on tracked test-binary children
    #[serde(default)]
    pub max_tracked_processes: Option<usize>,

    /// File receiving the daemon's pid while it runs
    #[serde(default)]
    pub pidfile: Option<PathBuf>,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/watchdog")
}

fn default_heartbeat_stamps() -> usize {
    DEFAULT_HEARTBEAT_STAMPS
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            watchdog_device: None,
            soft_reboot: false,
            log_dir: default_log_dir(),
            heartbeat_file: None,
            heartbeat_stamps: default_heartbeat_stamps(),
            test_binaries: Vec::new(),
            max_tracked_processes: None,
            pidfile: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io(e)
            }
        })?;
        let config: DaemonConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration with atomic write
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "interval_secs must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_stamps == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_stamps must be at least 1".to_string(),
            ));
        }
        if self.max_tracked_processes == Some(0) {
            return Err(ConfigError::Invalid(
                "max_tracked_processes must be at least 1 when set".to_string(),
            ));
        }
        if let Some(index) = self
            .test_binaries
            .iter()
            .position(|b| b.path.to_string_lossy().trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "test_binaries[{}] has a blank path",
                index
            )));
        }
        Ok(())
    }

    /// Time between daemon cycles
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
