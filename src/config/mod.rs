//! Configuration Management Module for Liveguard
//!
//! Provides the daemon's JSON configuration:
//! - Per-field defaults so partial files are valid
//! - Validation on load
//! - Atomic writes using temp file + rename

mod storage;

pub use storage::{
    ConfigError, ConfigResult, DaemonConfig, DEFAULT_CONFIG_PATH, DEFAULT_INTERVAL_SECS,
};
