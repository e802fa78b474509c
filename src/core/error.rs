//! Error types for Liveguard
//!
//! Module errors are defined next to their modules; this file aggregates
//! them and holds the daemon's numeric result codes.

use thiserror::Error;

use crate::config::ConfigError;
use crate::heartbeat::JournalError;
use crate::logging::LoggingError;
use crate::watchdog::{KeepaliveError, SupervisorError};

/// Result type alias for Liveguard operations
pub type Result<T> = std::result::Result<T, LiveguardError>;

/// No error
pub const ENOERR: i32 = 0;
/// Unconditional reboot
pub const EREBOOT: i32 = 255;
/// Unconditional hard reset
pub const ERESET: i32 = 254;
/// Load average too high
pub const EMAXLOAD: i32 = 253;
/// Too hot inside
pub const ETOOHOT: i32 = 252;
/// Load average file contains no data
pub const ENOLOAD: i32 = 251;
/// File was not changed in the given interval
pub const ENOCHANGE: i32 = 250;
/// Memory statistics contain invalid data
pub const EINVMEM: i32 = 249;
/// Child was killed by a signal
pub const ECHKILL: i32 = 248;
/// Child did not return in time
pub const ETOOLONG: i32 = 247;
/// Reserved for user supplied values
pub const EUSERVALUE: i32 = 246;
/// Unknown, not enough data
pub const EDONTKNOW: i32 = 245;

/// Describe a daemon result code.
///
/// Codes in the reserved range have fixed meanings; anything else is taken
/// to be an errno value, which is how test binaries usually report failure.
pub fn describe_code(code: i32) -> String {
    match code {
        ENOERR => "no error".to_string(),
        EREBOOT => "unconditional reboot requested".to_string(),
        ERESET => "unconditional hard reset requested".to_string(),
        EMAXLOAD => "load average too high".to_string(),
        ETOOHOT => "too hot".to_string(),
        ENOLOAD => "loadavg contains no data".to_string(),
        ENOCHANGE => "file was not changed in the given interval".to_string(),
        EINVMEM => "meminfo contains invalid data".to_string(),
        ECHKILL => "child process was killed by signal".to_string(),
        ETOOLONG => "child process did not return in time".to_string(),
        EUSERVALUE => "user-reserved code".to_string(),
        EDONTKNOW => "unknown (not enough data)".to_string(),
        other => std::io::Error::from_raw_os_error(other).to_string(),
    }
}

/// Main error type for Liveguard
#[derive(Error, Debug)]
pub enum LiveguardError {
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Keepalive error: {0}")]
    Keepalive(#[from] KeepaliveError),

    #[error("Heartbeat journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LiveguardError {
    /// Whether the soft-reboot policy should treat this as fatal
    pub fn is_reboot_worthy(&self) -> bool {
        matches!(self, LiveguardError::Supervisor(_) | LiveguardError::Keepalive(_))
    }

    /// Numeric daemon code for this error
    pub fn code(&self) -> i32 {
        match self {
            LiveguardError::Supervisor(e) => e.code(),
            LiveguardError::Keepalive(e) => e.code(),
            LiveguardError::Io(e) => e.raw_os_error().unwrap_or(EDONTKNOW),
            _ => EDONTKNOW,
        }
    }
}
