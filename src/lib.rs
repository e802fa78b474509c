//! Liveguard - watchdog daemon liveness core
//!
//! This crate provides the pieces a system watchdog daemon needs to prove
//! the host is alive and to notice when it is not:
//! - Supervision of external health-check programs with timeouts
//! - Hardware watchdog keepalive with orderly magic close
//! - A fixed-size on-disk heartbeat journal and gap analysis
//! - JSON configuration and `tracing`-based logging

pub mod config;
pub mod core;
pub mod heartbeat;
pub mod logging;
pub mod watchdog;

// Re-export commonly used items
pub use crate::core::error::{describe_code, LiveguardError, Result};
pub use config::{ConfigError, DaemonConfig};
pub use heartbeat::{find_gaps, read_journal, HeartbeatGap, HeartbeatJournal};
pub use logging::{LoggingConfig, LoggingSystem};
pub use watchdog::{
    CheckVerdict, CycleReport, KeepaliveCoordinator, ProcessSupervisor, TestBinary,
    WatchdogDaemon,
};
