//! Daemon Context
//!
//! Bundles the state a watchdog daemon carries for its whole life: the
//! process supervisor (and its registry), the keepalive coordinator (and its
//! device and journal), and the configured test binaries.

use std::path::PathBuf;

use super::keepalive::KeepaliveCoordinator;
use super::supervisor::{CheckVerdict, ProcessSupervisor, SupervisorConfig, TestBinary};
use crate::config::DaemonConfig;
use crate::core::error::{LiveguardError, Result};
use crate::heartbeat::HeartbeatJournal;

/// Verdicts gathered during one daemon cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub verdicts: Vec<(PathBuf, CheckVerdict)>,
}

impl CycleReport {
    /// Checks that reported a failure
    pub fn failures(&self) -> impl Iterator<Item = &(PathBuf, CheckVerdict)> {
        self.verdicts.iter().filter(|(_, v)| !v.is_healthy())
    }

    pub fn is_healthy(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Everything one watchdog daemon instance owns
pub struct WatchdogDaemon {
    supervisor: ProcessSupervisor,
    keepalive: KeepaliveCoordinator,
    test_binaries: Vec<TestBinary>,
}

impl WatchdogDaemon {
    pub fn new(
        supervisor: ProcessSupervisor,
        keepalive: KeepaliveCoordinator,
        test_binaries: Vec<TestBinary>,
    ) -> Self {
        Self {
            supervisor,
            keepalive,
            test_binaries,
        }
    }

    /// Open the device and journal named in `config` and build the daemon
    pub fn from_config(config: &DaemonConfig) -> Result<Self> {
        if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
            tracing::warn!(
                log_dir = %config.log_dir.display(),
                "Cannot create test-binary log directory: {}",
                e
            );
        }

        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            log_dir: config.log_dir.clone(),
            tick_interval: config.tick_interval(),
            soft_reboot: config.soft_reboot,
            max_tracked_processes: config.max_tracked_processes,
        });

        // Journal first: once the device is open nothing may fail before the
        // coordinator owns it, or the timer would be left armed
        let journal = match &config.heartbeat_file {
            Some(path) => HeartbeatJournal::open(path, config.heartbeat_stamps)?,
            None => HeartbeatJournal::disabled(),
        };

        let device = match &config.watchdog_device {
            Some(path) => Some(KeepaliveCoordinator::open_device(path)?),
            None => None,
        };

        let keepalive = KeepaliveCoordinator::new(device, journal, config.soft_reboot);

        Ok(Self::new(supervisor, keepalive, config.test_binaries.clone()))
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn keepalive(&self) -> &KeepaliveCoordinator {
        &self.keepalive
    }

    pub fn test_binaries(&self) -> &[TestBinary] {
        &self.test_binaries
    }

    /// Pulse the device, then run every configured test binary once.
    ///
    /// Reported health failures land in the report. An `Err` is an escalated
    /// device failure or a supervisor malfunction; the remaining checks of
    /// the cycle are skipped.
    pub fn cycle(&mut self) -> Result<CycleReport> {
        self.keepalive.tick().map_err(LiveguardError::from)?;

        let mut report = CycleReport::default();
        for binary in &self.test_binaries {
            let verdict = self.supervisor.run_check(binary)?;
            report.verdicts.push((binary.path.clone(), verdict));
        }
        Ok(report)
    }

    /// Release everything: forget tracked children and disarm the device
    pub fn shutdown(&mut self) {
        self.supervisor.shutdown();
        self.keepalive.close();
        tracing::info!("Watchdog daemon stopped");
    }
}
