//! Process Supervisor Module
//!
//! Runs external test binaries and turns their exit status into a health
//! verdict. Each check launches one instance, waits half a tick interval,
//! then reaps whatever children have finished without blocking.
//!
//! A test binary that never terminates is not killed. Its record is evicted
//! after `timeout_secs` on the next check of the same binary, and that check
//! reports a timeout instead of launching a new instance.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::process::{
    ChildStatus, InvocationMode, LaunchRequest, ProcessHost, ReapResult, SpawnError,
    UnixProcessHost,
};
use super::registry::{ProcessRegistry, TimeoutCheck};
use crate::core::error::{describe_code, ECHKILL, ENOERR, EREBOOT, ETOOLONG};

/// A configured health-check program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestBinary {
    /// Path of the program; an empty path means no test is configured
    pub path: PathBuf,

    /// Seconds an instance may run before it is written off (0 = no limit)
    #[serde(default)]
    pub timeout_secs: u64,

    /// Calling convention
    #[serde(default)]
    pub mode: InvocationMode,
}

impl TestBinary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout_secs: 0,
            mode: InvocationMode::Bare,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_mode(mut self, mode: InvocationMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory holding the shared test-binary output logs
    pub log_dir: PathBuf,
    /// Daemon tick interval; the supervisor waits half of it before reaping
    pub tick_interval: Duration,
    /// Escalate stray reap errors instead of swallowing them
    pub soft_reboot: bool,
    /// Bound on tracked children, exceeding it counts as allocation failure
    pub max_tracked_processes: Option<usize>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/log/watchdog"),
            tick_interval: Duration::from_secs(10),
            soft_reboot: false,
            max_tracked_processes: None,
        }
    }
}

impl SupervisorConfig {
    /// How long a check sleeps before its first reap attempt
    pub fn reap_delay(&self) -> Duration {
        self.tick_interval / 2
    }
}

/// A test binary's reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthFailure {
    /// A previous instance outlived its time limit
    TimedOut { limit_secs: u64 },
    /// The binary exited with this non-zero code
    ExitCode(i32),
    /// The binary was terminated by this uncaught signal
    KilledBySignal(i32),
}

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckVerdict {
    /// Healthy, or still running and not yet over its limit
    Pass,
    /// No test configured
    Abstain,
    /// The health check reported a failure
    Fail(HealthFailure),
}

impl CheckVerdict {
    /// True unless the check reported a failure
    pub fn is_healthy(&self) -> bool {
        !matches!(self, CheckVerdict::Fail(_))
    }

    /// Numeric daemon code for this verdict
    pub fn code(&self) -> i32 {
        match self {
            CheckVerdict::Pass | CheckVerdict::Abstain => ENOERR,
            CheckVerdict::Fail(HealthFailure::TimedOut { .. }) => ETOOLONG,
            CheckVerdict::Fail(HealthFailure::ExitCode(code)) => *code,
            CheckVerdict::Fail(HealthFailure::KilledBySignal(_)) => ECHKILL,
        }
    }
}

/// Supervisor malfunctions, as opposed to reported health failures
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Process fork failed for {binary:?}: {source}")]
    ForkFailed {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Waiting for test-binary children failed: {0}")]
    StrayReap(#[source] io::Error),
}

impl SupervisorError {
    /// Numeric daemon code for this error
    pub fn code(&self) -> i32 {
        match self {
            SupervisorError::ForkFailed { .. } => EREBOOT,
            SupervisorError::StrayReap(e) => e.raw_os_error().unwrap_or(EREBOOT),
        }
    }
}

/// Launches test binaries and tracks the ones still running
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    registry: ProcessRegistry,
    host: Box<dyn ProcessHost>,
}

impl ProcessSupervisor {
    /// Create a supervisor driving real OS processes
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_host(config, Box::new(UnixProcessHost::new()))
    }

    /// Create a supervisor over a custom process host
    pub fn with_host(config: SupervisorConfig, host: Box<dyn ProcessHost>) -> Self {
        let registry = match config.max_tracked_processes {
            Some(max) => ProcessRegistry::with_limit(max),
            None => ProcessRegistry::new(),
        };
        Self {
            config,
            registry,
            host,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProcessRegistry {
        &mut self.registry
    }

    /// Run one check of `binary`.
    ///
    /// `Ok` carries the health verdict, including failures the binary itself
    /// reported. `Err` means the supervisor could not do its job and the
    /// caller should treat the host as needing a reboot.
    pub fn run_check(&mut self, binary: &TestBinary) -> Result<CheckVerdict, SupervisorError> {
        if binary.path.as_os_str().is_empty() {
            return Ok(CheckVerdict::Abstain);
        }
        let name = binary.path.to_string_lossy().into_owned();

        if binary.timeout_secs > 0 {
            if let TimeoutCheck::Expired(record) =
                self.registry.check_timeout(&name, binary.timeout_secs)
            {
                tracing::error!(
                    binary = %name,
                    pid = record.pid,
                    "test-binary {} exceeded time limit {}",
                    name,
                    binary.timeout_secs
                );
                return Ok(CheckVerdict::Fail(HealthFailure::TimedOut {
                    limit_secs: binary.timeout_secs,
                }));
            }
        }

        let request = LaunchRequest {
            binary: &binary.path,
            mode: binary.mode,
            log_dir: &self.config.log_dir,
        };
        let pid = match self.host.spawn(&request) {
            Ok(pid) => pid,
            Err(SpawnError::Fork(source)) => {
                tracing::error!(
                    binary = %name,
                    "process fork failed with error = {} = '{}'",
                    source.raw_os_error().unwrap_or(0),
                    source
                );
                return Err(SupervisorError::ForkFailed {
                    binary: binary.path.clone(),
                    source,
                });
            }
            Err(e) => {
                // The child never got to run the binary; report it the way
                // the child's own exit status would have. Redirection and exec
                // fail in the parent here, so this returns without the reap
                // pass: children that finished meanwhile are collected on the
                // next check instead.
                let code = e.os_code();
                tracing::error!(
                    binary = %name,
                    code,
                    "test binary {} returned {} = '{}' ({})",
                    name,
                    code,
                    describe_code(code),
                    e
                );
                return Ok(CheckVerdict::Fail(HealthFailure::ExitCode(code)));
            }
        };

        tracing::debug!(binary = %name, pid, "Test binary launched");
        if let Err(e) = self.registry.add(&name, pid) {
            tracing::error!(binary = %name, pid, "{}", e);
        }

        std::thread::sleep(self.config.reap_delay());

        self.reap_and_classify(&name, pid)
    }

    /// Reap finished children until one fails or none is ready
    fn reap_and_classify(&mut self, name: &str, launched_pid: u32) -> Result<CheckVerdict, SupervisorError> {
        loop {
            match self.host.try_reap_any() {
                Ok(ReapResult::Reaped { pid, status }) => {
                    let reaped_name = self
                        .registry
                        .remove(pid)
                        .map(|record| record.name)
                        .unwrap_or_else(|| name.to_string());

                    match status {
                        ChildStatus::ExitedOk => {
                            tracing::debug!(binary = %reaped_name, pid, "Test binary passed");
                        }
                        ChildStatus::ExitedWithCode(code) => {
                            tracing::error!(
                                binary = %reaped_name,
                                pid,
                                code,
                                "test binary {} returned {} = '{}'",
                                reaped_name,
                                code,
                                describe_code(code)
                            );
                            return Ok(CheckVerdict::Fail(HealthFailure::ExitCode(code)));
                        }
                        ChildStatus::KilledBySignal(signal) => {
                            tracing::error!(
                                binary = %reaped_name,
                                pid,
                                signal,
                                "test binary {} was killed by uncaught signal {}",
                                reaped_name,
                                signal
                            );
                            return Ok(CheckVerdict::Fail(HealthFailure::KilledBySignal(signal)));
                        }
                    }
                }
                Ok(ReapResult::NothingReady) | Ok(ReapResult::NoChildren) => {
                    return Ok(CheckVerdict::Pass);
                }
                Err(e) => {
                    tracing::error!(
                        pid = launched_pid,
                        "child {} did not exit immediately (error = {} = '{}')",
                        launched_pid,
                        e.raw_os_error().unwrap_or(0),
                        e
                    );
                    if self.config.soft_reboot {
                        return Err(SupervisorError::StrayReap(e));
                    }
                    return Ok(CheckVerdict::Pass);
                }
            }
        }
    }

    /// Stop tracking every child
    pub fn shutdown(&mut self) {
        if !self.registry.is_empty() {
            tracing::info!(
                tracked = self.registry.len(),
                "Dropping records of still-running test binaries"
            );
        }
        self.registry.clear();
    }
}
