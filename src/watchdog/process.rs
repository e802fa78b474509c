//! OS Process Abstraction
//!
//! The supervisor's view of the operating system: launch a test binary with
//! its output redirected, and poll without blocking for any child that has
//! terminated. The policy around these calls (registry, timeouts, verdicts)
//! lives in the supervisor and is tested against a scripted host.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nix::errno::Errno;
use nix::libc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File receiving every test binary's standard output
pub const STDOUT_LOG: &str = "test-bin.stdout";

/// File receiving every test binary's standard error
pub const STDERR_LOG: &str = "test-bin.stderr";

/// Argument passed to test binaries using the newer calling convention
pub const TEST_ARGUMENT: &str = "test";

/// How a test binary expects to be invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationMode {
    /// No arguments
    #[default]
    Bare,
    /// A single literal `test` argument
    TestArgument,
}

/// Everything needed to launch one test binary
#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest<'a> {
    pub binary: &'a Path,
    pub mode: InvocationMode,
    pub log_dir: &'a Path,
}

/// How a reaped child terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    ExitedOk,
    ExitedWithCode(i32),
    KilledBySignal(i32),
}

/// Outcome of one non-blocking poll for terminated children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapResult {
    /// A child terminated and has been reaped
    Reaped { pid: u32, status: ChildStatus },
    /// Children exist but none has terminated yet
    NothingReady,
    /// There are no children left to wait for
    NoChildren,
}

/// Launch failures
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("Failed to redirect test-binary output to {path:?}: {source}")]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to execute {binary:?}: {source}")]
    Exec {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Process fork failed: {0}")]
    Fork(#[source] io::Error),
}

impl SpawnError {
    /// The OS error code behind this failure, 0 if there is none
    pub fn os_code(&self) -> i32 {
        let source = match self {
            SpawnError::Redirect { source, .. } => source,
            SpawnError::Exec { source, .. } => source,
            SpawnError::Fork(source) => source,
        };
        source.raw_os_error().unwrap_or(0)
    }
}

/// Trait for the process operations the supervisor needs
pub trait ProcessHost: Send {
    /// Launch a test binary and return its pid
    fn spawn(&mut self, request: &LaunchRequest<'_>) -> Result<u32, SpawnError>;

    /// Poll for any terminated child without blocking
    fn try_reap_any(&mut self) -> io::Result<ReapResult>;
}

/// Process host backed by the real operating system
#[derive(Debug, Default)]
pub struct UnixProcessHost;

impl UnixProcessHost {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessHost for UnixProcessHost {
    fn spawn(&mut self, request: &LaunchRequest<'_>) -> Result<u32, SpawnError> {
        let stdout = open_log(&request.log_dir.join(STDOUT_LOG))?;
        let stderr = open_log(&request.log_dir.join(STDERR_LOG))?;

        let mut command = Command::new(request.binary);
        if request.mode == InvocationMode::TestArgument {
            command.arg(TEST_ARGUMENT);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // The child handle is dropped on purpose: reaping goes through
        // waitpid(-1) so children from earlier cycles are collected too.
        let child = command.spawn().map_err(|e| classify_spawn_error(request.binary, e))?;
        Ok(child.id())
    }

    fn try_reap_any(&mut self) -> io::Result<ReapResult> {
        // Raw waitpid: nix's WaitStatus rejects signals outside its Signal
        // enum (real-time signals) after the child is already reaped
        let mut status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };

        if pid < 0 {
            return match Errno::last() {
                Errno::ECHILD => Ok(ReapResult::NoChildren),
                errno => Err(io::Error::from(errno)),
            };
        }
        if pid == 0 {
            return Ok(ReapResult::NothingReady);
        }

        Ok(match decode_wait_status(status) {
            Some(status) => ReapResult::Reaped {
                pid: pid as u32,
                status,
            },
            // Stop/continue notifications are not requested
            None => ReapResult::NothingReady,
        })
    }
}

/// Classify a raw wait status; `None` unless the child terminated
fn decode_wait_status(status: libc::c_int) -> Option<ChildStatus> {
    if libc::WIFEXITED(status) {
        match libc::WEXITSTATUS(status) {
            0 => Some(ChildStatus::ExitedOk),
            code => Some(ChildStatus::ExitedWithCode(code)),
        }
    } else if libc::WIFSIGNALED(status) {
        Some(ChildStatus::KilledBySignal(libc::WTERMSIG(status)))
    } else {
        None
    }
}

/// Open a shared output log in append mode, creating it if needed
fn open_log(path: &Path) -> Result<File, SpawnError> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|source| SpawnError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}

/// Resource exhaustion means the fork itself failed; anything else is the
/// child failing to replace its image.
fn classify_spawn_error(binary: &Path, error: io::Error) -> SpawnError {
    match error.raw_os_error().map(Errno::from_raw) {
        Some(Errno::EAGAIN) | Some(Errno::ENOMEM) => SpawnError::Fork(error),
        _ => SpawnError::Exec {
            binary: binary.to_path_buf(),
            source: error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_mode_serde() {
        assert_eq!(
            serde_json::to_string(&InvocationMode::TestArgument).unwrap(),
            "\"test-argument\""
        );
        let mode: InvocationMode = serde_json::from_str("\"bare\"").unwrap();
        assert_eq!(mode, InvocationMode::Bare);
        assert_eq!(InvocationMode::default(), InvocationMode::Bare);
    }

    #[test]
    fn test_spawn_error_classification() {
        let bin = Path::new("/bin/check");

        let fork = classify_spawn_error(bin, io::Error::from_raw_os_error(Errno::EAGAIN as i32));
        assert!(matches!(fork, SpawnError::Fork(_)));

        let exec = classify_spawn_error(bin, io::Error::from_raw_os_error(Errno::ENOENT as i32));
        assert!(matches!(exec, SpawnError::Exec { .. }));
        assert_eq!(exec.os_code(), Errno::ENOENT as i32);
    }

    #[test]
    fn test_decode_wait_status() {
        // Exit code in bits 8..16, terminating signal in the low 7 bits
        assert_eq!(decode_wait_status(0), Some(ChildStatus::ExitedOk));
        assert_eq!(decode_wait_status(3 << 8), Some(ChildStatus::ExitedWithCode(3)));
        assert_eq!(decode_wait_status(9), Some(ChildStatus::KilledBySignal(9)));
        assert_eq!(decode_wait_status(34), Some(ChildStatus::KilledBySignal(34)));
        // Stopped by SIGSTOP
        assert_eq!(decode_wait_status((19 << 8) | 0x7f), None);
    }

    #[test]
    fn test_redirect_failure_reports_os_code() {
        let err = open_log(Path::new("/nonexistent-liveguard-dir/test-bin.stdout")).unwrap_err();
        assert!(matches!(err, SpawnError::Redirect { .. }));
        assert_eq!(err.os_code(), Errno::ENOENT as i32);
    }
}
