//! Watchdog Module
//!
//! Process supervision and hardware keepalive for the Liveguard daemon.
//! The supervisor launches external test binaries and classifies how they
//! exit; the keepalive coordinator feeds the watchdog device and journals
//! every attempt.

pub mod daemon;
pub mod keepalive;
pub mod process;
pub mod registry;
pub mod supervisor;

#[cfg(test)]
mod tests;

pub use daemon::{CycleReport, WatchdogDaemon};
pub use keepalive::{KeepaliveCoordinator, KeepaliveError, WatchdogDevice};
pub use process::{
    ChildStatus, InvocationMode, LaunchRequest, ProcessHost, ReapResult, SpawnError,
    UnixProcessHost,
};
pub use registry::{ProcessRecord, ProcessRegistry, RegistryError, TimeoutCheck};
pub use supervisor::{
    CheckVerdict, HealthFailure, ProcessSupervisor, SupervisorConfig, SupervisorError, TestBinary,
};
