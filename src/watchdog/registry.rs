//! Process Registry
//!
//! Tracks in-flight test-binary children. Records are keyed by pid for exact
//! removal on reap, and scanned by name when checking for timeouts.
//!
//! The registry only *tracks*: evicting a record never signals the process.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Longest binary name kept in a record, in bytes
pub const MAX_NAME_LEN: usize = 4095;

/// A running child launched by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    /// Path/identifier of the test binary
    pub name: String,
    /// OS process id
    pub pid: u32,
    /// Wall-clock launch time (Unix seconds)
    pub launched_at: u64,
}

/// Result of a timeout scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutCheck {
    /// No record for this name has outlived the timeout
    Ok,
    /// This record had outlived the timeout and was evicted
    Expired(ProcessRecord),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Out of memory adding test binary {name} (pid {pid})")]
    OutOfMemory { name: String, pid: u32 },
}

/// Collection of live child records
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: HashMap<u32, ProcessRecord>,
    max_records: Option<usize>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that treats growing past `max_records` as allocation failure
    pub fn with_limit(max_records: usize) -> Self {
        Self {
            records: HashMap::new(),
            max_records: Some(max_records),
        }
    }

    /// Track a new child, stamped with the current wall-clock time
    pub fn add(&mut self, name: &str, pid: u32) -> Result<(), RegistryError> {
        self.add_at(name, pid, now_secs())
    }

    /// Track a new child launched at `launched_at`.
    ///
    /// If the record cannot be stored, every record is dropped so that a
    /// later cleanup pass has room to work, and `OutOfMemory` is returned.
    pub fn add_at(&mut self, name: &str, pid: u32, launched_at: u64) -> Result<(), RegistryError> {
        let at_limit = self
            .max_records
            .is_some_and(|max| self.records.len() >= max);

        if at_limit || self.records.try_reserve(1).is_err() {
            tracing::error!(
                pid,
                binary = name,
                tracked = self.records.len(),
                "out of memory adding test binary, dropping all tracked processes"
            );
            self.clear();
            return Err(RegistryError::OutOfMemory {
                name: name.to_string(),
                pid,
            });
        }

        let record = ProcessRecord {
            name: bounded_name(name).to_string(),
            pid,
            launched_at,
        };
        if let Some(previous) = self.records.insert(pid, record) {
            tracing::debug!(pid, stale = %previous.name, "Replaced record for reused pid");
        }
        Ok(())
    }

    /// Forget a reaped child; absent pids are ignored
    pub fn remove(&mut self, pid: u32) -> Option<ProcessRecord> {
        self.records.remove(&pid)
    }

    /// Evict one record for `name` that has been live longer than `timeout_secs`
    pub fn check_timeout(&mut self, name: &str, timeout_secs: u64) -> TimeoutCheck {
        self.check_timeout_at(name, timeout_secs, now_secs())
    }

    /// As [`check_timeout`](Self::check_timeout) against an explicit `now`.
    ///
    /// Age must be strictly greater than the timeout. At most one record is
    /// evicted per call; when several are stale the most recently launched
    /// one goes first.
    pub fn check_timeout_at(&mut self, name: &str, timeout_secs: u64, now: u64) -> TimeoutCheck {
        let name = bounded_name(name);
        let expired = self
            .records
            .values()
            .filter(|r| r.name == name && now.saturating_sub(r.launched_at) > timeout_secs)
            .max_by_key(|r| (r.launched_at, r.pid))
            .map(|r| r.pid);

        match expired.and_then(|pid| self.records.remove(&pid)) {
            Some(record) => TimeoutCheck::Expired(record),
            None => TimeoutCheck::Ok,
        }
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.records.contains_key(&pid)
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    /// Number of live records sharing `name`
    pub fn count_named(&self, name: &str) -> usize {
        let name = bounded_name(name);
        self.records.values().filter(|r| r.name == name).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }
}

/// Clip a name to [`MAX_NAME_LEN`] bytes on a char boundary
fn bounded_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
