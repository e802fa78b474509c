//! Heartbeat Journal
//!
//! Persists every keepalive tick to a flat file of fixed-width slots so that
//! gaps in the timeline reveal an unplanned reboot. The file is rewritten
//! from its start on every tick, oldest slot first.
//!
//! The journal is diagnostic only: persistence failures are logged and
//! swallowed so the keepalive path is never held up by it.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use super::ring::{decode_slot, encode_slot, Slot, TimestampRing, TS_SIZE};

/// Default number of slots kept in the journal
pub const DEFAULT_HEARTBEAT_STAMPS: usize = 300;

/// Anything the journal can rewind and rewrite
pub trait HeartbeatStore: Write + Seek + Send {}

impl<T: Write + Seek + Send> HeartbeatStore for T {}

/// Errors raised while opening a journal
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Heartbeat journal needs at least one slot")]
    InvalidCapacity,

    #[error("Failed to open heartbeat file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// What happened on a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No journal file configured
    Disabled,
    /// Wall clock unavailable, tick skipped
    ClockUnavailable,
    /// Slot recorded and the file fully rewritten
    Persisted { epoch_secs: u64 },
    /// Slot recorded in memory but at least one write to the store failed
    Degraded { epoch_secs: u64 },
}

struct JournalState {
    ring: TimestampRing,
    store: Box<dyn HeartbeatStore>,
    path: Option<PathBuf>,
}

/// Rolling on-disk record of keepalive ticks
pub struct HeartbeatJournal {
    state: Option<JournalState>,
}

impl HeartbeatJournal {
    /// A journal with no backing file; every tick is a no-op
    pub fn disabled() -> Self {
        Self { state: None }
    }

    /// Open (or create) a heartbeat file holding up to `capacity` slots.
    ///
    /// Slots already in the file are recovered so the timeline continues
    /// across daemon restarts. Malformed slots are dropped, and if the file
    /// holds more than `capacity` slots only the newest are kept. The file is
    /// rewritten with the recovered contents before this returns.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, JournalError> {
        if capacity == 0 {
            return Err(JournalError::InvalidCapacity);
        }

        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| JournalError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let recovered = read_slots(&mut file)?;
        let ring = TimestampRing::from_chronological(capacity, &recovered);

        file.set_len((ring.len() * TS_SIZE) as u64)?;
        let (tail, head) = ring.segments();
        file.rewind()?;
        file.write_all(tail)?;
        file.write_all(head)?;
        file.flush()?;

        tracing::info!(
            path = %path.display(),
            capacity,
            recovered = ring.len(),
            "Heartbeat journal opened"
        );

        Ok(Self {
            state: Some(JournalState {
                ring,
                store: Box::new(file),
                path: Some(path.to_path_buf()),
            }),
        })
    }

    /// Build a journal over an arbitrary store with an empty ring
    pub fn with_store(store: Box<dyn HeartbeatStore>, capacity: usize) -> Result<Self, JournalError> {
        if capacity == 0 {
            return Err(JournalError::InvalidCapacity);
        }
        Ok(Self {
            state: Some(JournalState {
                ring: TimestampRing::new(capacity),
                store,
                path: None,
            }),
        })
    }

    /// Whether a backing store is configured
    pub fn is_enabled(&self) -> bool {
        self.state.is_some()
    }

    /// Path of the backing file, if the journal was opened from one
    pub fn path(&self) -> Option<&Path> {
        self.state.as_ref().and_then(|s| s.path.as_deref())
    }

    /// In-memory timestamps, oldest first
    pub fn timestamps(&self) -> Vec<u64> {
        self.state
            .as_ref()
            .map(|s| s.ring.timestamps())
            .unwrap_or_default()
    }

    /// Record the current wall-clock time
    pub fn record_tick(&mut self) -> TickOutcome {
        if self.state.is_none() {
            return TickOutcome::Disabled;
        }

        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(now) => self.record_at(now.as_secs()),
            Err(_) => {
                tracing::debug!("Wall clock before epoch, heartbeat skipped");
                TickOutcome::ClockUnavailable
            }
        }
    }

    /// Record an explicit timestamp and rewrite the store
    pub fn record_at(&mut self, epoch_secs: u64) -> TickOutcome {
        let Some(state) = self.state.as_mut() else {
            return TickOutcome::Disabled;
        };

        state.ring.push(&encode_slot(epoch_secs));

        if state.persist() {
            TickOutcome::Persisted { epoch_secs }
        } else {
            TickOutcome::Degraded { epoch_secs }
        }
    }
}

impl JournalState {
    /// Rewrite the whole logical contents oldest-first. Returns false if any
    /// step failed; failures are logged, never propagated.
    fn persist(&mut self) -> bool {
        // Writing at an unknown offset would grow the file and break ordering
        if let Err(e) = self.store.rewind() {
            log_write_error(&e);
            return false;
        }

        let mut ok = true;
        let (tail, head) = self.ring.segments();
        for segment in [tail, head] {
            if segment.is_empty() {
                continue;
            }
            if let Err(e) = self.store.write_all(segment) {
                log_write_error(&e);
                ok = false;
            }
        }

        if let Err(e) = self.store.flush() {
            log_write_error(&e);
            ok = false;
        }

        ok
    }
}

fn log_write_error(e: &io::Error) {
    tracing::error!(
        errno = e.raw_os_error().unwrap_or(0),
        "write heartbeat file gave error: {}",
        e
    );
}

/// Read every well-formed slot from the start of a file
fn read_slots(file: &mut File) -> io::Result<Vec<Slot>> {
    let mut bytes = Vec::new();
    file.rewind()?;
    file.read_to_end(&mut bytes)?;

    Ok(bytes
        .chunks_exact(TS_SIZE)
        .filter(|chunk| decode_slot(chunk).is_some())
        .filter_map(|chunk| Slot::try_from(chunk).ok())
        .collect())
}

/// Read the timestamps recorded in a heartbeat file, oldest first
pub fn read_journal(path: impl AsRef<Path>) -> io::Result<Vec<u64>> {
    let bytes = std::fs::read(path)?;
    Ok(bytes.chunks_exact(TS_SIZE).filter_map(decode_slot).collect())
}
