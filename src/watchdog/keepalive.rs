//! Keepalive Coordinator
//!
//! Feeds the hardware watchdog and records every attempt in the heartbeat
//! journal. The journal entry is written even when the device write fails:
//! the journal exists to show when the device or logger was unavailable.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::heartbeat::{HeartbeatJournal, TickOutcome};

/// Byte written on every keepalive pulse
const KEEPALIVE_BYTE: &[u8] = b"\0";

/// Byte that tells a driver the close is intentional
const MAGIC_CLOSE_BYTE: &[u8] = b"V";

/// Keepalive errors
#[derive(Error, Debug)]
pub enum KeepaliveError {
    #[error("Cannot open watchdog device {path:?}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Write to watchdog device failed: {0}")]
    DeviceWrite(#[source] io::Error),
}

impl KeepaliveError {
    /// Numeric daemon code: the underlying OS error
    pub fn code(&self) -> i32 {
        let source = match self {
            KeepaliveError::DeviceOpen { source, .. } => source,
            KeepaliveError::DeviceWrite(source) => source,
        };
        source.raw_os_error().unwrap_or(crate::core::error::EREBOOT)
    }
}

/// Anything that can stand in for the watchdog device
pub trait WatchdogDevice: Write + Send {}

impl<T: Write + Send> WatchdogDevice for T {}

/// Composes the device write and the heartbeat journal
pub struct KeepaliveCoordinator {
    device: Option<Box<dyn WatchdogDevice>>,
    journal: HeartbeatJournal,
    soft_reboot: bool,
}

impl KeepaliveCoordinator {
    pub fn new(
        device: Option<Box<dyn WatchdogDevice>>,
        journal: HeartbeatJournal,
        soft_reboot: bool,
    ) -> Self {
        Self {
            device,
            journal,
            soft_reboot,
        }
    }

    /// Open the watchdog device for writing
    pub fn open_device(path: &Path) -> Result<Box<dyn WatchdogDevice>, KeepaliveError> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| KeepaliveError::DeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(device = %path.display(), "Watchdog device opened");
        Ok(Box::new(file))
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn journal(&self) -> &HeartbeatJournal {
        &self.journal
    }

    /// Pulse the device once, then journal the tick.
    ///
    /// Without a device this is a no-op. A failed device write is logged and
    /// only returned to the caller under the soft-reboot policy.
    pub fn tick(&mut self) -> Result<(), KeepaliveError> {
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };

        let write_result = device.write_all(KEEPALIVE_BYTE).and_then(|_| device.flush());
        let escalate = match write_result {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    errno = e.raw_os_error().unwrap_or(0),
                    "write watchdog device gave error: {}",
                    e
                );
                self.soft_reboot.then_some(e)
            }
        };

        if let TickOutcome::Degraded { epoch_secs } = self.journal.record_tick() {
            tracing::debug!(epoch_secs, "Heartbeat kept in memory only");
        }

        match escalate {
            Some(e) => Err(KeepaliveError::DeviceWrite(e)),
            None => Ok(()),
        }
    }

    /// Disarm and release the device.
    ///
    /// Writes the magic close byte first so drivers that allow it stop the
    /// hardware timer instead of rebooting. Failures are logged only.
    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.write_all(MAGIC_CLOSE_BYTE).and_then(|_| device.flush()) {
                tracing::error!(
                    errno = e.raw_os_error().unwrap_or(0),
                    "write watchdog device gave error: {}",
                    e
                );
            }
            tracing::info!("Watchdog device closed");
        }
    }
}

impl Drop for KeepaliveCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::read_journal;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// In-memory device recording everything written to it
    #[derive(Clone, Default)]
    struct RecordingDevice(Arc<Mutex<Vec<u8>>>);

    impl RecordingDevice {
        fn written(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for RecordingDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Device whose writes always fail with EIO
    struct FailingDevice;

    impl Write for FailingDevice {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(5))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn journal_in(temp: &TempDir) -> (HeartbeatJournal, PathBuf) {
        let path = temp.path().join("heartbeat");
        (HeartbeatJournal::open(&path, 10).unwrap(), path)
    }

    #[test]
    fn test_no_device_is_noop() {
        let temp = TempDir::new().unwrap();
        let (journal, path) = journal_in(&temp);
        let mut keepalive = KeepaliveCoordinator::new(None, journal, true);

        assert!(keepalive.tick().is_ok());
        assert!(read_journal(&path).unwrap().is_empty());
    }

    #[test]
    fn test_tick_writes_null_byte_and_journals() {
        let temp = TempDir::new().unwrap();
        let (journal, path) = journal_in(&temp);
        let device = RecordingDevice::default();
        let mut keepalive =
            KeepaliveCoordinator::new(Some(Box::new(device.clone())), journal, false);

        keepalive.tick().unwrap();
        keepalive.tick().unwrap();

        assert_eq!(device.written(), vec![0u8, 0u8]);
        assert_eq!(read_journal(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_device_failure_swallowed_without_soft_reboot() {
        let temp = TempDir::new().unwrap();
        let (journal, path) = journal_in(&temp);
        let mut keepalive = KeepaliveCoordinator::new(Some(Box::new(FailingDevice)), journal, false);

        assert!(keepalive.tick().is_ok());
        assert_eq!(read_journal(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_device_failure_escalated_but_still_journaled() {
        let temp = TempDir::new().unwrap();
        let (journal, path) = journal_in(&temp);
        let mut keepalive = KeepaliveCoordinator::new(Some(Box::new(FailingDevice)), journal, true);

        let err = keepalive.tick().unwrap_err();
        assert!(matches!(err, KeepaliveError::DeviceWrite(_)));
        assert_eq!(err.code(), 5);
        assert_eq!(read_journal(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_close_writes_magic_byte_once() {
        let device = RecordingDevice::default();
        let mut keepalive = KeepaliveCoordinator::new(
            Some(Box::new(device.clone())),
            HeartbeatJournal::disabled(),
            false,
        );

        keepalive.tick().unwrap();
        keepalive.close();
        assert!(!keepalive.has_device());
        drop(keepalive);

        assert_eq!(device.written(), b"\0V".to_vec());
    }

    #[test]
    fn test_open_missing_device_fails() {
        let err = KeepaliveCoordinator::open_device(Path::new("/nonexistent/watchdog")).err();
        assert!(matches!(err, Some(KeepaliveError::DeviceOpen { .. })));
    }
}
