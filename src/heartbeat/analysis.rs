//! Post-mortem gap analysis
//!
//! A heartbeat journal written every `interval` seconds should show stamps
//! spaced roughly `interval` apart. A much larger spacing means nothing was
//! written for that long: the daemon, the logger or the whole host was down.

use chrono::{DateTime, Utc};
use std::fmt;

/// An interval between two consecutive heartbeats longer than expected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatGap {
    /// Last heartbeat before the gap (Unix seconds)
    pub last_seen: u64,
    /// First heartbeat after the gap (Unix seconds)
    pub resumed: u64,
}

impl HeartbeatGap {
    /// Length of the gap in seconds
    pub fn duration_secs(&self) -> u64 {
        self.resumed.saturating_sub(self.last_seen)
    }
}

impl fmt::Display for HeartbeatGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}s without heartbeat)",
            format_epoch(self.last_seen),
            format_epoch(self.resumed),
            self.duration_secs()
        )
    }
}

/// Every gap strictly longer than `max_gap_secs`, in timeline order
pub fn find_gaps(stamps: &[u64], max_gap_secs: u64) -> Vec<HeartbeatGap> {
    stamps
        .windows(2)
        .filter(|pair| pair[1].saturating_sub(pair[0]) > max_gap_secs)
        .map(|pair| HeartbeatGap {
            last_seen: pair[0],
            resumed: pair[1],
        })
        .collect()
}

fn format_epoch(epoch_secs: u64) -> String {
    i64::try_from(epoch_secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| epoch_secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_gaps_in_regular_timeline() {
        let stamps: Vec<u64> = (0..10).map(|i| 1_000 + i * 10).collect();
        assert!(find_gaps(&stamps, 30).is_empty());
    }

    #[test]
    fn test_gap_detected() {
        let stamps = vec![100, 110, 120, 500, 510];
        let gaps = find_gaps(&stamps, 30);
        assert_eq!(
            gaps,
            vec![HeartbeatGap {
                last_seen: 120,
                resumed: 500
            }]
        );
        assert_eq!(gaps[0].duration_secs(), 380);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(find_gaps(&[0, 30], 30).is_empty());
        assert_eq!(find_gaps(&[0, 31], 30).len(), 1);
    }

    #[test]
    fn test_short_inputs() {
        assert!(find_gaps(&[], 1).is_empty());
        assert!(find_gaps(&[42], 1).is_empty());
    }

    #[test]
    fn test_display_uses_rfc3339() {
        let gap = HeartbeatGap {
            last_seen: 0,
            resumed: 60,
        };
        let text = gap.to_string();
        assert!(text.starts_with("1970-01-01T00:00:00+00:00"));
        assert!(text.contains("60s without heartbeat"));
    }
}
