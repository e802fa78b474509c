//! Heartbeat Module
//!
//! Keeps a rolling, on-disk record of every keepalive tick. The record is a
//! flat file of fixed-width timestamp slots in chronological order; gaps in
//! it reveal periods where the watchdog device was not being fed.

pub mod analysis;
pub mod journal;
pub mod ring;


pub use analysis::{find_gaps, HeartbeatGap};
pub use journal::{
    read_journal, HeartbeatJournal, HeartbeatStore, JournalError, TickOutcome,
    DEFAULT_HEARTBEAT_STAMPS,
};
pub use ring::{decode_slot, encode_slot, TimestampRing, TS_SIZE};
