//! Timestamp Ring Buffer
//!
//! Fixed-capacity circular store of fixed-width heartbeat slots. Pure data
//! structure: no I/O, no clock. The journal owns one of these and persists
//! its contents after every write.

/// Width of one heartbeat slot in bytes, newline included
pub const TS_SIZE: usize = 12;

/// Largest timestamp that still fits in a slot (`TS_SIZE - 1` digits)
pub const MAX_SLOT_VALUE: u64 = 99_999_999_999;

/// A single encoded heartbeat slot
pub type Slot = [u8; TS_SIZE];

/// Encode a Unix timestamp as a right-aligned, newline-terminated slot.
///
/// Values wider than the slot are clamped to [`MAX_SLOT_VALUE`].
pub fn encode_slot(epoch_secs: u64) -> Slot {
    let text = format!(
        "{:>width$}\n",
        epoch_secs.min(MAX_SLOT_VALUE),
        width = TS_SIZE - 1
    );
    let mut slot = [b' '; TS_SIZE];
    slot.copy_from_slice(text.as_bytes());
    slot
}

/// Decode a slot back into a Unix timestamp.
///
/// Returns `None` for anything that is not a well-formed slot.
pub fn decode_slot(slot: &[u8]) -> Option<u64> {
    if slot.len() != TS_SIZE || slot[TS_SIZE - 1] != b'\n' {
        return None;
    }
    let text = std::str::from_utf8(&slot[..TS_SIZE - 1]).ok()?;
    text.trim_start_matches(' ').parse().ok()
}

/// Circular buffer of heartbeat slots
#[derive(Debug, Clone)]
pub struct TimestampRing {
    slots: Vec<u8>,
    capacity: usize,
    write_index: usize,
    count: usize,
}

impl TimestampRing {
    /// Create an empty ring holding `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![b' '; capacity * TS_SIZE],
            capacity,
            write_index: 0,
            count: 0,
        }
    }

    /// Rebuild a ring from slots already in chronological order.
    ///
    /// If more slots are given than fit, only the newest `capacity` are kept.
    pub fn from_chronological(capacity: usize, stamps: &[Slot]) -> Self {
        let mut ring = Self::new(capacity);
        let skip = stamps.len().saturating_sub(ring.capacity);
        for slot in &stamps[skip..] {
            ring.push(slot);
        }
        ring
    }

    /// Write a slot at `write_index`, then advance the cursor.
    ///
    /// Once the ring is full this overwrites the oldest slot, and afterwards
    /// `write_index` again names the oldest slot.
    pub fn push(&mut self, slot: &Slot) {
        let start = self.write_index * TS_SIZE;
        self.slots[start..start + TS_SIZE].copy_from_slice(slot);

        if self.count < self.capacity {
            self.count += 1;
        }
        self.write_index = (self.write_index + 1) % self.capacity;
    }

    /// The ring's logical contents as (older, newer) byte segments.
    ///
    /// Before the ring fills the first segment is `[0, count)` and the second
    /// is empty. Once full it is `[write_index, capacity)` followed by
    /// `[0, write_index)`, which together are oldest-first without moving
    /// anything in memory.
    pub fn segments(&self) -> (&[u8], &[u8]) {
        if self.is_full() {
            let split = self.write_index * TS_SIZE;
            (&self.slots[split..], &self.slots[..split])
        } else {
            (&self.slots[..self.count * TS_SIZE], &[])
        }
    }

    /// Decoded timestamps, oldest first
    pub fn timestamps(&self) -> Vec<u64> {
        let (tail, head) = self.segments();
        tail.chunks_exact(TS_SIZE)
            .chain(head.chunks_exact(TS_SIZE))
            .filter_map(decode_slot)
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// Index of the next slot to be written
    pub fn write_index(&self) -> usize {
        self.write_index
    }
}
