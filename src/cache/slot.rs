//! Fixed-capacity slot table.
//!
//! Slots are addressed by a stable index and never destroyed before the
//! table itself. Reassignment overwrites a slot in place; its payload
//! buffer is allocated on first use and reused across keys.

use crate::error::{BufferError, Result};

/// One prefetch slot.
#[derive(Debug, Default)]
pub struct Slot {
    /// Key currently owned by this slot.
    pub(crate) assigned_key: Option<u64>,
    /// Payload buffer, `max_payload_size` long once allocated.
    pub(crate) buffer: Option<Box<[u8]>>,
    /// Valid bytes in `buffer` for the current key.
    pub(crate) payload_size: usize,
    /// Payload for `assigned_key` has fully arrived.
    pub(crate) ready: bool,
    /// Caller retrieved or released the current payload.
    pub(crate) consumed: bool,
    /// Admission ticks since this slot was last (re)assigned.
    pub(crate) age: u64,
}

impl Slot {
    /// Key currently owned by this slot.
    #[inline]
    pub fn assigned_key(&self) -> Option<u64> {
        self.assigned_key
    }

    /// Whether the payload for the assigned key has arrived.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether the current payload was retrieved or released.
    #[inline]
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Admission ticks since last assignment.
    #[inline]
    pub fn age(&self) -> u64 {
        self.age
    }

    /// Valid payload bytes for the assigned key.
    #[inline]
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Whether the payload buffer has been allocated.
    #[inline]
    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// The slot's buffer, allocating `max_payload_size` bytes on first use.
    pub(crate) fn buffer_mut(&mut self, max_payload_size: usize) -> &mut [u8] {
        self.buffer
            .get_or_insert_with(|| vec![0u8; max_payload_size].into_boxed_slice())
    }

    /// The valid payload bytes, if the slot is ready.
    pub fn payload(&self) -> Option<&[u8]> {
        if !self.ready {
            return None;
        }
        self.buffer.as_deref().map(|b| &b[..self.payload_size])
    }
}

/// Point-in-time copy of a slot's bookkeeping, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSnapshot {
    /// Slot index.
    pub index: usize,
    /// Key currently owned by the slot.
    pub key: Option<u64>,
    /// Payload arrived.
    pub ready: bool,
    /// Payload retrieved or released.
    pub consumed: bool,
    /// Admission ticks since last assignment.
    pub age: u64,
    /// Valid payload bytes.
    pub payload_size: usize,
}

/// Fixed array of prefetch slots.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    /// Create a table of `capacity` empty slots.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BufferError::InvalidConfiguration(
                "slot capacity must be at least 1".to_string(),
            ));
        }
        let slots = (0..capacity).map(|_| Slot::default()).collect();
        Ok(Self { slots })
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// All slots, by index.
    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[inline]
    pub(crate) fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    /// Index of the slot owning `key`.
    pub fn find(&self, key: u64) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.assigned_key == Some(key))
    }

    /// Index of the slot owning `key` whose payload is ready.
    pub fn find_ready(&self, key: u64) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.assigned_key == Some(key) && s.ready)
    }

    /// Slots holding a payload nobody has retrieved yet.
    pub fn ready_unconsumed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.ready && !s.consumed).count()
    }

    /// Bookkeeping copy of every slot.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, s)| SlotSnapshot {
                index,
                key: s.assigned_key,
                ready: s.ready,
                consumed: s.consumed,
                age: s.age,
                payload_size: s.payload_size,
            })
            .collect()
    }
}
