//! Admission and eviction policy.
//!
//! A single left-to-right pass over the table picks the slot for a newly
//! requested key. In priority order:
//!
//! 1. A slot already owning the key (overrides everything, even later in
//!    the scan).
//! 2. The first consumed slot, unless candidacy is already locked.
//! 3. The slot with the strictly greatest age (first one wins ties).
//!
//! Every slot ages by one tick during the pass; the chosen slot is then
//! pinned back to age 0.

use super::slot::SlotTable;

/// Which rule selected the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionKind {
    /// The slot already owned the key.
    Match,
    /// The slot was free (consumed) and reused.
    Reuse,
    /// The oldest slot was evicted.
    Evict,
}

/// Outcome of admitting a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Index of the slot now owning the key.
    pub slot: usize,
    /// Rule that selected it.
    pub kind: AdmissionKind,
}

/// Select and assign the slot for `key`, advancing the age clock.
///
/// `ready` is cleared only on a true eviction. A matched or reused slot
/// keeps its `ready` flag, so a reused slot can report the previous key's
/// payload as ready until the new frame arrives.
pub fn select_slot(table: &mut SlotTable, key: u64) -> Admission {
    let slots = table.slots_mut();

    let mut candidate = 0;
    let mut max_age = slots[0].age;
    let mut locked = false;
    let mut kind = AdmissionKind::Evict;

    for (i, slot) in slots.iter_mut().enumerate() {
        if slot.assigned_key == Some(key) {
            candidate = i;
            locked = true;
            kind = AdmissionKind::Match;
        } else if !locked && slot.consumed {
            candidate = i;
            locked = true;
            kind = AdmissionKind::Reuse;
        } else if !locked && slot.age > max_age {
            candidate = i;
            max_age = slot.age;
        }
        slot.age = slot.age.saturating_add(1);
    }

    let chosen = &mut slots[candidate];
    chosen.assigned_key = Some(key);
    chosen.age = 0;
    chosen.consumed = false;
    if kind == AdmissionKind::Evict {
        chosen.ready = false;
    }

    Admission {
        slot: candidate,
        kind,
    }
}
