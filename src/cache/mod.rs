//! Cache module - slot table, admission policy and the prefetch cache.
//!
//! - [`SlotTable`] - Fixed array of slots with per-key bookkeeping
//! - [`select_slot`] - Single-pass admission with age-based eviction
//! - [`PrefetchCache`] - Request, ingestion and read API over one lock

mod policy;
mod prefetch;
mod slot;

pub use policy::{select_slot, Admission, AdmissionKind};
pub use prefetch::{FrameSink, PrefetchCache};
pub use slot::{Slot, SlotSnapshot, SlotTable};
