//! Codec module - interpretation of frame payloads.
//!
//! Payloads are opaque to the wire format. This module provides:
//!
//! - [`NumericCodec`] - Positional reinterpretation as fixed-width numbers
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the element type is chosen at compile time.

mod numeric;

pub use numeric::NumericCodec;
