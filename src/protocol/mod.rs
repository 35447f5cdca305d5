//! Protocol module - wire format and frame types.
//!
//! This module implements the binary framing of the message stream:
//! - Fixed-width Big Endian request encoding
//! - Header decoding with per-session key/length widths
//! - Frame struct splitting a message into header and payload

mod frame;
mod wire_format;

pub(crate) use frame::checked_payload_len;
pub use frame::{build_frame, Frame};
pub use wire_format::{FieldWidth, Header, WireCodec};
