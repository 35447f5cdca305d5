//! Transport module - websocket connection handling.
//!
//! Provides:
//! - [`dial`] - Open the session websocket
//! - [`frame_sink`] - Outbound request frames as binary messages
//! - [`read_loop`] - Inbound messages into the prefetch cache

mod socket;

pub use socket::{dial, frame_sink, read_loop, WsStream};
