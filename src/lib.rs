//! # buffered-websocket
//!
//! Slot-based prefetch cache over a binary websocket stream.
//!
//! The client asks a server for numbered data units ("keys") ahead of
//! need. Responses arrive asynchronously and land in a fixed number of
//! reusable slots; the caller later polls for a key, and gets its payload
//! if it has arrived and has not been evicted in the meantime.
//!
//! ## Architecture
//!
//! - **Control Plane** (HTTP): one JSON document fixes the wire widths,
//!   the websocket URL and the slot buffer size
//! - **Data Plane** (websocket): outbound requests carry only a key;
//!   inbound frames carry key, length and payload, big-endian
//!
//! ## Example
//!
//! ```no_run
//! use buffered_websocket::BufferedSocket;
//!
//! #[tokio::main]
//! async fn main() -> buffered_websocket::Result<()> {
//!     let mut socket = BufferedSocket::new("http://localhost:8888/sim/test", 3)?;
//!     socket.connect().await?;
//!
//!     for key in 0..3 {
//!         socket.request(key)?;
//!     }
//!
//!     let mut positions = [0f32; 10];
//!     let copied = socket.get_as(0, &mut positions);
//!     println!("key 0: {} bytes ready", copied);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod control;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod transport;

mod client;
mod writer;

pub use cache::{Admission, AdmissionKind, FrameSink, PrefetchCache, SlotSnapshot};
pub use client::{
    BufferedSocket, BufferedSocketBuilder, DEFAULT_CAPACITY, DEFAULT_READY_EVENTS_CAPACITY,
};
pub use control::{MetadataExtension, SessionMetadata, SessionParams, SimInfo};
pub use error::{BufferError, Result};
pub use observer::ObserverId;
pub use writer::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_PENDING_FRAMES};

/// Socket whose metadata carries the simulation [`SimInfo`] fields.
pub type SimSocket = BufferedSocket<SimInfo>;
