//! Control plane module - session metadata bootstrap.
//!
//! The control plane is a single JSON document fetched before the data
//! plane opens. It fixes the wire widths, the websocket URL and the slot
//! buffer size for the whole session.
//!
//! # Workflow
//!
//! 1. Client fetches the document from the metadata endpoint
//! 2. Client parses [`SessionParams`] and the optional extension
//! 3. Client dials `ws_url`
//! 4. Binary communication begins on the data plane
//!
//! # Example
//!
//! ```
//! use buffered_websocket::control::{parse_metadata, MetadataSource, StaticMetadata};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let source = StaticMetadata::new(
//!     r#"{"key_bytes": 4, "len_bytes": 4, "ws_url": "ws://localhost/x", "max_buffer_size": 64}"#,
//! );
//! let doc = source.fetch("http://localhost/sim/test").await.unwrap();
//! let meta = parse_metadata::<()>(&doc).unwrap();
//! assert_eq!(meta.params.max_buffer_size, 64);
//! # }
//! ```

mod fetch;
mod metadata;

pub use fetch::{
    BoxFuture, HttpMetadataSource, MetadataSource, StaticMetadata, DEFAULT_FETCH_TIMEOUT,
};
pub use metadata::{parse_metadata, MetadataExtension, SessionMetadata, SessionParams, SimInfo};
