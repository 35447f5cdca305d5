//! Error types for buffered-websocket.

use thiserror::Error;

/// Main error type for all buffered-websocket operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// JSON error while parsing the session metadata document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error while fetching the session metadata document.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket protocol or handshake error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Zero capacity, unsupported field width, or similar setup mistake.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Inbound message too short to hold a frame header.
    #[error("Malformed header: need {needed} bytes, got {available}")]
    MalformedHeader {
        /// Bytes required for the header.
        needed: usize,
        /// Bytes actually present in the message.
        available: usize,
    },

    /// Inbound message holds fewer payload bytes than its header announces.
    #[error("Truncated payload for key {key}: announced {announced} bytes, got {available}")]
    TruncatedPayload {
        /// Key from the frame header.
        key: u64,
        /// Payload length from the frame header.
        announced: u64,
        /// Payload bytes actually present.
        available: usize,
    },

    /// Announced payload does not fit the session's slot buffers.
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Payload length from the frame header.
        size: u64,
        /// Session maximum payload size.
        max: usize,
    },

    /// Metadata document parsed but is missing or has invalid fields.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Operation needs a connected session.
    #[error("Not connected")]
    NotConnected,

    /// `connect` was called on a session that is already connected.
    #[error("Already connected")]
    AlreadyConnected,

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Outbound request queue is full.
    #[error("Backpressure: outbound queue is full")]
    Backpressure,

    /// Transport-level failure reported by a sink or stream.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias using BufferError.
pub type Result<T> = std::result::Result<T, BufferError>;
