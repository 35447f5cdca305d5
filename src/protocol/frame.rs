//! Frame struct for inbound messages.
//!
//! Each websocket message carries exactly one frame: header followed by
//! the payload. Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use buffered_websocket::protocol::{build_frame, Frame, WireCodec};
//! use bytes::Bytes;
//!
//! let codec = WireCodec::new(4, 4).unwrap();
//! let message = Bytes::from(build_frame(&codec, 7, b"hello"));
//! let frame = Frame::parse(&codec, message).unwrap();
//!
//! assert_eq!(frame.key(), 7);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, WireCodec};
use crate::error::{BufferError, Result};

/// A complete inbound frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes, exactly `header.payload_length` long.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Split a whole inbound message into header and payload.
    ///
    /// Bytes past the announced payload length are dropped.
    ///
    /// # Errors
    ///
    /// - `MalformedHeader` if the message is shorter than the header.
    /// - `TruncatedPayload` if fewer payload bytes arrived than announced.
    pub fn parse(codec: &WireCodec, mut message: Bytes) -> Result<Self> {
        let header = codec.decode_header(&message)?;
        let payload = message.split_off(codec.header_size());
        let length = checked_payload_len(&header, payload.len())?;
        Ok(Self::new(header, payload.slice(..length)))
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the key.
    #[inline]
    pub fn key(&self) -> u64 {
        self.header.key
    }
}

/// Payload length announced by `header`, checked against what arrived.
pub(crate) fn checked_payload_len(header: &Header, available: usize) -> Result<usize> {
    match usize::try_from(header.payload_length) {
        Ok(length) if length <= available => Ok(length),
        _ => Err(BufferError::TruncatedPayload {
            key: header.key,
            announced: header.payload_length,
            available,
        }),
    }
}

/// Build a complete frame as a single byte vector (producer side).
///
/// # Example
///
/// ```
/// use buffered_websocket::protocol::{build_frame, WireCodec};
///
/// let codec = WireCodec::new(2, 2).unwrap();
/// let bytes = build_frame(&codec, 1, b"abc");
/// assert_eq!(bytes, vec![0, 1, 0, 3, b'a', b'b', b'c']);
/// ```
pub fn build_frame(codec: &WireCodec, key: u64, payload: &[u8]) -> Vec<u8> {
    let header = Header::new(key, payload.len() as u64);
    let mut buf = Vec::with_capacity(codec.header_size() + payload.len());
    codec.encode_header_into(&header, &mut buf);
    buf.extend_from_slice(payload);
    buf
}
