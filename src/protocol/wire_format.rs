//! Wire format encoding and decoding.
//!
//! Field widths are negotiated per session through the metadata document,
//! so the layout is described by a [`WireCodec`] rather than constants:
//!
//! ```text
//! Outbound request:
//! ┌──────────────────┐
//! │ Key              │
//! │ key_width bytes  │
//! │ uint BE          │
//! └──────────────────┘
//!
//! Inbound frame:
//! ┌──────────────────┬──────────────────┬───────────────┐
//! │ Key              │ Length N         │ Payload       │
//! │ key_width bytes  │ len_width bytes  │ N bytes       │
//! │ uint BE          │ uint BE          │ opaque        │
//! └──────────────────┴──────────────────┴───────────────┘
//! ```
//!
//! All header integers are Big Endian regardless of host byte order.
//! Supported widths are 2, 4 and 8 bytes.

use bytes::Bytes;

use crate::control::SessionParams;
use crate::error::{BufferError, Result};

/// Width of a header integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    /// 2 bytes (`u16`).
    U16,
    /// 4 bytes (`u32`).
    U32,
    /// 8 bytes (`u64`).
    U64,
}

impl FieldWidth {
    /// Map a byte count to a field width.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for anything other than 2, 4 or 8.
    pub fn from_bytes(bytes: u32) -> Result<Self> {
        match bytes {
            2 => Ok(Self::U16),
            4 => Ok(Self::U32),
            8 => Ok(Self::U64),
            other => Err(BufferError::InvalidConfiguration(format!(
                "unsupported field width of {} bytes (expected 2, 4 or 8)",
                other
            ))),
        }
    }

    /// Number of bytes this field occupies on the wire.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    /// Largest value representable in this width.
    #[inline]
    pub const fn max_value(self) -> u64 {
        match self {
            Self::U16 => u16::MAX as u64,
            Self::U32 => u32::MAX as u64,
            Self::U64 => u64::MAX,
        }
    }

    /// Append `value` truncated to this width, Big Endian.
    fn write(self, value: u64, out: &mut Vec<u8>) {
        match self {
            Self::U16 => out.extend_from_slice(&(value as u16).to_be_bytes()),
            Self::U32 => out.extend_from_slice(&(value as u32).to_be_bytes()),
            Self::U64 => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    /// Read an unsigned Big Endian value. `buf` must hold `self.size()` bytes.
    fn read(self, buf: &[u8]) -> u64 {
        match self {
            Self::U16 => u16::from_be_bytes([buf[0], buf[1]]) as u64,
            Self::U32 => u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64,
            Self::U64 => u64::from_be_bytes([
                buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
            ]),
        }
    }
}

/// Decoded header of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Key echoed back by the server.
    pub key: u64,
    /// Payload length in bytes.
    pub payload_length: u64,
}

impl Header {
    /// Create a new header.
    pub fn new(key: u64, payload_length: u64) -> Self {
        Self {
            key,
            payload_length,
        }
    }

    /// Check the announced payload fits a slot buffer of `max_payload_size`.
    pub fn validate(&self, max_payload_size: usize) -> Result<()> {
        if self.payload_length > max_payload_size as u64 {
            return Err(BufferError::PayloadTooLarge {
                size: self.payload_length,
                max: max_payload_size,
            });
        }
        Ok(())
    }
}

/// Encoder/decoder for one session's key and length widths.
///
/// Construction validates both widths, so encode and decode never see an
/// unsupported layout.
///
/// # Example
///
/// ```
/// use buffered_websocket::protocol::WireCodec;
///
/// let codec = WireCodec::new(4, 4).unwrap();
/// let request = codec.encode_request(258);
/// assert_eq!(&request[..], &[0, 0, 1, 2]);
///
/// let header = codec.decode_header(&[0, 0, 1, 2, 0, 0, 0, 16]).unwrap();
/// assert_eq!(header.key, 258);
/// assert_eq!(header.payload_length, 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    key: FieldWidth,
    len: FieldWidth,
}

impl WireCodec {
    /// Create a codec for the given key and length byte widths.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if either width is not 2, 4 or 8.
    pub fn new(key_bytes: u32, len_bytes: u32) -> Result<Self> {
        Ok(Self {
            key: FieldWidth::from_bytes(key_bytes)?,
            len: FieldWidth::from_bytes(len_bytes)?,
        })
    }

    /// Create a codec from the session's wire parameters.
    pub fn from_params(params: &SessionParams) -> Result<Self> {
        Self::new(params.key_bytes, params.len_bytes)
    }

    /// Key field width in bytes.
    #[inline]
    pub fn key_width(&self) -> usize {
        self.key.size()
    }

    /// Length field width in bytes.
    #[inline]
    pub fn len_width(&self) -> usize {
        self.len.size()
    }

    /// Total inbound header size (key + length).
    #[inline]
    pub fn header_size(&self) -> usize {
        self.key.size() + self.len.size()
    }

    /// Encode an outbound request for `key`.
    ///
    /// Produces exactly `key_width` bytes. A key wider than the field is
    /// truncated; the server will echo the truncated key, which matches no
    /// slot, so such a request can never complete.
    pub fn encode_request(&self, key: u64) -> Bytes {
        if key > self.key.max_value() {
            tracing::warn!(
                "Key {} does not fit in {} bytes and will be truncated",
                key,
                self.key.size()
            );
        }
        let mut buf = Vec::with_capacity(self.key.size());
        self.key.write(key, &mut buf);
        Bytes::from(buf)
    }

    /// Encode a frame header (producer side).
    pub fn encode_header(&self, header: &Header) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header_size());
        self.encode_header_into(header, &mut buf);
        buf
    }

    /// Append an encoded frame header to `buf`.
    pub fn encode_header_into(&self, header: &Header, buf: &mut Vec<u8>) {
        self.key.write(header.key, buf);
        self.len.write(header.payload_length, buf);
    }

    /// Decode an outbound request (server side).
    ///
    /// # Errors
    ///
    /// Returns `MalformedHeader` unless `buf` is exactly `key_width` bytes.
    pub fn decode_request(&self, buf: &[u8]) -> Result<u64> {
        let needed = self.key.size();
        if buf.len() != needed {
            return Err(BufferError::MalformedHeader {
                needed,
                available: buf.len(),
            });
        }
        Ok(self.key.read(buf))
    }

    /// Decode the header at the front of an inbound message.
    ///
    /// Bytes past the header are ignored.
    ///
    /// # Errors
    ///
    /// Returns `MalformedHeader` if `buf` is shorter than `header_size()`.
    pub fn decode_header(&self, buf: &[u8]) -> Result<Header> {
        let needed = self.header_size();
        if buf.len() < needed {
            return Err(BufferError::MalformedHeader {
                needed,
                available: buf.len(),
            });
        }
        let key_end = self.key.size();
        Ok(Header {
            key: self.key.read(&buf[..key_end]),
            payload_length: self.len.read(&buf[key_end..needed]),
        })
    }
}
