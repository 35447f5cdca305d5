//! Numeric codec - positional reinterpretation of raw payloads.
//!
//! Payload encoding is a contract between producer and consumer, so no
//! byte-order conversion happens here: bytes are copied as-is into the
//! destination's memory. A producer writing little-endian `f32` samples
//! reads back correctly on a little-endian host only.
//!
//! # Example
//!
//! ```
//! use buffered_websocket::codec::NumericCodec;
//!
//! let raw: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
//! let mut samples = [0f32; 4];
//! let copied = NumericCodec::copy_into(&raw, &mut samples);
//!
//! assert_eq!(copied, 8);
//! assert_eq!(&samples[..2], &[1.5, -2.0]);
//! ```

use bytemuck::Pod;

/// Codec that reinterprets raw bytes as fixed-width numeric values.
pub struct NumericCodec;

impl NumericCodec {
    /// Copy `src` into the memory of `dst`, host byte order.
    ///
    /// Copies `min(src.len(), size_of_val(dst))` bytes and returns that
    /// count. A trailing partial element is written byte-wise.
    #[inline]
    pub fn copy_into<T: Pod>(src: &[u8], dst: &mut [T]) -> usize {
        let dst_bytes: &mut [u8] = bytemuck::cast_slice_mut(dst);
        let n = src.len().min(dst_bytes.len());
        dst_bytes[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Reinterpret `src` as an owned vector of whole `T` elements.
    ///
    /// A trailing partial element is dropped.
    pub fn to_vec<T: Pod>(src: &[u8]) -> Vec<T> {
        let size = std::mem::size_of::<T>();
        if size == 0 {
            return Vec::new();
        }
        let mut out = vec![T::zeroed(); src.len() / size];
        Self::copy_into(src, &mut out);
        out
    }
}
