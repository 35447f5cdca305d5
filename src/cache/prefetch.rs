//! Prefetch cache: admission, frame ingestion and the read API.
//!
//! The whole slot table sits behind one mutex. Admission scans every slot
//! to compare ages and ingestion both scans and writes a slot, so the two
//! must exclude each other as a unit; per-slot locking would not do.
//!
//! # Example
//!
//! ```
//! use buffered_websocket::cache::{FrameSink, PrefetchCache};
//! use buffered_websocket::protocol::{build_frame, WireCodec};
//! use bytes::Bytes;
//!
//! struct Discard;
//! impl FrameSink for Discard {
//!     fn send(&self, _frame: Bytes) -> buffered_websocket::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let codec = WireCodec::new(4, 4).unwrap();
//! let cache = PrefetchCache::new(codec, 64, 2, Box::new(Discard)).unwrap();
//!
//! cache.request(1).unwrap();
//! assert!(cache.get(1).is_none()); // not ready yet
//!
//! cache.on_frame(&build_frame(&codec, 1, b"data")).unwrap();
//! assert_eq!(&cache.get(1).unwrap()[..], b"data");
//! ```

use std::sync::Arc;

use bytemuck::Pod;
use bytes::Bytes;
use parking_lot::Mutex;

use super::policy::{select_slot, Admission, AdmissionKind};
use super::slot::{SlotSnapshot, SlotTable};
use crate::codec::NumericCodec;
use crate::error::Result;
use crate::observer::{ObserverId, ObserverRegistry};
use crate::protocol::{checked_payload_len, WireCodec};

/// Outbound half of the connection: pushes one encoded request frame.
///
/// Implementations must not block; queue the frame if the transport is
/// busy.
pub trait FrameSink: Send + Sync {
    /// Send one request frame.
    fn send(&self, frame: Bytes) -> Result<()>;
}

/// Fixed-capacity prefetch buffer keyed by frame key.
pub struct PrefetchCache {
    codec: WireCodec,
    max_payload_size: usize,
    table: Mutex<SlotTable>,
    observers: Arc<ObserverRegistry>,
    sink: Box<dyn FrameSink>,
}

impl PrefetchCache {
    /// Create a cache with its own observer registry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `capacity` is 0.
    pub fn new(
        codec: WireCodec,
        max_payload_size: usize,
        capacity: usize,
        sink: Box<dyn FrameSink>,
    ) -> Result<Self> {
        Self::with_observers(
            codec,
            max_payload_size,
            capacity,
            sink,
            Arc::new(ObserverRegistry::new()),
        )
    }

    /// Create a cache that notifies a shared observer registry.
    pub fn with_observers(
        codec: WireCodec,
        max_payload_size: usize,
        capacity: usize,
        sink: Box<dyn FrameSink>,
        observers: Arc<ObserverRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            codec,
            max_payload_size,
            table: Mutex::new(SlotTable::new(capacity)?),
            observers,
            sink,
        })
    }

    /// Session wire codec.
    pub fn codec(&self) -> &WireCodec {
        &self.codec
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.table.lock().capacity()
    }

    /// Slot buffer size.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Observer registry notified on ingestion.
    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    /// Register a key-ready observer.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    /// Admit `key` into a slot and send its request frame.
    ///
    /// The slot is assigned before the frame is sent, so on a sink error
    /// it stays assigned to `key` until evicted or released.
    pub fn request(&self, key: u64) -> Result<Admission> {
        let (admission, frame) = {
            let mut table = self.table.lock();
            let admission = select_slot(&mut table, key);
            (admission, self.codec.encode_request(key))
        };

        match admission.kind {
            AdmissionKind::Match => {
                tracing::trace!("Key {} re-requested in slot {}", key, admission.slot)
            }
            AdmissionKind::Reuse => {
                tracing::trace!("Key {} reuses free slot {}", key, admission.slot)
            }
            AdmissionKind::Evict => {
                tracing::debug!("Key {} evicts slot {}", key, admission.slot)
            }
        }

        self.sink.send(frame)?;
        Ok(admission)
    }

    /// Ingest one inbound message.
    ///
    /// Returns the key that became ready, or `None` if the frame was stale
    /// (no slot owns its key any more). Stale frames touch no slot and
    /// notify nobody.
    ///
    /// # Errors
    ///
    /// `MalformedHeader`, `TruncatedPayload` and `PayloadTooLarge` are
    /// stream framing violations; the connection should be dropped.
    pub fn on_frame(&self, message: &[u8]) -> Result<Option<u64>> {
        let header = self.codec.decode_header(message)?;
        let payload = &message[self.codec.header_size()..];
        let length = checked_payload_len(&header, payload.len())?;
        header.validate(self.max_payload_size)?;
        if payload.len() > length {
            tracing::debug!(
                "Ignoring {} trailing bytes after frame for key {}",
                payload.len() - length,
                header.key
            );
        }

        {
            let mut table = self.table.lock();
            let Some(index) = table.find(header.key) else {
                tracing::debug!("Discarding stale frame for key {}", header.key);
                return Ok(None);
            };
            let slot = &mut table.slots_mut()[index];
            slot.buffer_mut(self.max_payload_size)[..length].copy_from_slice(&payload[..length]);
            slot.payload_size = length;
            slot.ready = true;
        }

        tracing::trace!("Key {} ready ({} bytes)", header.key, length);
        self.observers.notify(header.key);
        Ok(Some(header.key))
    }

    /// Run `f` over the payload for `key` and mark it consumed.
    ///
    /// The slot table stays locked while `f` runs, so `f` must not call
    /// back into this cache. Returns `None` while the key is absent or not
    /// yet ready; a miss mutates nothing.
    pub fn with_payload<R>(&self, key: u64, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mut table = self.table.lock();
        let index = table.find_ready(key)?;
        let slot = &mut table.slots_mut()[index];
        slot.consumed = true;
        slot.payload().map(f)
    }

    /// Copy the payload for `key` out of its slot and mark it consumed.
    ///
    /// The lock is released before returning; the copy stays valid after
    /// the slot is reassigned.
    pub fn get(&self, key: u64) -> Option<Bytes> {
        self.with_payload(key, Bytes::copy_from_slice)
    }

    /// Copy the payload for `key` into `dst` and mark it consumed.
    ///
    /// Returns the number of bytes copied, 0 on a miss.
    pub fn get_into(&self, key: u64, dst: &mut [u8]) -> usize {
        self.get_as(key, dst)
    }

    /// Reinterpret the payload for `key` into `dst` and mark it consumed.
    ///
    /// Bytes are copied positionally with no byte-order conversion.
    /// Returns the number of source bytes copied, 0 on a miss.
    pub fn get_as<T: Pod>(&self, key: u64, dst: &mut [T]) -> usize {
        self.with_payload(key, |payload| NumericCodec::copy_into(payload, dst))
            .unwrap_or(0)
    }

    /// Abandon interest in `key`, freeing its slot for the next request.
    ///
    /// Works whether or not the payload has arrived. Returns `false` if no
    /// slot owns the key.
    pub fn release(&self, key: u64) -> bool {
        let mut table = self.table.lock();
        match table.find(key) {
            Some(index) => {
                table.slots_mut()[index].consumed = true;
                true
            }
            None => false,
        }
    }

    /// Whether `key` has a ready payload, without consuming it.
    pub fn is_ready(&self, key: u64) -> bool {
        self.table.lock().find_ready(key).is_some()
    }

    /// Slots holding a payload nobody has retrieved yet.
    pub fn ready_unconsumed_count(&self) -> usize {
        self.table.lock().ready_unconsumed_count()
    }

    /// Bookkeeping copy of every slot.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.table.lock().snapshot()
    }
}

impl std::fmt::Debug for PrefetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchCache")
            .field("codec", &self.codec)
            .field("max_payload_size", &self.max_payload_size)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BufferError;
    use crate::protocol::build_frame;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that records every request frame.
    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<Bytes>>>,
    }

    impl FrameSink for RecordingSink {
        fn send(&self, frame: Bytes) -> Result<()> {
            self.frames.lock().push(frame);
            Ok(())
        }
    }

    struct ClosedSink;

    impl FrameSink for ClosedSink {
        fn send(&self, _frame: Bytes) -> Result<()> {
            Err(BufferError::ConnectionClosed)
        }
    }

    const MAX: usize = 64;

    fn codec() -> WireCodec {
        WireCodec::new(4, 4).unwrap()
    }

    fn cache(capacity: usize) -> (PrefetchCache, RecordingSink) {
        let sink = RecordingSink::default();
        let cache = PrefetchCache::new(codec(), MAX, capacity, Box::new(sink.clone())).unwrap();
        (cache, sink)
    }

    fn frame(key: u64, payload: &[u8]) -> Vec<u8> {
        build_frame(&codec(), key, payload)
    }

    fn payload_for(key: u64) -> Vec<u8> {
        format!("frame-{key}").into_bytes()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = PrefetchCache::new(codec(), MAX, 0, Box::new(ClosedSink)).unwrap_err();
        assert!(matches!(err, BufferError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_request_sends_encoded_key() {
        let (cache, sink) = cache(2);
        cache.request(0x0102).unwrap();
        cache.request(7).unwrap();

        let frames = sink.frames.lock();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &[0, 0, 1, 2]);
        assert_eq!(&frames[1][..], &[0, 0, 0, 7]);
    }

    #[test]
    fn test_request_then_frame_then_get() {
        let (cache, _) = cache(2);
        cache.request(5).unwrap();
        assert_eq!(cache.on_frame(&frame(5, b"hello")).unwrap(), Some(5));

        assert_eq!(cache.ready_unconsumed_count(), 1);
        let payload = cache.get(5).unwrap();
        assert_eq!(&payload[..], b"hello");
        assert_eq!(payload.len(), 5);
        drop(payload);
        assert_eq!(cache.ready_unconsumed_count(), 0);
    }

    #[test]
    fn test_get_before_ready_is_miss() {
        let (cache, _) = cache(2);
        cache.request(1).unwrap();
        assert!(cache.get(1).is_none());
        assert!(cache.get(99).is_none());
    }

    #[test]
    fn test_request_while_holding_payload() {
        let (cache, _) = cache(3);
        let cache = Arc::new(cache);
        cache.request(0).unwrap();
        cache.on_frame(&frame(0, b"zero")).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let walker = cache.clone();
        std::thread::spawn(move || {
            if let Some(payload) = walker.get(0) {
                walker.request(3).unwrap();
                tx.send(payload).unwrap();
            }
        });

        let payload = rx
            .recv_timeout(std::time::Duration::from_secs(2))
            .expect("request blocked while a payload was held");
        assert_eq!(&payload[..], b"zero");
        assert_eq!(cache.snapshot()[0].key, Some(3));
    }

    #[test]
    fn test_with_payload_borrows_in_place() {
        let (cache, _) = cache(2);
        cache.request(4).unwrap();
        cache.on_frame(&frame(4, b"borrowed")).unwrap();

        assert_eq!(cache.with_payload(4, |p| p.len()), Some(8));
        assert!(cache.snapshot()[0].consumed);
        assert_eq!(cache.with_payload(5, |p| p.len()), None);

        // Copies outlive the slot they came from.
        let copy = cache.get(4).unwrap();
        cache.request(5).unwrap();
        cache.on_frame(&frame(5, b"next")).unwrap();
        assert_eq!(&copy[..], b"borrowed");
    }

    #[test]
    fn test_repeated_miss_does_not_consume() {
        let (cache, _) = cache(1);
        cache.request(1).unwrap();
        for _ in 0..5 {
            assert!(cache.get(1).is_none());
        }
        assert!(!cache.snapshot()[0].consumed);
    }

    #[test]
    fn test_stale_frame_discarded() {
        let (cache, _) = cache(2);
        cache.request(1).unwrap();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        cache.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let before = cache.snapshot();
        assert_eq!(cache.on_frame(&frame(2, b"late")).unwrap(), None);

        assert_eq!(cache.snapshot(), before);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_single_slot_reassigned_before_arrival() {
        let (cache, _) = cache(1);
        cache.request(0).unwrap();
        cache.request(1).unwrap();

        // Frame for key 0 arrives after its slot went to key 1.
        assert_eq!(cache.on_frame(&frame(0, b"zero")).unwrap(), None);
        assert!(cache.get(0).is_none());

        cache.on_frame(&frame(1, b"one")).unwrap();
        assert!(cache.get(0).is_none());
        assert_eq!(&cache.get(1).unwrap()[..], b"one");
    }

    #[test]
    fn test_five_slots_ten_keys() {
        let (cache, _) = cache(5);
        for key in 0..10u64 {
            cache.request(key).unwrap();
        }
        for key in 0..10u64 {
            cache.on_frame(&frame(key, &payload_for(key))).unwrap();
        }

        for key in 0..5u64 {
            assert!(cache.get(key).is_none(), "key {key} should be evicted");
        }
        for key in 5..10u64 {
            let payload = cache.get(key).unwrap();
            assert_eq!(&payload[..], &payload_for(key)[..]);
        }
    }

    #[test]
    fn test_eviction_keeps_other_keys() {
        let (cache, _) = cache(3);
        for key in 0..3u64 {
            cache.request(key).unwrap();
        }
        let admission = cache.request(3).unwrap();
        assert_eq!(admission.slot, 0);

        let keys: Vec<_> = cache.snapshot().iter().map(|s| s.key).collect();
        assert_eq!(keys, vec![Some(3), Some(1), Some(2)]);
    }

    #[test]
    fn test_consumed_slot_reused_before_older_slot() {
        let (cache, _) = cache(3);
        for key in 0..3u64 {
            cache.request(key).unwrap();
            cache.on_frame(&frame(key, &payload_for(key))).unwrap();
        }
        assert!(cache.get(2).is_some());

        let admission = cache.request(3).unwrap();
        assert_eq!(admission.slot, 2);
        assert_eq!(admission.kind, AdmissionKind::Reuse);
    }

    #[test]
    fn test_release_frees_slot_without_payload() {
        let (cache, _) = cache(2);
        cache.request(0).unwrap();
        cache.request(1).unwrap();
        assert!(cache.release(1));
        assert!(!cache.release(42));

        let admission = cache.request(2).unwrap();
        assert_eq!(admission.slot, 1);

        // The abandoned key's frame is now stale.
        assert_eq!(cache.on_frame(&frame(1, b"x")).unwrap(), None);
    }

    #[test]
    fn test_reuse_exposes_previous_payload_until_new_frame() {
        // Documented race: a reused slot keeps its ready flag, so the new
        // key reads the previous key's payload until its own frame lands.
        let (cache, _) = cache(1);
        cache.request(0).unwrap();
        cache.on_frame(&frame(0, b"old")).unwrap();
        assert!(cache.get(0).is_some());

        let admission = cache.request(1).unwrap();
        assert_eq!(admission.kind, AdmissionKind::Reuse);
        assert_eq!(&cache.get(1).unwrap()[..], b"old");

        cache.on_frame(&frame(1, b"new")).unwrap();
        assert_eq!(&cache.get(1).unwrap()[..], b"new");
    }

    #[test]
    fn test_rerequest_same_key_keeps_ready_payload() {
        let (cache, sink) = cache(2);
        cache.request(4).unwrap();
        cache.on_frame(&frame(4, b"v1")).unwrap();

        let admission = cache.request(4).unwrap();
        assert_eq!(admission.kind, AdmissionKind::Match);
        assert!(cache.is_ready(4));
        assert_eq!(sink.frames.lock().len(), 2);
    }

    #[test]
    fn test_buffer_reused_across_keys() {
        let (cache, _) = cache(1);
        cache.request(0).unwrap();
        cache.on_frame(&frame(0, b"first")).unwrap();
        assert!(cache.get(0).is_some());

        cache.request(1).unwrap();
        cache.on_frame(&frame(1, b"ab")).unwrap();
        assert_eq!(&cache.get(1).unwrap()[..], b"ab");
        assert_eq!(cache.snapshot()[0].payload_size, 2);
    }

    #[test]
    fn test_observer_called_after_ingestion() {
        let cache = Arc::new(cache(2).0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer_cache = cache.clone();
        let observer_seen = seen.clone();
        cache.subscribe(move |key| {
            // The table lock is free while observers run.
            let payload = observer_cache.get(key);
            observer_seen.lock().push((key, payload));
        });

        cache.request(3).unwrap();
        cache.on_frame(&frame(3, b"abc")).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 3);
        assert_eq!(seen[0].1.as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn test_get_as_floats() {
        let (cache, _) = cache(2);
        let samples = [0.5f32, 1.25, -3.0];
        let raw: Vec<u8> = samples.iter().flat_map(|v| v.to_ne_bytes()).collect();
        cache.request(15).unwrap();
        cache.on_frame(&frame(15, &raw)).unwrap();

        let mut dst = [0f32; 8];
        assert_eq!(cache.get_as(15, &mut dst), 12);
        assert_eq!(&dst[..3], &samples);
        assert_eq!(cache.get_as(16, &mut dst), 0);
    }

    #[test]
    fn test_get_into() {
        let (cache, _) = cache(1);
        cache.request(2).unwrap();
        cache.on_frame(&frame(2, b"abcdef")).unwrap();

        let mut dst = [0u8; 4];
        assert_eq!(cache.get_into(2, &mut dst), 4);
        assert_eq!(&dst, b"abcd");
    }

    #[test]
    fn test_empty_payload_is_ready() {
        let (cache, _) = cache(1);
        cache.request(9).unwrap();
        cache.on_frame(&frame(9, b"")).unwrap();
        let payload = cache.get(9).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let (cache, _) = cache(1);
        cache.request(1).unwrap();
        let err = cache.on_frame(&frame(1, &vec![0u8; MAX + 1])).unwrap_err();
        assert!(matches!(err, BufferError::PayloadTooLarge { .. }));
        assert!(!cache.is_ready(1));
    }

    #[test]
    fn test_malformed_and_truncated_frames() {
        let (cache, _) = cache(1);
        cache.request(1).unwrap();

        let err = cache.on_frame(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, BufferError::MalformedHeader { .. }));

        let mut truncated = frame(1, b"abcdef");
        truncated.truncate(10);
        let err = cache.on_frame(&truncated).unwrap_err();
        assert!(matches!(err, BufferError::TruncatedPayload { .. }));
        assert!(!cache.is_ready(1));
    }

    #[test]
    fn test_sink_error_keeps_assignment() {
        let cache = PrefetchCache::new(codec(), MAX, 1, Box::new(ClosedSink)).unwrap();
        let err = cache.request(3).unwrap_err();
        assert!(matches!(err, BufferError::ConnectionClosed));
        assert_eq!(cache.snapshot()[0].key, Some(3));
    }

    #[test]
    fn test_concurrent_request_and_ingest() {
        let (cache, _) = cache(4);
        let cache = Arc::new(cache);

        let requester = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for key in 0..200u64 {
                    cache.request(key % 16).unwrap();
                    let _ = cache.get(key % 16);
                }
            })
        };
        let ingester = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for key in 0..200u64 {
                    cache.on_frame(&frame(key % 16, &payload_for(key % 16))).unwrap();
                }
            })
        };
        requester.join().unwrap();
        ingester.join().unwrap();

        let mut keys: Vec<u64> = cache.snapshot().iter().filter_map(|s| s.key).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }
}
