//! Client builder and session lifecycle.
//!
//! The [`BufferedSocketBuilder`] configures slot capacity, the outbound
//! queue and the metadata source. [`BufferedSocket::connect`] then:
//! 1. Fetches and parses the session metadata
//! 2. Builds the wire codec and slot table from it
//! 3. Dials the websocket
//! 4. Spawns the writer task and the read loop
//!
//! # Example
//!
//! ```no_run
//! use buffered_websocket::BufferedSocket;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut socket = BufferedSocket::new("http://localhost:8888/sim/test", 5)?;
//!     socket.connect().await?;
//!
//!     socket.request(0)?;
//!     let mut events = socket.ready_events();
//!     let key = events.recv().await?;
//!
//!     if let Some(payload) = socket.get(key) {
//!         println!("key {} carried {} bytes", key, payload.len());
//!     }
//!     Ok(())
//! }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::cache::{Admission, PrefetchCache, SlotSnapshot};
use crate::control::{
    parse_metadata, HttpMetadataSource, MetadataExtension, MetadataSource, SessionMetadata,
};
use crate::error::{BufferError, Result};
use crate::observer::{ObserverId, ObserverRegistry};
use crate::protocol::WireCodec;
use crate::transport::{dial, frame_sink, read_loop};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Default number of prefetch slots.
pub const DEFAULT_CAPACITY: usize = 8;

/// Default capacity of the key-ready broadcast channel.
pub const DEFAULT_READY_EVENTS_CAPACITY: usize = 256;

/// Builder for configuring a [`BufferedSocket`].
pub struct BufferedSocketBuilder<X = ()> {
    endpoint: String,
    capacity: usize,
    writer_config: WriterConfig,
    ready_events_capacity: usize,
    metadata_source: Option<Box<dyn MetadataSource>>,
    _extension: PhantomData<fn() -> X>,
}

impl BufferedSocketBuilder<()> {
    /// Create a builder for the metadata endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            capacity: DEFAULT_CAPACITY,
            writer_config: WriterConfig::default(),
            ready_events_capacity: DEFAULT_READY_EVENTS_CAPACITY,
            metadata_source: None,
            _extension: PhantomData,
        }
    }
}

impl<X: MetadataExtension> BufferedSocketBuilder<X> {
    /// Set the number of prefetch slots.
    ///
    /// Default: 8
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the maximum queued request frames before `request` reports
    /// backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.writer_config.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Set the capacity of the [`BufferedSocket::ready_events`] channel.
    ///
    /// Default: 256
    pub fn ready_events_capacity(mut self, capacity: usize) -> Self {
        self.ready_events_capacity = capacity;
        self
    }

    /// Replace the HTTP metadata fetch.
    pub fn metadata_source(mut self, source: impl MetadataSource) -> Self {
        self.metadata_source = Some(Box::new(source));
        self
    }

    /// Parse an extension type out of the metadata document.
    pub fn extension<Y: MetadataExtension>(self) -> BufferedSocketBuilder<Y> {
        BufferedSocketBuilder {
            endpoint: self.endpoint,
            capacity: self.capacity,
            writer_config: self.writer_config,
            ready_events_capacity: self.ready_events_capacity,
            metadata_source: self.metadata_source,
            _extension: PhantomData,
        }
    }

    /// Validate the configuration and create the (unconnected) socket.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if the capacity, channel capacity or
    /// ready-event capacity is 0.
    pub fn build(self) -> Result<BufferedSocket<X>> {
        if self.capacity == 0 {
            return Err(BufferError::InvalidConfiguration(
                "slot capacity must be at least 1".to_string(),
            ));
        }
        if self.writer_config.channel_capacity == 0 || self.ready_events_capacity == 0 {
            return Err(BufferError::InvalidConfiguration(
                "channel capacities must be at least 1".to_string(),
            ));
        }

        let metadata_source = match self.metadata_source {
            Some(source) => source,
            None => Box::new(HttpMetadataSource::new()?),
        };

        let observers = Arc::new(ObserverRegistry::new());
        let (ready_tx, _) = broadcast::channel(self.ready_events_capacity);
        let events = ready_tx.clone();
        observers.subscribe(move |key| {
            // No receivers is fine.
            let _ = events.send(key);
        });

        Ok(BufferedSocket {
            endpoint: self.endpoint,
            capacity: self.capacity,
            writer_config: self.writer_config,
            metadata_source,
            observers,
            ready_tx,
            session: None,
        })
    }
}

/// State that exists only while connected.
struct Session<X> {
    metadata: SessionMetadata<X>,
    cache: Arc<PrefetchCache>,
    writer: WriterHandle,
    shutdown_rx: Option<oneshot::Receiver<()>>,
    reader_task: JoinHandle<()>,
    _writer_task: JoinHandle<Result<()>>,
}

/// Prefetching frame cache over one websocket session.
///
/// Created unconnected; [`connect`](Self::connect) fetches the metadata
/// and opens the socket. Read operations before `connect` behave as a
/// miss; `request` fails with `NotConnected`.
pub struct BufferedSocket<X = ()> {
    endpoint: String,
    capacity: usize,
    writer_config: WriterConfig,
    metadata_source: Box<dyn MetadataSource>,
    observers: Arc<ObserverRegistry>,
    ready_tx: broadcast::Sender<u64>,
    session: Option<Session<X>>,
}

impl BufferedSocket<()> {
    /// Create an unconnected socket with `capacity` slots.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if `capacity` is 0.
    pub fn new(endpoint: impl Into<String>, capacity: usize) -> Result<Self> {
        Self::builder(endpoint).capacity(capacity).build()
    }

    /// Create a builder for the metadata endpoint.
    pub fn builder(endpoint: impl Into<String>) -> BufferedSocketBuilder<()> {
        BufferedSocketBuilder::new(endpoint)
    }
}

impl<X: MetadataExtension> BufferedSocket<X> {
    /// Fetch the session metadata, dial the websocket and start the
    /// writer and reader tasks.
    ///
    /// # Errors
    ///
    /// Metadata fetch or parse failures, unsupported wire widths and
    /// websocket handshake failures. `AlreadyConnected` on a second call.
    pub async fn connect(&mut self) -> Result<&SessionMetadata<X>> {
        if self.session.is_some() {
            return Err(BufferError::AlreadyConnected);
        }

        let document = self.metadata_source.fetch(&self.endpoint).await?;
        let metadata = parse_metadata::<X>(&document)?;
        let codec = WireCodec::from_params(&metadata.params)?;

        let socket = dial(&metadata.params.ws_url).await?;
        let (sink, stream) = socket.split();

        let (writer, writer_task) = spawn_writer_task(frame_sink(sink), self.writer_config.clone());

        let cache = Arc::new(PrefetchCache::with_observers(
            codec,
            metadata.params.max_buffer_size,
            self.capacity,
            Box::new(writer.clone()),
            self.observers.clone(),
        )?);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let reader_cache = cache.clone();
        let reader_writer = writer.clone();
        let reader_task = tokio::spawn(async move {
            match read_loop(stream, reader_cache).await {
                Ok(()) => tracing::debug!("Read loop finished"),
                Err(e) => tracing::error!("Read loop error: {}", e),
            }
            // The connection is done either way; release the write half too.
            reader_writer.shutdown();
            let _ = shutdown_tx.send(());
        });

        tracing::info!(
            "Connected to {} with {} slots of {} bytes",
            metadata.params.ws_url,
            self.capacity,
            metadata.params.max_buffer_size
        );

        let session = self.session.insert(Session {
            metadata,
            cache,
            writer,
            shutdown_rx: Some(shutdown_rx),
            reader_task,
            _writer_task: writer_task,
        });
        Ok(&session.metadata)
    }

    fn cache(&self) -> Option<&PrefetchCache> {
        self.session.as_ref().map(|s| s.cache.as_ref())
    }

    /// Admit `key` into a slot and send its request.
    pub fn request(&self, key: u64) -> Result<Admission> {
        self.cache().ok_or(BufferError::NotConnected)?.request(key)
    }

    /// Copy the payload for `key` out of its slot and mark it consumed.
    pub fn get(&self, key: u64) -> Option<Bytes> {
        self.cache()?.get(key)
    }

    /// Run `f` over the payload for `key` in place and mark it consumed.
    ///
    /// Slot bookkeeping is locked while `f` runs; do not call back into
    /// the socket from `f`.
    pub fn with_payload<R>(&self, key: u64, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.cache()?.with_payload(key, f)
    }

    /// Reinterpret the payload for `key` into `dst`, returning the number
    /// of bytes copied (0 on a miss).
    pub fn get_as<T: Pod>(&self, key: u64, dst: &mut [T]) -> usize {
        self.cache().map_or(0, |cache| cache.get_as(key, dst))
    }

    /// Copy the payload for `key` into `dst`, returning the number of
    /// bytes copied (0 on a miss).
    pub fn get_into(&self, key: u64, dst: &mut [u8]) -> usize {
        self.cache().map_or(0, |cache| cache.get_into(key, dst))
    }

    /// Abandon interest in `key`, freeing its slot.
    pub fn release(&self, key: u64) -> bool {
        self.cache().is_some_and(|cache| cache.release(key))
    }

    /// Whether `key` has a ready payload, without consuming it.
    pub fn is_ready(&self, key: u64) -> bool {
        self.cache().is_some_and(|cache| cache.is_ready(key))
    }

    /// Slots holding a payload nobody has retrieved yet.
    pub fn ready_unconsumed_count(&self) -> usize {
        self.cache().map_or(0, |cache| cache.ready_unconsumed_count())
    }

    /// Bookkeeping copy of every slot; empty before `connect`.
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.cache().map(|cache| cache.snapshot()).unwrap_or_default()
    }

    /// Register a key-ready observer.
    ///
    /// Observers run synchronously on the read loop, after the slot lock
    /// is released. May be called before `connect`.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    /// Remove a key-ready observer.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Receive key-ready notifications as an async stream of keys.
    ///
    /// A receiver that falls behind loses the oldest keys
    /// (`RecvError::Lagged`); the payloads stay in their slots.
    pub fn ready_events(&self) -> broadcast::Receiver<u64> {
        self.ready_tx.subscribe()
    }

    /// Metadata endpoint this socket was created for.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Number of prefetch slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Session metadata, once connected.
    pub fn metadata(&self) -> Option<&SessionMetadata<X>> {
        self.session.as_ref().map(|s| &s.metadata)
    }

    /// Whether `connect` succeeded and the read loop is still running.
    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.reader_task.is_finished())
    }

    /// Get the current pending frame count.
    pub fn pending_frames(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.writer.pending_count())
    }

    /// Get the current backpressure status.
    pub fn is_backpressure_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.writer.is_backpressure_active())
    }

    /// Wait until the server closes the connection or the read loop fails.
    ///
    /// This consumes the socket.
    pub async fn wait_for_shutdown(mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(BufferError::NotConnected)?;
        if let Some(rx) = session.shutdown_rx.take() {
            let _ = rx.await;
        }
        Ok(())
    }
}

impl<X> Drop for BufferedSocket<X> {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.reader_task.abort();
            session.writer.shutdown();
        }
    }
}

impl<X> std::fmt::Debug for BufferedSocket<X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedSocket")
            .field("endpoint", &self.endpoint)
            .field("capacity", &self.capacity)
            .field("connected", &self.session.is_some())
            .finish()
    }
}
