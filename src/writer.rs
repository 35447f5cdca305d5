//! Dedicated writer task for outbound request frames.
//!
//! Request frames are handed to a writer task over an mpsc channel instead
//! of locking the websocket sink from every caller. `request` never waits
//! on the network: it enqueues and returns.
//!
//! # Architecture
//!
//! ```text
//! request() ─┐
//! request() ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► WebSocket sink
//! request() ─┘
//! ```
//!
//! The task drains whatever is queued in one batch, feeds it to the sink
//! and flushes once. When every handle is dropped, or any handle calls
//! [`WriterHandle::shutdown`], the task closes the sink, which sends the
//! websocket close frame. Frames still queued at that point are dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Sink, SinkExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::cache::FrameSink;
use crate::error::{BufferError, Result};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch before a flush.
const MAX_BATCH_SIZE: usize = 64;

/// An encoded request waiting to be written.
#[derive(Debug, Clone)]
pub struct OutboundFrame(pub Bytes);

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing frames to the writer task.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    stop: Arc<Notify>,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundFrame>, pending: Arc<AtomicUsize>, max_pending: usize) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            stop: Arc::new(Notify::new()),
        }
    }

    /// Queue a frame without waiting.
    ///
    /// Returns `Backpressure` if the queue is at capacity and
    /// `ConnectionClosed` if the writer task has stopped.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            return Err(BufferError::Backpressure);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => BufferError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => BufferError::ConnectionClosed,
            }
        })
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Stop the writer task and close the sink, even while other handles
    /// are still alive. Later sends fail with `ConnectionClosed`.
    pub fn shutdown(&self) {
        self.stop.notify_one();
    }
}

impl FrameSink for WriterHandle {
    fn send(&self, frame: Bytes) -> Result<()> {
        self.try_send(OutboundFrame(frame))
    }
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("pending", &self.pending_count())
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

/// Spawn the writer task and return a handle for queueing frames.
///
/// The returned `JoinHandle` resolves once the sink has been closed, or on
/// the first sink error. Either way the pending count is back to 0.
pub fn spawn_writer_task<S>(sink: S, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    S: Sink<Bytes, Error = BufferError> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), config.max_pending_frames);
    let stop = handle.stop.clone();
    let task = tokio::spawn(async move {
        let result = writer_loop(rx, sink, pending, stop).await;
        if let Err(e) = &result {
            tracing::error!("Writer task error: {}", e);
        }
        result
    });

    (handle, task)
}

async fn writer_loop<S>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut sink: S,
    pending: Arc<AtomicUsize>,
    stop: Arc<Notify>,
) -> Result<()>
where
    S: Sink<Bytes, Error = BufferError> + Unpin,
{
    let result = drain_channel(&mut rx, &mut sink, &pending, &stop).await;

    // Refuse new frames, then forget the ones nobody will write.
    rx.close();
    while rx.try_recv().is_ok() {
        pending.fetch_sub(1, Ordering::Release);
    }
    result
}

async fn drain_channel<S>(
    rx: &mut mpsc::Receiver<OutboundFrame>,
    sink: &mut S,
    pending: &AtomicUsize,
    stop: &Notify,
) -> Result<()>
where
    S: Sink<Bytes, Error = BufferError> + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    loop {
        let first = tokio::select! {
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => {
                    tracing::debug!("Writer channel closed, closing sink");
                    return sink.close().await;
                }
            },
            _ = stop.notified() => {
                tracing::debug!("Writer stopped, closing sink");
                if let Err(e) = sink.close().await {
                    tracing::debug!("Sink close after stop failed: {}", e);
                }
                return Ok(());
            }
        };

        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        let written = write_batch(sink, &mut batch).await;
        pending.fetch_sub(batch_size, Ordering::Release);
        written?;
    }
}

async fn write_batch<S>(sink: &mut S, batch: &mut Vec<OutboundFrame>) -> Result<()>
where
    S: Sink<Bytes, Error = BufferError> + Unpin,
{
    for OutboundFrame(frame) in batch.drain(..) {
        sink.feed(frame).await?;
    }
    sink.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::pin::Pin;
    use std::time::Duration;

    type TestSink = Pin<Box<dyn Sink<Bytes, Error = BufferError> + Send>>;

    fn recording_sink() -> (TestSink, Arc<Mutex<Vec<Bytes>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = futures_util::sink::unfold(written.clone(), |written, frame: Bytes| async move {
            written.lock().push(frame);
            Ok::<_, BufferError>(written)
        });
        (Box::pin(sink), written)
    }

    fn failing_sink() -> TestSink {
        Box::pin(futures_util::sink::unfold((), |(), _frame: Bytes| async {
            Err::<(), _>(BufferError::Transport("sink gone".to_string()))
        }))
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_frames, DEFAULT_MAX_PENDING_FRAMES);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn test_frames_written_in_order() {
        let (sink, written) = recording_sink();
        let (handle, task) = spawn_writer_task(sink, WriterConfig::default());

        for key in 0..10u32 {
            handle
                .try_send(OutboundFrame(Bytes::copy_from_slice(&key.to_be_bytes())))
                .unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let written = written.lock();
        assert_eq!(written.len(), 10);
        for (key, frame) in written.iter().enumerate() {
            assert_eq!(&frame[..], &(key as u32).to_be_bytes());
        }
    }

    #[tokio::test]
    async fn test_pending_count_drains() {
        let (sink, _written) = recording_sink();
        let (handle, _task) = spawn_writer_task(sink, WriterConfig::default());

        assert_eq!(handle.pending_count(), 0);
        FrameSink::send(&handle, Bytes::from_static(b"\0\0\0\x01")).unwrap();

        for _ in 0..100 {
            if handle.pending_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handle.pending_count(), 0);
        assert!(!handle.is_backpressure_active());
    }

    #[tokio::test]
    async fn test_try_send_at_capacity() {
        let (tx, _rx) = mpsc::channel::<OutboundFrame>(10);
        let pending = Arc::new(AtomicUsize::new(100));
        let handle = WriterHandle::new(tx, pending, 100);

        let result = handle.try_send(OutboundFrame(Bytes::new()));
        assert!(matches!(result, Err(BufferError::Backpressure)));
        assert!(handle.is_backpressure_active());
    }

    #[tokio::test]
    async fn test_try_send_full_channel() {
        let (tx, _rx) = mpsc::channel::<OutboundFrame>(1);
        let handle = WriterHandle::new(tx, Arc::new(AtomicUsize::new(0)), 100);

        handle.try_send(OutboundFrame(Bytes::new())).unwrap();
        let result = handle.try_send(OutboundFrame(Bytes::new()));
        assert!(matches!(result, Err(BufferError::Backpressure)));
        assert_eq!(handle.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_try_send_after_close() {
        let (tx, rx) = mpsc::channel::<OutboundFrame>(4);
        drop(rx);
        let handle = WriterHandle::new(tx, Arc::new(AtomicUsize::new(0)), 100);

        let result = handle.try_send(OutboundFrame(Bytes::new()));
        assert!(matches!(result, Err(BufferError::ConnectionClosed)));
        assert_eq!(handle.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_writer_stops_on_sink_error() {
        let (handle, task) = spawn_writer_task(failing_sink(), WriterConfig::default());
        handle.try_send(OutboundFrame(Bytes::from_static(b"x"))).unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(BufferError::Transport(_))));

        let err = handle.try_send(OutboundFrame(Bytes::from_static(b"y"))).unwrap_err();
        assert!(matches!(err, BufferError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_failed_batch_releases_pending() {
        let (handle, task) = spawn_writer_task(failing_sink(), WriterConfig::default());
        for _ in 0..3 {
            handle.try_send(OutboundFrame(Bytes::from_static(b"x"))).unwrap();
        }
        assert_eq!(handle.pending_count(), 3);

        assert!(task.await.unwrap().is_err());
        assert_eq!(handle.pending_count(), 0);
        assert!(!handle.is_backpressure_active());
    }

    #[tokio::test]
    async fn test_shutdown_with_live_handles() {
        let (sink, written) = recording_sink();
        let (handle, task) = spawn_writer_task(sink, WriterConfig::default());
        let other = handle.clone();

        handle.shutdown();
        task.await.unwrap().unwrap();

        let err = other.try_send(OutboundFrame(Bytes::from_static(b"late"))).unwrap_err();
        assert!(matches!(err, BufferError::ConnectionClosed));
        assert_eq!(other.pending_count(), 0);
        assert!(written.lock().is_empty());
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (sink, _written) = recording_sink();
        let (handle, task) = spawn_writer_task(sink, WriterConfig::default());

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
