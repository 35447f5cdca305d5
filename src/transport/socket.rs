//! WebSocket dial and read loop.
//!
//! Each binary message is one frame. Messages are ingested one at a time,
//! in arrival order, and ingestion (observer calls included) completes
//! before the next message is read.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::cache::PrefetchCache;
use crate::error::{BufferError, Result};

/// Client websocket stream.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the websocket for a session.
///
/// Only plain `ws://` endpoints are dialed.
pub async fn dial(ws_url: &str) -> Result<WsStream> {
    if !ws_url.starts_with("ws://") {
        return Err(BufferError::InvalidConfiguration(format!(
            "unsupported websocket url '{ws_url}'"
        )));
    }

    let (stream, response) = connect_async(ws_url).await?;
    tracing::debug!("Connected to {} (status {})", ws_url, response.status());
    Ok(stream)
}

/// Adapt a websocket message sink into a sink of encoded request frames.
///
/// Every request goes out as one binary message.
pub fn frame_sink<S>(sink: S) -> impl Sink<Bytes, Error = BufferError> + Unpin + Send
where
    S: Sink<Message, Error = WsError> + Unpin + Send,
{
    sink.with(|frame: Bytes| future::ready(Ok::<_, WsError>(Message::Binary(frame.to_vec()))))
        .sink_map_err(BufferError::from)
}

/// Feed inbound messages to the cache until the stream ends.
///
/// Returns `Ok(())` on a close frame or end of stream. Framing violations
/// and websocket errors end the loop with an error; the connection is not
/// usable after either.
pub async fn read_loop<R>(mut stream: R, cache: Arc<PrefetchCache>) -> Result<()>
where
    R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                cache.on_frame(&data)?;
            }
            Ok(Message::Text(text)) => {
                tracing::warn!("Ignoring text message ({} bytes)", text.len());
            }
            Ok(Message::Close(frame)) => {
                tracing::debug!("Server closed connection: {:?}", frame);
                return Ok(());
            }
            Ok(_) => {}
            Err(WsError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
