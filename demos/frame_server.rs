//! Frame Server - test server for the prefetch client.
//!
//! This demo serves:
//! - `GET /sim/test` on the HTTP port: the session metadata document
//! - a websocket on the next port: one frame of random `f32` positions
//!   per request, or an empty frame past the last frame
//!
//! # Running
//!
//! ```text
//! cargo run --example frame_server -- 8888
//! cargo run --example forward_walk -- http://127.0.0.1:8888/sim/test
//! ```

use buffered_websocket::protocol::{build_frame, WireCodec};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

const KEY_BYTES: u32 = 4;
const LEN_BYTES: u32 = 4;
const ATOMS: usize = 10;
const FRAMES: u64 = 100;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let port: u16 = std::env::args()
        .nth(1)
        .map(|p| p.parse())
        .transpose()?
        .unwrap_or(8888);

    let http = TcpListener::bind(("127.0.0.1", port)).await?;
    let ws = TcpListener::bind(("127.0.0.1", port + 1)).await?;
    tracing::info!("Metadata on http://127.0.0.1:{}/sim/test", port);
    tracing::info!("Frames on ws://127.0.0.1:{}", port + 1);

    let ws_port = port + 1;
    tokio::spawn(async move {
        while let Ok((stream, peer)) = http.accept().await {
            tracing::debug!("Metadata request from {}", peer);
            tokio::spawn(serve_metadata(stream, ws_port));
        }
    });

    while let Ok((stream, peer)) = ws.accept().await {
        tracing::info!("Websocket connection from {}", peer);
        tokio::spawn(async move {
            if let Err(e) = serve_socket(stream).await {
                tracing::warn!("Websocket session error: {}", e);
            }
        });
    }
    Ok(())
}

async fn serve_metadata(mut stream: TcpStream, ws_port: u16) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let request = String::from_utf8_lossy(&request);
    let path = request.split_whitespace().nth(1).unwrap_or("");
    let (status, body) = match path.strip_prefix("/sim/") {
        Some("test") => {
            let id = format!("{:016x}", rand::thread_rng().gen::<u64>());
            let document = serde_json::json!({
                "name": "test",
                "id": id,
                "ws_url": format!("ws://127.0.0.1:{ws_port}/sim/{id}/pos"),
                "key_bytes": KEY_BYTES,
                "len_bytes": LEN_BYTES,
                "max_buffer_size": ATOMS * 4,
                "elements": vec!["O"; ATOMS],
                "atom_number": ATOMS,
                "frame_number": FRAMES,
            });
            ("200 OK", document.to_string())
        }
        Some(name) => ("404 Not Found", format!("Could not find dataset {name}")),
        None => ("404 Not Found", String::new()),
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn serve_socket(stream: TcpStream) -> buffered_websocket::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    let codec = WireCodec::new(KEY_BYTES, LEN_BYTES)?;

    while let Some(message) = read.next().await {
        let request = match message? {
            Message::Binary(request) => request,
            Message::Close(_) => break,
            _ => continue,
        };

        let key = match codec.decode_request(&request) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Could not decode request frame: {}", e);
                continue;
            }
        };

        let payload: Vec<u8> = if key < FRAMES {
            let mut rng = rand::thread_rng();
            (0..ATOMS)
                .flat_map(|_| rng.gen::<f32>().to_ne_bytes())
                .collect()
        } else {
            tracing::warn!("Frame {} is outside of available frames", key);
            Vec::new()
        };

        tracing::debug!("Sending frame {} ({} bytes)", key, payload.len());
        write
            .send(Message::Binary(build_frame(&codec, key, &payload)))
            .await?;
    }
    Ok(())
}
