//! Forward Walk - read frames in order with a fixed prefetch window.
//!
//! This demo demonstrates:
//! - Connecting with the simulation metadata extension
//! - Keeping `WINDOW` requests in flight ahead of the reader
//! - Waiting on key-ready events and reading payloads as `f32`
//!
//! # Running
//!
//! ```text
//! cargo run --example frame_server -- 8888
//! cargo run --example forward_walk -- http://127.0.0.1:8888/sim/test
//! ```

use buffered_websocket::BufferedSocket;
use buffered_websocket::SimInfo;

const WINDOW: u64 = 3;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8888/sim/test".to_string());

    let mut socket = BufferedSocket::builder(endpoint)
        .capacity(WINDOW as usize)
        .extension::<SimInfo>()
        .build()?;
    let info = socket.connect().await?.extension.clone();
    tracing::info!(
        "Session has {} frames of {} atoms",
        info.frame_number,
        info.atom_number
    );

    let mut events = socket.ready_events();
    for key in 0..WINDOW.min(info.frame_number) {
        socket.request(key)?;
    }

    let mut positions = vec![0f32; info.atom_number as usize];
    for key in 0..info.frame_number {
        // A reused slot reports the previous key until the new frame lands.
        while events.recv().await? != key {}

        let copied = socket.get_as(key, &mut positions);
        println!(
            "frame {:>4}: {:>4} bytes, first atom at {:.4}",
            key,
            copied,
            positions.first().copied().unwrap_or_default()
        );

        if key + WINDOW < info.frame_number {
            socket.request(key + WINDOW)?;
        }
    }

    Ok(())
}
