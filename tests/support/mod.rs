//! Shared helpers for the integration tests: a minimal raw TCP client
//! that speaks the frame format without going through a connection
//! controller, so the tests observe exactly what is on the wire.

use minefield::protocol::frame::HEADER_LEN;
use minefield::protocol::MessageType;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

pub async fn read_raw_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await.expect("read header");
    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    let mut frame = vec![0u8; HEADER_LEN + len];
    frame[..HEADER_LEN].copy_from_slice(&header);
    stream
        .read_exact(&mut frame[HEADER_LEN..])
        .await
        .expect("read payload");
    frame
}

/// Reads frames until one of type `wanted` arrives, skipping broadcast
/// chatter such as text messages.
pub async fn read_frame_of_type(stream: &mut TcpStream, wanted: MessageType) -> Vec<u8> {
    timeout(Duration::from_secs(5), async {
        loop {
            let frame = read_raw_frame(stream).await;
            if frame[0] == wanted as u8 {
                return frame;
            }
        }
    })
    .await
    .expect("timed out waiting for frame")
}

/// A fresh SQLite path under the system temp directory.
pub fn temp_db_path(tag: &str) -> String {
    let path = std::env::temp_dir().join(format!(
        "minefield-it-{}-{}.db",
        tag,
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path.to_str().expect("temp path is not UTF-8").to_owned()
}
