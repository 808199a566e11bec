//! The reader task: pulls bytes off the transport's read half, frames them,
//! decodes each frame into a typed message, and forwards `(source_node,
//! message)` pairs to the dispatcher over a bounded channel.
//!
//! A malformed frame's payload is logged and dropped; it does not end the
//! connection. A transport read error does end it, after notifying the
//! caller via `on_comm_error`.

use aseba_core::{Frame, Message};
use aseba_transport::Transport;
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::{mpsc, watch};

use crate::callbacks::Callbacks;
use crate::error::ConnectionError;

/// Bytes read per `read()` call. A node never sends a frame anywhere near
/// this large; it just bounds how much the buffer grows between frames.
const READ_CHUNK: usize = 4096;

pub async fn run_reader(
    mut read_half: ReadHalf<Box<dyn Transport>>,
    tx: mpsc::Sender<(u16, Message)>,
    callbacks: std::sync::Arc<Callbacks>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!("reader task exiting: shutdown requested");
                    return;
                }
                continue;
            }
            result = read_half.read(&mut chunk) => match result {
                Ok(0) => {
                    tracing::info!("transport closed, reader exiting");
                    return;
                }
                Ok(n) => n,
                Err(error) => {
                    let error = ConnectionError::Io(error);
                    tracing::warn!(%error, "transport read failed, reader exiting");
                    callbacks.fire_comm_error(&error);
                    return;
                }
            },
        };
        buf.extend_from_slice(&chunk[..n]);

        loop {
            match Frame::decode(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.drain(..consumed);
                    match Message::decode(&frame) {
                        Ok(message) => {
                            if tx.send((frame.source_node, message)).await.is_err() {
                                tracing::info!("dispatcher gone, reader exiting");
                                return;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(
                                id = format_args!("{:#06x}", frame.id),
                                %error,
                                "dropping malformed frame payload"
                            );
                        }
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    // A corrupt header leaves no reliable resync point; treat it
                    // the same as a transport error rather than spin on garbage.
                    let error = ConnectionError::Wire(error);
                    tracing::warn!(%error, "frame header decode failed, reader exiting");
                    callbacks.fire_comm_error(&error);
                    return;
                }
            }
        }
    }
}
