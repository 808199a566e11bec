//! The output lock: a single writer half shared by every task and public API
//! call that can send a frame, so writes to the transport are never
//! interleaved.

use std::sync::Arc;

use aseba_core::{Frame, Outbound};
use aseba_transport::Transport;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::Mutex;

use crate::error::ConnectionError;

pub type SharedOutput = Arc<Mutex<WriteHalf<Box<dyn Transport>>>>;

/// Encode `message` from `host_node_id` and write it to the transport,
/// serialized with every other sender via the output lock.
pub async fn send(
    output: &SharedOutput,
    host_node_id: u16,
    message: &Outbound,
) -> Result<(), ConnectionError> {
    let frame = message.encode(host_node_id);
    write_frame(output, &frame).await
}

pub async fn write_frame(output: &SharedOutput, frame: &Frame) -> Result<(), ConnectionError> {
    let bytes = frame.encode()?;
    let mut writer = output.lock().await;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    tracing::trace!(id = format_args!("{:#06x}", frame.id), host_node_id = frame.source_node, "frame sent");
    Ok(())
}
