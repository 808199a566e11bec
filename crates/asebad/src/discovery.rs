//! The discovery task: periodically broadcasts `LIST_NODES` so new robots
//! on the transport announce themselves via `NODE_PRESENT`.

use std::time::Duration;

use aseba_core::{Outbound, SessionConfig};
use tokio::sync::watch;
use tokio::time;

use crate::output::{send, SharedOutput};

/// Spawn the discovery task. A `discover_rate_secs` of `0` means discovery
/// is caller-driven only (via a one-shot `Connection::list_nodes` call) and
/// no task is spawned. Exits once `shutdown_rx` observes termination.
pub fn spawn_discovery_task(
    config: SessionConfig,
    output: SharedOutput,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    if config.discover_rate_secs <= 0.0 {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs_f64(config.discover_rate_secs));
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("discovery task exiting: shutdown requested");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(error) = send(&output, config.host_node_id, &Outbound::ListNodes).await {
                        tracing::warn!(%error, "discovery broadcast failed");
                    } else {
                        tracing::trace!("discovery broadcast sent");
                    }
                }
            }
        }
    }))
}
