//! The liveness task: drops a node (and fires the disconnect callback) once
//! no message has been observed from it within the configured timeout.

use std::time::Duration;

use aseba_core::SessionConfig;
use tokio::sync::watch;
use tokio::time;

use crate::callbacks::Callbacks;
use crate::clock::Clock;
use crate::node_table::{HandshakePhase, SharedNodeTable};
use std::sync::Arc;

/// Poll interval for the liveness sweep: a quarter of the timeout, never
/// slower than once a second, so the sweep is responsive without busy-looping.
fn sweep_period(timeout_secs: f64) -> Duration {
    Duration::from_secs_f64((timeout_secs / 4.0).clamp(0.05, 1.0))
}

pub fn spawn_liveness_task(
    config: SessionConfig,
    nodes: SharedNodeTable,
    callbacks: Arc<Callbacks>,
    clock: Clock,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(sweep_period(config.liveness_timeout_secs));
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("liveness task exiting: shutdown requested");
                        return;
                    }
                }
                _ = interval.tick() => {}
            }
            let now = clock.now();
            let stale: Vec<u16> = {
                let table = nodes.lock().await;
                table
                    .iter()
                    .filter(|(_, entry)| !entry.node.is_alive(now, config.liveness_timeout_secs))
                    .map(|(id, _)| *id)
                    .collect()
            };
            if stale.is_empty() {
                continue;
            }
            let mut table = nodes.lock().await;
            for node_id in stale {
                if let Some(entry) = table.remove(&node_id) {
                    tracing::info!(node_id, "node liveness timeout, removed");
                    let was_active = entry.phase == HandshakePhase::Active;
                    drop(table);
                    // Only a node that actually reached Active ever fired
                    // connection_changed(true); firing the disconnect half
                    // for one that didn't would violate the documented
                    // connection_changed(true) -> ... -> connection_changed(false)
                    // ordering guarantee.
                    if was_active {
                        callbacks.fire_connection_changed(node_id, false);
                    }
                    table = nodes.lock().await;
                }
            }
        }
    })
}
