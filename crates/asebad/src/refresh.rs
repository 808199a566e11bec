//! The per-node refresh task: once a node's variable catalog completes,
//! periodically issues `GET_VARIABLES` for the whole mirror or a computed
//! coverage span.

use std::time::Duration;

use aseba_core::{Outbound, SessionConfig};
use tokio::sync::watch;
use tokio::time;

use crate::node_table::{HandshakePhase, SharedNodeTable};
use crate::output::{send, SharedOutput};

/// Spawn the refresh task for `node_id`. Exits once the node is no longer
/// present in the table (removed by the liveness task), has left the active
/// phase, or `shutdown_rx` observes termination.
pub fn spawn_refresh_task(
    node_id: u16,
    config: SessionConfig,
    nodes: SharedNodeTable,
    output: SharedOutput,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let period = Duration::from_secs_f64(config.refresh_rate_secs.max(0.001));
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!(node_id, "refresh task exiting: shutdown requested");
                        return;
                    }
                }
                _ = interval.tick() => {}
            }

            let (target, offset, len) = {
                let table = nodes.lock().await;
                let Some(entry) = table.get(&node_id) else {
                    tracing::debug!(node_id, "refresh task exiting: node removed");
                    return;
                };
                if entry.phase != HandshakePhase::Active {
                    tracing::debug!(node_id, "refresh task exiting: node left active phase");
                    return;
                }
                if config.refresh_coverage.is_empty() {
                    (node_id, 0u16, entry.node.var_total_size())
                } else {
                    let names: Vec<&str> = config.refresh_coverage.iter().map(String::as_str).collect();
                    let (offset, len) = entry.node.data_span_for_variables(&names);
                    (node_id, offset, len)
                }
            };

            if len == 0 {
                continue;
            }

            {
                let mut table = nodes.lock().await;
                if let Some(entry) = table.get_mut(&node_id) {
                    entry.node.mark_get_variables_sent(offset, len);
                }
            }

            if let Err(error) = send(
                &output,
                config.host_node_id,
                &Outbound::GetVariables {
                    target_node_id: target,
                    var_offset: offset,
                    var_count: len,
                },
            )
            .await
            {
                tracing::warn!(node_id, %error, "refresh send failed, task exiting");
                return;
            }
        }
    });
}
