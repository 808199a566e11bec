//! Dispatch rules: mutate the node mirror and fire callbacks for one decoded
//! message. Runs under the input lock, one message at a time, on the
//! dispatcher task.

use aseba_core::{wire, DeviceInfo, Message, Outbound, RemoteNode};
use tokio::sync::{watch, MutexGuard};

use crate::callbacks::Callbacks;
use crate::error::ConnectionError;
use crate::node_table::{HandshakePhase, NodeEntry, NodeTable, SharedNodeTable};
use crate::output::{send, SharedOutput};
use crate::refresh::spawn_refresh_task;
use aseba_core::SessionConfig;

/// Process one inbound `(source_node, message)` pair.
#[allow(clippy::too_many_arguments)]
pub async fn handle_message(
    source_node: u16,
    message: Message,
    now: f64,
    nodes: &SharedNodeTable,
    output: &SharedOutput,
    callbacks: &Callbacks,
    config: &SessionConfig,
    shutdown_rx: &watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let mut table = nodes.lock().await;

    // NODE_PRESENT can create a node; everything else requires one to exist.
    if let Message::NodePresent { version } = &message {
        let version = *version;
        let is_new = !table.contains_key(&source_node);
        let entry = table.entry(source_node).or_insert_with(|| NodeEntry {
            node: RemoteNode::new(source_node, version, now),
            phase: HandshakePhase::Discovered,
            mirror_ready: false,
        });
        entry.node.touch(now);
        if is_new {
            entry.node.firmware_version = version;
            drop(table);
            if version >= wire::DEVICE_INFO_MIN_VERSION {
                for kind in [
                    wire::DEVICE_INFO_UUID,
                    wire::DEVICE_INFO_NAME,
                    wire::DEVICE_INFO_THYMIO2_RF_SETTINGS,
                ] {
                    send(
                        output,
                        config.host_node_id,
                        &Outbound::GetDeviceInfo {
                            target_node_id: source_node,
                            kind,
                        },
                    )
                    .await?;
                }
            }
            send(
                output,
                config.host_node_id,
                &Outbound::GetNodeDescription {
                    target_node_id: source_node,
                },
            )
            .await?;
            let mut table = nodes.lock().await;
            if let Some(entry) = table.get_mut(&source_node) {
                entry.phase = HandshakePhase::Describing;
            }
        }
        return Ok(());
    }

    let Some(entry) = table.get_mut(&source_node) else {
        tracing::debug!(source_node, "message from unknown node ignored");
        return Ok(());
    };
    entry.node.touch(now);

    match message {
        Message::DeviceInfo(info) => apply_device_info(&mut entry.node, info),

        Message::Description {
            bytecode_size,
            stack_size,
            max_var_size,
            num_named_var,
            num_local_events,
            num_native_fun,
            ..
        } => {
            entry.node.record_description(
                bytecode_size,
                stack_size,
                max_var_size,
                num_named_var,
                num_local_events,
                num_native_fun,
            );
            return advance_handshake(source_node, table, nodes, output, callbacks, config, shutdown_rx).await;
        }

        Message::NamedVariableDescription { size, name } => {
            entry.node.add_var(&name, size)?;
            return advance_handshake(source_node, table, nodes, output, callbacks, config, shutdown_rx).await;
        }

        Message::LocalEventDescription { name, description } => {
            entry.node.add_local_event(name, description);
        }

        Message::NativeFunctionDescription {
            name,
            description,
            params,
        } => {
            let arg_sizes = params.iter().map(|p| p.size).collect();
            entry.node.add_native_function(name, description, arg_sizes);
            return advance_handshake(source_node, table, nodes, output, callbacks, config, shutdown_rx).await;
        }

        Message::Variables { var_offset, var_data } => {
            let was_received = entry.node.var_received();
            entry.node.set_var_data(var_offset, &var_data);
            if !was_received && entry.node.var_received() {
                drop(table);
                callbacks.fire_variables_received(source_node);
                return Ok(());
            }
        }

        Message::ExecutionStateChanged {
            pc,
            event_active,
            step_by_step,
            event_running,
        } => {
            let flags = (event_active as u16) | ((step_by_step as u16) << 1) | ((event_running as u16) << 2);
            drop(table);
            callbacks.fire_execution_state_changed(source_node, pc, flags);
            return Ok(());
        }

        Message::UserEvent { id, arg } => {
            drop(table);
            callbacks.fire_user_event(source_node, id, &arg);
            return Ok(());
        }

        Message::NodePresent { .. } => unreachable!("handled above"),
        Message::Other { id, .. } => {
            tracing::debug!(source_node, id = format_args!("{id:#06x}"), "unhandled message id");
        }
    }

    Ok(())
}

/// Re-checks catalog and native-function completeness after a description
/// message mutates the node, and performs whichever of mirror reset /
/// refresh-task spawn / active-callback is now due. Called from every arm
/// that can complete the catalog, since a node with zero named variables or
/// zero native functions never emits the message that would otherwise
/// trigger the transition.
#[allow(clippy::too_many_arguments)]
async fn advance_handshake(
    source_node: u16,
    mut table: MutexGuard<'_, NodeTable>,
    nodes: &SharedNodeTable,
    output: &SharedOutput,
    callbacks: &Callbacks,
    config: &SessionConfig,
    shutdown_rx: &watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    let Some(entry) = table.get_mut(&source_node) else {
        return Ok(());
    };

    if !entry.mirror_ready && entry.node.catalog_complete() {
        entry.node.reset_var_data();
        entry.mirror_ready = true;
    }

    let became_active =
        entry.mirror_ready && entry.node.natives_complete() && entry.phase != HandshakePhase::Active;
    if !became_active {
        return Ok(());
    }
    entry.phase = HandshakePhase::Active;
    entry.node.handshake_done = true;

    let node_id = source_node;
    let config = config.clone();
    let shutdown_rx = shutdown_rx.clone();
    let nodes = nodes.clone();
    let output = output.clone();
    drop(table);
    spawn_refresh_task(node_id, config, nodes, output, shutdown_rx);
    callbacks.fire_connection_changed(source_node, true);
    Ok(())
}

fn apply_device_info(node: &mut RemoteNode, info: DeviceInfo) {
    match info {
        DeviceInfo::Name(name) => {
            if node.device.name.as_deref() != Some(name.as_str()) {
                node.device.name = Some(name);
            }
        }
        DeviceInfo::Uuid(bytes) => {
            let uuid = format_uuid(&bytes);
            if node.device.uuid.as_deref() != Some(uuid.as_str()) {
                node.device.uuid = Some(uuid);
            }
        }
        DeviceInfo::Thymio2RfSettings {
            network_id,
            node_id,
            channel,
        } => {
            let triple = (network_id, node_id, channel);
            if node.device.rf_settings != Some(triple) {
                node.device.rf_settings = Some(triple);
            }
        }
        DeviceInfo::Other { .. } => {}
    }
}

fn format_uuid(bytes: &[u8]) -> String {
    if bytes.len() != 16 {
        return bytes.iter().map(|b| format!("{b:02x}")).collect();
    }
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}
