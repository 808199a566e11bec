//! The public `Connection` API: opens a transport, spawns every task the
//! session engine needs, and exposes the outbound operations of §4.3.

use std::sync::Arc;
use std::time::Duration;

use aseba_core::{wire, DeviceIdentity, Message, Outbound, RemoteNode, SessionConfig};
use aseba_transport::Transport;
use tokio::io::{split, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::callbacks::Callbacks;
use crate::clock::Clock;
use crate::dispatch;
use crate::error::ConnectionError;
use crate::node_table::{shared_node_table, HandshakePhase, SharedNodeTable};
use crate::output::{send, SharedOutput};
use crate::{discovery, liveness};

/// Depth of the bounded channel the reader task uses to hand decoded
/// messages to the dispatcher. A node never has this many frames in flight;
/// it just bounds memory if the dispatcher falls behind.
const DISPATCH_QUEUE_DEPTH: usize = 256;

/// A snapshot of one discovered node's identity and handshake phase, for
/// callers that want to enumerate nodes without reaching into the mirror.
#[derive(Debug, Clone)]
pub struct NodeSummary {
    pub node_id: u16,
    pub firmware_version: u16,
    pub device: DeviceIdentity,
    pub phase: HandshakePhase,
}

/// A live connection to one or more Aseba nodes over a single transport.
///
/// Construct with [`Connection::open`]. Every spawned task (reader,
/// dispatcher, discovery, liveness, and one refresh task per active node)
/// runs until [`Connection::shutdown`] is called or the transport closes.
/// [`Connection::run_forever`] awaits every task's exit, for a caller that
/// wants to block the current task until the connection winds down.
pub struct Connection {
    config: SessionConfig,
    nodes: SharedNodeTable,
    output: SharedOutput,
    clock: Clock,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Open a connection over `transport`, spawning the reader, dispatcher,
    /// discovery (if configured), and liveness tasks.
    pub async fn open(transport: Box<dyn Transport>, config: SessionConfig, callbacks: Callbacks) -> Self {
        Connection::open_with_clock(transport, config, callbacks, Clock::start()).await
    }

    /// As [`Connection::open`], but with an explicit [`Clock`] — used by
    /// tests that need to control what `last_msg_time` reads as.
    pub async fn open_with_clock(
        transport: Box<dyn Transport>,
        config: SessionConfig,
        callbacks: Callbacks,
        clock: Clock,
    ) -> Self {
        let (read_half, write_half): (ReadHalf<Box<dyn Transport>>, WriteHalf<Box<dyn Transport>>) =
            split(transport);
        let nodes = shared_node_table();
        let output: SharedOutput = Arc::new(Mutex::new(write_half));
        let callbacks = Arc::new(callbacks);
        let (tx, rx) = mpsc::channel(DISPATCH_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(crate::reader::run_reader(
            read_half,
            tx,
            callbacks.clone(),
            shutdown_rx.clone(),
        )));

        tasks.push(tokio::spawn(run_dispatcher(
            rx,
            nodes.clone(),
            output.clone(),
            callbacks.clone(),
            config.clone(),
            clock.clone(),
            shutdown_rx.clone(),
        )));

        if let Some(handle) = discovery::spawn_discovery_task(config.clone(), output.clone(), shutdown_rx.clone()) {
            tasks.push(handle);
        }

        tasks.push(liveness::spawn_liveness_task(
            config.clone(),
            nodes.clone(),
            callbacks,
            clock.clone(),
            shutdown_rx.clone(),
        ));

        Connection {
            config,
            nodes,
            output,
            clock,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Discovery / handshake ──────────────────────────────────────────────

    /// Broadcast `LIST_NODES`, prompting every node on the transport to
    /// announce itself via `NODE_PRESENT`.
    pub async fn list_nodes(&self) -> Result<(), ConnectionError> {
        send(&self.output, self.config.host_node_id, &Outbound::ListNodes).await
    }

    pub async fn get_node_description(&self, node_id: u16) -> Result<(), ConnectionError> {
        send(
            &self.output,
            self.config.host_node_id,
            &Outbound::GetNodeDescription { target_node_id: node_id },
        )
        .await
    }

    /// Request one piece of device info, or all three (UUID, NAME, RF) when
    /// `kind` is `None`.
    pub async fn get_device_info(&self, node_id: u16, kind: Option<u8>) -> Result<(), ConnectionError> {
        match kind {
            Some(kind) => {
                send(
                    &self.output,
                    self.config.host_node_id,
                    &Outbound::GetDeviceInfo { target_node_id: node_id, kind },
                )
                .await
            }
            None => {
                for kind in [
                    wire::DEVICE_INFO_UUID,
                    wire::DEVICE_INFO_NAME,
                    wire::DEVICE_INFO_THYMIO2_RF_SETTINGS,
                ] {
                    send(
                        &self.output,
                        self.config.host_node_id,
                        &Outbound::GetDeviceInfo { target_node_id: node_id, kind },
                    )
                    .await?;
                }
                Ok(())
            }
        }
    }

    /// Block until `node_id` reaches the active handshake phase, or return
    /// [`ConnectionError::HandshakeTimeout`] after `handshake_wait_secs`.
    pub async fn wait_for_handshake(&self, node_id: u16) -> Result<(), ConnectionError> {
        let deadline = self.clock.now() + self.config.handshake_wait_secs;
        loop {
            if self.is_active(node_id).await {
                return Ok(());
            }
            if self.clock.now() >= deadline {
                return Err(ConnectionError::HandshakeTimeout(node_id));
            }
            tokio::time::sleep(Duration::from_secs_f64(self.config.handshake_poll_secs.max(0.001))).await;
        }
    }

    pub async fn is_active(&self, node_id: u16) -> bool {
        self.nodes
            .lock()
            .await
            .get(&node_id)
            .is_some_and(|entry| entry.phase == HandshakePhase::Active)
    }

    /// Snapshot every currently known node (any handshake phase).
    pub async fn nodes(&self) -> Vec<NodeSummary> {
        self.nodes
            .lock()
            .await
            .values()
            .map(|entry| NodeSummary {
                node_id: entry.node.node_id,
                firmware_version: entry.node.firmware_version,
                device: entry.node.device.clone(),
                phase: entry.phase,
            })
            .collect()
    }

    // ── Variable mirror ─────────────────────────────────────────────────────

    /// Issue `GET_VARIABLES` for `[offset, offset+len)` and arm the mirror to
    /// recognize when the reply completes the window.
    pub async fn get_variables(&self, node_id: u16, offset: u16, len: u16) -> Result<(), ConnectionError> {
        {
            let mut table = self.nodes.lock().await;
            let entry = table.get_mut(&node_id).ok_or(ConnectionError::UnknownNode(node_id))?;
            entry.node.mark_get_variables_sent(offset, len);
        }
        send(
            &self.output,
            self.config.host_node_id,
            &Outbound::GetVariables {
                target_node_id: node_id,
                var_offset: offset,
                var_count: len,
            },
        )
        .await
    }

    /// Refresh only the span covering `names`, via [`RemoteNode::data_span_for_variables`].
    pub async fn get_variables_for(&self, node_id: u16, names: &[&str]) -> Result<(), ConnectionError> {
        let (offset, len) = {
            let table = self.nodes.lock().await;
            let entry = table.get(&node_id).ok_or(ConnectionError::UnknownNode(node_id))?;
            entry.node.data_span_for_variables(names)
        };
        if len == 0 {
            return Ok(());
        }
        self.get_variables(node_id, offset, len).await
    }

    pub async fn set_variables(&self, node_id: u16, offset: u16, values: Vec<u16>) -> Result<(), ConnectionError> {
        send(
            &self.output,
            self.config.host_node_id,
            &Outbound::SetVariables {
                target_node_id: node_id,
                var_offset: offset,
                values,
            },
        )
        .await
    }

    /// Write one scalar into the local mirror and ship it to the node.
    pub async fn set_scalar(&self, node_id: u16, name: &str, val: i16, index: usize) -> Result<(), ConnectionError> {
        let (offset, values) = {
            let mut table = self.nodes.lock().await;
            let entry = table.get_mut(&node_id).ok_or(ConnectionError::UnknownNode(node_id))?;
            entry.node.set_scalar(name, val, index)?
        };
        self.set_variables(node_id, offset, values).await
    }

    /// Write a whole array into the local mirror and ship it to the node.
    pub async fn set_array(&self, node_id: u16, name: &str, values: &[i16]) -> Result<(), ConnectionError> {
        let (offset, values) = {
            let mut table = self.nodes.lock().await;
            let entry = table.get_mut(&node_id).ok_or(ConnectionError::UnknownNode(node_id))?;
            entry.node.set_array(name, values)?
        };
        self.set_variables(node_id, offset, values).await
    }

    pub async fn get_scalar(&self, node_id: u16, name: &str, index: usize) -> Result<i16, ConnectionError> {
        let table = self.nodes.lock().await;
        let entry = table.get(&node_id).ok_or(ConnectionError::UnknownNode(node_id))?;
        Ok(entry.node.get_scalar(name, index)?)
    }

    pub async fn get_array(&self, node_id: u16, name: &str) -> Result<Vec<i16>, ConnectionError> {
        let table = self.nodes.lock().await;
        let entry = table.get(&node_id).ok_or(ConnectionError::UnknownNode(node_id))?;
        Ok(entry.node.get_array(name)?.to_vec())
    }

    /// Read out a clone of the live [`RemoteNode`], for callers that need
    /// more than the scalar/array accessors (e.g. the assembler, which seeds
    /// its symbol table from the whole node).
    pub async fn snapshot_node(&self, node_id: u16) -> Result<RemoteNode, ConnectionError> {
        let table = self.nodes.lock().await;
        let entry = table.get(&node_id).ok_or(ConnectionError::UnknownNode(node_id))?;
        Ok(entry.node.clone())
    }

    // ── Bytecode / execution control ────────────────────────────────────────

    /// Ship `bytecode` to `node_id` starting at `addr`, chunked into slices
    /// of at most [`wire::BYTECODE_CHUNK_WORDS`] words per `SET_BYTECODE`.
    pub async fn set_bytecode(&self, node_id: u16, bytecode: &[u16], addr: u16) -> Result<(), ConnectionError> {
        for (i, chunk) in bytecode.chunks(wire::BYTECODE_CHUNK_WORDS).enumerate() {
            let chunk_addr = addr + (i * wire::BYTECODE_CHUNK_WORDS) as u16;
            send(
                &self.output,
                self.config.host_node_id,
                &Outbound::SetBytecode {
                    target_node_id: node_id,
                    bc_offset: chunk_addr,
                    bytecode: chunk.to_vec(),
                },
            )
            .await?;
        }
        Ok(())
    }

    pub async fn reset(&self, node_id: u16) -> Result<(), ConnectionError> {
        self.send_outbound(Outbound::Reset { target_node_id: node_id }).await
    }

    pub async fn run(&self, node_id: u16) -> Result<(), ConnectionError> {
        self.send_outbound(Outbound::Run { target_node_id: node_id }).await
    }

    pub async fn pause(&self, node_id: u16) -> Result<(), ConnectionError> {
        self.send_outbound(Outbound::Pause { target_node_id: node_id }).await
    }

    pub async fn step(&self, node_id: u16) -> Result<(), ConnectionError> {
        self.send_outbound(Outbound::Step { target_node_id: node_id }).await
    }

    pub async fn stop(&self, node_id: u16) -> Result<(), ConnectionError> {
        self.send_outbound(Outbound::Stop { target_node_id: node_id }).await
    }

    pub async fn get_execution_state(&self, node_id: u16) -> Result<(), ConnectionError> {
        self.send_outbound(Outbound::GetExecutionState { target_node_id: node_id }).await
    }

    pub async fn breakpoint_set(&self, node_id: u16, pc: u16) -> Result<(), ConnectionError> {
        self.send_outbound(Outbound::BreakpointSet { target_node_id: node_id, pc }).await
    }

    pub async fn breakpoint_clear(&self, node_id: u16, pc: u16) -> Result<(), ConnectionError> {
        self.send_outbound(Outbound::BreakpointClear { target_node_id: node_id, pc }).await
    }

    pub async fn breakpoint_clear_all(&self, node_id: u16) -> Result<(), ConnectionError> {
        self.send_outbound(Outbound::BreakpointClearAll { target_node_id: node_id }).await
    }

    async fn send_outbound(&self, message: Outbound) -> Result<(), ConnectionError> {
        send(&self.output, self.config.host_node_id, &message).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Signal every spawned task to exit at its next wake. Does not block;
    /// call [`Connection::run_forever`] to wait for them.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Await every spawned task's exit. Returns once the reader, dispatcher,
    /// discovery, liveness, and any still-running refresh tasks have all
    /// stopped — which happens either because [`Connection::shutdown`] was
    /// called, or because the transport closed on its own.
    pub async fn run_forever(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().await);
        for handle in handles {
            if let Err(error) = handle.await {
                if error.is_panic() {
                    tracing::warn!(%error, "session task panicked");
                }
            }
        }
    }
}

/// A scoped wrapper that calls [`Connection::shutdown`] on drop, so a
/// caller that exits early (an error, a panic unwinding through the scope)
/// still leaves every task a chance to wind down instead of leaking them.
/// It does not await their exit — pair with [`Connection::run_forever`] for
/// that on the success path.
pub struct ConnectionGuard {
    connection: Connection,
}

impl ConnectionGuard {
    pub fn new(connection: Connection) -> Self {
        ConnectionGuard { connection }
    }
}

impl std::ops::Deref for ConnectionGuard {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connection.shutdown();
    }
}

/// The dispatcher task: drains the reader's channel one message at a time,
/// under the input lock, until the channel closes or shutdown is signaled.
async fn run_dispatcher(
    mut rx: mpsc::Receiver<(u16, Message)>,
    nodes: SharedNodeTable,
    output: SharedOutput,
    callbacks: Arc<Callbacks>,
    config: SessionConfig,
    clock: Clock,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!("dispatcher exiting: shutdown requested");
                    return;
                }
            }
            received = rx.recv() => {
                let Some((source_node, message)) = received else {
                    tracing::info!("reader channel closed, dispatcher exiting");
                    return;
                };
                let now = clock.now();
                if let Err(error) = dispatch::handle_message(
                    source_node,
                    message,
                    now,
                    &nodes,
                    &output,
                    &callbacks,
                    &config,
                    &shutdown_rx,
                )
                .await
                {
                    tracing::warn!(source_node, %error, "dispatch failed");
                    callbacks.fire_comm_error(&error);
                }
            }
        }
    }
}
