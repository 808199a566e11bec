//! The shared map of discovered nodes and their handshake phase.
//!
//! All reads and writes go through the single mutex wrapping this table —
//! the "input lock" of the concurrency model. Nothing in this module does
//! I/O; it is pure bookkeeping, mirroring how [`aseba_core::node`] keeps
//! mutation and transport concerns apart.

use std::collections::HashMap;
use std::sync::Arc;

use aseba_core::RemoteNode;
use tokio::sync::Mutex;

/// Where a node sits in the per-node handshake state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// `NODE_PRESENT` seen, capability requests not yet sent.
    Discovered,
    /// Capability requests sent; catalogs still filling in.
    Describing,
    /// Variable, event, and native-function catalogs complete; refresh running.
    Active,
}

pub struct NodeEntry {
    pub node: RemoteNode,
    pub phase: HandshakePhase,
    /// Set once the variable mirror has been sized and zeroed. Guards
    /// against `reset_var_data` running more than once, since catalog
    /// completion can be observed from more than one message arm.
    pub mirror_ready: bool,
}

pub type NodeTable = HashMap<u16, NodeEntry>;
pub type SharedNodeTable = Arc<Mutex<NodeTable>>;

pub fn shared_node_table() -> SharedNodeTable {
    Arc::new(Mutex::new(HashMap::new()))
}
