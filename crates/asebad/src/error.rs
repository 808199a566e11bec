//! Errors surfaced by the session engine to its caller.

use aseba_core::{NodeError, WireError};
use aseba_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("node error: {0}")]
    Node(#[from] NodeError),
    #[error("node {0} is not known to this connection")]
    UnknownNode(u16),
    #[error("handshake with node {0} did not complete within the configured timeout")]
    HandshakeTimeout(u16),
}
