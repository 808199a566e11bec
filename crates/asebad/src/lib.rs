//! asebad — the session engine: discovery, per-node handshake, variable
//! refresh, liveness, and dispatch of decoded messages to user callbacks.
//!
//! [`Connection::open`] spawns every task described in the concurrency
//! model — a reader task blocking on the transport, a dispatcher task that
//! owns the input lock, an optional discovery task, a liveness sweep, and a
//! refresh task per node once its variable catalog completes — and returns
//! a handle whose methods serialize outbound writes through a single output
//! lock. [`Connection::shutdown`] tells every task to exit at its next wake;
//! [`ConnectionGuard`] does that automatically on drop.

pub mod callbacks;
pub mod clock;
mod connection;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod liveness;
pub mod node_table;
pub mod output;
pub mod reader;
pub mod refresh;

pub use callbacks::Callbacks;
pub use clock::Clock;
pub use connection::{Connection, ConnectionGuard};
pub use error::ConnectionError;
pub use node_table::HandshakePhase;
