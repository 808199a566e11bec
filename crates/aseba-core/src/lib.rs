//! aseba-core — Aseba wire format, frame codec, the node mirror, and shared
//! configuration/error types. Every other crate in this workspace depends on
//! this one; it performs no I/O and pulls in no async runtime.

pub mod config;
pub mod message;
pub mod node;
pub mod wire;

pub use config::{ConfigError, SessionConfig};
pub use message::{DeviceInfo, Frame, Message, NativeFunctionParam, Outbound, PayloadReader, PayloadWriter};
pub use node::{DeviceIdentity, LocalEvent, NativeFunction, NodeError, RemoteNode, VariableSlot};
pub use wire::WireError;
