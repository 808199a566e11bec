//! Aseba wire format — on-wire message ids, constants, and the fixed frame header.
//!
//! Every Aseba message starts with this 6-byte header: payload length, source
//! node id, message id, all little-endian. The header's layout is exactly as
//! load-bearing as any other on-wire struct — changing it breaks every node
//! talking to this host — so it is a packed, zero-copy struct like the rest
//! of this lineage's wire types, with a compile-time size guard.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Frame header ──────────────────────────────────────────────────────────────

/// The fixed 6-byte header that precedes every Aseba message's payload.
///
/// Wire size: 6 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// Length of the payload in bytes, not including this header.
    pub payload_len: u16,
    /// Node id of the message's source (the robot, or the host for outbound).
    pub source_node: u16,
    /// Message id. Ids below `ID_FIRST_ASEBA_ID` are user events.
    pub id: u16,
}

assert_eq_size!(FrameHeader, [u8; 6]);

/// Size in bytes of [`FrameHeader`].
pub const HEADER_SIZE: usize = 6;

/// Maximum payload length a frame can carry (`payload_len` is a u16).
pub const MAX_PAYLOAD: usize = 0xffff;

// ── Message ids ───────────────────────────────────────────────────────────────

/// Message ids below this value are user events, not protocol messages.
pub const ID_FIRST_ASEBA_ID: u16 = 0x8000;

pub const ID_DESCRIPTION: u16 = 0x9000;
pub const ID_NAMED_VARIABLE_DESCRIPTION: u16 = 0x9001;
pub const ID_LOCAL_EVENT_DESCRIPTION: u16 = 0x9002;
pub const ID_NATIVE_FUNCTION_DESCRIPTION: u16 = 0x9003;
pub const ID_VARIABLES: u16 = 0x9005;
pub const ID_EXECUTION_STATE_CHANGED: u16 = 0x900a;
pub const ID_NODE_PRESENT: u16 = 0x900c;
pub const ID_DEVICE_INFO: u16 = 0x900d;
pub const ID_CHANGED_VARIABLES: u16 = 0x900e;

pub const ID_GET_DESCRIPTION: u16 = 0xa000;
pub const ID_SET_BYTECODE: u16 = 0xa001;
pub const ID_RESET: u16 = 0xa002;
pub const ID_RUN: u16 = 0xa003;
pub const ID_PAUSE: u16 = 0xa004;
pub const ID_STEP: u16 = 0xa005;
pub const ID_STOP: u16 = 0xa006;
pub const ID_GET_EXECUTION_STATE: u16 = 0xa007;
pub const ID_BREAKPOINT_SET: u16 = 0xa008;
pub const ID_BREAKPOINT_CLEAR: u16 = 0xa009;
pub const ID_BREAKPOINT_CLEAR_ALL: u16 = 0xa00a;
pub const ID_GET_VARIABLES: u16 = 0xa00b;
pub const ID_SET_VARIABLES: u16 = 0xa00c;
pub const ID_GET_NODE_DESCRIPTION: u16 = 0xa010;
pub const ID_LIST_NODES: u16 = 0xa011;
pub const ID_GET_DEVICE_INFO: u16 = 0xa012;

/// Protocol version the host declares in `LIST_NODES` / `GET_NODE_DESCRIPTION`.
pub const PROTOCOL_VERSION: u16 = 5;

/// Minimum node-advertised protocol version for which `GET_DEVICE_INFO` is used.
pub const DEVICE_INFO_MIN_VERSION: u16 = 6;

/// Default host node id, used as the `source_node` of every outbound message.
pub const DEFAULT_HOST_NODE_ID: u16 = 1;

pub const DEVICE_INFO_UUID: u8 = 1;
pub const DEVICE_INFO_NAME: u8 = 2;
pub const DEVICE_INFO_THYMIO2_RF_SETTINGS: u8 = 3;

// ── Timeouts ──────────────────────────────────────────────────────────────────

/// Default liveness timeout, in seconds, after which a silent node is dropped.
pub const DEFAULT_LIVENESS_TIMEOUT_SECS: f64 = 3.0;
/// Default `wait_for_handshake` timeout, in seconds.
pub const DEFAULT_HANDSHAKE_WAIT_SECS: f64 = 5.0;
/// Poll interval used while waiting for a handshake to complete.
pub const HANDSHAKE_POLL_SECS: f64 = 0.1;
/// Default variable-refresh period, in seconds.
pub const DEFAULT_REFRESH_RATE_SECS: f64 = 0.1;
/// Default discovery (`LIST_NODES`) period, in seconds.
pub const DEFAULT_DISCOVER_RATE_SECS: f64 = 2.0;
/// Max words per `SET_BYTECODE` chunk.
pub const BYTECODE_CHUNK_WORDS: usize = 256;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("frame payload of {0} bytes exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),
    #[error("truncated frame: expected {expected} payload bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("payload ended while reading a {0}")]
    UnexpectedEnd(&'static str),
    #[error("string field at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_header_is_six_bytes() {
        let header = FrameHeader {
            payload_len: 4,
            source_node: 7,
            id: ID_VARIABLES,
        };
        assert_eq!(header.as_bytes().len(), HEADER_SIZE);
    }

    #[test]
    fn frame_header_round_trip_le() {
        let header = FrameHeader {
            payload_len: 0x0102,
            source_node: 0x0304,
            id: 0x0506,
        };
        let bytes = header.as_bytes();
        assert_eq!(bytes, &[0x02, 0x01, 0x04, 0x03, 0x06, 0x05]);

        let recovered = FrameHeader::read_from(bytes).unwrap();
        let payload_len = recovered.payload_len;
        let source_node = recovered.source_node;
        let id = recovered.id;
        assert_eq!(payload_len, 0x0102);
        assert_eq!(source_node, 0x0304);
        assert_eq!(id, 0x0506);
    }

    #[test]
    fn user_event_ids_are_below_first_aseba_id() {
        assert!(0x0042 < ID_FIRST_ASEBA_ID);
        assert!(ID_DESCRIPTION >= ID_FIRST_ASEBA_ID);
    }
}
