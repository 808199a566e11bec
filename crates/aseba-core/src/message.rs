//! Frame and message codec for the Aseba wire protocol.
//!
//! A [`Frame`] is a decoded header plus its raw payload bytes. [`Message`] is
//! the typed, fully-parsed form of an inbound frame's payload; [`Outbound`]
//! builds the frames the host sends to a node. Payload parsing walks a
//! little-endian byte cursor exactly as the reference implementation does —
//! fixed fields first, then a length-prefixed string, then (for a few
//! messages) a trailing run of words.

use crate::wire::{self, FrameHeader, WireError};
use zerocopy::{AsBytes, FromBytes};

// ── Frame ─────────────────────────────────────────────────────────────────────

/// A decoded frame: header fields plus the payload bytes that followed it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub source_node: u16,
    pub id: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(source_node: u16, id: u16, payload: Vec<u8>) -> Self {
        Frame {
            source_node,
            id,
            payload,
        }
    }

    /// Encode this frame's header and payload into a byte buffer ready to write.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.payload.len() > wire::MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(self.payload.len()));
        }
        let header = FrameHeader {
            payload_len: self.payload.len() as u16,
            source_node: self.source_node,
            id: self.id,
        };
        let mut out = Vec::with_capacity(wire::HEADER_SIZE + self.payload.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Try to decode one frame from the front of `buf`, returning the frame
    /// and the number of bytes consumed. Returns `Ok(None)` if `buf` does not
    /// yet hold a complete frame (the caller should read more and retry).
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, WireError> {
        if buf.len() < wire::HEADER_SIZE {
            return Ok(None);
        }
        let header = FrameHeader::read_from_prefix(buf).expect("checked length above");
        let payload_len = header.payload_len as usize;
        let total = wire::HEADER_SIZE + payload_len;
        if buf.len() < total {
            return Ok(None);
        }
        let payload = buf[wire::HEADER_SIZE..total].to_vec();
        let frame = Frame {
            source_node: header.source_node,
            id: header.id,
            payload,
        };
        Ok(Some((frame, total)))
    }
}

// ── Payload cursor ────────────────────────────────────────────────────────────

/// A little-endian read cursor over a message payload.
pub struct PayloadReader<'a> {
    payload: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        PayloadReader { payload, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }

    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        let byte = *self
            .payload
            .get(self.offset)
            .ok_or(WireError::UnexpectedEnd("u8"))?;
        self.offset += 1;
        Ok(byte)
    }

    pub fn get_u16(&mut self) -> Result<u16, WireError> {
        let lo = self.get_u8()? as u16;
        let hi = self.get_u8()? as u16;
        Ok(lo | (hi << 8))
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self.offset + n;
        let slice = self
            .payload
            .get(self.offset..end)
            .ok_or(WireError::UnexpectedEnd("byte string"))?;
        self.offset = end;
        Ok(slice)
    }

    /// A length-prefixed (one byte) UTF-8 string, as used for names and
    /// descriptions throughout the protocol.
    pub fn get_string(&mut self) -> Result<String, WireError> {
        let start = self.offset;
        let len = self.get_u8()? as usize;
        let bytes = self.get_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8(start))
    }

    /// Consume the remaining payload as an array of little-endian words.
    pub fn remaining_as_u16_words(&mut self) -> Result<Vec<u16>, WireError> {
        let mut words = Vec::with_capacity(self.remaining() / 2);
        while self.remaining() >= 2 {
            words.push(self.get_u16()?);
        }
        Ok(words)
    }
}

/// A little-endian payload builder, mirroring [`PayloadReader`].
#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        PayloadWriter::default()
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u16_words(&mut self, words: &[u16]) -> &mut Self {
        for word in words {
            self.put_u16(*word);
        }
        self
    }

    pub fn put_string(&mut self, s: &str) -> &mut Self {
        self.put_u8(s.len() as u8);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ── Decoded inbound messages ──────────────────────────────────────────────────

/// A native function's declared parameter: name plus size (words per call, or
/// `0xffff` for a variable-length argument).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFunctionParam {
    pub name: String,
    pub size: u16,
}

/// One piece of device info, as carried by `DEVICE_INFO` (v6+ nodes only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceInfo {
    Name(String),
    Uuid(Vec<u8>),
    Thymio2RfSettings {
        network_id: u16,
        node_id: u16,
        channel: u16,
    },
    Other { kind: u8, data: Vec<u8> },
}

/// A fully-parsed inbound message, keyed on the frame's message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Description {
        node_name: String,
        protocol_version: u16,
        bytecode_size: u16,
        stack_size: u16,
        max_var_size: u16,
        num_named_var: u16,
        num_local_events: u16,
        num_native_fun: u16,
    },
    NamedVariableDescription {
        size: u16,
        name: String,
    },
    LocalEventDescription {
        name: String,
        description: String,
    },
    NativeFunctionDescription {
        name: String,
        description: String,
        params: Vec<NativeFunctionParam>,
    },
    /// Decoded from either `VARIABLES` (a reply to `GET_VARIABLES`) or
    /// `CHANGED_VARIABLES` (unsolicited, sent when the node's own watch list
    /// changes) — both share this layout and neither needs to be told apart
    /// downstream.
    Variables {
        var_offset: u16,
        var_data: Vec<u16>,
    },
    ExecutionStateChanged {
        pc: u16,
        event_active: bool,
        step_by_step: bool,
        event_running: bool,
    },
    NodePresent {
        version: u16,
    },
    DeviceInfo(DeviceInfo),
    /// A message id below `ID_FIRST_ASEBA_ID`: a user event with a word-array argument.
    UserEvent {
        id: u16,
        arg: Vec<u16>,
    },
    /// A recognized protocol message this driver has no typed decode for
    /// (e.g. an outbound-only id echoed back, or a newer-protocol id).
    Other {
        id: u16,
        payload: Vec<u8>,
    },
}

impl Message {
    /// Parse a frame's payload according to its message id.
    pub fn decode(frame: &Frame) -> Result<Message, WireError> {
        let mut r = PayloadReader::new(&frame.payload);
        match frame.id {
            wire::ID_DESCRIPTION => Ok(Message::Description {
                node_name: r.get_string()?,
                protocol_version: r.get_u16()?,
                bytecode_size: r.get_u16()?,
                stack_size: r.get_u16()?,
                max_var_size: r.get_u16()?,
                num_named_var: r.get_u16()?,
                num_local_events: r.get_u16()?,
                num_native_fun: r.get_u16()?,
            }),
            wire::ID_NAMED_VARIABLE_DESCRIPTION => Ok(Message::NamedVariableDescription {
                size: r.get_u16()?,
                name: r.get_string()?,
            }),
            wire::ID_LOCAL_EVENT_DESCRIPTION => Ok(Message::LocalEventDescription {
                name: r.get_string()?,
                description: r.get_string()?,
            }),
            wire::ID_NATIVE_FUNCTION_DESCRIPTION => {
                let name = r.get_string()?;
                let description = r.get_string()?;
                let num_params = r.get_u16()?;
                let mut params = Vec::with_capacity(num_params as usize);
                for _ in 0..num_params {
                    let size = r.get_u16()?;
                    let name = r.get_string()?;
                    params.push(NativeFunctionParam { name, size });
                }
                Ok(Message::NativeFunctionDescription {
                    name,
                    description,
                    params,
                })
            }
            wire::ID_VARIABLES | wire::ID_CHANGED_VARIABLES => {
                let var_offset = r.get_u16()?;
                let var_data = r.remaining_as_u16_words()?;
                Ok(Message::Variables {
                    var_offset,
                    var_data,
                })
            }
            wire::ID_EXECUTION_STATE_CHANGED => {
                let pc = r.get_u16()?;
                let flags = r.get_u16()?;
                Ok(Message::ExecutionStateChanged {
                    pc,
                    event_active: flags & 1 != 0,
                    step_by_step: flags & 2 != 0,
                    event_running: flags & 4 != 0,
                })
            }
            wire::ID_NODE_PRESENT => Ok(Message::NodePresent {
                version: r.get_u16()?,
            }),
            wire::ID_DEVICE_INFO => {
                let kind = r.get_u8()?;
                let info = match kind {
                    wire::DEVICE_INFO_NAME => DeviceInfo::Name(r.get_string()?),
                    wire::DEVICE_INFO_UUID => {
                        let len = r.get_u8()? as usize;
                        DeviceInfo::Uuid(r.get_bytes(len)?.to_vec())
                    }
                    wire::DEVICE_INFO_THYMIO2_RF_SETTINGS => {
                        let len = r.get_u8()? as usize;
                        let data = r.get_bytes(len)?;
                        if len == 6 {
                            let mut dr = PayloadReader::new(data);
                            DeviceInfo::Thymio2RfSettings {
                                network_id: dr.get_u16()?,
                                node_id: dr.get_u16()?,
                                channel: dr.get_u16()?,
                            }
                        } else {
                            DeviceInfo::Other {
                                kind,
                                data: data.to_vec(),
                            }
                        }
                    }
                    other => {
                        let len = r.get_u8()? as usize;
                        DeviceInfo::Other {
                            kind: other,
                            data: r.get_bytes(len)?.to_vec(),
                        }
                    }
                };
                Ok(Message::DeviceInfo(info))
            }
            id if id < wire::ID_FIRST_ASEBA_ID => Ok(Message::UserEvent {
                id,
                arg: r.remaining_as_u16_words()?,
            }),
            id => Ok(Message::Other {
                id,
                payload: frame.payload.clone(),
            }),
        }
    }
}

// ── Outbound messages ─────────────────────────────────────────────────────────

/// A message the host can send to a node. `encode` turns it into a [`Frame`]
/// addressed from `host_node_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    ListNodes,
    GetNodeDescription { target_node_id: u16 },
    GetDescription,
    GetDeviceInfo { target_node_id: u16, kind: u8 },
    SetBytecode { target_node_id: u16, bc_offset: u16, bytecode: Vec<u16> },
    Reset { target_node_id: u16 },
    Run { target_node_id: u16 },
    Pause { target_node_id: u16 },
    Step { target_node_id: u16 },
    Stop { target_node_id: u16 },
    GetExecutionState { target_node_id: u16 },
    BreakpointSet { target_node_id: u16, pc: u16 },
    BreakpointClear { target_node_id: u16, pc: u16 },
    BreakpointClearAll { target_node_id: u16 },
    GetVariables { target_node_id: u16, var_offset: u16, var_count: u16 },
    SetVariables { target_node_id: u16, var_offset: u16, values: Vec<u16> },
}

impl Outbound {
    /// Build the wire frame for this message, sent on behalf of `host_node_id`.
    pub fn encode(&self, host_node_id: u16) -> Frame {
        let mut w = PayloadWriter::new();
        let id = match self {
            Outbound::ListNodes => {
                w.put_u16(wire::PROTOCOL_VERSION);
                wire::ID_LIST_NODES
            }
            Outbound::GetNodeDescription { target_node_id } => {
                w.put_u16(*target_node_id);
                w.put_u16(wire::PROTOCOL_VERSION);
                wire::ID_GET_NODE_DESCRIPTION
            }
            Outbound::GetDescription => wire::ID_GET_DESCRIPTION,
            Outbound::GetDeviceInfo { target_node_id, kind } => {
                w.put_u16(*target_node_id);
                w.put_u16(*kind as u16);
                wire::ID_GET_DEVICE_INFO
            }
            Outbound::SetBytecode { target_node_id, bc_offset, bytecode } => {
                w.put_u16(*target_node_id);
                w.put_u16(*bc_offset);
                w.put_u16_words(bytecode);
                wire::ID_SET_BYTECODE
            }
            Outbound::Reset { target_node_id } => {
                w.put_u16(*target_node_id);
                wire::ID_RESET
            }
            Outbound::Run { target_node_id } => {
                w.put_u16(*target_node_id);
                wire::ID_RUN
            }
            Outbound::Pause { target_node_id } => {
                w.put_u16(*target_node_id);
                wire::ID_PAUSE
            }
            Outbound::Step { target_node_id } => {
                w.put_u16(*target_node_id);
                wire::ID_STEP
            }
            Outbound::Stop { target_node_id } => {
                w.put_u16(*target_node_id);
                wire::ID_STOP
            }
            Outbound::GetExecutionState { target_node_id } => {
                w.put_u16(*target_node_id);
                wire::ID_GET_EXECUTION_STATE
            }
            Outbound::BreakpointSet { target_node_id, pc } => {
                w.put_u16(*target_node_id);
                w.put_u16(*pc);
                wire::ID_BREAKPOINT_SET
            }
            Outbound::BreakpointClear { target_node_id, pc } => {
                w.put_u16(*target_node_id);
                w.put_u16(*pc);
                wire::ID_BREAKPOINT_CLEAR
            }
            Outbound::BreakpointClearAll { target_node_id } => {
                w.put_u16(*target_node_id);
                wire::ID_BREAKPOINT_CLEAR_ALL
            }
            Outbound::GetVariables { target_node_id, var_offset, var_count } => {
                w.put_u16(*target_node_id);
                w.put_u16(*var_offset);
                w.put_u16(*var_count);
                wire::ID_GET_VARIABLES
            }
            Outbound::SetVariables { target_node_id, var_offset, values } => {
                w.put_u16(*target_node_id);
                w.put_u16(*var_offset);
                w.put_u16_words(values);
                wire::ID_SET_VARIABLES
            }
        };
        Frame::new(host_node_id, id, w.into_bytes())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
