//! Command and response packet layout
//!
//! Both directions use a fixed 64-byte packet on bulk endpoint 1:
//!
//! ```text
//! Command:  [0] opcode  [1] port  [2] data   [3..63] zero  [63] sequence
//! Response: [0] opcode  [1] port1 [2] input  [3..63] ...   [63] sequence
//! ```
//!
//! The port and data bytes of a command are only populated when a write is
//! requested; a pure read leaves them zero.

use crate::error::{ProtocolError, Result};
use crate::types::{InputPins, SequenceNumber};
use std::fmt::Write;

/// Size of every command and response packet
pub const PACKET_SIZE: usize = 64;

/// Digital input and output opcode
pub const OPCODE_DIO: u8 = 0x20;

/// Output port (J1[0:7])
pub const PORT_OUT: u8 = 1;

/// Input port (J2[0:3], pulled up)
pub const PORT_IN: u8 = 2;

/// Bulk endpoint number used in both directions
pub const ENDPOINT: u8 = 1;

/// Bulk OUT endpoint address
pub const ENDPOINT_OUT: u8 = ENDPOINT;

/// Bulk IN endpoint address
pub const ENDPOINT_IN: u8 = ENDPOINT | 0x80;

pub const CMD_OFFSET_OPCODE: usize = 0;
pub const CMD_OFFSET_PORT: usize = 1;
pub const CMD_OFFSET_DATA: usize = 2;
pub const CMD_OFFSET_SEQUENCE: usize = 63;

pub const RESPONSE_OFFSET_OPCODE: usize = 0;
/// Echo of port 1; not used by the host
pub const RESPONSE_OFFSET_PORT1: usize = 1;
pub const RESPONSE_OFFSET_INPUT: usize = 2;
pub const RESPONSE_OFFSET_SEQUENCE: usize = 63;

/// "Digital I/O" command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket {
    /// Sequence number the device will echo back
    pub sequence: SequenceNumber,
    /// Full output port byte to drive, or `None` for a pure read
    pub output: Option<u8>,
}

impl CommandPacket {
    pub fn new(sequence: SequenceNumber, output: Option<u8>) -> Self {
        Self { sequence, output }
    }

    /// Encode into the zero-filled wire representation
    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        buf[CMD_OFFSET_OPCODE] = OPCODE_DIO;
        buf[CMD_OFFSET_SEQUENCE] = self.sequence.0;
        if let Some(data) = self.output {
            buf[CMD_OFFSET_PORT] = PORT_OUT;
            buf[CMD_OFFSET_DATA] = data;
        }
        buf
    }
}

/// Response to a "Digital I/O" command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePacket {
    pub opcode: u8,
    pub port1: u8,
    /// Input port byte; bit `n` set means input pin `n` is open
    pub input: u8,
    pub sequence: SequenceNumber,
}

impl ResponsePacket {
    /// Decode a response packet
    ///
    /// Anything other than exactly [`PACKET_SIZE`] bytes is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PACKET_SIZE {
            return Err(ProtocolError::InvalidLength {
                expected: PACKET_SIZE,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            opcode: bytes[RESPONSE_OFFSET_OPCODE],
            port1: bytes[RESPONSE_OFFSET_PORT1],
            input: bytes[RESPONSE_OFFSET_INPUT],
            sequence: SequenceNumber(bytes[RESPONSE_OFFSET_SEQUENCE]),
        })
    }

    /// Whether this response answers the command with sequence number `sequence`
    pub fn answers(&self, sequence: SequenceNumber) -> bool {
        self.sequence == sequence
    }

    pub fn input_pins(&self) -> InputPins {
        InputPins(self.input)
    }
}

/// Format bytes as space-separated hex for packet tracing
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
