//! Packet protocol for the USB-IO 2.0 digital I/O device
//!
//! This crate defines the fixed 64-byte command and response packets exchanged
//! with the device over bulk endpoint 1. It is pure encode/decode, no I/O.
//!
//! # Example
//!
//! ```
//! use protocol::{CommandPacket, ResponsePacket, SequenceNumber, OPCODE_DIO, PACKET_SIZE};
//!
//! // Write 0x01 to the output port with sequence number 7
//! let command = CommandPacket::new(SequenceNumber(7), Some(0x01));
//! let bytes = command.encode();
//! assert_eq!(bytes.len(), PACKET_SIZE);
//! assert_eq!(bytes[0], OPCODE_DIO);
//! assert_eq!(bytes[63], 7);
//!
//! // Decode what the device sends back
//! let mut reply = [0u8; PACKET_SIZE];
//! reply[0] = OPCODE_DIO;
//! reply[2] = 0x05;
//! reply[63] = 7;
//! let response = ResponsePacket::decode(&reply).unwrap();
//! assert_eq!(response.input, 0x05);
//! assert!(response.answers(SequenceNumber(7)));
//! ```

pub mod error;
pub mod packet;
pub mod types;

pub use error::{ProtocolError, Result};
pub use packet::{
    CMD_OFFSET_DATA, CMD_OFFSET_OPCODE, CMD_OFFSET_PORT, CMD_OFFSET_SEQUENCE, CommandPacket,
    ENDPOINT, ENDPOINT_IN, ENDPOINT_OUT, OPCODE_DIO, PACKET_SIZE, PORT_IN, PORT_OUT,
    RESPONSE_OFFSET_INPUT, RESPONSE_OFFSET_OPCODE, RESPONSE_OFFSET_PORT1,
    RESPONSE_OFFSET_SEQUENCE, ResponsePacket, hex_dump,
};
pub use types::{INPUT_PIN_COUNT, InputPins, OUTPUT_PIN_COUNT, OutputState, SequenceNumber};
