//! Protocol engine
//!
//! Turns one digital I/O request into exactly one command packet and one
//! correlated response. Each command gets the next sequence number; a
//! response is accepted only when it is a full packet echoing that number.
//! Anything else (short read, stale sequence number, transport error) is
//! retried after a short delay until the attempt budget runs out.
//!
//! The engine also keeps the host-side mirror of the output port, since a
//! masked write has to resend the full port byte.

use crate::error::{ReadFailure, Result, TransferFailure, UsbIoError};
use crate::transport::DeviceIo;
use protocol::{
    CommandPacket, ENDPOINT_IN, ENDPOINT_OUT, OutputState, PACKET_SIZE, ResponsePacket,
    SequenceNumber, hex_dump,
};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Timeouts and retry budget for one exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSettings {
    /// Timeout for sending the command packet
    #[serde(default = "ExchangeSettings::default_write_timeout")]
    pub write_timeout_ms: u64,
    /// Timeout for each response read attempt
    #[serde(default = "ExchangeSettings::default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Total number of response read attempts
    #[serde(default = "ExchangeSettings::default_response_attempts")]
    pub response_attempts: u32,
    /// Delay between response read attempts
    #[serde(default = "ExchangeSettings::default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl ExchangeSettings {
    fn default_write_timeout() -> u64 {
        1000
    }

    fn default_read_timeout() -> u64 {
        100
    }

    fn default_response_attempts() -> u32 {
        20
    }

    fn default_retry_delay() -> u64 {
        1
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            write_timeout_ms: Self::default_write_timeout(),
            read_timeout_ms: Self::default_read_timeout(),
            response_attempts: Self::default_response_attempts(),
            retry_delay_ms: Self::default_retry_delay(),
        }
    }
}

/// Sequence counter and output port mirror for one device
#[derive(Debug, Clone)]
pub struct ProtocolEngine {
    settings: ExchangeSettings,
    sequence: SequenceNumber,
    output: OutputState,
}

impl ProtocolEngine {
    pub fn new(settings: ExchangeSettings) -> Self {
        Self {
            settings,
            sequence: SequenceNumber::default(),
            output: OutputState::default(),
        }
    }

    /// Sequence number of the most recently issued command
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Last output port state confirmed by the device
    pub fn output_state(&self) -> OutputState {
        self.output
    }

    /// Perform one read/write exchange
    ///
    /// Bits of `mask` select which output pins take their value from `data`;
    /// a zero mask is a pure read. The output mirror is only updated once the
    /// device has answered the command.
    pub fn exchange<H: DeviceIo>(
        &mut self,
        handle: &mut H,
        mask: u8,
        data: u8,
    ) -> Result<ResponsePacket> {
        self.sequence = self.sequence.next();
        let sequence = self.sequence;

        let next_output = self.output.merge(mask, data);
        let command = CommandPacket::new(sequence, (mask != 0).then_some(next_output.0));

        self.send(handle, &command)?;
        let response = self.receive(handle, sequence)?;

        if mask != 0 {
            debug!("Output port {} -> {}", self.output, next_output);
        }
        self.output = next_output;

        Ok(response)
    }

    fn send<H: DeviceIo>(&self, handle: &mut H, command: &CommandPacket) -> Result<()> {
        let bytes = command.encode();
        trace!("TX {}: {}", command.sequence, hex_dump(&bytes));

        match handle.write_bulk(ENDPOINT_OUT, &bytes, self.settings.write_timeout()) {
            Ok(written) if written == PACKET_SIZE => Ok(()),
            Ok(written) => {
                warn!(
                    "Short bulk write for command {}: {} of {} bytes",
                    command.sequence, written, PACKET_SIZE
                );
                Err(UsbIoError::TransferFailed {
                    sequence: command.sequence,
                    reason: TransferFailure::ShortWrite {
                        written,
                        expected: PACKET_SIZE,
                    },
                })
            }
            Err(e) => {
                warn!("Bulk write for command {} failed: {}", command.sequence, e);
                Err(UsbIoError::TransferFailed {
                    sequence: command.sequence,
                    reason: TransferFailure::Usb(e),
                })
            }
        }
    }

    fn receive<H: DeviceIo>(
        &self,
        handle: &mut H,
        sequence: SequenceNumber,
    ) -> Result<ResponsePacket> {
        let attempts = self.settings.response_attempts.max(1);
        let mut attempt = 1;

        loop {
            let mut buf = [0u8; PACKET_SIZE];
            let failure =
                match handle.read_bulk(ENDPOINT_IN, &mut buf, self.settings.read_timeout()) {
                    Ok(len) => match ResponsePacket::decode(&buf[..len]) {
                        Ok(response) if response.answers(sequence) => {
                            trace!("RX {}: {}", sequence, hex_dump(&buf));
                            return Ok(response);
                        }
                        Ok(response) => ReadFailure::SequenceMismatch {
                            expected: sequence,
                            actual: response.sequence,
                        },
                        Err(e) => ReadFailure::Malformed(e),
                    },
                    Err(e) => ReadFailure::Usb(e),
                };

            debug!(
                "Response attempt {}/{} for command {} rejected: {}",
                attempt, attempts, sequence, failure
            );

            if attempt >= attempts {
                warn!(
                    "No response to command {} after {} attempts",
                    sequence, attempts
                );
                return Err(UsbIoError::ResponseTimeout {
                    sequence,
                    attempts,
                    last: failure,
                });
            }

            attempt += 1;
            thread::sleep(self.settings.retry_delay());
        }
    }
}
