//! Driver error types
//!
//! Every variant carries the underlying transport error (its `Display` is
//! libusb's description of the failure) or a structured reason, so the cause
//! of a surfaced failure is never lost.

use common::DeviceIdentity;
use protocol::{ProtocolError, SequenceNumber};
use thiserror::Error;

/// Errors surfaced by the driver
#[derive(Debug, Error)]
pub enum UsbIoError {
    /// The bus scan itself failed
    #[error("USB enumeration failed: {0}")]
    EnumerationFailed(#[source] rusb::Error),

    /// No device with the target identity is present
    #[error("Can't find target device {identity}")]
    DeviceNotFound { identity: DeviceIdentity },

    /// The transport could not acquire a handle
    #[error("Failed to open device on bus {bus} address {address}: {source}")]
    OpenFailed {
        bus: u8,
        address: u8,
        #[source]
        source: rusb::Error,
    },

    /// Setting the configuration failed, including the retry after detach
    #[error("Failed to set configuration {value}: {source}")]
    ConfigureFailed {
        value: u8,
        #[source]
        source: rusb::Error,
    },

    /// Claiming the interface failed, including the retry after detach
    #[error("Failed to claim interface {interface}: {source}")]
    ClaimFailed {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    /// The command packet could not be sent
    #[error("Failed to send command {sequence}: {reason}")]
    TransferFailed {
        sequence: SequenceNumber,
        #[source]
        reason: TransferFailure,
    },

    /// No matching response arrived within the attempt budget
    #[error("No response to command {sequence} after {attempts} attempts: {last}")]
    ResponseTimeout {
        sequence: SequenceNumber,
        attempts: u32,
        #[source]
        last: ReadFailure,
    },

    /// A step of session startup failed; all acquired resources were released
    #[error("Initialization failed: {0}")]
    InitializationFailed(#[source] Box<UsbIoError>),

    /// The session no longer owns a device handle
    #[error("Session is closed")]
    SessionClosed,
}

impl UsbIoError {
    /// The error that started the failure
    ///
    /// Unwraps `InitializationFailed` so callers can match on the step that
    /// failed.
    pub fn root_cause(&self) -> &UsbIoError {
        match self {
            UsbIoError::InitializationFailed(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// The transport error behind this failure, if any
    pub fn usb_error(&self) -> Option<rusb::Error> {
        match self.root_cause() {
            UsbIoError::EnumerationFailed(e) => Some(*e),
            UsbIoError::OpenFailed { source, .. }
            | UsbIoError::ConfigureFailed { source, .. }
            | UsbIoError::ClaimFailed { source, .. } => Some(*source),
            UsbIoError::TransferFailed {
                reason: TransferFailure::Usb(e),
                ..
            } => Some(*e),
            UsbIoError::ResponseTimeout {
                last: ReadFailure::Usb(e),
                ..
            } => Some(*e),
            _ => None,
        }
    }
}

/// Why a command write failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferFailure {
    #[error("bulk write failed: {0}")]
    Usb(rusb::Error),

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

/// Why a single response read was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadFailure {
    #[error("bulk read failed: {0}")]
    Usb(rusb::Error),

    #[error("{0}")]
    Malformed(ProtocolError),

    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        expected: SequenceNumber,
        actual: SequenceNumber,
    },
}

/// Type alias for driver results
pub type Result<T> = std::result::Result<T, UsbIoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_initialization() {
        let err = UsbIoError::InitializationFailed(Box::new(UsbIoError::DeviceNotFound {
            identity: DeviceIdentity::usbio(),
        }));
        assert!(matches!(
            err.root_cause(),
            UsbIoError::DeviceNotFound { .. }
        ));
        assert!(err.to_string().contains("Can't find target device 1352:0121"));
    }

    #[test]
    fn test_usb_error_is_attached() {
        let err = UsbIoError::InitializationFailed(Box::new(UsbIoError::ClaimFailed {
            interface: 0,
            source: rusb::Error::Busy,
        }));
        assert_eq!(err.usb_error(), Some(rusb::Error::Busy));

        let err = UsbIoError::TransferFailed {
            sequence: SequenceNumber(1),
            reason: TransferFailure::ShortWrite {
                written: 10,
                expected: 64,
            },
        };
        assert_eq!(err.usb_error(), None);
        assert!(err.to_string().contains("short write: 10 of 64 bytes"));
    }

    #[test]
    fn test_response_timeout_display() {
        let err = UsbIoError::ResponseTimeout {
            sequence: SequenceNumber(3),
            attempts: 20,
            last: ReadFailure::SequenceMismatch {
                expected: SequenceNumber(3),
                actual: SequenceNumber(2),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("command #3"));
        assert!(msg.contains("20 attempts"));
        assert!(msg.contains("expected #3, got #2"));
    }
}
