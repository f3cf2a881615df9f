//! Userspace driver for the USB-IO 2.0 (AKI) digital I/O board
//!
//! The board exposes eight output pins (port 1) and four pulled-up input
//! pins (port 2) through a single "digital I/O" command exchanged as 64-byte
//! packets over bulk endpoint 1.
//!
//! A [`Session`] owns the device from discovery to teardown:
//! - locate the device by vendor/product ID
//! - open, configure and claim it, detaching a kernel driver if needed
//! - exchange sequenced command/response packets with bounded retry
//! - reset or close the device on shutdown
//!
//! All operations are synchronous and block the calling thread. A session is
//! not internally locked; share it between threads only behind a mutex.
//!
//! # Example
//!
//! ```no_run
//! fn main() -> usbio::Result<()> {
//!     let mut session = usbio::initialize(false)?;
//!
//!     // Turn on output pin 0, leave the others alone
//!     session.write(0x01, 0x01)?;
//!
//!     let input = session.read()?;
//!     println!("input pins: {:08b}", input);
//!
//!     usbio::shutdown(session, true);
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod locator;
pub mod session;
pub mod test_utils;
pub mod transport;

pub use common::{DeviceIdentity, DeviceRef};
pub use engine::{ExchangeSettings, ProtocolEngine};
pub use error::{ReadFailure, Result, TransferFailure, UsbIoError};
pub use locator::{list, locate};
pub use protocol::{InputPins, OutputState, SequenceNumber};
pub use session::{Session, SessionOptions, SessionState};
pub use transport::{DeviceIo, RusbHandle, RusbTransport, Transport};

/// Open the USB-IO device on the local bus
///
/// With `reset_first` the device is reset and located again before it is
/// opened.
pub fn initialize(reset_first: bool) -> Result<Session<RusbHandle>> {
    let options = SessionOptions {
        reset_first,
        ..Default::default()
    };
    initialize_with_options(&options)
}

/// Open the device described by `options` on the local bus
pub fn initialize_with_options(options: &SessionOptions) -> Result<Session<RusbHandle>> {
    let transport = RusbTransport::with_target(options.identity).map_err(|e| {
        UsbIoError::InitializationFailed(Box::new(UsbIoError::EnumerationFailed(e)))
    })?;
    Session::initialize(&transport, options)
}

/// Release the device; see [`Session::shutdown`]
pub fn shutdown<H: DeviceIo>(session: Session<H>, reset_on_close: bool) {
    session.shutdown(reset_on_close);
}

/// Read the input port
pub fn read<H: DeviceIo>(session: &mut Session<H>) -> Result<u8> {
    session.read()
}

/// Drive the output pins selected by `mask` to the values in `data`
pub fn write<H: DeviceIo>(session: &mut Session<H>, data: u8, mask: u8) -> Result<()> {
    session.write(data, mask)
}

/// Write the masked output pins and read the input port in one exchange
pub fn read_and_write<H: DeviceIo>(session: &mut Session<H>, data: u8, mask: u8) -> Result<u8> {
    session.read_write(data, mask)
}
