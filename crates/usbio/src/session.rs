//! Session manager
//!
//! A [`Session`] is one exclusive claim on one physical device. Startup runs
//! locate, an optional bus reset and re-locate, open, configure and claim:
//!
//! ```text
//! Located -> Opened -> Configured -> Claimed -> Closed
//! ```
//!
//! Configuration and interface claim are often refused while a generic
//! kernel HID driver owns the interface, so both get one transparent
//! recovery: detach the kernel driver, then try again once.
//!
//! Teardown releases the handle on every path, including when the session is
//! dropped without an explicit [`Session::shutdown`].

use crate::engine::{ExchangeSettings, ProtocolEngine};
use crate::error::{Result, UsbIoError};
use crate::locator::locate;
use crate::transport::{DeviceIo, Transport};
use common::{DeviceIdentity, DeviceRef};
use protocol::{OutputState, SequenceNumber};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Device found on the bus, no handle yet
    Located,
    /// Handle acquired
    Opened,
    /// Configuration applied
    Configured,
    /// Interface claimed; ready for I/O
    Claimed,
    /// Handle released
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Located => "located",
            SessionState::Opened => "opened",
            SessionState::Configured => "configured",
            SessionState::Claimed => "claimed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How to bring up a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Device model to look for
    #[serde(default)]
    pub identity: DeviceIdentity,
    /// Issue a bus reset and re-locate the device before opening it
    #[serde(default)]
    pub reset_first: bool,
    #[serde(default)]
    pub exchange: ExchangeSettings,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::usbio(),
            reset_first: false,
            exchange: ExchangeSettings::default(),
        }
    }
}

/// Acquire an exclusive handle to `device`
pub fn open<T: Transport>(transport: &T, device: &DeviceRef) -> Result<T::Handle> {
    transport.open(device).map_err(|e| {
        warn!("Failed to open {}: {}", device, e);
        UsbIoError::OpenFailed {
            bus: device.bus_number,
            address: device.address,
            source: e,
        }
    })
}

/// Apply configuration `value`, detaching a kernel driver from `interface`
/// and retrying once if the first attempt fails
pub fn configure<H: DeviceIo>(handle: &mut H, value: u8, interface: u8) -> Result<()> {
    with_detach_retry(handle, interface, "set_configuration", |h| {
        h.set_configuration(value)
    })
    .map_err(|e| UsbIoError::ConfigureFailed { value, source: e })
}

/// Claim `interface`, detaching a kernel driver and retrying once if the
/// first attempt fails
pub fn claim<H: DeviceIo>(handle: &mut H, interface: u8) -> Result<()> {
    with_detach_retry(handle, interface, "claim_interface", |h| {
        h.claim_interface(interface)
    })
    .map_err(|e| UsbIoError::ClaimFailed {
        interface,
        source: e,
    })
}

/// Run `op`; on failure detach the kernel driver from `interface` and run it
/// exactly once more. Only the second result decides the outcome.
fn with_detach_retry<H, F>(handle: &mut H, interface: u8, name: &str, mut op: F) -> rusb::Result<()>
where
    H: DeviceIo,
    F: FnMut(&mut H) -> rusb::Result<()>,
{
    let first = match op(handle) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    warn!(
        "{}() failed: {}, detaching kernel driver from interface {}",
        name, first, interface
    );

    if let Err(e) = handle.detach_kernel_driver(interface) {
        warn!(
            "detach_kernel_driver({}) failed: {}, retrying {}() anyway",
            interface, e, name
        );
    }

    op(handle).inspect_err(|e| warn!("{}() failed again: {}", name, e))
}

/// Open a temporary handle and reset the device
///
/// Failures are logged only; the caller re-locates the device afterwards
/// either way.
fn reset_device<T: Transport>(transport: &T, device: &DeviceRef) {
    match transport.open(device) {
        Ok(mut handle) => {
            if let Err(e) = handle.reset() {
                warn!("Failed to reset {}: {}", device, e);
            } else {
                info!("Reset {}", device);
            }
        }
        Err(e) => warn!("Failed to open {} for reset: {}", device, e),
    }
}

/// Exclusive claim on one device
pub struct Session<H: DeviceIo> {
    device: DeviceRef,
    handle: Option<H>,
    state: SessionState,
    engine: ProtocolEngine,
}

impl<H: DeviceIo> Session<H> {
    /// Locate, open, configure and claim the target device
    ///
    /// Any failure releases whatever was acquired and is reported as
    /// [`UsbIoError::InitializationFailed`] wrapping the failing step.
    pub fn initialize<T>(transport: &T, options: &SessionOptions) -> Result<Self>
    where
        T: Transport<Handle = H>,
    {
        let initialization_failed = |e| UsbIoError::InitializationFailed(Box::new(e));

        let mut device = locate(transport, options.identity).map_err(initialization_failed)?;

        if options.reset_first {
            reset_device(transport, &device);
            device = locate(transport, options.identity).map_err(initialization_failed)?;
        }

        let mut session = Session {
            device,
            handle: None,
            state: SessionState::Located,
            engine: ProtocolEngine::new(options.exchange.clone()),
        };

        if let Err(e) = session.bring_up(transport) {
            warn!("Initialization of {} failed: {}", session.device, e);
            session.teardown(true);
            return Err(initialization_failed(e));
        }

        info!("Session ready on {}", session.device);
        Ok(session)
    }

    fn bring_up<T>(&mut self, transport: &T) -> Result<()>
    where
        T: Transport<Handle = H>,
    {
        let handle = self.handle.insert(open(transport, &self.device)?);
        self.state = SessionState::Opened;
        debug!("{}: {}", self.device, self.state);

        configure(
            handle,
            self.device.config_value,
            self.device.interface_number,
        )?;
        self.state = SessionState::Configured;
        debug!("{}: {}", self.device, self.state);

        claim(handle, self.device.interface_number)?;
        self.state = SessionState::Claimed;
        debug!("{}: {}", self.device, self.state);

        Ok(())
    }

    /// Read the input port
    pub fn read(&mut self) -> Result<u8> {
        self.read_write(0x00, 0x00)
    }

    /// Drive the output pins selected by `mask` to the values in `data`
    pub fn write(&mut self, data: u8, mask: u8) -> Result<()> {
        self.read_write(data, mask).map(|_| ())
    }

    /// Write the masked output pins and read the input port in one exchange
    pub fn read_write(&mut self, data: u8, mask: u8) -> Result<u8> {
        let handle = self.handle.as_mut().ok_or(UsbIoError::SessionClosed)?;
        let response = self.engine.exchange(handle, mask, data)?;
        Ok(response.input)
    }

    /// Release the device
    ///
    /// With `reset_on_close` the device is reset, which keeps it responsive
    /// for the next session. Otherwise the handle is closed gracefully and
    /// the device stays unresponsive until it is reset or re-plugged.
    pub fn shutdown(mut self, reset_on_close: bool) {
        self.teardown(reset_on_close);
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Last output port state confirmed by the device
    pub fn output_status(&self) -> OutputState {
        self.engine.output_state()
    }

    /// Sequence number of the most recently issued command
    pub fn sequence_number(&self) -> SequenceNumber {
        self.engine.sequence()
    }

    fn teardown(&mut self, reset: bool) {
        let Some(mut handle) = self.handle.take() else {
            self.state = SessionState::Closed;
            return;
        };

        // Leaves the interface free for the next claim
        if let Err(e) = handle.detach_kernel_driver(self.device.interface_number) {
            debug!(
                "detach_kernel_driver({}) on teardown: {}",
                self.device.interface_number, e
            );
        }

        if reset {
            if let Err(e) = handle.reset() {
                warn!("Failed to reset {} on teardown: {}", self.device, e);
            }
            drop(handle);
        } else if let Err(e) = handle.close() {
            warn!("Failed to close {}: {}", self.device, e);
        }

        self.state = SessionState::Closed;
        info!("Released {}", self.device);
    }
}

impl<H: DeviceIo> Drop for Session<H> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!("Session on {} dropped without shutdown", self.device);
            self.teardown(true);
        }
    }
}

impl<H: DeviceIo> fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("state", &self.state)
            .field("output_status", &self.engine.output_state())
            .field("sequence_number", &self.engine.sequence())
            .finish()
    }
}
