//! Transport adapter
//!
//! The driver only needs a handful of USB primitives: enumerate devices, open
//! one, manage its configuration and interface, and move bulk packets with a
//! timeout. [`Transport`] and [`DeviceIo`] describe that contract;
//! [`RusbTransport`] implements it on top of libusb via rusb.

use common::{DeviceIdentity, DeviceRef};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Device enumeration and handle acquisition
pub trait Transport {
    type Handle: DeviceIo;

    /// All devices currently attached, across all buses
    fn devices(&self) -> rusb::Result<Vec<DeviceRef>>;

    /// Acquire an exclusive handle to `device`
    fn open(&self, device: &DeviceRef) -> rusb::Result<Self::Handle>;
}

/// Operations on an opened device
///
/// Dropping a handle releases it.
pub trait DeviceIo {
    /// Issue a USB port reset
    fn reset(&mut self) -> rusb::Result<()>;

    /// Close the handle without resetting the device
    fn close(self) -> rusb::Result<()>
    where
        Self: Sized;

    fn set_configuration(&mut self, value: u8) -> rusb::Result<()>;

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()>;

    /// Release a kernel driver's hold on `interface`
    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()>;

    /// Bulk OUT transfer; returns the number of bytes written
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> rusb::Result<usize>;

    /// Bulk IN transfer into `buf`; returns the number of bytes read
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration)
    -> rusb::Result<usize>;
}

/// libusb-backed transport
///
/// Devices whose configuration cannot be read are skipped during
/// enumeration, except for the target device: its read error fails the
/// enumeration so the cause reaches the caller.
pub struct RusbTransport {
    context: Context,
    target: DeviceIdentity,
}

impl RusbTransport {
    /// Create a new libusb context targeting the USB-IO board
    pub fn new() -> rusb::Result<Self> {
        Self::with_target(DeviceIdentity::usbio())
    }

    /// Create a new libusb context targeting `target`
    pub fn with_target(target: DeviceIdentity) -> rusb::Result<Self> {
        let context = Context::new()?;
        Ok(Self { context, target })
    }

    fn find_device(&self, target: &DeviceRef) -> rusb::Result<Device<Context>> {
        self.context
            .devices()?
            .iter()
            .find(|d| d.bus_number() == target.bus_number && d.address() == target.address)
            .ok_or(rusb::Error::NoDevice)
    }
}

impl Transport for RusbTransport {
    type Handle = RusbHandle;

    fn devices(&self) -> rusb::Result<Vec<DeviceRef>> {
        let devices = self.context.devices()?;
        let mut found = Vec::with_capacity(devices.len());

        for device in devices.iter() {
            let (bus, address) = (device.bus_number(), device.address());

            let identity = match device.device_descriptor() {
                Ok(d) => DeviceIdentity::new(d.vendor_id(), d.product_id()),
                Err(e) => {
                    debug!(
                        "Skipping device on bus {:03} address {:03}: {}",
                        bus, address, e
                    );
                    continue;
                }
            };

            match first_configuration(&device) {
                Ok((config_value, interface_number)) => found.push(DeviceRef {
                    bus_number: bus,
                    address,
                    identity,
                    config_value,
                    interface_number,
                }),
                Err(e) => skip_unreadable(self.target, identity, e).inspect_err(|e| {
                    warn!(
                        "Can't read configuration of {} on bus {:03} address {:03}: {}",
                        identity, bus, address, e
                    )
                })?,
            }
        }

        found.sort_by_key(|d| (d.bus_number, d.address));
        debug!("Enumerated {} devices", found.len());
        Ok(found)
    }

    fn open(&self, target: &DeviceRef) -> rusb::Result<RusbHandle> {
        let device = self.find_device(target)?;
        let handle = device.open()?;
        debug!("Opened {}", target);
        Ok(RusbHandle { handle })
    }
}

/// bConfigurationValue of the first configuration and bInterfaceNumber of
/// its first interface
fn first_configuration(device: &Device<Context>) -> rusb::Result<(u8, u8)> {
    let config = device.config_descriptor(0)?;
    let interface_number = config
        .interfaces()
        .next()
        .and_then(|interface| interface.descriptors().next())
        .map(|alt| alt.interface_number())
        .unwrap_or(0);

    Ok((config.number(), interface_number))
}

/// Decide what to do with a device whose configuration can't be read
///
/// Other devices are skipped; the target's error is returned.
fn skip_unreadable(
    target: DeviceIdentity,
    identity: DeviceIdentity,
    error: rusb::Error,
) -> rusb::Result<()> {
    if identity == target {
        Err(error)
    } else {
        debug!("Skipping {}: {}", identity, error);
        Ok(())
    }
}

/// Opened libusb device handle
pub struct RusbHandle {
    handle: DeviceHandle<Context>,
}

impl DeviceIo for RusbHandle {
    fn reset(&mut self) -> rusb::Result<()> {
        self.handle.reset()
    }

    fn close(self) -> rusb::Result<()> {
        // libusb closes the handle when it is dropped
        drop(self.handle);
        Ok(())
    }

    fn set_configuration(&mut self, value: u8) -> rusb::Result<()> {
        self.handle.set_active_configuration(value)
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        self.handle.claim_interface(interface)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        self.handle.detach_kernel_driver(interface)
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> rusb::Result<usize> {
        trace!(
            "Bulk OUT: endpoint={:#x}, len={}, timeout={}ms",
            endpoint,
            data.len(),
            timeout.as_millis()
        );
        self.handle.write_bulk(endpoint, data, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        trace!(
            "Bulk IN: endpoint={:#x}, len={}, timeout={}ms",
            endpoint,
            buf.len(),
            timeout.as_millis()
        );
        self.handle.read_bulk(endpoint, buf, timeout)
    }
}
