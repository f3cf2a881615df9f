//! USB device identity types shared by the locator and the CLI

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vendor ID of the USB-IO 2.0 (AKI)
pub const USBIO_VENDOR_ID: u16 = 0x1352;

/// Product ID of the USB-IO 2.0 (AKI)
pub const USBIO_PRODUCT_ID: u16 = 0x0121;

/// Vendor/product pair identifying a device model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// The USB-IO 2.0 digital I/O board
    pub const fn usbio() -> Self {
        Self::new(USBIO_VENDOR_ID, USBIO_PRODUCT_ID)
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::usbio()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// A device seen during enumeration
///
/// Carries the bus location used to reopen the device and the parameters of
/// its first configuration, which are applied when the device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceRef {
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub address: u8,
    pub identity: DeviceIdentity,
    /// bConfigurationValue of the first configuration
    pub config_value: u8,
    /// bInterfaceNumber of the first interface of that configuration
    pub interface_number: u8,
}

impl DeviceRef {
    pub fn matches(&self, identity: DeviceIdentity) -> bool {
        self.identity == identity
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (bus {:03} device {:03})",
            self.identity, self.bus_number, self.address
        )
    }
}
