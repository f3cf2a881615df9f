//! Common utilities for rust-usbio
//!
//! This crate provides functionality shared between the driver library and
//! the command line tool: USB device identity types, error handling and
//! logging setup.

pub mod error;
pub mod logging;
pub mod usb_types;

pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::{DeviceIdentity, DeviceRef, USBIO_PRODUCT_ID, USBIO_VENDOR_ID};
