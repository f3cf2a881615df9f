//! Device locator
//!
//! Scans every enumerated device on every bus and picks the first one whose
//! vendor/product identity matches. The scan is single-shot; callers decide
//! whether to scan again.

use crate::error::{Result, UsbIoError};
use crate::transport::Transport;
use common::{DeviceIdentity, DeviceRef};
use tracing::{debug, info, warn};

/// Find the first attached device matching `identity`
pub fn locate<T: Transport>(transport: &T, identity: DeviceIdentity) -> Result<DeviceRef> {
    let devices = transport.devices().map_err(|e| {
        warn!("Device enumeration failed: {}", e);
        UsbIoError::EnumerationFailed(e)
    })?;

    debug!("Scanning {} devices for {}", devices.len(), identity);

    match devices.into_iter().find(|d| d.matches(identity)) {
        Some(device) => {
            info!(
                "Found {}: configuration {}, interface {}",
                device, device.config_value, device.interface_number
            );
            Ok(device)
        }
        None => {
            warn!("Can't find target device {}", identity);
            Err(UsbIoError::DeviceNotFound { identity })
        }
    }
}

/// All attached devices, marking those matching `identity`
pub fn list<T: Transport>(
    transport: &T,
    identity: DeviceIdentity,
) -> Result<Vec<(DeviceRef, bool)>> {
    let devices = transport
        .devices()
        .map_err(UsbIoError::EnumerationFailed)?;

    Ok(devices
        .into_iter()
        .map(|d| {
            let is_target = d.matches(identity);
            (d, is_target)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockCall, MockTransport, mock_device};

    #[test]
    fn test_locate_first_match() {
        let transport = MockTransport::new();
        transport.add_device(mock_device(1, 2, 0x046d, 0xc52b));
        transport.add_device(mock_device(2, 5, 0x1352, 0x0121));
        transport.add_device(mock_device(3, 1, 0x1352, 0x0121));

        let device = locate(&transport, DeviceIdentity::usbio()).unwrap();
        assert_eq!(device.bus_number, 2);
        assert_eq!(device.address, 5);
        assert_eq!(transport.calls(), vec![MockCall::Devices]);
    }

    #[test]
    fn test_locate_not_found() {
        let transport = MockTransport::new();
        transport.add_device(mock_device(1, 2, 0x1352, 0x0120));

        let err = locate(&transport, DeviceIdentity::usbio()).unwrap_err();
        assert!(matches!(err, UsbIoError::DeviceNotFound { .. }));
        // Single scan, no internal retry
        assert_eq!(transport.calls(), vec![MockCall::Devices]);
    }

    #[test]
    fn test_locate_empty_bus() {
        let transport = MockTransport::new();
        assert!(matches!(
            locate(&transport, DeviceIdentity::usbio()),
            Err(UsbIoError::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn test_enumeration_failure() {
        let transport = MockTransport::with_usbio();
        transport.fail_enumeration(rusb::Error::NoMem);

        let err = locate(&transport, DeviceIdentity::usbio()).unwrap_err();
        assert!(matches!(
            err,
            UsbIoError::EnumerationFailed(rusb::Error::NoMem)
        ));
    }

    #[test]
    fn test_list_marks_target() {
        let transport = MockTransport::new();
        transport.add_device(mock_device(1, 1, 0x1d6b, 0x0002));
        transport.add_device(mock_device(1, 7, 0x1352, 0x0121));

        let listed = list(&transport, DeviceIdentity::usbio()).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(!listed[0].1);
        assert!(listed[1].1);
    }
}
