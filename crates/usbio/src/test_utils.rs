//! Test utilities for the usbio driver
//!
//! [`MockTransport`] is an in-memory stand-in for a USB bus with a scripted
//! USB-IO device on it. It records every call, counts live handles, and lets
//! tests inject failures at each step of the session lifecycle.
//!
//! # Example
//!
//! ```
//! use usbio::test_utils::MockTransport;
//! use usbio::{Session, SessionOptions};
//!
//! let transport = MockTransport::with_usbio();
//! transport.set_input(0x05);
//!
//! let mut session = Session::initialize(&transport, &SessionOptions::default()).unwrap();
//! assert_eq!(session.read().unwrap(), 0x05);
//! session.shutdown(true);
//! assert_eq!(transport.open_handles(), 0);
//! ```

use crate::transport::{DeviceIo, Transport};
use common::{DeviceIdentity, DeviceRef};
use protocol::{
    CMD_OFFSET_DATA, CMD_OFFSET_PORT, CMD_OFFSET_SEQUENCE, OPCODE_DIO, PACKET_SIZE, PORT_OUT,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A call made through the mock transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Devices,
    Open { bus: u8, address: u8 },
    Reset,
    Close,
    SetConfiguration(u8),
    ClaimInterface(u8),
    DetachKernelDriver(u8),
    WriteBulk { endpoint: u8, data: Vec<u8> },
    ReadBulk { endpoint: u8 },
}

/// What the device answers to one bulk read
#[derive(Debug, Clone, Default)]
pub enum MockRead {
    /// Answer the last command with the current input byte
    #[default]
    Echo,
    /// Answer the last command with this input byte
    EchoInput(u8),
    /// Answer with the sequence number preceding the last command's
    Stale,
    /// Return these bytes verbatim
    Raw(Vec<u8>),
    /// Fail the read
    Fail(rusb::Error),
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<DeviceRef>,
    calls: Vec<MockCall>,
    open_handles: usize,
    fail_enumeration: Option<rusb::Error>,
    fail_open: Option<rusb::Error>,
    configure_failures: usize,
    claim_failures: usize,
    fail_detach: Option<rusb::Error>,
    fail_reset: Option<rusb::Error>,
    fail_close: Option<rusb::Error>,
    write_results: VecDeque<rusb::Result<usize>>,
    reads: VecDeque<MockRead>,
    fallback_read: MockRead,
    input: u8,
    latched_output: u8,
    last_command: Option<[u8; PACKET_SIZE]>,
}

/// Scripted in-memory transport
///
/// Clones share the same bus.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// A USB-IO device at bus 1, address 4, configuration 1, interface 0
pub fn usbio_device() -> DeviceRef {
    mock_device(1, 4, 0x1352, 0x0121)
}

/// A device with the given location and identity
pub fn mock_device(bus_number: u8, address: u8, vendor_id: u16, product_id: u16) -> DeviceRef {
    DeviceRef {
        bus_number,
        address,
        identity: DeviceIdentity::new(vendor_id, product_id),
        config_value: 1,
        interface_number: 0,
    }
}

impl MockTransport {
    /// An empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus with one USB-IO device on it
    pub fn with_usbio() -> Self {
        let transport = Self::new();
        transport.add_device(usbio_device());
        transport
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    pub fn add_device(&self, device: DeviceRef) {
        self.state().devices.push(device);
    }

    pub fn fail_enumeration(&self, error: rusb::Error) {
        self.state().fail_enumeration = Some(error);
    }

    pub fn fail_open(&self, error: rusb::Error) {
        self.state().fail_open = Some(error);
    }

    /// Fail the next `times` configuration attempts with `Busy`
    pub fn fail_configure(&self, times: usize) {
        self.state().configure_failures = times;
    }

    /// Fail the next `times` interface claims with `Busy`
    pub fn fail_claim(&self, times: usize) {
        self.state().claim_failures = times;
    }

    pub fn fail_detach(&self, error: rusb::Error) {
        self.state().fail_detach = Some(error);
    }

    pub fn fail_reset(&self, error: rusb::Error) {
        self.state().fail_reset = Some(error);
    }

    pub fn fail_close(&self, error: rusb::Error) {
        self.state().fail_close = Some(error);
    }

    /// Queue the result of the next bulk write
    pub fn push_write_result(&self, result: rusb::Result<usize>) {
        self.state().write_results.push_back(result);
    }

    /// Queue the answer to the next bulk read
    pub fn push_read(&self, read: MockRead) {
        self.state().reads.push_back(read);
    }

    /// Answer used once the read queue is empty
    pub fn set_fallback_read(&self, read: MockRead) {
        self.state().fallback_read = read;
    }

    /// Input port byte reported by echoed responses
    pub fn set_input(&self, input: u8) {
        self.state().input = input;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Handles opened and not yet released
    pub fn open_handles(&self) -> usize {
        self.state().open_handles
    }

    /// Number of bulk reads issued
    pub fn read_attempts(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::ReadBulk { .. }))
            .count()
    }

    /// Bulk writes issued, in order
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::WriteBulk { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Last command packet the device accepted
    pub fn last_command(&self) -> Option<[u8; PACKET_SIZE]> {
        self.state().last_command
    }

    /// Output port byte the device is currently driving
    pub fn latched_output(&self) -> u8 {
        self.state().latched_output
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for MockTransport {
    type Handle = MockHandle;

    fn devices(&self) -> rusb::Result<Vec<DeviceRef>> {
        let mut state = self.state();
        state.calls.push(MockCall::Devices);
        match state.fail_enumeration {
            Some(e) => Err(e),
            None => Ok(state.devices.clone()),
        }
    }

    fn open(&self, device: &DeviceRef) -> rusb::Result<MockHandle> {
        let mut state = self.state();
        state.calls.push(MockCall::Open {
            bus: device.bus_number,
            address: device.address,
        });
        if let Some(e) = state.fail_open {
            return Err(e);
        }
        if !state.devices.contains(device) {
            return Err(rusb::Error::NoDevice);
        }
        state.open_handles += 1;
        Ok(MockHandle {
            state: Arc::clone(&self.state),
        })
    }
}

/// Handle to the mock device
#[derive(Debug)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut state = self.state();
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}

impl DeviceIo for MockHandle {
    fn reset(&mut self) -> rusb::Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::Reset);
        match state.fail_reset {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn close(self) -> rusb::Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::Close);
        match state.fail_close {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn set_configuration(&mut self, value: u8) -> rusb::Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::SetConfiguration(value));
        if state.configure_failures > 0 {
            state.configure_failures -= 1;
            return Err(rusb::Error::Busy);
        }
        Ok(())
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::ClaimInterface(interface));
        if state.claim_failures > 0 {
            state.claim_failures -= 1;
            return Err(rusb::Error::Busy);
        }
        Ok(())
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::DetachKernelDriver(interface));
        match state.fail_detach {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        let mut state = self.state();
        state.calls.push(MockCall::WriteBulk {
            endpoint,
            data: data.to_vec(),
        });

        let result = state.write_results.pop_front().unwrap_or(Ok(data.len()));
        if let Ok(written) = result {
            if written == PACKET_SIZE && data.len() == PACKET_SIZE {
                let mut command = [0u8; PACKET_SIZE];
                command.copy_from_slice(data);
                if command[CMD_OFFSET_PORT] == PORT_OUT {
                    state.latched_output = command[CMD_OFFSET_DATA];
                }
                state.last_command = Some(command);
            }
        }
        result
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let mut state = self.state();
        state.calls.push(MockCall::ReadBulk { endpoint });

        let read = match state.reads.pop_front() {
            Some(read) => read,
            None => state.fallback_read.clone(),
        };
        let sequence = state
            .last_command
            .map(|c| c[CMD_OFFSET_SEQUENCE])
            .ok_or(rusb::Error::Timeout);

        let reply = match read {
            MockRead::Echo => response(state.input, state.latched_output, sequence?),
            MockRead::EchoInput(input) => response(input, state.latched_output, sequence?),
            MockRead::Stale => {
                response(state.input, state.latched_output, sequence?.wrapping_sub(1))
            }
            MockRead::Raw(bytes) => bytes,
            MockRead::Fail(e) => return Err(e),
        };

        let len = reply.len().min(buf.len());
        buf[..len].copy_from_slice(&reply[..len]);
        Ok(len)
    }
}

fn response(input: u8, output: u8, sequence: u8) -> Vec<u8> {
    let mut buf = vec![0u8; PACKET_SIZE];
    buf[0] = OPCODE_DIO;
    buf[1] = output;
    buf[2] = input;
    buf[CMD_OFFSET_SEQUENCE] = sequence;
    buf
}
