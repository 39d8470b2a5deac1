//! Mock USB transport for testing.
//!
//! [`MockDevice`] is a tiny panel simulator: it records every frame written,
//! answers acknowledged commands with an echo frame, and can be told to fail
//! writes, stay silent, or report a busy interface on open.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{TransportError, UsbBackend, UsbTransport};
use crate::device::DeviceIdentity;
use crate::protocol::constants::{TURING_PRODUCT_ID, TURING_VENDOR_ID};
use crate::protocol::{self, CommandId, Packet, ParsedCommand, Timestamp};

#[derive(Debug, Default)]
struct MockState {
    /// Captured writes.
    writes: Vec<Vec<u8>>,
    /// Explicitly queued responses, served before automatic ones.
    responses: VecDeque<Vec<u8>>,
    /// Automatic acknowledgements owed for acknowledged commands.
    owed_acks: VecDeque<CommandId>,
    /// Never answer, every read times out.
    silent: bool,
    /// Fail the write with this index (0-based, counted across the device's lifetime).
    fail_write_at: Option<usize>,
    write_attempts: usize,
    /// Remaining opens that report a busy interface.
    busy_opens: u32,
    open_attempts: u32,
    fail_open: bool,
    open_transports: u32,
    releases: u32,
}

/// Shared handle to one simulated panel.
#[derive(Debug, Clone)]
pub struct MockDevice {
    identity: DeviceIdentity,
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new(serial: &str) -> Self {
        Self {
            identity: DeviceIdentity {
                vendor_id: TURING_VENDOR_ID,
                product_id: TURING_PRODUCT_ID,
                serial: serial.to_string(),
                bus_path: format!("1-{}", serial.len()),
                product: Some("Turing".to_string()),
                firmware: Some(0x0100),
            },
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_bus_path(mut self, bus_path: &str) -> Self {
        self.identity.bus_path = bus_path.to_string();
        self
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Open a transport directly, bypassing busy simulation.
    pub fn transport(&self) -> MockTransport {
        self.state.lock().unwrap().open_transports += 1;
        MockTransport {
            vid: self.identity.vendor_id,
            pid: self.identity.product_id,
            state: Arc::clone(&self.state),
        }
    }

    /// Queue a raw response to be returned on a later read.
    pub fn queue_response(&self, bytes: &[u8]) {
        self.state.lock().unwrap().responses.push_back(bytes.to_vec());
    }

    pub fn set_silent(&self, silent: bool) {
        let mut state = self.state.lock().unwrap();
        state.silent = silent;
        state.owed_acks.clear();
    }

    pub fn fail_write_at(&self, index: usize) {
        self.state.lock().unwrap().fail_write_at = Some(index);
    }

    pub fn set_busy_opens(&self, count: u32) {
        self.state.lock().unwrap().busy_opens = count;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    pub fn open_attempts(&self) -> u32 {
        self.state.lock().unwrap().open_attempts
    }

    /// True when every transport handed out has been dropped.
    pub fn is_released(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.open_transports > 0 && state.open_transports == state.releases
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Captured writes decoded back into packets; undecodable writes are skipped.
    pub fn packets(&self) -> Vec<Packet> {
        self.get_writes()
            .iter()
            .filter_map(|w| protocol::decode(w).ok())
            .collect()
    }

    /// Captured writes parsed into typed commands.
    pub fn commands(&self) -> Vec<ParsedCommand> {
        self.packets()
            .iter()
            .filter_map(|p| ParsedCommand::parse(p).ok())
            .collect()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }
}

/// Whether the device answers this write, and with which command id.
fn ack_owed(bytes: &[u8]) -> Option<CommandId> {
    let packet = protocol::decode(bytes).ok()?;
    match ParsedCommand::parse(&packet).ok()? {
        ParsedCommand::ImageChunk(f) | ParsedCommand::VideoChunk(f) => {
            let h = f.header;
            let last_data = !h.is_leader() && h.offset as usize + f.data.len() == h.chunk_len as usize;
            (h.is_final() && last_data).then_some(packet.command)
        }
        _ => Some(packet.command),
    }
}

/// Mock transport bound to a [`MockDevice`].
pub struct MockTransport {
    vid: u16,
    pid: u16,
    state: Arc<Mutex<MockState>>,
}

impl UsbTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        let index = state.write_attempts;
        state.write_attempts += 1;
        if state.fail_write_at == Some(index) {
            return Err(TransportError::WriteFailed("injected failure".into()));
        }
        state.writes.push(data.to_vec());
        if !state.silent
            && let Some(command) = ack_owed(data)
        {
            state.owed_acks.push_back(command);
        }
        Ok(data.len())
    }

    fn read(&self, _max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock().unwrap();
        let timed_out = TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        };
        if state.silent {
            return Err(timed_out);
        }
        if let Some(bytes) = state.responses.pop_front() {
            return Ok(bytes);
        }
        let command = state.owed_acks.pop_front().ok_or(timed_out)?;
        let frame = protocol::encode(command, &[], Timestamp(0))
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        Ok(frame.as_bytes().to_vec())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.releases += 1;
        }
    }
}

/// Backend over a fixed set of simulated panels.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    devices: Vec<MockDevice>,
    scan_error: Option<String>,
}

impl MockBackend {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            scan_error: None,
        }
    }

    pub fn with_scan_error(message: &str) -> Self {
        Self {
            devices: Vec::new(),
            scan_error: Some(message.to_string()),
        }
    }

    pub fn device(&self, serial: &str) -> Option<&MockDevice> {
        self.devices.iter().find(|d| d.identity.serial == serial)
    }
}

impl UsbBackend for MockBackend {
    type Transport = MockTransport;

    fn scan(&self) -> Result<Vec<DeviceIdentity>, TransportError> {
        if let Some(message) = &self.scan_error {
            return Err(TransportError::OpenFailed(message.clone()));
        }
        Ok(self.devices.iter().map(|d| d.identity.clone()).collect())
    }

    fn open(&self, identity: &DeviceIdentity) -> Result<MockTransport, TransportError> {
        let device = self
            .devices
            .iter()
            .find(|d| d.identity == *identity)
            .ok_or_else(|| TransportError::DeviceNotFound(identity.to_string()))?;

        {
            let mut state = device.state.lock().unwrap();
            state.open_attempts += 1;
            if state.fail_open {
                return Err(TransportError::OpenFailed("injected open failure".into()));
            }
            if state.busy_opens > 0 {
                state.busy_opens -= 1;
                return Err(TransportError::Busy {
                    interface: 0,
                    message: "Resource busy".into(),
                });
            }
        }

        Ok(device.transport())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    fn frame(cmd: Command<'_>) -> Vec<u8> {
        cmd.encode(Timestamp(0)).unwrap().as_bytes().to_vec()
    }

    #[test]
    fn test_mock_acks_acknowledged_commands() {
        let device = MockDevice::new("A1");
        let transport = device.transport();

        transport.write(&frame(Command::Sync)).unwrap();
        let reply = transport.read(512, Duration::from_millis(10)).unwrap();
        assert_eq!(protocol::decode(&reply).unwrap().command, CommandId::Sync);

        // Queue is empty now
        assert!(matches!(
            transport.read(512, Duration::from_millis(10)),
            Err(TransportError::Timeout { timeout_ms: 10 })
        ));
    }

    #[test]
    fn test_mock_write_capture() {
        let device = MockDevice::new("A1");
        let transport = device.transport();
        transport.write(b"Hello").unwrap();
        transport.write(b"World").unwrap();

        let writes = device.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
        // Raw bytes are not frames, so nothing is owed.
        assert!(transport.read(512, Duration::ZERO).is_err());
    }

    #[test]
    fn test_mock_injected_write_failure() {
        let device = MockDevice::new("A1");
        device.fail_write_at(1);
        let transport = device.transport();
        assert!(transport.write(b"one").is_ok());
        assert!(transport.write(b"two").is_err());
        assert!(transport.write(b"three").is_ok());
        assert_eq!(device.get_writes().len(), 2);
    }

    #[test]
    fn test_mock_busy_then_open() {
        let device = MockDevice::new("A1");
        device.set_busy_opens(1);
        let backend = MockBackend::new(vec![device.clone()]);

        let err = backend.open(device.identity()).err().unwrap();
        assert!(err.is_busy());
        let transport = backend.open(device.identity()).unwrap();
        assert_eq!(device.open_attempts(), 2);

        assert!(!device.is_released());
        drop(transport);
        assert!(device.is_released());
    }
}
