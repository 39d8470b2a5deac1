//! USB Transport layer abstraction.
//!
//! `UsbTransport` moves raw bytes over one claimed interface; `UsbBackend`
//! discovers devices and opens transports. Both have nusb and mock
//! implementations.

use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceIdentity;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Interface {interface} busy: {message}")]
    Busy { interface: u8, message: String },

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Contention on the interface claim; worth retrying after a pause.
    pub fn is_busy(&self) -> bool {
        matches!(self, TransportError::Busy { .. })
    }
}

/// Byte-level access to one opened device.
///
/// Dropping the transport releases the interface.
pub trait UsbTransport: Send {
    /// Write raw bytes to the OUT endpoint.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `max_len` bytes from the IN endpoint, waiting at most `timeout`.
    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

/// Device discovery plus opening.
pub trait UsbBackend {
    type Transport: UsbTransport;

    /// All attached panels of this family, in no particular order.
    fn scan(&self) -> Result<Vec<DeviceIdentity>, TransportError>;

    /// Open and claim one device. A contended claim returns [`TransportError::Busy`].
    fn open(&self, identity: &DeviceIdentity) -> Result<Self::Transport, TransportError>;
}
