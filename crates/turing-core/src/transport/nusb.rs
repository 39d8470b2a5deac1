//! nusb-based USB transport implementation.

use nusb::transfer::{Bulk, In, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::{TransportError, UsbBackend, UsbTransport};
use crate::device::DeviceIdentity;
use crate::protocol::constants::{
    DEFAULT_READ_TIMEOUT_MS, FRAME_LEN, TURING_INTERFACE, TURING_PRODUCT_ID, TURING_VENDOR_ID,
};

/// nusb-based USB transport.
pub struct NusbTransport {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    vid: u16,
    pid: u16,
    write_timeout: Duration,
}

/// Discovers and opens panels through nusb.
#[derive(Debug, Clone, Copy, Default)]
pub struct NusbBackend;

impl NusbBackend {
    pub fn new() -> Self {
        Self
    }

    fn identity_of(info: &nusb::DeviceInfo) -> DeviceIdentity {
        let bus = info.bus_id().to_string();
        let serial = match info.serial_number() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => DeviceIdentity::fallback_serial(&bus, info.device_address()),
        };
        let ports: Vec<String> = info.port_chain().iter().map(|p| p.to_string()).collect();
        let bus_path = if ports.is_empty() {
            format!("{}:{:03}", bus, info.device_address())
        } else {
            format!("{}-{}", bus, ports.join("."))
        };

        DeviceIdentity {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            serial,
            bus_path,
            product: info.product_string().map(str::to_string),
            firmware: Some(info.device_version()),
        }
    }

    fn is_panel(info: &nusb::DeviceInfo) -> bool {
        info.vendor_id() == TURING_VENDOR_ID && info.product_id() == TURING_PRODUCT_ID
    }
}

impl UsbBackend for NusbBackend {
    type Transport = NusbTransport;

    #[instrument(level = "debug", skip(self))]
    fn scan(&self) -> Result<Vec<DeviceIdentity>, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let found: Vec<DeviceIdentity> = devices
            .filter(Self::is_panel)
            .map(|info| Self::identity_of(&info))
            .collect();

        debug!(count = found.len(), "Scan complete");
        Ok(found)
    }

    #[instrument(level = "info", skip(self), fields(serial = %identity.serial))]
    fn open(&self, identity: &DeviceIdentity) -> Result<NusbTransport, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .filter(Self::is_panel)
            .find(|info| {
                let candidate = Self::identity_of(info);
                candidate.bus_path == identity.bus_path && candidate.serial == identity.serial
            })
            .ok_or_else(|| TransportError::DeviceNotFound(identity.to_string()))?;

        NusbTransport::open_device_info(device_info)
    }
}

impl NusbTransport {
    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        // Claiming also detaches a bound kernel driver where the OS supports it.
        let interface = device
            .detach_and_claim_interface(TURING_INTERFACE)
            .wait()
            .map_err(|e| {
                if matches!(e.kind(), nusb::ErrorKind::Busy) {
                    TransportError::Busy {
                        interface: TURING_INTERFACE,
                        message: e.to_string(),
                    }
                } else {
                    TransportError::ClaimInterfaceFailed {
                        interface: TURING_INTERFACE,
                        message: e.to_string(),
                    }
                }
            })?;

        // Find BULK endpoints
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != TURING_INTERFACE {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                            if ep.direction() == nusb::transfer::Direction::In {
                                in_endpoint = ep.address();
                            } else {
                                out_endpoint = ep.address();
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "In".into(),
            });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "Out".into(),
            });
        }

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            interface,
            in_endpoint,
            out_endpoint,
            vid,
            pid,
            write_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        })
    }
}

fn map_io(err: std::io::Error, timeout: Duration, read: bool) -> TransportError {
    match err.kind() {
        ErrorKind::TimedOut => TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        ErrorKind::NotConnected | ErrorKind::BrokenPipe => TransportError::Disconnected,
        _ if read => TransportError::ReadFailed(err.to_string()),
        _ => TransportError::WriteFailed(err.to_string()),
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(level = "trace", skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        let mut writer = ep.writer(FRAME_LEN).with_write_timeout(self.write_timeout);
        writer
            .write_all(data)
            .map_err(|e| map_io(e, self.write_timeout, false))?;
        writer
            .flush()
            .map_err(|e| map_io(e, self.write_timeout, false))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    #[instrument(level = "trace", skip(self), fields(max_len))]
    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mut reader = ep.reader(FRAME_LEN).with_read_timeout(timeout);
        let mut buf = vec![0u8; max_len];

        let n = reader.read(&mut buf).map_err(|e| map_io(e, timeout, true))?;

        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
