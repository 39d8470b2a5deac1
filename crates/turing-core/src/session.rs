//! Device session: one opened panel and its request/response primitive.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::device::{Brightness, DeviceIdentity, DisplayMode, DisplaySettings};
use crate::error::{Error, Result};
use crate::events::{PacketDirection, TracingObserver, TransportEvent, TransportObserver};
use crate::protocol::constants::FRAME_LEN;
use crate::protocol::{self, Command, CommandId, Frame, Packet, Timestamp};
use crate::transfer::{TransferKind, TransferPlan, TransferReport, TransferSession};
use crate::transport::{TransportError, UsbBackend, UsbTransport};

/// One claimed panel.
///
/// Dropping the session releases the interface.
pub struct DeviceSession<T: UsbTransport> {
    transport: Option<T>,
    identity: DeviceIdentity,
    config: SessionConfig,
    /// Last mode the device acknowledged through save-settings.
    mode: Option<DisplayMode>,
    /// Kind of an upload that was started and not completed.
    pending: Option<TransferKind>,
    observer: Arc<dyn TransportObserver>,
}

impl<T: UsbTransport> DeviceSession<T> {
    /// Open `identity`, retrying while the interface is busy.
    pub fn open<B>(backend: &B, identity: &DeviceIdentity, config: SessionConfig) -> Result<Self>
    where
        B: UsbBackend<Transport = T>,
    {
        Self::open_with_observer(backend, identity, config, Arc::new(TracingObserver))
    }

    #[instrument(level = "info", skip_all, fields(serial = %identity.serial))]
    pub fn open_with_observer<B>(
        backend: &B,
        identity: &DeviceIdentity,
        config: SessionConfig,
        observer: Arc<dyn TransportObserver>,
    ) -> Result<Self>
    where
        B: UsbBackend<Transport = T>,
    {
        let mut attempts = 0;
        let transport = config
            .open_retry
            .run(
                |attempt| {
                    attempts = attempt;
                    let result = backend.open(identity);
                    if let Err(e) = &result
                        && e.is_busy()
                    {
                        warn!(attempt, "Interface busy");
                    }
                    result
                },
                TransportError::is_busy,
            )
            .map_err(|failure| {
                if failure.error.is_busy() {
                    Error::DeviceBusy {
                        serial: identity.serial.clone(),
                        attempts: failure.attempts,
                    }
                } else {
                    failure.error.into()
                }
            })?;

        observer.on_event(&TransportEvent::DeviceOpened {
            serial: identity.serial.clone(),
            attempts,
        });

        Ok(Self {
            transport: Some(transport),
            identity: identity.clone(),
            config,
            mode: None,
            pending: None,
            observer,
        })
    }

    /// Wrap an already opened transport.
    pub fn from_transport(transport: T, identity: DeviceIdentity, config: SessionConfig) -> Self {
        Self {
            transport: Some(transport),
            identity,
            config,
            mode: None,
            pending: None,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransportObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Last mode acknowledged by the device, if any was saved in this session.
    pub fn mode(&self) -> Option<DisplayMode> {
        self.mode
    }

    pub fn pending_transfer(&self) -> Option<TransferKind> {
        self.pending
    }

    pub(crate) fn set_pending(&mut self, kind: Option<TransferKind>) {
        self.pending = kind;
    }

    pub(crate) fn observer(&self) -> &dyn TransportObserver {
        self.observer.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn transport(&self) -> Result<&T> {
        self.transport.as_ref().ok_or(Error::SessionClosed)
    }

    /// Send exactly one frame.
    pub fn write(&self, frame: &Frame) -> Result<()> {
        self.write_frame(frame, None)
    }

    fn write_frame(&self, frame: &Frame, command: Option<CommandId>) -> Result<()> {
        let written = self.transport()?.write(frame.as_bytes())?;
        if written != FRAME_LEN {
            return Err(TransportError::WriteFailed(format!(
                "short write: {} of {} bytes",
                written, FRAME_LEN
            ))
            .into());
        }
        self.observer.on_event(&TransportEvent::Packet {
            direction: PacketDirection::Tx,
            command,
            length: written,
        });
        Ok(())
    }

    /// Block up to `timeout` for one response frame.
    ///
    /// A reply that fails decryption or the magic/trailer check is a
    /// `ProtocolFraming` error.
    pub fn read(&self, timeout: Duration) -> Result<Packet> {
        let data = self.transport()?.read(FRAME_LEN, timeout)?;
        if data.is_empty() {
            return Err(Error::NoAcknowledgement);
        }
        let decoded = protocol::decode(&data);
        self.observer.on_event(&TransportEvent::Packet {
            direction: PacketDirection::Rx,
            command: decoded.as_ref().ok().map(|p| p.command),
            length: data.len(),
        });
        match decoded {
            Ok(packet) => Ok(packet),
            Err(e) => {
                warn!(len = data.len(), error = %e, "Undecodable reply");
                Err(Error::ProtocolFraming(e))
            }
        }
    }

    /// Encode and write a command without waiting for a response.
    pub fn send(&self, command: &Command<'_>) -> Result<()> {
        let frame = command.encode(Timestamp::now())?;
        self.write_frame(&frame, Some(command.id()))
    }

    /// Wait for the acknowledgement of the last write, then drain stale input.
    pub fn read_ack(&self) -> Result<Packet> {
        let ack = self.read(self.config.read_timeout())?;
        self.flush_input();
        Ok(ack)
    }

    /// Send a command and wait for its acknowledgement.
    pub fn request(&self, command: &Command<'_>) -> Result<Packet> {
        debug!(command = %command.id(), "Request");
        self.send(command)?;
        self.read_ack()
    }

    /// Discard leftover responses with short reads. Stops at the first
    /// timeout or error.
    pub fn flush_input(&self) {
        let Ok(transport) = self.transport() else {
            return;
        };
        for _ in 0..self.config.flush_attempts {
            match transport.read(FRAME_LEN, self.config.flush_timeout()) {
                Ok(data) if !data.is_empty() => debug!(len = data.len(), "Flushed stale input"),
                _ => break,
            }
        }
    }

    #[instrument(level = "debug", skip(self), fields(serial = %self.identity.serial))]
    pub fn sync(&mut self) -> Result<()> {
        self.request(&Command::Sync)?;
        Ok(())
    }

    /// Sync, then give the device a moment before the real operation.
    pub fn handshake(&mut self) -> Result<()> {
        self.sync()?;
        thread::sleep(self.config.settle_delay());
        Ok(())
    }

    /// Reboot the panel. It drops off the bus, so the session is released
    /// once the restart is acknowledged.
    #[instrument(level = "info", skip(self), fields(serial = %self.identity.serial))]
    pub fn restart(&mut self) -> Result<()> {
        self.request(&Command::Restart)?;
        info!("Restart acknowledged, releasing device");
        self.release();
        Ok(())
    }

    #[instrument(level = "info", skip(self), fields(serial = %self.identity.serial))]
    pub fn set_brightness(&mut self, brightness: Brightness) -> Result<()> {
        self.request(&Command::SetBrightness(brightness))?;
        Ok(())
    }

    /// Persist settings. The mode is recorded only once the device acknowledged.
    #[instrument(level = "info", skip(self), fields(serial = %self.identity.serial, mode = %settings.mode))]
    pub fn save_settings(&mut self, settings: &DisplaySettings) -> Result<()> {
        self.request(&Command::SaveSettings(*settings))?;
        self.mode = Some(settings.mode);
        self.observer.on_event(&TransportEvent::SettingsSaved {
            serial: self.identity.serial.clone(),
            mode: settings.mode,
        });
        Ok(())
    }

    /// Run a whole upload.
    pub fn upload(&mut self, plan: &TransferPlan) -> Result<TransferReport> {
        TransferSession::begin(self, plan)?.run()
    }

    /// Release the interface.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(transport) = self.transport.take() {
            drop(transport);
            self.pending = None;
            self.observer.on_event(&TransportEvent::DeviceClosed {
                serial: self.identity.serial.clone(),
            });
        }
    }
}

impl<T: UsbTransport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        self.release();
    }
}
