//! Fleet setup across several panels.
//!
//! Opens are serialised and spaced out: panels sharing a hub misbehave when
//! claimed back to back. Static panels are configured before video panels.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::config::{FleetConfig, SessionConfig};
use crate::device::{DeviceIdentity, DisplayMode, DisplaySettings};
use crate::enumerator::{Enumerator, Selector, resolve_in};
use crate::error::{Error, Result};
use crate::events::{TracingObserver, TransportEvent, TransportObserver};
use crate::protocol::constants::FLEET_OPEN_DELAY_MS;
use crate::session::DeviceSession;
use crate::transfer::{PixelBuffer, PngBandEncoder, TransferPlan, TransferReport};
use crate::transport::UsbBackend;

/// Content to upload after the settings are saved.
#[derive(Debug, Clone)]
pub enum AssetData {
    /// PNG file contents. Banded when larger than one layer.
    EncodedImage(Vec<u8>),
    /// Raw pixels, PNG-encoded in bands.
    Pixels(PixelBuffer),
    /// Annex-B H.264 stream.
    Video(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Asset {
    /// Storage file name on the device.
    pub name: String,
    pub data: AssetData,
}

impl Asset {
    pub fn plan(&self) -> Result<TransferPlan> {
        match &self.data {
            AssetData::EncodedImage(bytes) => TransferPlan::png_file(bytes.clone(), &self.name),
            AssetData::Pixels(pixels) => {
                TransferPlan::image(pixels, &PngBandEncoder::default(), &self.name)
            }
            AssetData::Video(stream) => TransferPlan::video(stream.clone(), &self.name),
        }
    }
}

/// Desired state of one panel.
#[derive(Debug, Clone)]
pub struct DisplaySetup {
    pub selector: Selector,
    pub settings: DisplaySettings,
    pub asset: Option<Asset>,
}

/// Outcome for one requested panel.
#[derive(Debug)]
pub struct SetupResult {
    /// Position in the request list.
    pub position: usize,
    pub selector: Selector,
    /// Resolved serial, when resolution succeeded.
    pub serial: Option<String>,
    pub mode: DisplayMode,
    pub outcome: Result<Option<TransferReport>>,
}

impl SetupResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub struct Orchestrator<'a, B: UsbBackend> {
    backend: &'a B,
    session: SessionConfig,
    open_delay: Duration,
    observer: Arc<dyn TransportObserver>,
}

impl<'a, B: UsbBackend> Orchestrator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            session: SessionConfig::default(),
            open_delay: Duration::from_millis(FLEET_OPEN_DELAY_MS),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn from_config(backend: &'a B, config: &FleetConfig) -> Self {
        Self::new(backend)
            .with_session_config(config.session.clone())
            .with_open_delay(config.open_delay())
    }

    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransportObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Configure every requested panel. One result per request, in request
    /// order; a failing panel does not stop the others.
    #[instrument(level = "info", skip_all, fields(count = setups.len()))]
    pub fn apply(&self, setups: &[DisplaySetup]) -> Vec<SetupResult> {
        let devices = Enumerator::new(self.backend).list().map_err(|e| match e {
            Error::Enumeration(message) => message,
            other => other.to_string(),
        });

        let mut order: Vec<usize> = (0..setups.len()).collect();
        order.sort_by_key(|&i| !setups[i].settings.mode.is_static());

        let mut results = Vec::with_capacity(setups.len());
        for (n, &position) in order.iter().enumerate() {
            if n > 0 && !self.open_delay.is_zero() {
                thread::sleep(self.open_delay);
            }
            let setup = &setups[position];

            let resolved = match &devices {
                Ok(list) => resolve_in(list, &setup.selector).cloned(),
                Err(message) => Err(Error::Enumeration(message.clone())),
            };
            let serial = resolved.as_ref().ok().map(|d| d.serial.clone());
            let outcome = resolved.and_then(|identity| self.configure(&identity, setup));

            match &outcome {
                Ok(_) => info!(position, selector = %setup.selector, "Display configured"),
                Err(e) => warn!(position, selector = %setup.selector, error = %e, "Display setup failed"),
            }
            self.observer.on_event(&TransportEvent::SetupFinished {
                position,
                selector: setup.selector.to_string(),
                ok: outcome.is_ok(),
            });

            results.push(SetupResult {
                position,
                selector: setup.selector.clone(),
                serial,
                mode: setup.settings.mode,
                outcome,
            });
        }

        results.sort_by_key(|r| r.position);
        results
    }

    /// open -> handshake -> save settings -> optional upload -> close.
    fn configure(
        &self,
        identity: &DeviceIdentity,
        setup: &DisplaySetup,
    ) -> Result<Option<TransferReport>> {
        // Build the plan first so bad input never touches the device.
        let plan = setup.asset.as_ref().map(Asset::plan).transpose()?;

        let mut session = DeviceSession::open_with_observer(
            self.backend,
            identity,
            self.session.clone(),
            Arc::clone(&self.observer),
        )?;
        session.handshake()?;
        session.save_settings(&setup.settings)?;
        let report = match &plan {
            Some(plan) => Some(session.upload(plan)?),
            None => None,
        };
        session.close();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockBackend, MockDevice};

    fn setup(serial: &str, mode: DisplayMode) -> DisplaySetup {
        DisplaySetup {
            selector: Selector::Serial(serial.into()),
            settings: DisplaySettings::with_mode(mode),
            asset: None,
        }
    }

    fn quick(backend: &MockBackend) -> Orchestrator<'_, MockBackend> {
        Orchestrator::new(backend)
            .with_session_config(SessionConfig::immediate())
            .with_open_delay(Duration::ZERO)
    }

    #[test]
    fn test_unknown_selector_reported_in_place() {
        let backend = MockBackend::new(vec![MockDevice::new("A1")]);
        let results = quick(&backend).apply(&[
            setup("A1", DisplayMode::Stats),
            setup("ZZ", DisplayMode::Stats),
        ]);

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(results[0].serial.as_deref(), Some("A1"));
        assert!(matches!(results[1].outcome, Err(Error::NotFound { .. })));
        assert_eq!(results[1].serial, None);
    }

    #[test]
    fn test_scan_failure_fails_every_entry() {
        let backend = MockBackend::with_scan_error("no usb");
        let results = quick(&backend).apply(&[
            setup("A1", DisplayMode::Stats),
            setup("B2", DisplayMode::Video),
        ]);
        assert!(results.iter().all(|r| matches!(r.outcome, Err(Error::Enumeration(_)))));
    }

    #[test]
    fn test_invalid_asset_never_opens_device() {
        let device = MockDevice::new("A1");
        let backend = MockBackend::new(vec![device.clone()]);
        let mut request = setup("A1", DisplayMode::Video);
        request.asset = Some(Asset {
            name: "bad/name".into(),
            data: AssetData::Video(vec![0; 10]),
        });

        let results = quick(&backend).apply(&[request]);
        assert!(matches!(results[0].outcome, Err(Error::InvalidInput(_))));
        assert_eq!(device.open_attempts(), 0);
    }
}
