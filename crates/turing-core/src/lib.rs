//! turing-core: USB transport for Turing-style smart display panels.
//!
//! The panels take fixed 512-byte DES-encrypted command frames over a bulk
//! interface. Images and video are uploaded into on-device storage in
//! chunks and played back by the panel itself.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: frame layout, cipher, command ids and payloads
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Enumerator**: discovery and selector resolution
//! - **Session**: one opened device, request/acknowledge primitive
//! - **Transfer**: chunked image and video uploads
//! - **Orchestrator**: multi-device setup
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use turing_core::{
//!     DeviceSession, DisplayMode, DisplaySettings, Enumerator, NusbBackend, Selector,
//!     SessionConfig, TransferPlan,
//! };
//!
//! # fn main() -> turing_core::Result<()> {
//! let backend = NusbBackend::new();
//! let identity = Enumerator::new(&backend).resolve(&Selector::First)?;
//!
//! let mut session = DeviceSession::open(&backend, &identity, SessionConfig::default())?;
//! session.handshake()?;
//! session.save_settings(&DisplaySettings::with_mode(DisplayMode::Video))?;
//!
//! let stream = std::fs::read("loop.h264").map_err(|e| turing_core::Error::InvalidInput(e.to_string()))?;
//! session.upload(&TransferPlan::video(stream, "loop.h264")?)?;
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod enumerator;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use config::{DisplayConfig, FleetConfig, SessionConfig};
pub use device::{Brightness, DeviceIdentity, DisplayMode, DisplaySettings, Rotation};
pub use enumerator::{Enumerator, Selector};
pub use error::{Error, Result};
pub use events::{NullObserver, TracingObserver, TransportEvent, TransportObserver};
pub use orchestrator::{Asset, AssetData, DisplaySetup, Orchestrator, SetupResult};
pub use protocol::{Command, CommandId, Frame, FrameError};
pub use retry::RetryPolicy;
pub use session::DeviceSession;
pub use transfer::{
    PixelBuffer, PixelFormat, PngBandEncoder, TransferKind, TransferPlan, TransferReport,
    TransferSession,
};
pub use transport::{
    MockBackend, MockDevice, MockTransport, NusbBackend, NusbTransport, TransportError,
    UsbBackend, UsbTransport,
};
