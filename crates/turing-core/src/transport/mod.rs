//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use self::mock::{MockBackend, MockDevice, MockTransport};
pub use self::nusb::{NusbBackend, NusbTransport};
pub use self::traits::{TransportError, UsbBackend, UsbTransport};
