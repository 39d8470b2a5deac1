//! Device identity and persistent display settings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::protocol::constants::MAX_BRIGHTNESS;

/// A physical panel as seen during enumeration. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// USB serial, or `bus<BBB>:<AAA>` when the device reports none.
    pub serial: String,
    /// Bus id plus port chain, e.g. `1-2.4`.
    pub bus_path: String,
    pub product: Option<String>,
    /// BCD-encoded firmware revision (`bcdDevice`).
    pub firmware: Option<u16>,
}

impl DeviceIdentity {
    /// Serial used when the descriptor has none. Numeric bus ids are
    /// zero padded to three digits, like the address.
    pub fn fallback_serial(bus: &str, address: u8) -> String {
        match bus.parse::<u32>() {
            Ok(number) => format!("bus{:03}:{:03}", number, address),
            Err(_) => format!("bus{}:{:03}", bus, address),
        }
    }

    /// Firmware revision as `major.minor`.
    pub fn firmware_display(&self) -> String {
        match self.firmware {
            Some(bcd) => format!("{}.{:02}", (bcd >> 8) & 0xFF, bcd & 0xFF),
            None => "Unknown".to_string(),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "serial={} (bus={}, {:04X}:{:04X})",
            self.serial, self.bus_path, self.vendor_id, self.product_id
        )
    }
}

/// What the panel shows at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Host-driven telemetry (image pushes).
    #[default]
    Stats,
    Image,
    Video,
}

impl DisplayMode {
    /// Startup byte of the save-settings payload.
    pub fn startup_code(self) -> u8 {
        match self {
            DisplayMode::Stats => 0,
            DisplayMode::Image => 1,
            DisplayMode::Video => 2,
        }
    }

    pub fn from_startup_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DisplayMode::Stats),
            1 => Some(DisplayMode::Image),
            2 => Some(DisplayMode::Video),
            _ => None,
        }
    }

    /// Static modes are configured before video ones during fleet setup.
    pub fn is_static(self) -> bool {
        !matches!(self, DisplayMode::Video)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Stats => write!(f, "stats"),
            DisplayMode::Image => write!(f, "image"),
            DisplayMode::Video => write!(f, "video"),
        }
    }
}

/// Backlight level, 0..=102.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Brightness(u8);

impl Brightness {
    pub const MAX: Brightness = Brightness(MAX_BRIGHTNESS);

    pub fn new(value: u8) -> Result<Self, Error> {
        if value > MAX_BRIGHTNESS {
            return Err(Error::InvalidInput(format!(
                "brightness {} out of range 0-{}",
                value, MAX_BRIGHTNESS
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Brightness {
    fn default() -> Self {
        Self::MAX
    }
}

impl TryFrom<u8> for Brightness {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Brightness> for u8 {
    fn from(value: Brightness) -> Self {
        value.0
    }
}

/// Panel rotation. Takes effect after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rotation {
    #[default]
    Normal,
    Flipped,
}

impl Rotation {
    pub fn code(self) -> u8 {
        match self {
            Rotation::Normal => 0,
            Rotation::Flipped => 2,
        }
    }
}

impl TryFrom<u8> for Rotation {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Rotation::Normal),
            2 => Ok(Rotation::Flipped),
            other => Err(Error::InvalidInput(format!(
                "rotation {} must be 0 (0°) or 2 (180°)",
                other
            ))),
        }
    }
}

impl From<Rotation> for u8 {
    fn from(value: Rotation) -> Self {
        value.code()
    }
}

/// Everything the save-settings command persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub mode: DisplayMode,
    pub brightness: Brightness,
    pub rotation: Rotation,
    pub sleep_timeout: u8,
    pub offline: bool,
}

impl DisplaySettings {
    pub fn with_mode(mode: DisplayMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness_range() {
        assert_eq!(Brightness::new(0).unwrap().value(), 0);
        assert_eq!(Brightness::new(102).unwrap().value(), 102);
        assert!(Brightness::new(103).is_err());
    }

    #[test]
    fn test_startup_codes() {
        for mode in [DisplayMode::Stats, DisplayMode::Image, DisplayMode::Video] {
            assert_eq!(DisplayMode::from_startup_code(mode.startup_code()), Some(mode));
        }
        assert_eq!(DisplayMode::from_startup_code(3), None);
        assert!(DisplayMode::Image.is_static());
        assert!(!DisplayMode::Video.is_static());
    }

    #[test]
    fn test_rotation_codes() {
        assert_eq!(Rotation::try_from(2).unwrap(), Rotation::Flipped);
        assert!(Rotation::try_from(1).is_err());
    }

    #[test]
    fn test_firmware_display() {
        let identity = DeviceIdentity {
            vendor_id: 0x1CBE,
            product_id: 0x0088,
            serial: "ABC".into(),
            bus_path: "1-2".into(),
            product: None,
            firmware: Some(0x0105),
        };
        assert_eq!(identity.firmware_display(), "1.05");
    }

    #[test]
    fn test_fallback_serial_padding() {
        assert_eq!(DeviceIdentity::fallback_serial("3", 7), "bus003:007");
        assert_eq!(DeviceIdentity::fallback_serial("12", 104), "bus012:104");
        assert_eq!(DeviceIdentity::fallback_serial("usb-a", 2), "bususb-a:002");
    }
}
