//! Session and fleet configuration, loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::device::{Brightness, DisplayMode, DisplaySettings, Rotation};
use crate::enumerator::Selector;
use crate::protocol::constants::{
    DEFAULT_READ_TIMEOUT_MS, FLEET_OPEN_DELAY_MS, FLUSH_READ_ATTEMPTS, FLUSH_READ_TIMEOUT_MS,
    SETTLE_DELAY_MS,
};
use crate::retry::RetryPolicy;

/// Timing knobs for one device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wait for an acknowledgement frame.
    pub read_timeout_ms: u64,
    /// Per-read wait while draining stale input.
    pub flush_timeout_ms: u64,
    pub flush_attempts: u32,
    /// Pause after the handshake sync.
    pub settle_delay_ms: u64,
    /// Busy-interface retry on open.
    pub open_retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            flush_timeout_ms: FLUSH_READ_TIMEOUT_MS,
            flush_attempts: FLUSH_READ_ATTEMPTS,
            settle_delay_ms: SETTLE_DELAY_MS,
            open_retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Zero delays everywhere. Handy for simulated devices.
    pub fn immediate() -> Self {
        Self {
            settle_delay_ms: 0,
            flush_timeout_ms: 0,
            open_retry: RetryPolicy::new(RetryPolicy::default().max_attempts, Duration::ZERO),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_toml(path.as_ref())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_toml(self, path.as_ref())
    }
}

/// Desired state of one panel in a fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Index or serial (prefix). Absent means the first device.
    pub device: Option<String>,
    pub mode: DisplayMode,
    pub brightness: Brightness,
    pub rotation: Rotation,
    pub sleep_timeout: u8,
    pub offline: bool,
    /// Encoded image (PNG) to upload.
    pub image: Option<PathBuf>,
    /// Annex-B H.264 stream to upload.
    pub video: Option<PathBuf>,
    /// Storage file name; defaults to the asset's file name.
    pub name: Option<String>,
}

impl DisplayConfig {
    pub fn selector(&self) -> crate::Result<Selector> {
        match &self.device {
            Some(s) => s.parse(),
            None => Ok(Selector::First),
        }
    }

    pub fn settings(&self) -> DisplaySettings {
        DisplaySettings {
            mode: self.mode,
            brightness: self.brightness,
            rotation: self.rotation,
            sleep_timeout: self.sleep_timeout,
            offline: self.offline,
        }
    }
}

/// Multi-panel setup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Pause between consecutive device opens.
    pub open_delay_ms: u64,
    pub session: SessionConfig,
    pub displays: Vec<DisplayConfig>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            open_delay_ms: FLEET_OPEN_DELAY_MS,
            session: SessionConfig::default(),
            displays: Vec::new(),
        }
    }
}

impl FleetConfig {
    pub fn open_delay(&self) -> Duration {
        Duration::from_millis(self.open_delay_ms)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_toml(path.as_ref())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_toml(self, path.as_ref())
    }
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

fn save_toml<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
