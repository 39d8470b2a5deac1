//! Device discovery and selector resolution.
//!
//! Indices are a transient view over a fresh, serial-sorted scan. Nothing is
//! cached between calls; callers that need stability across runs should key
//! by serial.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, instrument};

use crate::device::DeviceIdentity;
use crate::error::{Error, Result};
use crate::transport::UsbBackend;

/// How a user names a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    /// No selector given: the first device in sorted order.
    #[default]
    First,
    Index(usize),
    /// Exact serial, or a unique serial prefix.
    Serial(String),
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidInput("empty device selector".into()));
        }
        if s.bytes().all(|b| b.is_ascii_digit())
            && let Ok(index) = s.parse::<usize>()
        {
            return Ok(Selector::Index(index));
        }
        Ok(Selector::Serial(s.to_string()))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::First => write!(f, "<first>"),
            Selector::Index(i) => write!(f, "{}", i),
            Selector::Serial(s) => write!(f, "{}", s),
        }
    }
}

/// Sort identities into index order: serial ascending, bus path as tiebreak.
pub fn sort_identities(devices: &mut [DeviceIdentity]) {
    devices.sort_by(|a, b| a.serial.cmp(&b.serial).then_with(|| a.bus_path.cmp(&b.bus_path)));
}

/// Resolve `selector` against an already sorted list.
pub fn resolve_in<'a>(devices: &'a [DeviceIdentity], selector: &Selector) -> Result<&'a DeviceIdentity> {
    let not_found = |detail: String| Error::NotFound {
        selector: selector.to_string(),
        detail,
    };

    if devices.is_empty() {
        return Err(not_found(" (no devices attached)".into()));
    }

    match selector {
        Selector::First => Ok(&devices[0]),
        Selector::Index(index) => devices
            .get(*index)
            .ok_or_else(|| not_found(format!(" (index out of range 0-{})", devices.len() - 1))),
        Selector::Serial(wanted) => {
            if let Some(exact) = devices.iter().find(|d| d.serial == *wanted) {
                return Ok(exact);
            }
            let matches: Vec<&DeviceIdentity> = devices
                .iter()
                .filter(|d| d.serial.starts_with(wanted.as_str()))
                .collect();
            match matches.as_slice() {
                [] => Err(not_found(String::new())),
                [only] => Ok(*only),
                many => Err(Error::Ambiguous {
                    selector: wanted.clone(),
                    candidates: many.iter().map(|d| d.serial.clone()).collect(),
                }),
            }
        }
    }
}

/// Enumerates panels through a backend.
pub struct Enumerator<'a, B: UsbBackend> {
    backend: &'a B,
}

impl<'a, B: UsbBackend> Enumerator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// All attached panels, sorted by serial. Position is the device index.
    #[instrument(level = "debug", skip(self))]
    pub fn list(&self) -> Result<Vec<DeviceIdentity>> {
        let mut devices = self
            .backend
            .scan()
            .map_err(|e| Error::Enumeration(e.to_string()))?;
        sort_identities(&mut devices);
        debug!(count = devices.len(), "Enumerated devices");
        Ok(devices)
    }

    /// Scan and resolve one selector.
    pub fn resolve(&self, selector: &Selector) -> Result<DeviceIdentity> {
        let devices = self.list()?;
        resolve_in(&devices, selector).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(serial: &str) -> DeviceIdentity {
        DeviceIdentity {
            vendor_id: 0x1CBE,
            product_id: 0x0088,
            serial: serial.to_string(),
            bus_path: format!("1-{}", serial),
            product: None,
            firmware: None,
        }
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!("2".parse::<Selector>().unwrap(), Selector::Index(2));
        assert_eq!(
            "A1B2".parse::<Selector>().unwrap(),
            Selector::Serial("A1B2".into())
        );
        assert_eq!("-1".parse::<Selector>().unwrap(), Selector::Serial("-1".into()));
        assert!("  ".parse::<Selector>().is_err());
    }

    #[test]
    fn test_sort_is_by_serial() {
        let mut devices = vec![identity("b2"), identity("a1"), identity("c3")];
        sort_identities(&mut devices);
        let serials: Vec<_> = devices.iter().map(|d| d.serial.as_str()).collect();
        assert_eq!(serials, ["a1", "b2", "c3"]);
    }

    #[test]
    fn test_exact_match_beats_prefix() {
        let devices = vec![identity("a1"), identity("a10")];
        let found = resolve_in(&devices, &Selector::Serial("a1".into())).unwrap();
        assert_eq!(found.serial, "a1");
    }

    #[test]
    fn test_ambiguous_prefix() {
        let devices = vec![identity("a1"), identity("a10")];
        match resolve_in(&devices, &Selector::Serial("a".into())) {
            Err(Error::Ambiguous { candidates, .. }) => assert_eq!(candidates, ["a1", "a10"]),
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_unique_prefix_and_misses() {
        let devices = vec![identity("a1"), identity("b2")];
        assert_eq!(
            resolve_in(&devices, &Selector::Serial("b".into())).unwrap().serial,
            "b2"
        );
        assert!(matches!(
            resolve_in(&devices, &Selector::Serial("z9".into())),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            resolve_in(&devices, &Selector::Index(2)),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(resolve_in(&[], &Selector::First), Err(Error::NotFound { .. })));
    }
}
