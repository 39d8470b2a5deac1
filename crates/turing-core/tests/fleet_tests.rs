//! Multi-device setup and device session tests.
//!
//! Run with: `cargo test -p turing-core --test fleet_tests`

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use turing_core::protocol::ParsedCommand;
use turing_core::{
    Asset, AssetData, DeviceSession, DisplayMode, DisplaySettings, DisplaySetup, Enumerator,
    Error, MockBackend, MockDevice, Orchestrator, RetryPolicy, Selector, SessionConfig,
    TransportEvent, TransportObserver,
};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<TransportEvent>>,
}

impl TransportObserver for Recorder {
    fn on_event(&self, event: &TransportEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl Recorder {
    fn opened(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                TransportEvent::DeviceOpened { serial, .. } => Some(serial.clone()),
                _ => None,
            })
            .collect()
    }
}

fn display(serial: &str, mode: DisplayMode) -> DisplaySetup {
    DisplaySetup {
        selector: serial.parse().unwrap(),
        settings: DisplaySettings::with_mode(mode),
        asset: None,
    }
}

// ============================================================================
// Enumeration
// ============================================================================

#[test]
fn test_indices_follow_serial_order() {
    let backend = MockBackend::new(vec![
        MockDevice::new("b2"),
        MockDevice::new("a1"),
        MockDevice::new("c3"),
    ]);
    let enumerator = Enumerator::new(&backend);

    let serials: Vec<String> = enumerator.list().unwrap().into_iter().map(|d| d.serial).collect();
    assert_eq!(serials, ["a1", "b2", "c3"]);
    assert_eq!(enumerator.resolve(&Selector::Index(1)).unwrap().serial, "b2");
    assert_eq!(enumerator.resolve(&"c".parse().unwrap()).unwrap().serial, "c3");
}

#[test]
fn test_equal_serials_ordered_by_bus_path() {
    let backend = MockBackend::new(vec![
        MockDevice::new("A1").with_bus_path("2-1"),
        MockDevice::new("A1").with_bus_path("1-4"),
        MockDevice::new("A0").with_bus_path("3-1"),
    ]);
    let enumerator = Enumerator::new(&backend);

    let order: Vec<(String, String)> = enumerator
        .list()
        .unwrap()
        .into_iter()
        .map(|d| (d.serial, d.bus_path))
        .collect();
    assert_eq!(
        order,
        [
            ("A0".to_string(), "3-1".to_string()),
            ("A1".to_string(), "1-4".to_string()),
            ("A1".to_string(), "2-1".to_string()),
        ]
    );
    assert_eq!(enumerator.resolve(&Selector::Index(2)).unwrap().bus_path, "2-1");
}

#[test]
fn test_scan_error_is_enumeration_error() {
    let backend = MockBackend::with_scan_error("permission denied");
    assert!(matches!(
        Enumerator::new(&backend).list(),
        Err(Error::Enumeration(message)) if message.contains("permission denied")
    ));
}

// ============================================================================
// Opening
// ============================================================================

#[test]
fn test_busy_open_within_bound() {
    let device = MockDevice::new("A1");
    device.set_busy_opens(4);
    let backend = MockBackend::new(vec![device.clone()]);

    let config = SessionConfig {
        open_retry: RetryPolicy::new(5, Duration::ZERO),
        ..SessionConfig::immediate()
    };
    let session = DeviceSession::open(&backend, device.identity(), config).unwrap();
    assert_eq!(device.open_attempts(), 5);
    session.close();
    assert!(device.is_released());
}

#[test]
fn test_busy_open_beyond_bound() {
    let device = MockDevice::new("A1");
    device.set_busy_opens(3);
    let backend = MockBackend::new(vec![device.clone()]);

    let config = SessionConfig {
        open_retry: RetryPolicy::new(3, Duration::ZERO),
        ..SessionConfig::immediate()
    };
    assert!(matches!(
        DeviceSession::open(&backend, device.identity(), config),
        Err(Error::DeviceBusy { attempts: 3, .. })
    ));
}

// ============================================================================
// Fleet setup
// ============================================================================

#[test]
fn test_failing_device_does_not_stop_batch() {
    let a = MockDevice::new("A1");
    let b = MockDevice::new("B2");
    let c = MockDevice::new("C3");
    b.set_fail_open(true);
    let backend = MockBackend::new(vec![a.clone(), b.clone(), c.clone()]);

    let results = Orchestrator::new(&backend)
        .with_session_config(SessionConfig::immediate())
        .with_open_delay(Duration::ZERO)
        .apply(&[
            display("A1", DisplayMode::Stats),
            display("B2", DisplayMode::Stats),
            display("C3", DisplayMode::Image),
        ]);

    assert_eq!(results.len(), 3);
    let positions: Vec<usize> = results.iter().map(|r| r.position).collect();
    assert_eq!(positions, [0, 1, 2]);
    assert!(results[0].is_ok());
    assert!(matches!(results[1].outcome, Err(Error::Io(_))));
    assert!(results[2].is_ok());

    for device in [&a, &c] {
        let commands = device.commands();
        assert_eq!(commands[0], ParsedCommand::Sync);
        assert!(matches!(commands[1], ParsedCommand::SaveSettings(_)));
        assert!(device.is_released());
    }
}

#[test]
fn test_opens_are_spaced_by_delay() {
    let devices = ["A1", "B2", "C3"].map(MockDevice::new);
    let backend = MockBackend::new(devices.to_vec());
    let delay = Duration::from_millis(40);

    let started = Instant::now();
    let results = Orchestrator::new(&backend)
        .with_session_config(SessionConfig::immediate())
        .with_open_delay(delay)
        .apply(&[
            display("A1", DisplayMode::Stats),
            display("B2", DisplayMode::Stats),
            display("C3", DisplayMode::Stats),
        ]);

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(started.elapsed() >= delay * 2);
    for serial in ["A1", "B2", "C3"] {
        assert_eq!(backend.device(serial).unwrap().open_attempts(), 1);
    }
}

#[test]
fn test_static_devices_before_video() {
    let devices = ["V1", "S1", "V2", "S2"].map(MockDevice::new);
    let backend = MockBackend::new(devices.to_vec());
    let recorder = Arc::new(Recorder::default());

    let mut video = display("V1", DisplayMode::Video);
    video.asset = Some(Asset {
        name: "loop.h264".into(),
        data: AssetData::Video(vec![0; 1500]),
    });
    let mut image = display("S2", DisplayMode::Image);
    image.asset = Some(Asset {
        name: "logo.png".into(),
        data: AssetData::EncodedImage(vec![0x89; 700]),
    });

    let results = Orchestrator::new(&backend)
        .with_session_config(SessionConfig::immediate())
        .with_open_delay(Duration::ZERO)
        .with_observer(recorder.clone())
        .apply(&[
            video,
            display("S1", DisplayMode::Stats),
            display("V2", DisplayMode::Video),
            image,
        ]);

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(recorder.opened(), ["S1", "S2", "V1", "V2"]);

    let uploaded = results[0].outcome.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(uploaded.bytes, 1500);
    assert_eq!(results[3].outcome.as_ref().unwrap().as_ref().unwrap().chunks, 1);
    assert!(results[1].outcome.as_ref().unwrap().is_none());
}

#[test]
fn test_asset_kind_must_match_mode() {
    let device = MockDevice::new("S1");
    let backend = MockBackend::new(vec![device.clone()]);

    let mut request = display("S1", DisplayMode::Stats);
    request.asset = Some(Asset {
        name: "loop.h264".into(),
        data: AssetData::Video(vec![0; 10]),
    });

    let results = Orchestrator::new(&backend)
        .with_session_config(SessionConfig::immediate())
        .with_open_delay(Duration::ZERO)
        .apply(&[request]);

    assert!(matches!(results[0].outcome, Err(Error::ModeMismatch { .. })));
    assert!(
        device
            .commands()
            .iter()
            .all(|c| !matches!(c, ParsedCommand::VideoChunk(_)))
    );
}
