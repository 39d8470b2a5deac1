//! Event system for UI decoupling.
//!
//! Sessions, transfers and the fleet orchestrator report through a
//! [`TransportObserver`] so a CLI or dashboard can follow progress without
//! touching the protocol code.

use std::fmt;

use crate::device::DisplayMode;
use crate::protocol::CommandId;
use crate::transfer::TransferKind;

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Events emitted by sessions, transfers and the orchestrator.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Session opened on a device.
    DeviceOpened { serial: String, attempts: u32 },
    /// Session closed and interface released.
    DeviceClosed { serial: String },
    /// Frame sent/received. Responses that do not decode carry no command.
    Packet {
        direction: PacketDirection,
        command: Option<CommandId>,
        length: usize,
    },
    /// Settings persisted on the device.
    SettingsSaved { serial: String, mode: DisplayMode },
    /// A chunked upload started.
    TransferStarted {
        kind: TransferKind,
        destination: String,
        total_chunks: usize,
        total_bytes: usize,
    },
    /// One chunk fully written.
    ChunkSent {
        kind: TransferKind,
        chunk_index: u16,
        sent: usize,
        total: usize,
    },
    /// Upload finished and acknowledged.
    TransferComplete { kind: TransferKind, bytes: usize },
    /// Upload abandoned; the device may hold a partial asset.
    TransferAborted {
        kind: TransferKind,
        sent: usize,
        total: usize,
        reason: String,
    },
    /// Fleet setup of one device finished.
    SetupFinished {
        position: usize,
        selector: String,
        ok: bool,
    },
}

/// Observer trait for receiving transport events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait TransportObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &TransportEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl TransportObserver for NullObserver {
    fn on_event(&self, _event: &TransportEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl TransportObserver for TracingObserver {
    fn on_event(&self, event: &TransportEvent) {
        match event {
            TransportEvent::DeviceOpened { serial, attempts } => {
                tracing::info!(serial = %serial, attempts, "Device opened");
            }
            TransportEvent::DeviceClosed { serial } => {
                tracing::debug!(serial = %serial, "Device closed");
            }
            TransportEvent::Packet {
                direction,
                command,
                length,
            } => {
                tracing::trace!(dir = %direction, command = ?command, len = length, "USB Packet");
            }
            TransportEvent::SettingsSaved { serial, mode } => {
                tracing::info!(serial = %serial, mode = %mode, "Settings saved");
            }
            TransportEvent::TransferStarted {
                kind,
                destination,
                total_chunks,
                total_bytes,
            } => {
                tracing::info!(
                    kind = %kind,
                    destination = %destination,
                    chunks = total_chunks,
                    bytes = total_bytes,
                    "Transfer started"
                );
            }
            TransportEvent::ChunkSent {
                kind,
                chunk_index,
                sent,
                total,
            } => {
                let pct = if *total > 0 { (*sent * 100) / *total } else { 0 };
                tracing::debug!(kind = %kind, chunk = chunk_index, progress = %format!("{}%", pct), "Chunk sent");
            }
            TransportEvent::TransferComplete { kind, bytes } => {
                tracing::info!(kind = %kind, bytes, "Transfer complete");
            }
            TransportEvent::TransferAborted {
                kind,
                sent,
                total,
                reason,
            } => {
                tracing::error!(kind = %kind, sent, total, "Transfer aborted: {}", reason);
            }
            TransportEvent::SetupFinished {
                position,
                selector,
                ok,
            } => {
                if *ok {
                    tracing::info!(position, selector = %selector, "Display ready");
                } else {
                    tracing::warn!(position, selector = %selector, "Display setup failed");
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Observer that keeps every event for later inspection.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<TransportEvent>>,
    }

    impl TransportObserver for RecordingObserver {
        fn on_event(&self, event: &TransportEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
