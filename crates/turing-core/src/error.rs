//! Crate-wide error taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::device::DisplayMode;
use crate::protocol::FrameError;
use crate::transfer::TransferKind;
use crate::transport::TransportError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// Interface claim kept failing with "Resource busy".
    #[error("Device {serial} busy after {attempts} attempts")]
    DeviceBusy { serial: String, attempts: u32 },

    #[error("No device found matching '{selector}'{detail}")]
    NotFound { selector: String, detail: String },

    #[error("Ambiguous serial prefix '{selector}' matches: {}", candidates.join(", "))]
    Ambiguous {
        selector: String,
        candidates: Vec<String>,
    },

    #[error("Protocol framing error: {0}")]
    ProtocolFraming(FrameError),

    #[error("Payload too large: {len} bytes, maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("USB I/O error: {0}")]
    Io(TransportError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Device sent an empty acknowledgement")]
    NoAcknowledgement,

    #[error("Transfer aborted after {chunks_sent}/{total_chunks} chunks: {reason}")]
    TransferAborted {
        chunks_sent: usize,
        total_chunks: usize,
        reason: String,
    },

    #[error("Device is in {mode} mode, cannot accept a {requested} transfer")]
    ModeMismatch {
        mode: DisplayMode,
        requested: TransferKind,
    },

    #[error("A {active} transfer is pending on this device, cannot start a {requested} transfer")]
    TransferConflict {
        active: TransferKind,
        requested: TransferKind,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    #[error("Session already closed")]
    SessionClosed,
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { len, max } => Error::PayloadTooLarge { len, max },
            other => Error::ProtocolFraming(other),
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { timeout_ms } => {
                Error::Timeout(Duration::from_millis(timeout_ms))
            }
            other => Error::Io(other),
        }
    }
}
