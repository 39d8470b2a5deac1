//! Chunked uploads of images and video into on-device storage.
//!
//! A [`TransferPlan`] holds the chunks of one asset in transmission order.
//! A [`TransferSession`] walks that plan over an open
//! [`DeviceSession`](crate::session::DeviceSession), one chunk at a time,
//! and refuses to continue once any chunk failed.

pub mod image;
pub mod plan;
pub mod png;
pub mod session;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::DisplayMode;
use crate::protocol::CommandId;
use crate::protocol::constants::{IMAGE_STORAGE_DIR, VIDEO_STORAGE_DIR};

pub use self::image::{Band, BandEncoder, PixelBuffer, PixelFormat, split_into_bands};
pub use plan::{PlannedChunk, StoragePath, TransferPlan};
pub use self::png::{PngBandEncoder, decode_png};
pub use session::{TransferReport, TransferSession, TransferState};

/// What is being uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Image,
    Video,
}

impl TransferKind {
    /// Command carrying this kind's fragments.
    pub fn command(self) -> CommandId {
        match self {
            TransferKind::Image => CommandId::ImageChunk,
            TransferKind::Video => CommandId::VideoChunk,
        }
    }

    pub fn storage_dir(self) -> &'static str {
        match self {
            TransferKind::Image => IMAGE_STORAGE_DIR,
            TransferKind::Video => VIDEO_STORAGE_DIR,
        }
    }

    /// Whether a device last set to `mode` takes this kind of upload.
    /// An unknown mode accepts anything.
    pub fn accepted_by(self, mode: Option<DisplayMode>) -> bool {
        match (mode, self) {
            (None, _) => true,
            (Some(DisplayMode::Video), TransferKind::Video) => true,
            (Some(DisplayMode::Stats | DisplayMode::Image), TransferKind::Image) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Image => write!(f, "image"),
            TransferKind::Video => write!(f, "video"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_acceptance() {
        assert!(TransferKind::Image.accepted_by(Some(DisplayMode::Stats)));
        assert!(TransferKind::Image.accepted_by(Some(DisplayMode::Image)));
        assert!(!TransferKind::Image.accepted_by(Some(DisplayMode::Video)));
        assert!(TransferKind::Video.accepted_by(Some(DisplayMode::Video)));
        assert!(!TransferKind::Video.accepted_by(Some(DisplayMode::Stats)));
        assert!(TransferKind::Video.accepted_by(None));
    }

    #[test]
    fn test_kind_command_and_dir() {
        assert_eq!(TransferKind::Image.command(), CommandId::ImageChunk);
        assert_eq!(TransferKind::Video.command(), CommandId::VideoChunk);
        assert!(TransferKind::Video.storage_dir().ends_with("/video/"));
    }
}
