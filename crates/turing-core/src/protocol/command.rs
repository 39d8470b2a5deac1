//! Typed commands and their payload layouts.

use super::chunk::{Fragment, FragmentHeader};
use super::frame::{self, CommandId, Frame, FrameError, Packet, Timestamp};
use crate::device::{Brightness, DisplayMode, DisplaySettings, Rotation};

/// A command with its payload already shaped for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Sync,
    Restart,
    SetBrightness(Brightness),
    SaveSettings(DisplaySettings),
    ImageChunk {
        header: FragmentHeader,
        data: &'a [u8],
    },
    VideoChunk {
        header: FragmentHeader,
        data: &'a [u8],
    },
}

impl Command<'_> {
    pub fn id(&self) -> CommandId {
        match self {
            Command::Sync => CommandId::Sync,
            Command::Restart => CommandId::Restart,
            Command::SetBrightness(_) => CommandId::SetBrightness,
            Command::SaveSettings(_) => CommandId::SaveSettings,
            Command::ImageChunk { .. } => CommandId::ImageChunk,
            Command::VideoChunk { .. } => CommandId::VideoChunk,
        }
    }

    /// Streaming fragments are fire-and-forget; everything else is acknowledged.
    pub fn expects_ack(&self) -> bool {
        !matches!(self, Command::ImageChunk { .. } | Command::VideoChunk { .. })
    }

    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::Sync | Command::Restart => Vec::new(),
            Command::SetBrightness(b) => vec![b.value()],
            Command::SaveSettings(s) => vec![
                s.brightness.value(),
                s.mode.startup_code(),
                0, // reserved
                s.rotation.code(),
                s.sleep_timeout,
                s.offline as u8,
            ],
            Command::ImageChunk { header, data } | Command::VideoChunk { header, data } => {
                let mut payload = header.to_bytes();
                payload.extend_from_slice(data);
                payload
            }
        }
    }

    pub fn encode(&self, timestamp: Timestamp) -> Result<Frame, FrameError> {
        frame::encode(self.id(), &self.payload(), timestamp)
    }
}

/// Owned, parsed view of a decoded packet. Mostly useful to device simulators
/// and tests that inspect what went over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Sync,
    Restart,
    SetBrightness(Brightness),
    SaveSettings(DisplaySettings),
    ImageChunk(Fragment),
    VideoChunk(Fragment),
}

impl ParsedCommand {
    pub fn parse(packet: &Packet) -> Result<Self, FrameError> {
        let p = &packet.payload;
        match packet.command {
            CommandId::Sync => Ok(ParsedCommand::Sync),
            CommandId::Restart => Ok(ParsedCommand::Restart),
            CommandId::SetBrightness => {
                let value = *p.first().ok_or(FrameError::MalformedPayload { what: "brightness" })?;
                Brightness::new(value)
                    .map(ParsedCommand::SetBrightness)
                    .map_err(|_| FrameError::MalformedPayload { what: "brightness" })
            }
            CommandId::SaveSettings => {
                let malformed = || FrameError::MalformedPayload { what: "settings" };
                if p.len() < 6 {
                    return Err(malformed());
                }
                Ok(ParsedCommand::SaveSettings(DisplaySettings {
                    brightness: Brightness::new(p[0]).map_err(|_| malformed())?,
                    mode: DisplayMode::from_startup_code(p[1]).ok_or_else(malformed)?,
                    rotation: Rotation::try_from(p[3]).map_err(|_| malformed())?,
                    sleep_timeout: p[4],
                    offline: p[5] != 0,
                }))
            }
            CommandId::ImageChunk => Fragment::parse(p).map(ParsedCommand::ImageChunk),
            CommandId::VideoChunk => Fragment::parse(p).map(ParsedCommand::VideoChunk),
        }
    }
}
