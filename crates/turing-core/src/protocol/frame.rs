//! 512-byte frame codec.
//!
//! Plaintext layout:
//!
//! | Offset    | Field                           |
//! |-----------|---------------------------------|
//! | 0         | command id                      |
//! | 1         | reserved                        |
//! | 2..4      | magic `1A 6D`                   |
//! | 4..8      | timestamp, u32 LE (ms since local midnight) |
//! | 8..506    | payload, zero padded            |
//! | 506..508  | payload length, u16 BE          |
//! | 508..510  | reserved                        |
//! | 510..512  | trailer `A1 1A`                 |
//!
//! The whole frame goes through [`cipher`](super::cipher) before it hits the wire.

use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use chrono::{Local, Timelike};
use thiserror::Error;

use super::cipher;
use super::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload too large: {len} bytes, maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("Bad frame length: expected {expected}, got {actual}")]
    BadLength { expected: usize, actual: usize },
    #[error("Invalid magic: expected {expected:02X?}, got {actual:02X?}")]
    InvalidMagic { expected: [u8; 2], actual: [u8; 2] },
    #[error("Invalid trailer: expected {expected:02X?}, got {actual:02X?}")]
    InvalidTrailer { expected: [u8; 2], actual: [u8; 2] },
    #[error("Payload length field {len} exceeds {max}")]
    InvalidPayloadLength { len: usize, max: usize },
    #[error("Unknown command id {0}")]
    UnknownCommand(u8),
    #[error("Malformed {what} payload")]
    MalformedPayload { what: &'static str },
}

impl FrameError {
    /// Caller-side contract violations, as opposed to bad data from the wire.
    pub fn is_input_error(&self) -> bool {
        matches!(self, FrameError::PayloadTooLarge { .. })
    }
}

/// Closed set of command ids this layer speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    Sync = 10,
    Restart = 11,
    SetBrightness = 14,
    ImageChunk = 102,
    VideoChunk = 121,
    SaveSettings = 125,
}

impl CommandId {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandId {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(CommandId::Sync),
            11 => Ok(CommandId::Restart),
            14 => Ok(CommandId::SetBrightness),
            102 => Ok(CommandId::ImageChunk),
            121 => Ok(CommandId::VideoChunk),
            125 => Ok(CommandId::SaveSettings),
            other => Err(FrameError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandId::Sync => "SYNC",
            CommandId::Restart => "RESTART",
            CommandId::SetBrightness => "SET_BRIGHTNESS",
            CommandId::ImageChunk => "IMAGE_CHUNK",
            CommandId::VideoChunk => "VIDEO_CHUNK",
            CommandId::SaveSettings => "SAVE_SETTINGS",
        };
        write!(f, "{}({})", name, self.as_u8())
    }
}

/// Frame timestamp: milliseconds since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp(pub u32);

impl Timestamp {
    pub fn now() -> Self {
        let now = Local::now();
        let millis = now.num_seconds_from_midnight() * 1000 + now.timestamp_subsec_millis() % 1000;
        Self(millis)
    }
}

/// One encrypted frame, ready for the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let raw: [u8; FRAME_LEN] = bytes.try_into().map_err(|_| FrameError::BadLength {
            expected: FRAME_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(raw))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:02X?}..)", &self.0[..8])
    }
}

/// Decoded plaintext view of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: CommandId,
    pub timestamp: Timestamp,
    pub payload: Vec<u8>,
}

/// Lay out and encrypt one frame.
///
/// All 512 bytes are encrypted, trailer included. Firmware expecting a
/// 500-byte encrypted body followed by a cleartext `A1 1A` trailer will not
/// accept these frames.
pub fn encode(command: CommandId, payload: &[u8], timestamp: Timestamp) -> Result<Frame, FrameError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    let mut buf = [0u8; FRAME_LEN];
    buf[COMMAND_OFFSET] = command.as_u8();
    buf[RESERVED_OFFSET] = 0;
    buf[MAGIC_OFFSET..MAGIC_OFFSET + 2].copy_from_slice(&FRAME_MAGIC);
    LittleEndian::write_u32(&mut buf[TIMESTAMP_OFFSET..PAYLOAD_OFFSET], timestamp.0);
    buf[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
    BigEndian::write_u16(
        &mut buf[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 2],
        payload.len() as u16,
    );
    buf[TRAILER_OFFSET..].copy_from_slice(&FRAME_TRAILER);

    cipher::encrypt_in_place(&mut buf);
    Ok(Frame(buf))
}

/// Decrypt and validate one frame.
pub fn decode(bytes: &[u8]) -> Result<Packet, FrameError> {
    let mut buf = Frame::from_bytes(bytes)?.0;
    cipher::decrypt_in_place(&mut buf);

    let magic = [buf[MAGIC_OFFSET], buf[MAGIC_OFFSET + 1]];
    if magic != FRAME_MAGIC {
        return Err(FrameError::InvalidMagic {
            expected: FRAME_MAGIC,
            actual: magic,
        });
    }

    let trailer = [buf[TRAILER_OFFSET], buf[TRAILER_OFFSET + 1]];
    if trailer != FRAME_TRAILER {
        return Err(FrameError::InvalidTrailer {
            expected: FRAME_TRAILER,
            actual: trailer,
        });
    }

    let len = BigEndian::read_u16(&buf[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 2]) as usize;
    if len > MAX_PAYLOAD {
        return Err(FrameError::InvalidPayloadLength {
            len,
            max: MAX_PAYLOAD,
        });
    }

    let command = CommandId::try_from(buf[COMMAND_OFFSET])?;
    let timestamp = Timestamp(LittleEndian::read_u32(&buf[TIMESTAMP_OFFSET..PAYLOAD_OFFSET]));

    Ok(Packet {
        command,
        timestamp,
        payload: buf[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len].to_vec(),
    })
}
