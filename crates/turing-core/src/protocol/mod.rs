//! Protocol module - frame layout, cipher and command set.

pub mod chunk;
pub mod cipher;
pub mod command;
pub mod constants;
pub mod frame;

pub use chunk::{ChunkLeader, Fragment, FragmentHeader};
pub use command::{Command, ParsedCommand};
pub use constants::*;
pub use frame::{CommandId, Frame, FrameError, Packet, Timestamp, decode, encode};
