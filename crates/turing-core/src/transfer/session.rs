//! Transfer state machine.
//!
//! `InProgress -> Completed` on the acknowledged final chunk, or
//! `InProgress -> Aborted` on the first I/O failure. Aborted is terminal:
//! a retry means a new transfer from offset zero.

use tracing::{debug, instrument};

use super::TransferKind;
use super::plan::{PlannedChunk, TransferPlan};
use crate::error::{Error, Result};
use crate::events::TransportEvent;
use crate::protocol::constants::{FLAG_FINAL, FLAG_LEADER, FRAGMENT_DATA_LEN};
use crate::protocol::{ChunkLeader, Command, FragmentHeader};
use crate::session::DeviceSession;
use crate::transport::UsbTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    InProgress,
    Completed,
    Aborted { reason: String },
}

/// Summary of a finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub kind: TransferKind,
    pub destination: String,
    pub chunks: usize,
    pub bytes: usize,
}

/// One upload in flight on a device session.
pub struct TransferSession<'a, T: UsbTransport> {
    device: &'a mut DeviceSession<T>,
    plan: &'a TransferPlan,
    next: usize,
    state: TransferState,
}

fn chunk_command<'d>(kind: TransferKind, header: FragmentHeader, data: &'d [u8]) -> Command<'d> {
    match kind {
        TransferKind::Image => Command::ImageChunk { header, data },
        TransferKind::Video => Command::VideoChunk { header, data },
    }
}

impl<'a, T: UsbTransport> TransferSession<'a, T> {
    /// Check the device can take this upload and mark it pending.
    ///
    /// Nothing is written here, so a rejected transfer leaves the bus untouched.
    pub fn begin(device: &'a mut DeviceSession<T>, plan: &'a TransferPlan) -> Result<Self> {
        if !device.is_open() {
            return Err(Error::SessionClosed);
        }
        let kind = plan.kind();
        if let Some(active) = device.pending_transfer()
            && active != kind
        {
            return Err(Error::TransferConflict {
                active,
                requested: kind,
            });
        }
        if !kind.accepted_by(device.mode()) {
            return Err(Error::ModeMismatch {
                mode: device.mode().unwrap_or_default(),
                requested: kind,
            });
        }

        device.set_pending(Some(kind));
        device.observer().on_event(&TransportEvent::TransferStarted {
            kind,
            destination: plan.destination().to_string(),
            total_chunks: plan.chunks().len(),
            total_bytes: plan.total_bytes(),
        });

        Ok(Self {
            device,
            plan,
            next: 0,
            state: TransferState::InProgress,
        })
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn chunks_sent(&self) -> usize {
        self.next
    }

    pub fn total_chunks(&self) -> usize {
        self.plan.chunks().len()
    }

    pub fn is_complete(&self) -> bool {
        self.state == TransferState::Completed
    }

    /// Send the next chunk. After the final chunk, waits for the device's
    /// acknowledgement. Returns the number of chunks still to send.
    #[instrument(level = "debug", skip(self), fields(kind = %self.plan.kind(), chunk = self.next))]
    pub fn send_next_chunk(&mut self) -> Result<usize> {
        match &self.state {
            TransferState::Aborted { reason } => {
                return Err(Error::TransferAborted {
                    chunks_sent: self.next,
                    total_chunks: self.total_chunks(),
                    reason: reason.clone(),
                });
            }
            TransferState::Completed => return Ok(0),
            TransferState::InProgress => {}
        }

        let plan = self.plan;
        let chunk = &plan.chunks()[self.next];
        if let Err(e) = self.write_chunk(chunk) {
            return Err(self.abort(e));
        }
        if chunk.is_final
            && let Err(e) = self.device.read_ack()
        {
            return Err(self.abort(e));
        }

        self.next += 1;
        let kind = plan.kind();
        self.device.observer().on_event(&TransportEvent::ChunkSent {
            kind,
            chunk_index: chunk.index,
            sent: self.next,
            total: self.total_chunks(),
        });

        if chunk.is_final {
            self.state = TransferState::Completed;
            self.device.set_pending(None);
            self.device
                .observer()
                .on_event(&TransportEvent::TransferComplete {
                    kind,
                    bytes: plan.total_bytes(),
                });
        }
        Ok(self.total_chunks() - self.next)
    }

    /// Leader fragment, then the chunk bytes in fragment-sized pieces.
    fn write_chunk(&self, chunk: &PlannedChunk) -> Result<()> {
        let kind = self.plan.kind();
        let data = self.plan.chunk_data(chunk);
        let final_flag = if chunk.is_final { FLAG_FINAL } else { 0 };
        let chunk_len = data.len() as u32;

        let leader = ChunkLeader {
            destination: self.plan.destination().to_string(),
            origin_row: chunk.origin_row,
            rows: chunk.rows,
        }
        .to_bytes()?;
        let header = FragmentHeader {
            chunk_len,
            offset: 0,
            chunk_index: chunk.index,
            flags: FLAG_LEADER | final_flag,
        };
        self.device.send(&chunk_command(kind, header, &leader))?;

        for (i, piece) in data.chunks(FRAGMENT_DATA_LEN).enumerate() {
            let header = FragmentHeader {
                chunk_len,
                offset: (i * FRAGMENT_DATA_LEN) as u32,
                chunk_index: chunk.index,
                flags: final_flag,
            };
            self.device.send(&chunk_command(kind, header, piece))?;
        }

        debug!(index = chunk.index, bytes = data.len(), "Chunk written");
        Ok(())
    }

    fn abort(&mut self, cause: Error) -> Error {
        let reason = cause.to_string();
        let kind = self.plan.kind();
        self.device
            .observer()
            .on_event(&TransportEvent::TransferAborted {
                kind,
                sent: self.next,
                total: self.total_chunks(),
                reason: reason.clone(),
            });
        self.state = TransferState::Aborted {
            reason: reason.clone(),
        };
        Error::TransferAborted {
            chunks_sent: self.next,
            total_chunks: self.total_chunks(),
            reason,
        }
    }

    /// Send every remaining chunk.
    pub fn run(mut self) -> Result<TransferReport> {
        while !self.is_complete() {
            self.send_next_chunk()?;
        }
        Ok(TransferReport {
            kind: self.plan.kind(),
            destination: self.plan.destination().to_string(),
            chunks: self.total_chunks(),
            bytes: self.plan.total_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::device::{DisplayMode, DisplaySettings};
    use crate::protocol::ParsedCommand;
    use crate::transport::{MockDevice, MockTransport};

    fn session(device: &MockDevice) -> DeviceSession<MockTransport> {
        DeviceSession::from_transport(
            device.transport(),
            device.identity().clone(),
            SessionConfig::immediate(),
        )
    }

    fn video_plan(len: usize, chunk: usize) -> TransferPlan {
        TransferPlan::video_with_chunk_size(vec![0x42; len], "clip.h264", chunk).unwrap()
    }

    #[test]
    fn test_fragments_of_one_chunk() {
        let device = MockDevice::new("A1");
        let mut dev = session(&device);
        let plan = video_plan(1000, 1000);

        let report = dev.upload(&plan).unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(report.bytes, 1000);

        let commands = device.commands();
        // leader + ceil(1000 / 486) data fragments
        assert_eq!(commands.len(), 1 + 3);
        let ParsedCommand::VideoChunk(leader) = &commands[0] else {
            panic!("expected video leader, got {:?}", commands[0]);
        };
        assert!(leader.header.is_leader());
        assert!(leader.header.is_final());
        let parsed = ChunkLeader::from_bytes(&leader.data).unwrap();
        assert!(parsed.destination.ends_with("/video/clip.h264"));

        let offsets: Vec<u32> = commands[1..]
            .iter()
            .map(|c| match c {
                ParsedCommand::VideoChunk(f) => f.header.offset,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(offsets, [0, 486, 972]);
        assert_eq!(dev.pending_transfer(), None);
    }

    #[test]
    fn test_mode_mismatch_sends_nothing() {
        let device = MockDevice::new("A1");
        let mut dev = session(&device);
        dev.save_settings(&DisplaySettings::with_mode(DisplayMode::Stats))
            .unwrap();
        device.clear_writes();

        let plan = video_plan(10, 10);
        match TransferSession::begin(&mut dev, &plan) {
            Err(Error::ModeMismatch { mode, requested }) => {
                assert_eq!(mode, DisplayMode::Stats);
                assert_eq!(requested, TransferKind::Video);
            }
            other => panic!("expected mode mismatch, got {:?}", other.err()),
        }
        assert!(device.get_writes().is_empty());
    }

    #[test]
    fn test_aborted_transfer_stays_aborted() {
        let device = MockDevice::new("A1");
        let mut dev = session(&device);
        // Each 10-byte chunk is a leader plus one data frame; fail the second chunk's data frame.
        device.fail_write_at(3);
        let plan = video_plan(30, 10);

        let mut transfer = TransferSession::begin(&mut dev, &plan).unwrap();
        assert_eq!(transfer.send_next_chunk().unwrap(), 2);
        let err = transfer.send_next_chunk().unwrap_err();
        assert!(matches!(
            err,
            Error::TransferAborted { chunks_sent: 1, total_chunks: 3, .. }
        ));
        // Later calls keep failing instead of resuming.
        assert!(matches!(
            transfer.send_next_chunk(),
            Err(Error::TransferAborted { chunks_sent: 1, .. })
        ));
        assert_eq!(device.get_writes().len(), 3);
        drop(transfer);

        // The abandoned kind still blocks the other kind.
        let image = TransferPlan::encoded_image(vec![1; 4], "a.png").unwrap();
        assert!(matches!(
            TransferSession::begin(&mut dev, &image).err(),
            Some(Error::TransferConflict { active: TransferKind::Video, requested: TransferKind::Image })
        ));
    }
}
