//! Chunk fragment structures.
//!
//! A chunk (image band or video slice) travels as a run of frames. Each frame's
//! payload starts with a [`FragmentHeader`]; the first frame of every chunk is
//! a leader whose data is a [`ChunkLeader`].

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use super::constants::{FLAG_FINAL, FLAG_LEADER, FRAGMENT_HEADER_LEN, MAX_STORAGE_PATH};
use super::frame::FrameError;

/// Fragment header (12 bytes / 0x0C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentHeader {
    /// Total length of the chunk this fragment belongs to.
    pub chunk_len: u32,
    /// Byte offset of this fragment's data within the chunk.
    pub offset: u32,
    /// Chunk index (vertical band index for images, sequence for video).
    pub chunk_index: u16,
    pub flags: u8,
}

impl FragmentHeader {
    pub const SIZE: usize = FRAGMENT_HEADER_LEN;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_u32::<BigEndian>(self.chunk_len).unwrap();
        buf.write_u32::<BigEndian>(self.offset).unwrap();
        buf.write_u16::<BigEndian>(self.chunk_index).unwrap();
        buf.write_u8(self.flags).unwrap();
        buf.write_u8(0).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < Self::SIZE {
            return Err(FrameError::MalformedPayload { what: "fragment" });
        }
        let mut cursor = Cursor::new(data);
        let malformed = |_| FrameError::MalformedPayload { what: "fragment" };
        Ok(Self {
            chunk_len: cursor.read_u32::<BigEndian>().map_err(malformed)?,
            offset: cursor.read_u32::<BigEndian>().map_err(malformed)?,
            chunk_index: cursor.read_u16::<BigEndian>().map_err(malformed)?,
            flags: cursor.read_u8().map_err(malformed)?,
        })
    }

    pub fn is_final(&self) -> bool {
        self.flags & FLAG_FINAL != 0
    }

    pub fn is_leader(&self) -> bool {
        self.flags & FLAG_LEADER != 0
    }
}

/// Decoded chunk payload: header plus its data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub header: FragmentHeader,
    pub data: Vec<u8>,
}

impl Fragment {
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        let header = FragmentHeader::from_bytes(payload)?;
        Ok(Self {
            header,
            data: payload[FragmentHeader::SIZE..].to_vec(),
        })
    }
}

/// Leader data: where the chunk is stored and which rows it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLeader {
    pub destination: String,
    /// First row of an image band; 0 for video.
    pub origin_row: u16,
    /// Rows in an image band; 0 for video.
    pub rows: u16,
}

impl ChunkLeader {
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let path = self.destination.as_bytes();
        if path.len() > MAX_STORAGE_PATH {
            return Err(FrameError::MalformedPayload { what: "leader path" });
        }
        let mut buf = Vec::with_capacity(1 + path.len() + 4);
        buf.push(path.len() as u8);
        buf.extend_from_slice(path);
        buf.write_u16::<BigEndian>(self.origin_row).unwrap();
        buf.write_u16::<BigEndian>(self.rows).unwrap();
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        let malformed = FrameError::MalformedPayload { what: "leader" };
        let path_len = *data.first().ok_or(malformed.clone())? as usize;
        if data.len() < 1 + path_len + 4 {
            return Err(malformed);
        }
        let destination = String::from_utf8(data[1..1 + path_len].to_vec()).map_err(|_| malformed.clone())?;
        let mut cursor = Cursor::new(&data[1 + path_len..]);
        Ok(Self {
            destination,
            origin_row: cursor.read_u16::<BigEndian>().map_err(|_| malformed.clone())?,
            rows: cursor.read_u16::<BigEndian>().map_err(|_| malformed.clone())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_header_layout() {
        let header = FragmentHeader {
            chunk_len: 0x0001_0203,
            offset: 486,
            chunk_index: 7,
            flags: FLAG_FINAL,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), FragmentHeader::SIZE);
        assert_eq!(&bytes[0..4], &[0x00, 0x01, 0x02, 0x03]);
        assert_eq!(&bytes[8..10], &[0x00, 0x07]);
        assert_eq!(bytes[10], FLAG_FINAL);

        let parsed = FragmentHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.is_final());
        assert!(!parsed.is_leader());
    }

    #[test]
    fn test_leader_parse() {
        let leader = ChunkLeader {
            destination: "/tmp/sdcard/mmcblk0p1/img/status.png".into(),
            origin_row: 640,
            rows: 320,
        };
        let bytes = leader.to_bytes().unwrap();
        assert_eq!(ChunkLeader::from_bytes(&bytes).unwrap(), leader);
    }

    #[test]
    fn test_truncated_inputs_are_malformed() {
        assert!(FragmentHeader::from_bytes(&[0u8; 5]).is_err());
        assert!(ChunkLeader::from_bytes(&[10, b'a']).is_err());
        assert!(ChunkLeader::from_bytes(&[]).is_err());
    }
}
