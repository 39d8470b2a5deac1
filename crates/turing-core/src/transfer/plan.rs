//! Chunk layout of one upload, fixed before the first frame is sent.

use std::fmt;
use std::ops::Range;

use tracing::debug;

use super::TransferKind;
use super::image::{Band, BandEncoder, PixelBuffer, split_into_bands};
use super::png::{PngBandEncoder, decode_png};
use crate::error::{Error, Result};
use crate::protocol::constants::{IMAGE_LAYER_LIMIT, MAX_STORAGE_PATH, VIDEO_CHUNK_SIZE};

/// Validated on-device destination, e.g. `/tmp/sdcard/mmcblk0p1/video/loop.h264`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePath(String);

impl StoragePath {
    pub fn new(kind: TransferKind, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(Error::InvalidInput(format!(
                "invalid storage file name '{}'",
                name
            )));
        }
        let path = format!("{}{}", kind.storage_dir(), name);
        if path.len() > MAX_STORAGE_PATH {
            return Err(Error::InvalidInput(format!(
                "storage path is {} bytes, maximum {}",
                path.len(),
                MAX_STORAGE_PATH
            )));
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chunk, in transmission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChunk {
    /// Band index from the top for images, sequence number for video.
    pub index: u16,
    /// Byte range within the plan's payload.
    pub range: Range<usize>,
    pub origin_row: u16,
    pub rows: u16,
    /// Last chunk of the transfer; carries the end-of-stream flag.
    pub is_final: bool,
}

impl PlannedChunk {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Payload plus its chunking.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    kind: TransferKind,
    destination: StoragePath,
    payload: Vec<u8>,
    chunks: Vec<PlannedChunk>,
}

impl TransferPlan {
    /// Split a raw Annex-B stream into 202 000-byte chunks. The stream itself
    /// is not inspected.
    pub fn video(stream: Vec<u8>, name: &str) -> Result<Self> {
        Self::video_with_chunk_size(stream, name, VIDEO_CHUNK_SIZE)
    }

    pub fn video_with_chunk_size(stream: Vec<u8>, name: &str, chunk_size: usize) -> Result<Self> {
        let destination = StoragePath::new(TransferKind::Video, name)?;
        if stream.is_empty() {
            return Err(Error::InvalidInput("video stream is empty".into()));
        }
        if chunk_size == 0 {
            return Err(Error::InvalidInput("chunk size must be non-zero".into()));
        }
        let count = stream.len().div_ceil(chunk_size);
        check_chunk_count(count)?;

        let chunks = (0..count)
            .map(|i| {
                let start = i * chunk_size;
                PlannedChunk {
                    index: i as u16,
                    range: start..(start + chunk_size).min(stream.len()),
                    origin_row: 0,
                    rows: 0,
                    is_final: i + 1 == count,
                }
            })
            .collect();

        Ok(Self {
            kind: TransferKind::Video,
            destination,
            payload: stream,
            chunks,
        })
    }

    /// An already encoded image. It must fit a single layer.
    pub fn encoded_image(bytes: Vec<u8>, name: &str) -> Result<Self> {
        let destination = StoragePath::new(TransferKind::Image, name)?;
        if bytes.is_empty() {
            return Err(Error::InvalidInput("image is empty".into()));
        }
        if bytes.len() > IMAGE_LAYER_LIMIT {
            return Err(Error::PayloadTooLarge {
                len: bytes.len(),
                max: IMAGE_LAYER_LIMIT,
            });
        }
        let len = bytes.len();
        Ok(Self {
            kind: TransferKind::Image,
            destination,
            payload: bytes,
            chunks: vec![PlannedChunk {
                index: 0,
                range: 0..len,
                origin_row: 0,
                rows: 0,
                is_final: true,
            }],
        })
    }

    /// A PNG file as read from disk. Small files go out as one layer; larger
    /// ones are decoded and re-encoded in bands.
    pub fn png_file(bytes: Vec<u8>, name: &str) -> Result<Self> {
        if bytes.len() <= IMAGE_LAYER_LIMIT {
            return Self::encoded_image(bytes, name);
        }
        debug!(len = bytes.len(), "Image exceeds one layer, banding");
        let pixels = decode_png(&bytes)?;
        Self::image(&pixels, &PngBandEncoder::default(), name)
    }

    /// Encode `image` in bands of at most 512 KiB each.
    pub fn image(image: &PixelBuffer, encoder: &dyn BandEncoder, name: &str) -> Result<Self> {
        Self::image_with_limit(image, encoder, name, IMAGE_LAYER_LIMIT)
    }

    pub fn image_with_limit(
        image: &PixelBuffer,
        encoder: &dyn BandEncoder,
        name: &str,
        limit: usize,
    ) -> Result<Self> {
        let destination = StoragePath::new(TransferKind::Image, name)?;
        let bands = split_into_bands(image, encoder, limit)?;
        Self::from_bands(destination, bands)
    }

    /// Bands arrive top to bottom and are sent bottom to top.
    fn from_bands(destination: StoragePath, bands: Vec<Band>) -> Result<Self> {
        check_chunk_count(bands.len())?;
        let count = bands.len();
        let mut payload = Vec::with_capacity(bands.iter().map(|b| b.bytes.len()).sum());
        let mut chunks = Vec::with_capacity(count);

        for (index, band) in bands.into_iter().enumerate().rev() {
            let start = payload.len();
            payload.extend_from_slice(&band.bytes);
            chunks.push(PlannedChunk {
                index: index as u16,
                range: start..payload.len(),
                origin_row: band.origin_row as u16,
                rows: band.rows as u16,
                is_final: index == 0,
            });
        }

        Ok(Self {
            kind: TransferKind::Image,
            destination,
            payload,
            chunks,
        })
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn destination(&self) -> &StoragePath {
        &self.destination
    }

    pub fn chunks(&self) -> &[PlannedChunk] {
        &self.chunks
    }

    pub fn chunk_data(&self, chunk: &PlannedChunk) -> &[u8] {
        &self.payload[chunk.range.clone()]
    }

    pub fn total_bytes(&self) -> usize {
        self.payload.len()
    }
}

fn check_chunk_count(count: usize) -> Result<()> {
    if count > u16::MAX as usize + 1 {
        return Err(Error::InvalidInput(format!(
            "{} chunks exceed the protocol's chunk index range",
            count
        )));
    }
    Ok(())
}
