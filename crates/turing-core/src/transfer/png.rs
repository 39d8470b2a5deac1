//! PNG in and out of [`PixelBuffer`]s.
//!
//! The writer emits 8-bit truecolour (with or without alpha), no interlace,
//! filter type 0 on every scanline. Enough for the panel's decoder. Reading
//! goes through the `png` crate and normalises to 8-bit RGB or RGBA.

use std::io::Write;
use std::ops::Range;

use byteorder::{BigEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::ZlibEncoder;

use super::image::{BandEncoder, PixelBuffer, PixelFormat};
use crate::error::{Error, Result};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const COLOR_TYPE_RGB: u8 = 2;
const COLOR_TYPE_RGBA: u8 = 6;

/// PNG encoder for [`PixelBuffer`] row ranges.
#[derive(Debug, Clone, Copy)]
pub struct PngBandEncoder {
    level: Compression,
}

impl Default for PngBandEncoder {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl PngBandEncoder {
    /// zlib level 0-9.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

fn compression_failed(err: std::io::Error) -> Error {
    Error::InvalidInput(format!("PNG compression failed: {}", err))
}

fn decoding_failed(err: ::png::DecodingError) -> Error {
    Error::InvalidInput(format!("PNG decoding failed: {}", err))
}

/// Decode a PNG file into 8-bit pixels.
///
/// Palette and low bit depths are expanded, 16-bit samples stripped,
/// greyscale widened to RGB.
pub fn decode_png(bytes: &[u8]) -> Result<PixelBuffer> {
    let mut decoder = ::png::Decoder::new(bytes);
    decoder.set_transformations(::png::Transformations::EXPAND | ::png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(decoding_failed)?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).map_err(decoding_failed)?;
    buf.truncate(info.buffer_size());

    let (format, data) = match info.color_type {
        ::png::ColorType::Rgb => (PixelFormat::Rgb8, buf),
        ::png::ColorType::Rgba => (PixelFormat::Rgba8, buf),
        ::png::ColorType::Grayscale => (
            PixelFormat::Rgb8,
            buf.iter().flat_map(|&g| [g, g, g]).collect(),
        ),
        ::png::ColorType::GrayscaleAlpha => (
            PixelFormat::Rgba8,
            buf.chunks_exact(2)
                .flat_map(|ga| [ga[0], ga[0], ga[0], ga[1]])
                .collect(),
        ),
        ::png::ColorType::Indexed => {
            return Err(Error::InvalidInput("PNG palette was not expanded".into()));
        }
    };
    PixelBuffer::new(info.width, info.height, format, data)
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);

    out.write_u32::<BigEndian>(data.len() as u32).unwrap();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.write_u32::<BigEndian>(hasher.finalize()).unwrap();
}

impl BandEncoder for PngBandEncoder {
    fn encode_band(&self, image: &PixelBuffer, rows: Range<u32>) -> Result<Vec<u8>> {
        if rows.start >= rows.end || rows.end > image.height() {
            return Err(Error::InvalidInput(format!(
                "row range {:?} outside image of height {}",
                rows,
                image.height()
            )));
        }
        let height = rows.end - rows.start;

        let mut ihdr = Vec::with_capacity(13);
        ihdr.write_u32::<BigEndian>(image.width()).unwrap();
        ihdr.write_u32::<BigEndian>(height).unwrap();
        ihdr.push(8); // bit depth
        ihdr.push(match image.format() {
            PixelFormat::Rgb8 => COLOR_TYPE_RGB,
            PixelFormat::Rgba8 => COLOR_TYPE_RGBA,
        });
        ihdr.extend_from_slice(&[0, 0, 0]); // compression, filter, interlace

        let stride = image.stride();
        let mut zlib = ZlibEncoder::new(Vec::new(), self.level);
        for line in image.rows(rows).chunks(stride) {
            zlib.write_all(&[0]).map_err(compression_failed)?;
            zlib.write_all(line).map_err(compression_failed)?;
        }
        let idat = zlib.finish().map_err(compression_failed)?;

        let mut out = Vec::with_capacity(PNG_SIGNATURE.len() + idat.len() + 64);
        out.extend_from_slice(&PNG_SIGNATURE);
        write_chunk(&mut out, b"IHDR", &ihdr);
        write_chunk(&mut out, b"IDAT", &idat);
        write_chunk(&mut out, b"IEND", &[]);
        Ok(out)
    }
}
