//! Pixel buffers and horizontal banding.

use std::ops::Range;

use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Row-major pixels at the panel's native resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!(
                "empty image {}x{}",
                width, height
            )));
        }
        if height > u16::MAX as u32 {
            return Err(Error::InvalidInput(format!("image height {} too large", height)));
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(Error::InvalidInput(format!(
                "pixel data is {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Raw bytes of `rows`.
    pub fn rows(&self, rows: Range<u32>) -> &[u8] {
        let stride = self.stride();
        &self.data[rows.start as usize * stride..rows.end as usize * stride]
    }
}

/// Turns a run of rows into a self-contained encoded image.
pub trait BandEncoder {
    fn encode_band(&self, image: &PixelBuffer, rows: Range<u32>) -> Result<Vec<u8>>;
}

/// One encoded horizontal slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Band {
    pub origin_row: u32,
    pub rows: u32,
    pub bytes: Vec<u8>,
}

/// Near-equal split of `height` rows into `count` bands, top to bottom.
fn band_ranges(height: u32, count: u32) -> Vec<Range<u32>> {
    (0..count)
        .map(|i| {
            let start = (height as u64 * i as u64 / count as u64) as u32;
            let end = (height as u64 * (i as u64 + 1) / count as u64) as u32;
            start..end
        })
        .collect()
}

/// Encode `image` into bands that each fit within `limit` bytes.
///
/// Starts at `ceil(encoded / limit)` bands and adds one at a time until
/// every band fits. Bands are returned top to bottom.
pub fn split_into_bands(
    image: &PixelBuffer,
    encoder: &dyn BandEncoder,
    limit: usize,
) -> Result<Vec<Band>> {
    let height = image.height();
    let whole = encoder.encode_band(image, 0..height)?;
    if whole.len() <= limit {
        return Ok(vec![Band {
            origin_row: 0,
            rows: height,
            bytes: whole,
        }]);
    }

    let mut count = (whole.len().div_ceil(limit) as u32).clamp(2, height.max(2));
    'attempt: while count <= height {
        let mut bands = Vec::with_capacity(count as usize);
        for range in band_ranges(height, count) {
            let bytes = encoder.encode_band(image, range.clone())?;
            if bytes.len() > limit {
                if range.len() == 1 {
                    break 'attempt;
                }
                debug!(count, size = bytes.len(), limit, "Band too large, splitting further");
                count += 1;
                continue 'attempt;
            }
            bands.push(Band {
                origin_row: range.start,
                rows: range.end - range.start,
                bytes,
            });
        }
        debug!(count, "Image split into bands");
        return Ok(bands);
    }

    Err(Error::InvalidInput(format!(
        "a single image row encodes to more than {} bytes",
        limit
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encodes each row as a fixed number of bytes.
    struct FixedRowEncoder(usize);

    impl BandEncoder for FixedRowEncoder {
        fn encode_band(&self, _image: &PixelBuffer, rows: Range<u32>) -> Result<Vec<u8>> {
            Ok(vec![0xAB; rows.len() * self.0])
        }
    }

    fn gray(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::new(
            width,
            height,
            PixelFormat::Rgb8,
            vec![0x80; (width * height * 3) as usize],
        )
        .unwrap()
    }

    #[test]
    fn test_pixel_buffer_validates_length() {
        assert!(PixelBuffer::new(2, 2, PixelFormat::Rgba8, vec![0; 16]).is_ok());
        assert!(PixelBuffer::new(2, 2, PixelFormat::Rgba8, vec![0; 12]).is_err());
        assert!(PixelBuffer::new(0, 2, PixelFormat::Rgb8, vec![]).is_err());
    }

    #[test]
    fn test_small_image_single_band() {
        let bands = split_into_bands(&gray(4, 10), &FixedRowEncoder(10), 1000).unwrap();
        assert_eq!(bands.len(), 1);
        assert_eq!((bands[0].origin_row, bands[0].rows), (0, 10));
    }

    #[test]
    fn test_bands_cover_every_row_once() {
        // 100 rows * 10 bytes = 1000 bytes, limit 300 -> at least 4 bands
        let bands = split_into_bands(&gray(4, 100), &FixedRowEncoder(10), 300).unwrap();
        assert_eq!(bands.len(), 4);
        let mut next = 0;
        for band in &bands {
            assert_eq!(band.origin_row, next);
            assert!(band.bytes.len() <= 300);
            next += band.rows;
        }
        assert_eq!(next, 100);
    }

    #[test]
    fn test_uneven_rows_increase_band_count() {
        // 10 rows of 30 bytes, limit 70: ceil(300/70)=5 bands of 2 rows = 60 each
        let bands = split_into_bands(&gray(1, 10), &FixedRowEncoder(30), 70).unwrap();
        assert_eq!(bands.len(), 5);
        // limit 50: needs single-row bands
        let bands = split_into_bands(&gray(1, 10), &FixedRowEncoder(30), 50).unwrap();
        assert_eq!(bands.len(), 10);
    }

    #[test]
    fn test_single_oversized_row_is_rejected() {
        let err = split_into_bands(&gray(1, 3), &FixedRowEncoder(100), 50).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
