//! Frame encoding

use super::frame_buffer::FrameBuffer;
use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Lossy quality used for uploads (0.8 on a 0..1 scale)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Compresses a rendered bitmap for upload
///
/// Encoding runs synchronously on the tick, so the shared buffer is never
/// read by two encodes at once.
pub trait FrameEncoder: Send + Sync {
    /// Encoded bytes, or `None` when there is nothing to send
    fn encode(&self, frame: &FrameBuffer) -> Result<Option<Vec<u8>>>;
}

/// JPEG encoder backed by the `image` crate
#[derive(Debug, Clone)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &FrameBuffer) -> Result<Option<Vec<u8>>> {
        if frame.is_empty() {
            return Ok(None);
        }

        let mut out = Vec::with_capacity(frame.pixels().len() / 8);
        let mut encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        encoder.encode(
            frame.pixels(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )?;

        if out.is_empty() {
            return Ok(None);
        }
        Ok(Some(out))
    }
}
