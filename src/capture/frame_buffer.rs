//! Reusable offscreen RGB bitmap

use image::{imageops, RgbImage};

/// Width used when the source reports no dimensions
pub const DEFAULT_FRAME_WIDTH: u32 = 640;
/// Height used when the source reports no dimensions
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;

/// Packed RGB24 bitmap reused across capture ticks
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the buffer for the next frame
    ///
    /// A size change zeroes the whole buffer so no pixels of a
    /// differently-sized frame survive.
    pub fn prepare(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width as usize * height as usize * 3, 0);
    }

    /// Copy a packed RGB frame in, scaling when its size differs
    pub fn draw_rgb(&mut self, width: u32, height: u32, pixels: &[u8]) -> bool {
        if self.is_empty() || pixels.len() != width as usize * height as usize * 3 {
            return false;
        }

        if width == self.width && height == self.height {
            self.data.copy_from_slice(pixels);
            return true;
        }

        let Some(src) = RgbImage::from_raw(width, height, pixels.to_vec()) else {
            return false;
        };
        let scaled = imageops::resize(&src, self.width, self.height, imageops::FilterType::Nearest);
        self.data.copy_from_slice(scaled.as_raw());
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Frame dimensions, falling back to the default for missing or zero sizes
pub fn frame_dimensions(reported: Option<(u32, u32)>) -> (u32, u32) {
    match reported {
        Some((w, h)) if w > 0 && h > 0 => (w, h),
        _ => (DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT),
    }
}
