//! Camera device and live video source seams

use super::frame_buffer::FrameBuffer;
use crate::error::Result;
use async_trait::async_trait;

/// Something that can hand out an exclusively-owned live video source
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Request the camera; fails on permission/device errors
    async fn acquire(&self) -> Result<Box<dyn VideoSource>>;
}

/// A live camera stream owned by one capture loop
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Resolve once the first frame (and thus its dimensions) is available
    async fn wait_ready(&mut self) -> Result<()>;

    /// Dimensions reported by the source, if known
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Render the current frame into `buffer` (already sized by the caller)
    ///
    /// Returns false when no frame is available.
    fn draw_into(&self, buffer: &mut FrameBuffer) -> bool;

    /// Stop every underlying track
    fn stop_tracks(&mut self);

    /// Tracks still live
    fn live_tracks(&self) -> usize;
}
