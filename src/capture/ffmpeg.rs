//! FfmpegCamera - live camera access through an ffmpeg child process
//!
//! ffmpeg reads the device and writes raw `rgb24` frames of a fixed size
//! to stdout. A reader task keeps only the latest frame. The child is
//! spawned with `kill_on_drop(true)` so a dropped source never leaves the
//! camera open. stderr is drained for the life of the process so a chatty
//! ffmpeg never blocks on a full pipe; the last lines are kept for errors.

use super::frame_buffer::FrameBuffer;
use super::source::{CameraDevice, VideoSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long to wait for the first frame before giving up
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// stderr lines kept for the acquisition error
const STDERR_TAIL_LINES: usize = 20;

/// Bound on waiting for the stderr drain once ffmpeg has exited
const STDERR_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// One raw frame read from ffmpeg
#[derive(Debug)]
struct RawFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Camera device opened through ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegCamera {
    device: String,
    input_format: String,
    width: u32,
    height: u32,
    ready_timeout: Duration,
}

impl FfmpegCamera {
    /// Camera at `device` read with ffmpeg input format `input_format` (e.g. `v4l2`)
    pub fn new(device: impl Into<String>, input_format: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            input_format: input_format.into(),
            width: super::DEFAULT_FRAME_WIDTH,
            height: super::DEFAULT_FRAME_HEIGHT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    /// Requested capture size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.input_format.clone(),
            "-video_size".to_string(),
            format!("{}x{}", self.width, self.height),
            "-i".to_string(),
            self.device.clone(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s".to_string(),
            format!("{}x{}", self.width, self.height),
            "-".to_string(),
        ]
    }
}

#[async_trait]
impl CameraDevice for FfmpegCamera {
    async fn acquire(&self) -> Result<Box<dyn VideoSource>> {
        let mut child = Command::new("ffmpeg")
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Acquisition(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Acquisition("ffmpeg stdout unavailable".to_string()))?;

        let tail = StderrTail::default();
        let stderr_drain = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(drain_stderr(pipe, tail.clone(), self.device.clone())));

        let (tx, rx) = watch::channel(None);
        let reader = tokio::spawn(read_frames(stdout, self.width, self.height, tx));

        tracing::info!(
            device = %self.device,
            format = %self.input_format,
            width = self.width,
            height = self.height,
            "Camera opened via ffmpeg"
        );

        Ok(Box::new(FfmpegSource {
            device: self.device.clone(),
            child: Some(child),
            reader: Some(reader),
            stderr_drain,
            stderr_tail: tail,
            frames: rx,
            ready_timeout: self.ready_timeout,
        }))
    }
}

/// Read fixed-size frames until ffmpeg closes stdout
async fn read_frames<R: AsyncRead + Unpin>(
    mut stdout: R,
    width: u32,
    height: u32,
    tx: watch::Sender<Option<Arc<RawFrame>>>,
) {
    let frame_len = width as usize * height as usize * 3;
    loop {
        let mut pixels = vec![0u8; frame_len];
        if stdout.read_exact(&mut pixels).await.is_err() {
            break;
        }
        tx.send_replace(Some(Arc::new(RawFrame {
            width,
            height,
            pixels,
        })));
    }
    tracing::debug!("ffmpeg frame stream ended");
}

/// Log ffmpeg stderr line by line, keeping the most recent lines in `tail`
async fn drain_stderr<R: AsyncRead + Unpin>(pipe: R, tail: StderrTail, device: String) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        tracing::debug!(device = %device, "ffmpeg: {}", line);
        if let Ok(mut kept) = tail.lock() {
            if kept.len() == STDERR_TAIL_LINES {
                kept.pop_front();
            }
            kept.push_back(line.to_string());
        }
    }
}

fn tail_message(tail: &StderrTail) -> Option<String> {
    let kept = tail.lock().ok()?;
    if kept.is_empty() {
        return None;
    }
    Some(kept.iter().cloned().collect::<Vec<_>>().join("; "))
}

/// Live source backed by a running ffmpeg process
pub struct FfmpegSource {
    device: String,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<()>>,
    stderr_tail: StderrTail,
    frames: watch::Receiver<Option<Arc<RawFrame>>>,
    ready_timeout: Duration,
}

impl FfmpegSource {
    /// stderr of an exited ffmpeg, for error messages
    async fn exit_reason(&mut self) -> String {
        let Some(mut child) = self.child.take() else {
            return "camera closed".to_string();
        };
        let _ = child.wait().await;
        if let Some(drain) = self.stderr_drain.take() {
            let _ = tokio::time::timeout(STDERR_FLUSH_TIMEOUT, drain).await;
        }
        tail_message(&self.stderr_tail)
            .unwrap_or_else(|| "ffmpeg exited before the first frame".to_string())
    }
}

#[async_trait]
impl VideoSource for FfmpegSource {
    async fn wait_ready(&mut self) -> Result<()> {
        let first = tokio::time::timeout(
            self.ready_timeout,
            self.frames.wait_for(|frame| frame.is_some()),
        )
        .await
        .map(|frame| frame.is_ok());

        match first {
            Ok(true) => Ok(()),
            Ok(false) => {
                // reader ended without a single frame
                let reason = self.exit_reason().await;
                self.stop_tracks();
                Err(Error::Acquisition(format!("{}: {}", self.device, reason)))
            }
            Err(_) => {
                self.stop_tracks();
                Err(Error::Acquisition(format!(
                    "{}: no frame within {}s",
                    self.device,
                    self.ready_timeout.as_secs()
                )))
            }
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames
            .borrow()
            .as_ref()
            .map(|frame| (frame.width, frame.height))
    }

    fn draw_into(&self, buffer: &mut FrameBuffer) -> bool {
        let frame = self.frames.borrow().clone();
        match frame {
            Some(frame) => buffer.draw_rgb(frame.width, frame.height, &frame.pixels),
            None => false,
        }
    }

    fn stop_tracks(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "ffmpeg already exited");
            }
            tracing::info!(device = %self.device, "Camera released");
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.child.is_some())
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
