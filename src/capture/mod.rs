//! CaptureLoop - Webcam Frame Capture and Upload
//!
//! ## Responsibilities
//!
//! - Own at most one live video source and one capture timer at a time
//! - Capture immediately once the first frame arrives, then every interval
//! - Render -> encode (JPEG) -> multipart upload per tick
//! - Forward alerts returned by the server to the caller
//! - Release the camera on stop or teardown, including mid-acquisition
//!
//! ## States
//!
//! `Idle -> Acquiring -> Streaming -> Stopping -> Idle`
//!
//! Per-tick failures (empty encode, network, non-2xx) are logged and never
//! leave `Streaming`. Each active period owns a `CancellationToken`; an
//! upload that completes after its period was cancelled drops its alert.

mod encoder;
mod ffmpeg;
mod frame_buffer;
mod source;

pub use encoder::{FrameEncoder, JpegFrameEncoder, DEFAULT_JPEG_QUALITY};
pub use ffmpeg::{FfmpegCamera, FfmpegSource};
pub use frame_buffer::{frame_dimensions, FrameBuffer, DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH};
pub use source::{CameraDevice, VideoSource};

use crate::api_client::UploadFrameResponse;
use crate::error::{Error, Result};
use crate::models::Alert;
use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default capture cadence
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(5000);

/// Submits encoded frames to the analysis endpoint
#[async_trait]
pub trait FrameUploader: Send + Sync {
    async fn upload_frame(&self, jpeg: Vec<u8>, file_name: String) -> Result<UploadFrameResponse>;
}

/// Called once per alert returned by the server
pub type AlertCallback = Arc<dyn Fn(Alert) + Send + Sync>;
/// Called when the camera cannot be acquired
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Capture loop lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Acquiring,
    Streaming,
    Stopping,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Acquiring => "acquiring",
            CaptureState::Streaming => "streaming",
            CaptureState::Stopping => "stopping",
        }
    }
}

/// Caller-supplied capture settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub interval: Duration,
    pub active: bool,
}

impl CaptureConfig {
    pub fn active(interval: Duration) -> Self {
        Self {
            interval,
            active: true,
        }
    }

    pub fn inactive(interval: Duration) -> Self {
        Self {
            interval,
            active: false,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::inactive(DEFAULT_CAPTURE_INTERVAL)
    }
}

/// Counters kept across active periods
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub acquisitions: AtomicU64,
    pub ticks: AtomicU64,
    pub skipped: AtomicU64,
    pub submissions: AtomicU64,
    pub failures: AtomicU64,
    pub alerts: AtomicU64,
    pub stale_alerts: AtomicU64,
    pub leaked_tracks: AtomicU64,
}

/// Point-in-time copy of `CaptureStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStatsSnapshot {
    pub acquisitions: u64,
    pub ticks: u64,
    pub skipped: u64,
    pub submissions: u64,
    pub failures: u64,
    pub alerts: u64,
    pub stale_alerts: u64,
    pub leaked_tracks: u64,
}

impl CaptureStats {
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            acquisitions: self.acquisitions.load(Ordering::SeqCst),
            ticks: self.ticks.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            submissions: self.submissions.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            alerts: self.alerts.load(Ordering::SeqCst),
            stale_alerts: self.stale_alerts.load(Ordering::SeqCst),
            leaked_tracks: self.leaked_tracks.load(Ordering::SeqCst),
        }
    }
}

/// The running part of one active period
struct ActivePeriod {
    interval: Duration,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Everything a period task needs, cloned out of the loop
#[derive(Clone)]
struct Shared {
    device: Arc<dyn CameraDevice>,
    encoder: Arc<dyn FrameEncoder>,
    uploader: Arc<dyn FrameUploader>,
    on_alert: AlertCallback,
    on_error: ErrorCallback,
    state: Arc<watch::Sender<CaptureState>>,
    stats: Arc<CaptureStats>,
}

impl Shared {
    fn set_state(&self, state: CaptureState) {
        let prev = self.state.send_replace(state);
        if prev != state {
            tracing::debug!(from = prev.as_str(), to = state.as_str(), "Capture state changed");
        }
    }
}

/// CaptureLoop instance
pub struct CaptureLoop {
    shared: Shared,
    period: Mutex<Option<ActivePeriod>>,
}

impl CaptureLoop {
    /// Create new CaptureLoop
    pub fn new(
        device: Arc<dyn CameraDevice>,
        encoder: Arc<dyn FrameEncoder>,
        uploader: Arc<dyn FrameUploader>,
        on_alert: AlertCallback,
    ) -> Self {
        let (state, _rx) = watch::channel(CaptureState::Idle);
        Self {
            shared: Shared {
                device,
                encoder,
                uploader,
                on_alert,
                on_error: Arc::new(|e: &Error| {
                    tracing::error!(error = %e, "Could not access webcam");
                }),
                state: Arc::new(state),
                stats: Arc::new(CaptureStats::default()),
            },
            period: Mutex::new(None),
        }
    }

    /// Replace the acquisition error callback
    pub fn with_error_callback(mut self, on_error: ErrorCallback) -> Self {
        self.shared.on_error = on_error;
        self
    }

    /// Current state
    pub fn state(&self) -> CaptureState {
        *self.shared.state.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.shared.state.subscribe()
    }

    /// Wait until the loop reaches `target`
    ///
    /// Resolves at once when the loop is already there, so it cannot miss
    /// a transition that happened before the call.
    pub async fn wait_for_state(&self, target: CaptureState) {
        let mut rx = self.subscribe();
        // Err only if the sender is gone, which cannot outlive self
        let _ = rx.wait_for(|state| *state == target).await;
    }

    pub fn stats(&self) -> CaptureStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Drive the loop from caller settings
    ///
    /// An interval change while already active is ignored until the next
    /// stop/start cycle.
    pub async fn apply(&self, config: CaptureConfig) {
        if config.active {
            self.start(config.interval).await;
        } else {
            self.stop().await;
        }
    }

    /// Begin an active period; no-op when one is already running
    pub async fn start(&self, interval: Duration) {
        let mut period = self.period.lock().await;

        if let Some(active) = period.as_ref() {
            if !active.task.is_finished() {
                if active.interval != interval {
                    tracing::debug!(
                        current_ms = active.interval.as_millis() as u64,
                        requested_ms = interval.as_millis() as u64,
                        "Interval change ignored until restart"
                    );
                } else {
                    tracing::debug!("Capture already active");
                }
                return;
            }
        }

        let interval = if interval.is_zero() {
            DEFAULT_CAPTURE_INTERVAL
        } else {
            interval
        };

        let cancel = CancellationToken::new();
        let shared = self.shared.clone();
        shared.set_state(CaptureState::Acquiring);

        tracing::info!(interval_ms = interval.as_millis() as u64, "Starting capture");

        let task = tokio::spawn(run_period(shared, interval, cancel.clone()));
        *period = Some(ActivePeriod {
            interval,
            cancel,
            task,
        });
    }

    /// End the active period and wait for the camera to be released
    pub async fn stop(&self) {
        let Some(active) = self.period.lock().await.take() else {
            return;
        };

        active.cancel.cancel();
        if let Err(e) = active.task.await {
            tracing::error!(error = %e, "Capture task ended abnormally");
            self.shared.set_state(CaptureState::Idle);
        }
        tracing::info!("Capture stopped");
    }

    /// Whether an active period is running
    pub async fn is_active(&self) -> bool {
        self.period
            .lock()
            .await
            .as_ref()
            .map(|p| !p.task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        // Teardown: the period task releases the source once it sees this
        if let Some(active) = self.period.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

type AcquireFuture = Pin<Box<dyn Future<Output = Result<Box<dyn VideoSource>>> + Send>>;

/// One active period: acquire, stream until cancelled, release
async fn run_period(shared: Shared, interval: Duration, cancel: CancellationToken) {
    shared.stats.acquisitions.fetch_add(1, Ordering::SeqCst);

    let device = shared.device.clone();
    let mut acquire: AcquireFuture = Box::pin(async move { device.acquire().await });

    let acquired = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            // Let the request finish elsewhere and release whatever it yields
            let stats = shared.stats.clone();
            tokio::spawn(async move {
                if let Ok(mut source) = acquire.await {
                    stop_source(&stats, &mut source);
                    tracing::debug!("Late camera acquisition released");
                }
            });
            shared.set_state(CaptureState::Idle);
            return;
        }
        result = &mut acquire => result,
    };

    let mut source = match acquired {
        Ok(source) => source,
        Err(e) => {
            (shared.on_error)(&e);
            shared.set_state(CaptureState::Idle);
            return;
        }
    };

    let ready = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = source.wait_ready() => Some(result),
    };

    match ready {
        None => {
            release(&shared, source);
            return;
        }
        Some(Err(e)) => {
            stop_source(&shared.stats, &mut source);
            (shared.on_error)(&e);
            shared.set_state(CaptureState::Idle);
            return;
        }
        Some(Ok(())) => {}
    }

    shared.set_state(CaptureState::Streaming);
    tracing::info!(
        dimensions = ?source.dimensions(),
        "Camera streaming"
    );

    let mut buffer = FrameBuffer::new();

    // Immediate capture on entry, then the recurring timer
    capture_tick(&shared, source.as_ref(), &mut buffer, &cancel);

    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                capture_tick(&shared, source.as_ref(), &mut buffer, &cancel);
            }
        }
    }

    drop(ticker);
    release(&shared, source);
}

/// Stopping sequence after the timer is gone
fn release(shared: &Shared, mut source: Box<dyn VideoSource>) {
    shared.set_state(CaptureState::Stopping);
    stop_source(&shared.stats, &mut source);
    drop(source);
    shared.set_state(CaptureState::Idle);
}

/// Stop every track, counting any the source still reports live
fn stop_source(stats: &CaptureStats, source: &mut Box<dyn VideoSource>) {
    source.stop_tracks();
    let live = source.live_tracks();
    if live > 0 {
        stats.leaked_tracks.fetch_add(live as u64, Ordering::SeqCst);
        tracing::warn!(live, "Camera tracks still live after stop");
    }
}

/// Render and encode synchronously, then submit in the background
fn capture_tick(
    shared: &Shared,
    source: &dyn VideoSource,
    buffer: &mut FrameBuffer,
    cancel: &CancellationToken,
) {
    shared.stats.ticks.fetch_add(1, Ordering::SeqCst);

    let (width, height) = frame_dimensions(source.dimensions());
    buffer.prepare(width, height);

    if !source.draw_into(buffer) {
        shared.stats.skipped.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("No frame available, tick skipped");
        return;
    }

    let jpeg = match shared.encoder.encode(buffer) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            shared.stats.skipped.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("Encoder produced no data, tick skipped");
            return;
        }
        Err(e) => {
            shared.stats.skipped.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(error = %e, "Frame encode failed");
            return;
        }
    };

    let file_name = format!("frame_{}.jpg", Utc::now().timestamp_millis());
    let uploader = shared.uploader.clone();
    let on_alert = shared.on_alert.clone();
    let stats = shared.stats.clone();
    let cancel = cancel.clone();

    tokio::spawn(async move {
        if cancel.is_cancelled() {
            return;
        }

        stats.submissions.fetch_add(1, Ordering::SeqCst);
        let size = jpeg.len();

        match uploader.upload_frame(jpeg, file_name).await {
            Ok(response) => {
                tracing::debug!(size, status = ?response.status, "Frame uploaded");
                if let Some(alert) = response.alert {
                    if cancel.is_cancelled() {
                        stats.stale_alerts.fetch_add(1, Ordering::SeqCst);
                        tracing::debug!("Alert discarded, capture no longer streaming");
                    } else {
                        stats.alerts.fetch_add(1, Ordering::SeqCst);
                        tracing::info!(
                            timestamp = %alert.timestamp,
                            danger_status = ?alert.danger_status,
                            "Alert received"
                        );
                        on_alert(alert);
                    }
                }
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(error = %e, "Frame upload failed");
            }
        }
    });
}
