//! Capture loop behavior against in-memory camera, encoder and uploader

use async_trait::async_trait;
use crimewatch_client::api_client::UploadFrameResponse;
use crimewatch_client::capture::{
    CameraDevice, CaptureConfig, CaptureLoop, CaptureState, FrameBuffer, FrameEncoder,
    FrameUploader, JpegFrameEncoder, VideoSource,
};
use crimewatch_client::models::Alert;
use crimewatch_client::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const INTERVAL: Duration = Duration::from_millis(5000);

// ---- camera ----

#[derive(Default)]
struct FakeCamera {
    acquired: AtomicUsize,
    live: Arc<AtomicUsize>,
    fail: bool,
    acquire_delay: Option<Duration>,
    stubborn: bool,
}

impl FakeCamera {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            acquire_delay: Some(delay),
            ..Default::default()
        }
    }

    /// Sources ignore stop_tracks and stay live
    fn stubborn() -> Self {
        Self {
            stubborn: true,
            ..Default::default()
        }
    }

    fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn acquire(&self) -> Result<Box<dyn VideoSource>> {
        if let Some(delay) = self.acquire_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::Acquisition("Permission denied".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSource {
            live: self.live.clone(),
            stopped: false,
            stubborn: self.stubborn,
        }))
    }
}

struct FakeSource {
    live: Arc<AtomicUsize>,
    stopped: bool,
    stubborn: bool,
}

#[async_trait]
impl VideoSource for FakeSource {
    async fn wait_ready(&mut self) -> Result<()> {
        Ok(())
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((8, 6))
    }

    fn draw_into(&self, buffer: &mut FrameBuffer) -> bool {
        buffer.pixels_mut().fill(90);
        true
    }

    fn stop_tracks(&mut self) {
        if !self.stopped && !self.stubborn {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(!self.stopped)
    }
}

// ---- encoder ----

struct EmptyEncoder;

impl FrameEncoder for EmptyEncoder {
    fn encode(&self, _frame: &FrameBuffer) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

// ---- uploader ----

type Answer = Box<dyn Fn() -> Result<UploadFrameResponse> + Send + Sync>;

#[derive(Default)]
struct FakeUploader {
    calls: AtomicUsize,
    names: Mutex<Vec<String>>,
    scripted: Mutex<VecDeque<Answer>>,
    delay: Option<Duration>,
}

impl FakeUploader {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn then(self, answer: impl Fn() -> Result<UploadFrameResponse> + Send + Sync + 'static) -> Self {
        self.scripted.lock().unwrap().push_back(Box::new(answer));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameUploader for FakeUploader {
    async fn upload_frame(&self, jpeg: Vec<u8>, file_name: String) -> Result<UploadFrameResponse> {
        assert!(!jpeg.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(file_name);
        let answer = self.scripted.lock().unwrap().pop_front();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match answer {
            Some(answer) => answer(),
            None => Ok(UploadFrameResponse::default()),
        }
    }
}

fn ok() -> Result<UploadFrameResponse> {
    Ok(UploadFrameResponse::default())
}

fn weapon_alert() -> Result<UploadFrameResponse> {
    Ok(UploadFrameResponse {
        alert: Some(
            Alert::new("2026-10-14T09:00:00Z").with_danger_status("Weapon Detected"),
        ),
        ..Default::default()
    })
}

// ---- harness ----

struct Harness {
    camera: Arc<FakeCamera>,
    uploader: Arc<FakeUploader>,
    alerts: Arc<Mutex<Vec<Alert>>>,
    errors: Arc<AtomicUsize>,
    capture: CaptureLoop,
}

fn harness(camera: FakeCamera, uploader: FakeUploader) -> Harness {
    harness_with_encoder(camera, uploader, Arc::new(JpegFrameEncoder::default()))
}

fn harness_with_encoder(
    camera: FakeCamera,
    uploader: FakeUploader,
    encoder: Arc<dyn FrameEncoder>,
) -> Harness {
    let camera = Arc::new(camera);
    let uploader = Arc::new(uploader);
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(AtomicUsize::new(0));

    let sink = alerts.clone();
    let error_count = errors.clone();
    let capture = CaptureLoop::new(
        camera.clone(),
        encoder,
        uploader.clone(),
        Arc::new(move |alert: Alert| sink.lock().unwrap().push(alert)),
    )
    .with_error_callback(Arc::new(move |_e: &Error| {
        error_count.fetch_add(1, Ordering::SeqCst);
    }));

    Harness {
        camera,
        uploader,
        alerts,
        errors,
        capture,
    }
}

async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

// ---- tests ----

#[tokio::test(start_paused = true)]
async fn test_captures_immediately_then_every_interval() {
    let h = harness(FakeCamera::default(), FakeUploader::default());

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(17_000)).await;

    // t = 0, 5, 10, 15
    assert_eq!(h.uploader.calls(), 4);
    assert_eq!(h.capture.state(), CaptureState::Streaming);

    h.capture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_frame_names_are_jpeg_files() {
    let h = harness(FakeCamera::default(), FakeUploader::default());

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(100)).await;
    h.capture.stop().await;

    let names = h.uploader.names.lock().unwrap().clone();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("frame_"));
    assert!(names[0].ends_with(".jpg"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_camera_and_ends_submissions() {
    let h = harness(FakeCamera::default(), FakeUploader::default());

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(7_000)).await;
    h.capture.stop().await;

    let submitted = h.uploader.calls();
    assert_eq!(submitted, 2);
    assert_eq!(h.capture.state(), CaptureState::Idle);
    assert_eq!(h.camera.live(), 0);
    assert_eq!(h.capture.stats().leaked_tracks, 0);
    assert!(!h.capture.is_active().await);

    advance(Duration::from_millis(30_000)).await;
    assert_eq!(h.uploader.calls(), submitted);
}

#[tokio::test(start_paused = true)]
async fn test_track_left_live_after_stop_is_counted() {
    let h = harness(FakeCamera::stubborn(), FakeUploader::default());

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(100)).await;
    h.capture.stop().await;

    assert_eq!(h.capture.state(), CaptureState::Idle);
    assert_eq!(h.camera.live(), 1);
    assert_eq!(h.capture.stats().leaked_tracks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_upload_does_not_stop_the_loop() {
    let uploader = FakeUploader::default()
        .then(ok)
        .then(|| {
            Err(Error::Rejected {
                status: 500,
                detail: None,
            })
        });
    let h = harness(FakeCamera::default(), uploader);

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(17_000)).await;

    assert_eq!(h.uploader.calls(), 4);
    let stats = h.capture.stats();
    assert_eq!(stats.failures, 1);
    assert_eq!(h.capture.state(), CaptureState::Streaming);

    h.capture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_alert_forwarded_exactly_once() {
    let uploader = FakeUploader::default().then(weapon_alert);
    let h = harness(FakeCamera::default(), uploader);

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(12_000)).await;
    h.capture.stop().await;

    assert_eq!(h.uploader.calls(), 3);
    let alerts = h.alerts.lock().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].danger_status.as_deref(), Some("Weapon Detected"));
    assert_eq!(h.capture.stats().alerts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_alert_no_callback() {
    let h = harness(FakeCamera::default(), FakeUploader::default());

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(12_000)).await;
    h.capture.stop().await;

    assert!(h.alerts.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_alert_after_stop_is_dropped() {
    let uploader = FakeUploader::with_delay(Duration::from_millis(3_000)).then(weapon_alert);
    let h = harness(FakeCamera::default(), uploader);

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(1_000)).await;
    h.capture.stop().await;

    // The in-flight upload answers after the period ended
    advance(Duration::from_millis(5_000)).await;

    assert_eq!(h.uploader.calls(), 1);
    assert!(h.alerts.lock().unwrap().is_empty());
    assert_eq!(h.capture.stats().stale_alerts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_acquisition_failure_reports_and_does_not_retry() {
    let h = harness(FakeCamera::failing(), FakeUploader::default());

    h.capture.start(INTERVAL).await;
    h.capture.wait_for_state(CaptureState::Idle).await;
    advance(Duration::from_millis(20_000)).await;

    assert_eq!(h.errors.load(Ordering::SeqCst), 1);
    assert_eq!(h.capture.stats().acquisitions, 1);
    assert_eq!(h.uploader.calls(), 0);
    assert_eq!(h.capture.state(), CaptureState::Idle);
    assert!(!h.capture.is_active().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fast_acquisition_failure_seen_after_start_returns() {
    for _ in 0..100 {
        let h = harness(FakeCamera::failing(), FakeUploader::default());

        h.capture.start(INTERVAL).await;
        tokio::time::timeout(
            Duration::from_secs(2),
            h.capture.wait_for_state(CaptureState::Idle),
        )
        .await
        .expect("loop should be seen returning to Idle");

        assert_eq!(h.errors.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_acquiring_releases_late_source() {
    let h = harness(
        FakeCamera::slow(Duration::from_millis(10_000)),
        FakeUploader::default(),
    );

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(1_000)).await;
    assert_eq!(h.capture.state(), CaptureState::Acquiring);

    h.capture.stop().await;
    assert_eq!(h.capture.state(), CaptureState::Idle);

    advance(Duration::from_millis(20_000)).await;
    assert_eq!(h.camera.acquired(), 1);
    assert_eq!(h.camera.live(), 0);
    assert_eq!(h.uploader.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_while_acquiring_releases_late_source() {
    let h = harness(
        FakeCamera::slow(Duration::from_millis(10_000)),
        FakeUploader::default(),
    );
    let camera = h.camera.clone();
    let uploader = h.uploader.clone();

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(1_000)).await;
    drop(h);

    advance(Duration::from_millis(20_000)).await;
    assert_eq!(camera.acquired(), 1);
    assert_eq!(camera.live(), 0);
    assert_eq!(uploader.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_while_streaming_releases_camera() {
    let h = harness(FakeCamera::default(), FakeUploader::default());
    let camera = h.camera.clone();
    let uploader = h.uploader.clone();

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(6_000)).await;
    drop(h);

    advance(Duration::from_millis(20_000)).await;
    assert_eq!(camera.live(), 0);
    assert_eq!(uploader.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_restart_acquires_fresh_camera() {
    let h = harness(FakeCamera::default(), FakeUploader::default());

    h.capture.apply(CaptureConfig::active(INTERVAL)).await;
    advance(Duration::from_millis(6_000)).await;
    h.capture.apply(CaptureConfig::inactive(INTERVAL)).await;
    assert_eq!(h.camera.live(), 0);

    h.capture.apply(CaptureConfig::active(INTERVAL)).await;
    advance(Duration::from_millis(1_000)).await;

    assert_eq!(h.camera.acquired(), 2);
    assert_eq!(h.camera.live(), 1);
    // 2 in the first period, 1 immediate capture in the second
    assert_eq!(h.uploader.calls(), 3);

    h.capture.stop().await;
    assert_eq!(h.camera.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_double_start_keeps_single_timer() {
    let h = harness(FakeCamera::default(), FakeUploader::default());

    h.capture.start(INTERVAL).await;
    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(12_000)).await;

    assert_eq!(h.camera.acquired(), 1);
    assert_eq!(h.uploader.calls(), 3);

    h.capture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_while_active_is_ignored() {
    let h = harness(FakeCamera::default(), FakeUploader::default());

    h.capture.start(INTERVAL).await;
    h.capture.start(Duration::from_millis(1_000)).await;
    advance(Duration::from_millis(12_000)).await;

    assert_eq!(h.uploader.calls(), 3);
    h.capture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_encode_skips_submission() {
    let h = harness_with_encoder(
        FakeCamera::default(),
        FakeUploader::default(),
        Arc::new(EmptyEncoder),
    );

    h.capture.start(INTERVAL).await;
    advance(Duration::from_millis(12_000)).await;

    assert_eq!(h.uploader.calls(), 0);
    let stats = h.capture.stats();
    assert_eq!(stats.ticks, 3);
    assert_eq!(stats.skipped, 3);
    assert_eq!(h.capture.state(), CaptureState::Streaming);

    h.capture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_start_is_noop() {
    let h = harness(FakeCamera::default(), FakeUploader::default());

    h.capture.stop().await;
    assert_eq!(h.capture.state(), CaptureState::Idle);
    assert_eq!(h.camera.acquired(), 0);
}
