//! Application state
//!
//! Holds configuration and the shared client components

use crate::alert_feed::{AlertFeed, DEFAULT_ALERT_LIMIT};
use crate::api_client::{ApiClient, DEFAULT_CAMERA_ID};
use crate::capture::{
    AlertCallback, CaptureLoop, FfmpegCamera, JpegFrameEncoder, DEFAULT_CAPTURE_INTERVAL,
};
use crate::durable_store::{DurableStore, FileStore};
use crate::error::{Error, Result};
use crate::session::{RouteGuard, SessionStore, SessionVerifier, DEFAULT_VERIFY_TIMEOUT};
use crate::theme::ThemeStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".crimewatch"))
        .unwrap_or_else(|_| PathBuf::from(".crimewatch"))
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// CrimeWatch API base URL
    pub api_url: String,
    /// Durable client state directory (token, theme)
    pub data_dir: PathBuf,
    /// Camera device handed to ffmpeg
    pub camera_device: String,
    /// ffmpeg input format for the camera
    pub camera_format: String,
    /// Identifier sent with each frame
    pub camera_id: String,
    /// Capture cadence
    pub capture_interval: Duration,
    /// Verification timeout
    pub verify_timeout: Duration,
    /// HTTP client timeout
    pub http_timeout: Duration,
    /// Alerts requested per refresh
    pub alert_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: env_or("CRIMEWATCH_API_URL", "http://localhost:8000"),
            data_dir: std::env::var("CRIMEWATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),
            camera_device: env_or("CRIMEWATCH_CAMERA_DEVICE", "/dev/video0"),
            camera_format: env_or("CRIMEWATCH_CAMERA_FORMAT", "v4l2"),
            camera_id: env_or("CRIMEWATCH_CAMERA_ID", DEFAULT_CAMERA_ID),
            capture_interval: Duration::from_millis(env_parse(
                "CRIMEWATCH_CAPTURE_INTERVAL_MS",
                DEFAULT_CAPTURE_INTERVAL.as_millis() as u64,
            )),
            verify_timeout: Duration::from_millis(env_parse(
                "CRIMEWATCH_VERIFY_TIMEOUT_MS",
                DEFAULT_VERIFY_TIMEOUT.as_millis() as u64,
            )),
            http_timeout: Duration::from_secs(env_parse("CRIMEWATCH_HTTP_TIMEOUT_SECS", 30)),
            alert_limit: env_parse("CRIMEWATCH_ALERT_LIMIT", DEFAULT_ALERT_LIMIT),
        }
    }
}

impl AppConfig {
    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "API URL must start with http:// or https://: {}",
                self.api_url
            )));
        }
        if self.capture_interval.is_zero() {
            return Err(Error::Config("capture interval must be > 0".to_string()));
        }
        if self.verify_timeout.is_zero() {
            return Err(Error::Config("verify timeout must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Shared client components
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub api: Arc<ApiClient>,
    pub storage: Arc<dyn DurableStore>,
    pub session: Arc<SessionStore>,
    pub verifier: Arc<SessionVerifier>,
    pub guard: Arc<RouteGuard>,
    pub theme: Arc<ThemeStore>,
    pub alerts: Arc<AlertFeed>,
}

impl AppState {
    /// Wire components with file-backed storage from `config.data_dir`
    pub fn new(config: AppConfig) -> Result<Self> {
        let storage: Arc<dyn DurableStore> = Arc::new(FileStore::open(&config.data_dir)?);
        Self::with_storage(config, storage)
    }

    /// Wire components over a given storage backend
    pub fn with_storage(config: AppConfig, storage: Arc<dyn DurableStore>) -> Result<Self> {
        config.validate()?;

        let api = Arc::new(
            ApiClient::with_timeout(config.api_url.clone(), config.http_timeout)?
                .with_camera_id(config.camera_id.clone()),
        );
        let session = Arc::new(SessionStore::new(storage.clone()));
        let verifier = Arc::new(SessionVerifier::with_timeout(
            api.clone(),
            session.clone(),
            config.verify_timeout,
        ));
        let guard = Arc::new(RouteGuard::new(session.clone(), verifier.clone()));
        let theme = Arc::new(ThemeStore::new(storage.clone()));
        let alerts = Arc::new(AlertFeed::with_limit(api.clone(), config.alert_limit));

        Ok(Self {
            config,
            api,
            storage,
            session,
            verifier,
            guard,
            theme,
            alerts,
        })
    }

    /// Dashboard capture loop over the configured camera
    pub fn capture_loop(&self, on_alert: AlertCallback) -> CaptureLoop {
        let camera = FfmpegCamera::new(
            self.config.camera_device.clone(),
            self.config.camera_format.clone(),
        );
        CaptureLoop::new(
            Arc::new(camera),
            Arc::new(JpegFrameEncoder::default()),
            self.api.clone(),
            on_alert,
        )
    }
}
