//! ApiClient - CrimeWatch API Communication Adapter
//!
//! ## Responsibilities
//!
//! - Authentication calls (`/auth/signin`, `/auth/signup`, `/auth/verify`)
//! - Frame upload (`/upload-frame/`, multipart)
//! - Alert listing and snapshot download
//! - Mapping non-success responses to `Error::Rejected` with the server detail

use crate::capture::FrameUploader;
use crate::error::{Error, Result};
use crate::models::Alert;
use crate::session::VerifyTransport;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Camera identifier sent when none is configured
pub const DEFAULT_CAMERA_ID: &str = "camera_01";

/// CrimeWatch API client
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    camera_id: String,
    timeout: Duration,
}

/// Sign-in request body
#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
}

/// Sign-up request body
#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Token issued by `/auth/signin`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Account created by `/auth/signup`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOut {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
}

/// `/auth/verify` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub status: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// `/upload-frame/` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadFrameResponse {
    #[serde(default, deserialize_with = "crate::models::deserialize_alert")]
    pub alert: Option<Alert>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// `/alerts/` response
#[derive(Debug, Clone, Deserialize)]
struct AlertsResponse {
    #[serde(default)]
    alerts: Vec<Alert>,
}

/// Error body; FastAPI sends either a string or a list of validation errors
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Validation(Vec<ValidationItem>),
}

#[derive(Debug, Deserialize)]
struct ValidationItem {
    msg: String,
}

impl ErrorDetail {
    fn into_message(self) -> Option<String> {
        match self {
            ErrorDetail::Message(m) => Some(m),
            ErrorDetail::Validation(items) => items.into_iter().next().map(|i| i.msg),
        }
    }
}

/// Pull the `detail` text out of an error body, if present
fn parse_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail.into_message())
        .filter(|m| !m.trim().is_empty())
}

impl ApiClient {
    /// Create new API client
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create new API client with custom timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            camera_id: DEFAULT_CAMERA_ID.to_string(),
            timeout,
        })
    }

    /// Set the camera identifier sent with each frame
    pub fn with_camera_id(mut self, camera_id: impl Into<String>) -> Self {
        self.camera_id = camera_id.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into `Error::Rejected`
    async fn reject(resp: reqwest::Response) -> Error {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Error::Rejected {
            status,
            detail: parse_detail(&body),
        }
    }

    /// Decode a success body; undecodable bodies become `Error::Serialization`
    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Check API reachability (`GET /`)
    pub async fn health_check(&self) -> Result<bool> {
        match self.client.get(self.url("/")).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Sign in with username and password
    pub async fn sign_in(&self, request: &SignInRequest) -> Result<TokenResponse> {
        let resp = self
            .client
            .post(self.url("/auth/signin"))
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::reject(resp).await);
        }

        let token: TokenResponse = Self::decode(resp).await?;
        tracing::info!(username = %request.username, "Signed in");
        Ok(token)
    }

    /// Create an account
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<UserOut> {
        let resp = self
            .client
            .post(self.url("/auth/signup"))
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::reject(resp).await);
        }

        let user: UserOut = Self::decode(resp).await?;
        tracing::info!(username = %user.username, "Account created");
        Ok(user)
    }

    /// Ask the server whether a token is still valid
    pub async fn verify_token(&self, token: &str) -> Result<VerifyResponse> {
        let resp = self
            .client
            .get(self.url("/auth/verify"))
            .bearer_auth(token)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::reject(resp).await);
        }

        Self::decode(resp).await
    }

    /// Upload one encoded frame for analysis
    pub async fn upload(&self, jpeg: Vec<u8>, file_name: String) -> Result<UploadFrameResponse> {
        let form = Form::new()
            .part(
                "frame",
                Part::bytes(jpeg)
                    .file_name(file_name)
                    .mime_str("image/jpeg")?,
            )
            .text("camera_id", self.camera_id.clone());

        let resp = self
            .client
            .post(self.url("/upload-frame/"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::reject(resp).await);
        }

        Self::decode(resp).await
    }

    /// Fetch the most recent alerts
    pub async fn list_alerts(&self, limit: u32) -> Result<Vec<Alert>> {
        let resp = self
            .client
            .get(self.url("/alerts/"))
            .query(&[("limit", limit)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::reject(resp).await);
        }

        let body: AlertsResponse = Self::decode(resp).await?;
        Ok(body.alerts)
    }

    /// Download a stored snapshot image
    pub async fn fetch_snapshot(&self, filename: &str) -> Result<Vec<u8>> {
        if filename.is_empty() || filename.contains('/') || filename.contains("..") {
            return Err(Error::Validation(format!("invalid snapshot name: {}", filename)));
        }

        let resp = self
            .client
            .get(self.url(&format!("/snapshot/{}", filename)))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::reject(resp).await);
        }

        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        // The server answers 200 with {"error": ...} for unknown files
        if is_json {
            let body = resp.text().await?;
            return Err(Error::Rejected {
                status: 404,
                detail: serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from)),
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl FrameUploader for ApiClient {
    async fn upload_frame(&self, jpeg: Vec<u8>, file_name: String) -> Result<UploadFrameResponse> {
        self.upload(jpeg, file_name).await
    }
}

#[async_trait]
impl VerifyTransport for ApiClient {
    async fn verify(&self, token: &str) -> Result<VerifyResponse> {
        self.verify_token(token).await
    }
}
