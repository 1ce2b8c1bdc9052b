//! Error handling for the CrimeWatch client

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP client error (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote API answered with a non-success status
    #[error("Rejected by server ({status}){}", detail_suffix(.detail))]
    Rejected { status: u16, detail: Option<String> },

    /// Camera could not be acquired (permission denied, no device)
    #[error("Camera acquisition failed: {0}")]
    Acquisition(String),

    /// Frame encoding error
    #[error("Encode error: {0}")]
    Encode(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Validation error (form input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Durable storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

impl Error {
    /// Server-provided message for a rejected request, if any
    pub fn server_detail(&self) -> Option<&str> {
        match self {
            Error::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// HTTP status for a rejected request
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Rejected { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::Encode(err.to_string())
    }
}
