//! SessionVerifier - fail-closed token verification
//!
//! Every call issues a fresh request; results are never cached. Any
//! non-success outcome, including a timeout or an unreadable body, is
//! `Invalid`, and an invalid outcome clears the local session.

use super::store::SessionStore;
use crate::api_client::VerifyResponse;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound for one verification round-trip
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport for the verification call
#[async_trait]
pub trait VerifyTransport: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifyResponse>;
}

/// Identity confirmed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Reasons a session is treated as invalid
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSession {
    #[error("no session token")]
    MissingToken,

    #[error("token rejected by server ({0})")]
    Rejected(u16),

    #[error("verification request failed: {0}")]
    Unreachable(String),

    #[error("verification response unreadable: {0}")]
    Malformed(String),

    #[error("verification timed out")]
    TimedOut,
}

/// Token verifier bound to the session store it invalidates
pub struct SessionVerifier {
    transport: Arc<dyn VerifyTransport>,
    session: Arc<SessionStore>,
    timeout: Duration,
}

impl SessionVerifier {
    pub fn new(transport: Arc<dyn VerifyTransport>, session: Arc<SessionStore>) -> Self {
        Self::with_timeout(transport, session, DEFAULT_VERIFY_TIMEOUT)
    }

    pub fn with_timeout(
        transport: Arc<dyn VerifyTransport>,
        session: Arc<SessionStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            session,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Verify `token`; on any failure the session holding it is cleared
    pub async fn verify(&self, token: &str) -> std::result::Result<VerifiedUser, InvalidSession> {
        let outcome = self.check(token).await;

        if let Err(reason) = &outcome {
            tracing::warn!(reason = %reason, "Session verification failed");
            if let Err(e) = self.session.invalidate(token) {
                tracing::error!(error = %e, "Failed to clear invalid session");
            }
        }

        outcome
    }

    async fn check(&self, token: &str) -> std::result::Result<VerifiedUser, InvalidSession> {
        if token.is_empty() {
            return Err(InvalidSession::MissingToken);
        }

        let response = tokio::time::timeout(self.timeout, self.transport.verify(token))
            .await
            .map_err(Error::from)
            .and_then(|result| result);

        match response {
            Ok(body) => {
                tracing::debug!(status = %body.status, "Session verified");
                Ok(VerifiedUser {
                    username: body.username,
                    email: body.email,
                })
            }
            Err(Error::Rejected { status, .. }) => Err(InvalidSession::Rejected(status)),
            Err(Error::Serialization(e)) => Err(InvalidSession::Malformed(e.to_string())),
            Err(Error::Timeout) => Err(InvalidSession::TimedOut),
            Err(Error::Http(e)) if e.is_timeout() => Err(InvalidSession::TimedOut),
            Err(Error::Http(e)) if e.is_decode() => Err(InvalidSession::Malformed(e.to_string())),
            Err(e) => Err(InvalidSession::Unreachable(e.to_string())),
        }
    }
}
