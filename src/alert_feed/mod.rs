//! AlertFeed - cached alert list for the alerts view
//!
//! ## Responsibilities
//!
//! - Fetch recent alerts from `/alerts/`
//! - Keep the previous list when a refresh fails
//! - Provide the weapon/violence view

use crate::api_client::ApiClient;
use crate::error::Result;
use crate::models::{filter_danger, Alert};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of alerts requested
pub const DEFAULT_ALERT_LIMIT: u32 = 20;

/// AlertFeed instance
pub struct AlertFeed {
    api: Arc<ApiClient>,
    limit: u32,
    alerts: RwLock<Vec<Alert>>,
}

impl AlertFeed {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self::with_limit(api, DEFAULT_ALERT_LIMIT)
    }

    pub fn with_limit(api: Arc<ApiClient>, limit: u32) -> Self {
        Self {
            api,
            limit: limit.max(1),
            alerts: RwLock::new(Vec::new()),
        }
    }

    /// Refetch; on failure the cached list is left unchanged
    pub async fn refresh(&self) -> Result<usize> {
        match self.api.list_alerts(self.limit).await {
            Ok(alerts) => {
                let count = alerts.len();
                *self.alerts.write().await = alerts;
                tracing::debug!(count, "Alerts refreshed");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error fetching alerts");
                Err(e)
            }
        }
    }

    /// All cached alerts
    pub async fn all(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    /// Cached weapon/violence alerts
    pub async fn danger_alerts(&self) -> Vec<Alert> {
        filter_danger(&self.alerts.read().await)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
