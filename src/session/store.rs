//! SessionStore - single source of truth for the session token
//!
//! The in-memory copy lives in a `watch` channel so every dependent
//! (navigation, route guard, CLI) sees changes without re-reading storage.
//! Durable storage is written before memory on login; logout clears
//! memory even if the durable removal fails.

use crate::durable_store::{DurableStore, TOKEN_KEY};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Current authentication state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
}

impl Session {
    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }
}

/// Process-wide session holder
pub struct SessionStore {
    storage: Arc<dyn DurableStore>,
    state: watch::Sender<Session>,
    hydrated: AtomicBool,
}

impl SessionStore {
    /// Create a store backed by durable storage; the token is read lazily
    pub fn new(storage: Arc<dyn DurableStore>) -> Self {
        let (state, _rx) = watch::channel(Session::default());
        Self {
            storage,
            state,
            hydrated: AtomicBool::new(false),
        }
    }

    /// Load the durable copy into memory once
    fn hydrate(&self) {
        if self.hydrated.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.storage.get(TOKEN_KEY) {
            Ok(token) => {
                let token = token.filter(|t| !t.is_empty());
                self.state.send_if_modified(|s| {
                    if s.token.is_none() && token.is_some() {
                        s.token = token;
                        true
                    } else {
                        false
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored session token");
            }
        }
    }

    /// Current token
    pub fn token(&self) -> Option<String> {
        self.hydrate();
        self.state.borrow().token.clone()
    }

    /// Current session snapshot
    pub fn session(&self) -> Session {
        self.hydrate();
        self.state.borrow().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session().is_logged_in()
    }

    /// Store a token; repeated calls with the same token are no-ops for observers
    pub fn login(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.hydrate();

        self.storage.set(TOKEN_KEY, &token)?;

        let changed = self.state.send_if_modified(|s| {
            if s.token.as_deref() == Some(token.as_str()) {
                false
            } else {
                s.token = Some(token.clone());
                true
            }
        });

        if changed {
            tracing::info!("Session started");
        }
        Ok(())
    }

    /// Clear the session
    ///
    /// Memory is cleared first and stays cleared whatever storage does. If
    /// the durable copy cannot be removed it is blanked instead, which the
    /// next start reads as signed out. The error is returned only when
    /// neither works; the stored token may then come back after a restart.
    pub fn logout(&self) -> Result<()> {
        self.hydrated.store(true, Ordering::SeqCst);

        let changed = self.state.send_if_modified(|s| s.token.take().is_some());
        if changed {
            tracing::info!("Session ended");
        }

        match self.storage.remove(TOKEN_KEY) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to remove stored session token, blanking it");
                self.storage.set(TOKEN_KEY, "").map_err(|_| e)
            }
        }
    }

    /// Clear the session only if it still holds `token`
    ///
    /// Returns true when the session was cleared.
    pub fn invalidate(&self, token: &str) -> Result<bool> {
        self.hydrate();
        if self.state.borrow().token.as_deref() != Some(token) {
            return Ok(false);
        }
        self.logout()?;
        Ok(true)
    }

    /// Subscribe to session changes
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.hydrate();
        self.state.subscribe()
    }
}
