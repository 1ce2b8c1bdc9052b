//! RouteGuard - verification-then-render for protected views
//!
//! A protected view only runs after the server confirmed the token. While
//! the check is pending the published state is `Checking`; a missing or
//! invalid token ends in `Redirect` to the sign-in route.

use super::store::SessionStore;
use super::verifier::{SessionVerifier, VerifiedUser};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Sign-in entry point
pub const SIGN_IN_ROUTE: &str = "/signin";
/// Landing route after sign-in
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// Placeholder text shown while verification is pending
pub const CHECKING_MESSAGE: &str = "Checking authentication...";

/// Guard state as seen by the page layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    /// No check has run yet
    Pending,
    /// Verification in flight; render the placeholder
    Checking,
    /// Verified; the protected view may render
    Allowed(VerifiedUser),
    /// Not allowed; navigate here
    Redirect(String),
}

/// Outcome of running a protected view
#[derive(Debug, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    Rendered(T),
    Redirected(String),
}

/// Gate composed of the session store and verifier
pub struct RouteGuard {
    session: Arc<SessionStore>,
    verifier: Arc<SessionVerifier>,
    sign_in_route: String,
    state: watch::Sender<GuardState>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionStore>, verifier: Arc<SessionVerifier>) -> Self {
        let (state, _rx) = watch::channel(GuardState::Pending);
        Self {
            session,
            verifier,
            sign_in_route: SIGN_IN_ROUTE.to_string(),
            state,
        }
    }

    /// Override the redirect target
    pub fn with_sign_in_route(mut self, route: impl Into<String>) -> Self {
        self.sign_in_route = route.into();
        self
    }

    /// Subscribe to guard state changes
    pub fn subscribe(&self) -> watch::Receiver<GuardState> {
        self.state.subscribe()
    }

    /// Latest guard state
    pub fn state(&self) -> GuardState {
        self.state.borrow().clone()
    }

    fn publish(&self, state: GuardState) -> GuardState {
        self.state.send_replace(state.clone());
        state
    }

    fn redirect(&self) -> GuardState {
        self.publish(GuardState::Redirect(self.sign_in_route.clone()))
    }

    /// Run one activation check
    ///
    /// Dropping the returned future mid-verification puts back the state
    /// that was published before `Checking`.
    pub async fn check(&self) -> GuardState {
        // Fast path: no token means no request
        let Some(token) = self.session.token() else {
            tracing::debug!("No session token, redirecting to sign-in");
            if let Err(e) = self.session.logout() {
                tracing::warn!(error = %e, "Failed to clear stale session");
            }
            return self.redirect();
        };

        let previous = self.state.send_replace(GuardState::Checking);
        let restore = RestoreOnDrop {
            state: &self.state,
            previous: Some(previous),
        };

        let result = self.verifier.verify(&token).await;
        restore.disarm();

        match result {
            Ok(user) => self.publish(GuardState::Allowed(user)),
            Err(reason) => {
                tracing::info!(reason = %reason, route = %self.sign_in_route, "Redirecting to sign-in");
                self.redirect()
            }
        }
    }

    /// Render `view` only after verification succeeds
    pub async fn render<T, F, Fut>(&self, view: F) -> GuardOutcome<T>
    where
        F: FnOnce(VerifiedUser) -> Fut,
        Fut: Future<Output = T>,
    {
        match self.check().await {
            GuardState::Allowed(user) => GuardOutcome::Rendered(view(user).await),
            GuardState::Redirect(route) => GuardOutcome::Redirected(route),
            // check() always ends in Allowed or Redirect
            _ => GuardOutcome::Redirected(self.sign_in_route.clone()),
        }
    }
}

/// Puts `previous` back unless disarmed; covers a cancelled `check`
struct RestoreOnDrop<'a> {
    state: &'a watch::Sender<GuardState>,
    previous: Option<GuardState>,
}

impl RestoreOnDrop<'_> {
    fn disarm(mut self) {
        self.previous = None;
    }
}

impl Drop for RestoreOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            tracing::debug!("Verification abandoned, restoring guard state");
            self.state.send_replace(previous);
        }
    }
}
