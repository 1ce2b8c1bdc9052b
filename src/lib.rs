//! CrimeWatch Client Library
//!
//! Client side of the CrimeWatch weapon/violence monitoring service.
//!
//! ## Architecture
//!
//! 1. DurableStore - Persisted client state (token, theme)
//! 2. SessionStore - Process-wide session with change notification
//! 3. SessionVerifier - Fail-closed `/auth/verify` check with timeout
//! 4. RouteGuard - Verification-then-render for protected views
//! 5. CaptureLoop - Webcam capture, JPEG encode, frame upload, alert forwarding
//! 6. ApiClient - CrimeWatch HTTP API adapter
//! 7. AlertFeed - Alert list with weapon/violence filtering
//! 8. AuthForm - Sign-in / sign-up / alternate e-mail forms
//! 9. ThemeStore - Light/dark preference
//!
//! The remote API, detection model and storage behind it are external.

pub mod alert_feed;
pub mod api_client;
pub mod auth_form;
pub mod capture;
pub mod durable_store;
pub mod error;
pub mod models;
pub mod session;
pub mod state;
pub mod theme;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};
