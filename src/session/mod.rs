//! Session - Authentication state and gating
//!
//! ## Components
//!
//! - `SessionStore`: the process-wide token holder with change notification
//! - `SessionVerifier`: fail-closed token check against `/auth/verify`
//! - `RouteGuard`: verification-then-render gate for protected views

mod guard;
mod store;
mod verifier;

pub use guard::{
    GuardOutcome, GuardState, RouteGuard, CHECKING_MESSAGE, DASHBOARD_ROUTE, SIGN_IN_ROUTE,
};
pub use store::{Session, SessionStore};
pub use verifier::{
    InvalidSession, SessionVerifier, VerifiedUser, VerifyTransport, DEFAULT_VERIFY_TIMEOUT,
};
