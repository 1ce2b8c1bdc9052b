//! AuthForm - sign-in / sign-up submission
//!
//! ## Responsibilities
//!
//! - Validate fields locally before any request
//! - Sign-in: store the issued token in the session, go to the dashboard
//! - Sign-up: create the account, go to sign-in
//! - Failures keep the entered values and expose the server's message
//!   (or a generic one) for inline display

pub mod registration;

use crate::api_client::{ApiClient, SignInRequest, SignUpRequest};
use crate::error::{Error, Result};
use crate::session::{SessionStore, DASHBOARD_ROUTE, SIGN_IN_ROUTE};

/// Shown when the server gives no usable message
pub const GENERIC_SIGN_IN_ERROR: &str = "Sign in failed. Please try again.";
pub const GENERIC_SIGN_UP_ERROR: &str = "Sign up failed. Please try again.";

/// Which form this is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFormKind {
    SignIn,
    SignUp,
}

impl AuthFormKind {
    pub fn title(&self) -> &'static str {
        match self {
            AuthFormKind::SignIn => "Sign In to Dashboard",
            AuthFormKind::SignUp => "Create an Account",
        }
    }

    pub fn button_text(&self) -> &'static str {
        match self {
            AuthFormKind::SignIn => "Sign In",
            AuthFormKind::SignUp => "Sign Up",
        }
    }

    fn generic_error(&self) -> &'static str {
        match self {
            AuthFormKind::SignIn => GENERIC_SIGN_IN_ERROR,
            AuthFormKind::SignUp => GENERIC_SIGN_UP_ERROR,
        }
    }
}

/// Field values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthFields {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Result of a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSuccess {
    SignedIn { redirect: String },
    SignedUp { username: String, redirect: String },
}

/// Form state
#[derive(Debug, Clone)]
pub struct AuthForm {
    kind: AuthFormKind,
    pub fields: AuthFields,
    error: Option<String>,
}

impl AuthForm {
    pub fn new(kind: AuthFormKind) -> Self {
        Self {
            kind,
            fields: AuthFields::default(),
            error: None,
        }
    }

    pub fn sign_in(username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut form = Self::new(AuthFormKind::SignIn);
        form.fields.username = username.into();
        form.fields.password = password.into();
        form
    }

    pub fn sign_up(
        full_name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut form = Self::new(AuthFormKind::SignUp);
        form.fields = AuthFields {
            full_name: full_name.into(),
            username: username.into(),
            email: email.into(),
            password: password.into(),
        };
        form
    }

    pub fn kind(&self) -> AuthFormKind {
        self.kind
    }

    /// Inline error from the last submission
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Local checks before hitting the server
    pub fn validate(&self) -> Result<()> {
        let f = &self.fields;
        if f.username.trim().is_empty() {
            return Err(Error::Validation("Username is required".to_string()));
        }
        if f.password.is_empty() {
            return Err(Error::Validation("Password is required".to_string()));
        }
        if self.kind == AuthFormKind::SignUp {
            if f.full_name.trim().is_empty() {
                return Err(Error::Validation("Full name is required".to_string()));
            }
            if !registration::looks_like_email(&f.email) {
                return Err(Error::Validation("A valid email is required".to_string()));
            }
        }
        Ok(())
    }

    /// Submit; on failure `error()` holds the message to show
    pub async fn submit(&mut self, api: &ApiClient, session: &SessionStore) -> Result<AuthSuccess> {
        self.error = None;

        let outcome = match self.validate() {
            Ok(()) => self.send(api, session).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            self.error = Some(self.message_for(e));
            tracing::warn!(form = ?self.kind, error = %e, "Authentication form rejected");
        }

        outcome
    }

    async fn send(&self, api: &ApiClient, session: &SessionStore) -> Result<AuthSuccess> {
        let f = &self.fields;
        match self.kind {
            AuthFormKind::SignIn => {
                let token = api
                    .sign_in(&SignInRequest {
                        username: f.username.trim().to_string(),
                        password: f.password.clone(),
                    })
                    .await?;
                session.login(token.access_token)?;
                Ok(AuthSuccess::SignedIn {
                    redirect: DASHBOARD_ROUTE.to_string(),
                })
            }
            AuthFormKind::SignUp => {
                let user = api
                    .sign_up(&SignUpRequest {
                        full_name: f.full_name.trim().to_string(),
                        username: f.username.trim().to_string(),
                        email: f.email.trim().to_string(),
                        password: f.password.clone(),
                    })
                    .await?;
                Ok(AuthSuccess::SignedUp {
                    username: user.username,
                    redirect: SIGN_IN_ROUTE.to_string(),
                })
            }
        }
    }

    fn message_for(&self, err: &Error) -> String {
        match err {
            Error::Validation(msg) => msg.clone(),
            Error::Rejected { detail: Some(d), .. } => d.clone(),
            _ => self.kind.generic_error().to_string(),
        }
    }
}
