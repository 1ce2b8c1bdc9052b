//! Alternate e-mail registration for emergency alerts
//!
//! No remote endpoint exists for this; submission is local.

use crate::error::{Error, Result};

/// Loose address check: one `@`, non-empty local part, dotted domain
pub fn looks_like_email(value: &str) -> bool {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split('.')
            .filter(|part| !part.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Up to two alternate addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlternateEmails {
    pub primary: String,
    pub secondary: Option<String>,
    submitted: bool,
}

impl AlternateEmails {
    pub fn new(primary: impl Into<String>, secondary: Option<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.filter(|s| !s.trim().is_empty()),
            submitted: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !looks_like_email(&self.primary) {
            return Err(Error::Validation(
                "Alternate Email 1 must be a valid address".to_string(),
            ));
        }
        if let Some(secondary) = &self.secondary {
            if !looks_like_email(secondary) {
                return Err(Error::Validation(
                    "Alternate Email 2 must be a valid address".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Validate and mark as submitted
    pub fn submit(&mut self) -> Result<()> {
        self.validate()?;
        self.submitted = true;
        tracing::info!(
            count = 1 + usize::from(self.secondary.is_some()),
            "Alternate emails registered"
        );
        Ok(())
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_email() {
        assert!(looks_like_email("primary@example.com"));
        assert!(!looks_like_email("primary@example"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("a@@example.com"));
        assert!(!looks_like_email("a b@example.com"));
    }

    #[test]
    fn test_primary_required_secondary_optional() {
        let mut emails = AlternateEmails::new("primary@example.com", None);
        emails.submit().unwrap();
        assert!(emails.is_submitted());

        let mut missing = AlternateEmails::new("", Some("secondary@example.com".to_string()));
        assert!(missing.submit().is_err());
        assert!(!missing.is_submitted());
    }

    #[test]
    fn test_blank_secondary_is_ignored() {
        let emails = AlternateEmails::new("primary@example.com", Some("  ".to_string()));
        assert!(emails.secondary.is_none());
        assert!(emails.validate().is_ok());
    }

    #[test]
    fn test_invalid_secondary_rejected() {
        let emails = AlternateEmails::new("primary@example.com", Some("nope".to_string()));
        assert!(emails.validate().is_err());
    }
}
